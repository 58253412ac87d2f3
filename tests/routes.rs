#![cfg(feature = "web")]

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use std::sync::Arc;
use tower::ServiceExt;

use diabetes_dashboard::app::{AppState, router};
use diabetes_dashboard::record::Row;
use diabetes_dashboard::saving::LocalSheet;
use diabetes_dashboard::{
    AgeBand, BmiClass, GatewayError, Outcome, RecordId, RecordInput, RecordStore, SheetGateway,
};

const TOKEN: &str = "test-token";

fn fixture() -> (tempfile::TempDir, Router, RecordStore) {
    let dir = tempfile::tempdir().unwrap();
    let sheet = LocalSheet::open(dir.path().join("records.bin.gz")).unwrap();
    let store = RecordStore::new(Arc::new(sheet));
    let app = router(AppState::new(store.clone()).unwrap(), dir.path());
    (dir, app, store)
}

fn input(age: u32, bmi: f64, outcome: Outcome) -> RecordInput {
    RecordInput {
        pregnancies: 2,
        glucose: 120,
        blood_pressure: 70,
        skin_thickness: 20,
        insulin: 80,
        bmi,
        pedigree: 0.5,
        age,
        outcome,
    }
}

async fn get(app: &Router, uri: &str) -> Response {
    app.clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn post_form(app: &Router, uri: &str, body: &str) -> Response {
    let request = Request::post(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(header::COOKIE, format!("csrf_token={}", TOKEN))
        .body(Body::from(body.to_string()))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn location(response: &Response) -> &str {
    response.headers()[header::LOCATION].to_str().unwrap()
}

fn set_cookies(response: &Response) -> String {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

fn record_body(age: &str, csrf: &str) -> String {
    format!(
        "pregnancies=2&glucose=120&blood_pressure=70&skin_thickness=20&insulin=0\
         &bmi=27.5&diabetes_pedigree_function=0.45&age={}&outcome=1&csrf_token={}",
        age, csrf
    )
}

#[tokio::test]
async fn empty_dashboard_renders() {
    let (_dir, app, _) = fixture();
    let response = get(&app, "/").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookies(&response).contains("csrf_token="));
    let html = body_text(response).await;
    assert!(html.contains("Dashboard"));
    assert!(html.contains("chart-diabetes-count"));
}

#[tokio::test]
async fn add_creates_record_with_derived_labels() {
    let (_dir, app, store) = fixture();

    let response = post_form(&app, "/add", &record_body("45", TOKEN)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    assert!(set_cookies(&response).contains("flash=success"));

    let record = store.get(RecordId(1)).await.unwrap().unwrap();
    assert_eq!(record.age, Some(45));
    assert_eq!(record.age_band, Some(AgeBand::Forties));
    assert_eq!(record.bmi_class, Some(BmiClass::Overweight));
    assert_eq!(record.outcome, Some(Outcome::Positive));
}

#[tokio::test]
async fn add_rejects_a_mismatched_csrf_token() {
    let (_dir, app, store) = fixture();
    let response = post_form(&app, "/add", &record_body("45", "forged")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(store.records().await.unwrap().is_empty());
}

#[tokio::test]
async fn add_rerenders_invalid_form_with_messages() {
    let (_dir, app, store) = fixture();
    let response = post_form(&app, "/add", &record_body("12", TOKEN)).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let html = body_text(response).await;
    assert!(html.contains("Number must be between 20 and 120."));
    // submitted values are kept
    assert!(html.contains("value=\"27.5\""));
    assert!(store.records().await.unwrap().is_empty());
}

#[tokio::test]
async fn flash_message_is_shown_once() {
    let (_dir, app, _) = fixture();
    let request = Request::get("/")
        .header(
            header::COOKIE,
            "flash=success:Data%20submitted%20successfully%21",
        )
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert!(set_cookies(&response).contains("flash="));
    let html = body_text(response).await;
    assert!(html.contains("alert-success"));
    assert!(html.contains("Data submitted successfully!"));
}

#[tokio::test]
async fn update_flow_redirects_then_edits() {
    let (_dir, app, store) = fixture();
    store.create(&input(25, 22.0, Outcome::Negative)).await.unwrap();

    let response = post_form(&app, "/update", &format!("row_number=1&csrf_token={}", TOKEN)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/edit_row/1");

    let html = body_text(get(&app, "/edit_row/1").await).await;
    assert!(html.contains("value=\"120\""));

    let response = post_form(&app, "/edit_row/1", &record_body("65", TOKEN)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let record = store.get(RecordId(1)).await.unwrap().unwrap();
    assert_eq!(record.age_band, Some(AgeBand::Sixties));
}

#[tokio::test]
async fn update_rejects_out_of_range_row_numbers() {
    let (_dir, app, store) = fixture();
    store.create(&input(25, 22.0, Outcome::Negative)).await.unwrap();

    let response = post_form(&app, "/update", &format!("row_number=2&csrf_token={}", TOKEN)).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body_text(response).await.contains("Number must be between 1 and 1."));
}

#[tokio::test]
async fn missing_rows_redirect_with_a_danger_flash() {
    let (_dir, app, _) = fixture();
    for uri in ["/edit_row/7", "/edit_row/abc", "/edit_row/0"] {
        let response = get(&app, uri).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "{uri}");
        assert_eq!(location(&response), "/update");
        assert!(set_cookies(&response).contains("flash=danger"));
    }
}

#[tokio::test]
async fn delete_clears_the_row_and_keeps_later_ids() {
    let (_dir, app, store) = fixture();
    store.create(&input(25, 22.0, Outcome::Negative)).await.unwrap();
    store.create(&input(35, 22.0, Outcome::Positive)).await.unwrap();
    store.create(&input(45, 22.0, Outcome::Negative)).await.unwrap();

    let response = post_form(&app, "/delete", &format!("row_number=2&csrf_token={}", TOKEN)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");

    assert!(store.get(RecordId(2)).await.unwrap().is_none());
    assert_eq!(store.get(RecordId(3)).await.unwrap().unwrap().age, Some(45));

    // deleting it again is a not-found
    let response = post_form(&app, "/delete", &format!("row_number=2&csrf_token={}", TOKEN)).await;
    assert_eq!(location(&response), "/update");
    assert!(set_cookies(&response).contains("flash=danger"));

    let html = body_text(get(&app, "/view").await).await;
    assert!(html.contains("<th>Row Number</th>"));
    assert!(html.contains("<td>3</td><td>2</td><td>120</td>"));
}

#[tokio::test]
async fn chart_pages_embed_series() {
    let (_dir, app, store) = fixture();
    store.create(&input(25, 22.0, Outcome::Positive)).await.unwrap();
    store.create(&input(28, 31.0, Outcome::Negative)).await.unwrap();

    for uri in ["/d", "/a", "/b", "/s", "/g", "/p", "/pr", "/st"] {
        let response = get(&app, uri).await;
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
    }
    let html = body_text(get(&app, "/d").await).await;
    assert!(html.contains(r#""labels":["20-30"]"#));
    assert!(html.contains(r#""values":[50.0]"#));
}

#[tokio::test]
async fn stats_api_and_exports() {
    let (_dir, app, store) = fixture();
    store.create(&input(25, 22.0, Outcome::Positive)).await.unwrap();
    store.create(&input(52, 31.0, Outcome::Negative)).await.unwrap();

    let response = get(&app, "/api/stats").await;
    assert_eq!(response.status(), StatusCode::OK);
    let stats: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(stats["count"], 2);
    assert_eq!(stats["total_diabetes_count"], 1);
    assert_eq!(stats["diabetes_counts"]["labels"], serde_json::json!(["20-30", "50-60"]));

    let response = get(&app, "/export.csv").await;
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv; charset=utf-8");
    let csv = body_text(response).await;
    assert!(csv.starts_with("Row Number,Pregnancies,"));
    assert_eq!(csv.lines().count(), 3);

    let response = get(&app, "/export.xlsx").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .ends_with(".xlsx\"")
    );
}

async fn assert_png(app: &Router, uri: &str) {
    let response = get(app, uri).await;
    assert_eq!(response.status(), StatusCode::OK, "{uri}");
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png", "{uri}");
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(bytes.starts_with(b"\x89PNG\r\n\x1a\n"), "{uri}");
}

#[tokio::test]
async fn png_charts_render_with_and_without_data() {
    let (_dir, app, store) = fixture();
    let charts = ["/chart/bmi-class.png", "/chart/pregnancies.png", "/chart/prevalence.png"];

    for uri in charts {
        assert_png(&app, uri).await;
    }

    store.create(&input(25, 17.0, Outcome::Positive)).await.unwrap();
    store.create(&input(35, 22.0, Outcome::Negative)).await.unwrap();
    store.create(&input(45, 31.0, Outcome::Positive)).await.unwrap();
    for uri in charts {
        assert_png(&app, uri).await;
    }
    // the extension is optional
    assert_png(&app, "/chart/glucose").await;
}

#[tokio::test]
async fn dashboard_cards_count_live_records() {
    let (_dir, app, store) = fixture();
    store.create(&input(25, 22.0, Outcome::Positive)).await.unwrap();
    store.create(&input(35, 22.0, Outcome::Negative)).await.unwrap();
    store.create(&input(45, 22.0, Outcome::Negative)).await.unwrap();
    store.delete(RecordId(2)).await.unwrap();

    let html = body_text(get(&app, "/").await).await;
    assert!(html.contains(
        r#"<span class="card-value">2</span><span class="card-label">Total records</span>"#
    ));
}

#[tokio::test]
async fn unknown_pages_and_charts_are_404() {
    let (_dir, app, _) = fixture();
    assert_eq!(get(&app, "/nope").await.status(), StatusCode::NOT_FOUND);
    assert_eq!(get(&app, "/chart/nope.png").await.status(), StatusCode::NOT_FOUND);
}

struct FailingSheet;

#[async_trait]
impl SheetGateway for FailingSheet {
    async fn fetch_all(&self) -> Result<Vec<Row>, GatewayError> {
        Err(unavailable())
    }

    async fn fetch_row(&self, _row: usize) -> Result<Option<Row>, GatewayError> {
        Err(unavailable())
    }

    async fn append(&self, _values: Row) -> Result<usize, GatewayError> {
        Err(unavailable())
    }

    async fn update(&self, _row: usize, _values: Row) -> Result<(), GatewayError> {
        Err(unavailable())
    }

    async fn clear(&self, _row: usize) -> Result<(), GatewayError> {
        Err(unavailable())
    }

    fn describe(&self) -> String {
        "failing sheet".to_string()
    }
}

fn unavailable() -> GatewayError {
    GatewayError::Status {
        status: 500,
        body: "backend error".to_string(),
    }
}

#[tokio::test]
async fn gateway_failures_render_the_error_page() {
    let store = RecordStore::new(Arc::new(FailingSheet));
    let app = router(AppState::new(store).unwrap(), "static");

    for uri in ["/", "/d", "/view", "/api/stats", "/update", "/edit_row/1", "/export.csv"] {
        let response = get(&app, uri).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE, "{uri}");
    }
    let html = body_text(get(&app, "/").await).await;
    assert!(html.contains("backend error"));

    let response = post_form(&app, "/add", &record_body("45", TOKEN)).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
