#![cfg(feature = "web")]

use axum::{
    Form, Json, Router,
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{MethodRouter, get},
};
use axum_extra::extract::cookie::CookieJar;
use handlebars::Handlebars;
use serde_json::{Value, json};
use std::path::Path as FsPath;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::aggregate::DashboardStats;
use crate::config::Config;
use crate::downloader;
use crate::form::{DiabetesForm, FieldErrors, RowNumberForm};
use crate::graph::{self, ChartKind, GraphOptions};
use crate::record::{Record, header_row};
use crate::session::{csrf_token, set_flash, take_flash, verify_csrf};
use crate::store::{RecordId, RecordStore, StoreError};

const NOT_FOUND_MESSAGE: &str = "Invalid row number or no data found";
const CSRF_MESSAGE: &str = "The form expired or was tampered with. Please submit it again.";

pub struct AppState {
    store: RecordStore,
    templates: Handlebars<'static>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(store: RecordStore) -> Result<SharedState, handlebars::TemplateError> {
        let mut templates = Handlebars::new();
        templates.register_partial("header", include_str!("./static/header.html"))?;
        templates.register_partial("footer", include_str!("./static/footer.html"))?;
        templates.register_template_string("dashboard", include_str!("./static/dashboard.html"))?;
        templates.register_template_string("chart", include_str!("./static/chart.html"))?;
        templates
            .register_template_string("record_form", include_str!("./static/record_form.html"))?;
        templates.register_template_string("row_number", include_str!("./static/row_number.html"))?;
        templates.register_template_string("view", include_str!("./static/view.html"))?;

        Ok(Arc::new(AppState { store, templates }))
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }
}

/// Handler failures. Gateway trouble is a 503 page, never an empty dashboard.
#[derive(Debug)]
pub enum AppError {
    Store(StoreError),
    Render(String),
    Chart(String),
    NotFound,
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::Store(e)
    }
}

impl From<handlebars::RenderError> for AppError {
    fn from(e: handlebars::RenderError) -> Self {
        AppError::Render(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Store(StoreError::NotFound(id)) => {
                (StatusCode::NOT_FOUND, format!("No record at row number {}", id))
            }
            AppError::Store(e) => {
                log::error!("sheet unavailable: {}", e);
                (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
            }
            AppError::Render(e) => {
                log::error!("template rendering failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Page rendering failed".to_string())
            }
            AppError::Chart(e) => {
                log::error!("chart rendering failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Chart rendering failed".to_string())
            }
            AppError::NotFound => (StatusCode::NOT_FOUND, "Page not found".to_string()),
        };
        (status, error_page(status, &message)).into_response()
    }
}

fn error_page(status: StatusCode, message: &str) -> Html<String> {
    let data = json!({
        "title": status.canonical_reason().unwrap_or("Error"),
        "status": status.as_u16(),
        "message": message,
    });
    match Handlebars::new().render_template(include_str!("./static/error.html"), &data) {
        Ok(html) => Html(html),
        Err(_) => Html(format!("<h1>{}</h1><p>{}</p>", status, message)),
    }
}

type HandlerResult = Result<Response, AppError>;

/// Render `template` with the flash message and CSRF token merged into `data`.
fn render(
    state: &AppState,
    jar: CookieJar,
    template: &str,
    mut data: Value,
    status: StatusCode,
) -> HandlerResult {
    let (jar, token) = csrf_token(jar);
    let (jar, flash) = take_flash(jar);
    if let Value::Object(map) = &mut data {
        map.insert("csrf_token".to_string(), json!(token));
        map.insert("flash".to_string(), json!(flash));
    }
    let html = state.templates.render(template, &data)?;
    Ok((status, jar, Html(html)).into_response())
}

fn flash_redirect(jar: CookieJar, category: &str, message: &str, to: &str) -> Response {
    (set_flash(jar, category, message), Redirect::to(to)).into_response()
}

// JSON embedded in a <script> block.
fn script_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|_| "null".to_string())
        .replace('<', "\\u003c")
}

pub fn router(state: SharedState, static_dir: impl AsRef<FsPath>) -> Router {
    Router::new()
        .route("/", get(dashboard))
        .route("/add", get(add_form).post(add_record))
        .route("/update", get(update_form).post(update_lookup))
        .route("/edit_row/:row_number", get(edit_form).post(edit_record))
        .route("/delete", get(delete_form).post(delete_record))
        .route("/view", get(view_sheet))
        .route("/d", chart_route(ChartKind::Prevalence))
        .route("/a", chart_route(ChartKind::Insulin))
        .route("/b", chart_route(ChartKind::BloodPressure))
        .route("/s", chart_route(ChartKind::SkinThickness))
        .route("/g", chart_route(ChartKind::Glucose))
        .route("/p", chart_route(ChartKind::Pedigree))
        .route("/pr", chart_route(ChartKind::PregnancyOutcomes))
        .route("/st", chart_route(ChartKind::BmiOutcomes))
        .route("/api/stats", get(api_stats))
        .route("/chart/:name", get(chart_png))
        .route("/export.csv", get(export_csv))
        .route("/export.xlsx", get(export_xlsx))
        .nest_service("/static", ServeDir::new(static_dir.as_ref()))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let store = RecordStore::new(config.backend.connect()?);
    log::info!("records live in {}", store.describe());

    let app = router(AppState::new(store)?, &config.static_dir);

    let listener = TcpListener::bind(config.bind_addr).await?;
    log::info!("listening on http://{}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

fn chart_route(kind: ChartKind) -> MethodRouter<SharedState> {
    get(move |state: State<SharedState>, jar: CookieJar| chart_page(state, jar, kind))
}

async fn not_found() -> AppError {
    AppError::NotFound
}

async fn dashboard(State(state): State<SharedState>, jar: CookieJar) -> HandlerResult {
    let records = state.store.records().await?;
    let stats = DashboardStats::compute(&records);
    let charts: Vec<_> = ChartKind::ALL.iter().map(|kind| kind.data(&records)).collect();

    render(
        &state,
        jar,
        "dashboard",
        json!({
            "title": "Dashboard",
            "stats": stats,
            "charts": charts,
            "charts_json": script_json(&charts),
        }),
        StatusCode::OK,
    )
}

async fn chart_page(State(state): State<SharedState>, jar: CookieJar, kind: ChartKind) -> HandlerResult {
    let records = state.store.records().await?;
    let chart = kind.data(&records);

    render(
        &state,
        jar,
        "chart",
        json!({
            "title": kind.title(),
            "chart": chart,
            "charts_json": script_json(&[&chart]),
        }),
        StatusCode::OK,
    )
}

async fn api_stats(State(state): State<SharedState>) -> Result<Json<DashboardStats>, AppError> {
    let records = state.store.records().await?;
    Ok(Json(DashboardStats::compute(&records)))
}

async fn chart_png(State(state): State<SharedState>, Path(name): Path<String>) -> HandlerResult {
    let slug = name.strip_suffix(".png").unwrap_or(&name);
    let kind = ChartKind::from_slug(slug).ok_or(AppError::NotFound)?;
    let records = state.store.records().await?;
    let chart = kind.data(&records);

    let png = tokio::task::spawn_blocking(move || {
        graph::render_png(&chart, &GraphOptions::for_kind(kind)).map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| AppError::Chart(e.to_string()))?
    .map_err(AppError::Chart)?;

    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}

async fn export_csv(State(state): State<SharedState>) -> HandlerResult {
    let table = state.store.table().await?;
    let bytes = downloader::to_csv(&table).map_err(|e| AppError::Render(e.to_string()))?;
    Ok(attachment(
        bytes,
        "text/csv; charset=utf-8",
        &downloader::export_filename("csv"),
    ))
}

async fn export_xlsx(State(state): State<SharedState>) -> HandlerResult {
    let table = state.store.table().await?;
    let bytes = downloader::to_xlsx(&table).map_err(|e| AppError::Render(e.to_string()))?;
    Ok(attachment(
        bytes,
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        &downloader::export_filename("xlsx"),
    ))
}

fn attachment(bytes: Vec<u8>, content_type: &'static str, filename: &str) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        Body::from(bytes),
    )
        .into_response()
}

async fn view_sheet(State(state): State<SharedState>, jar: CookieJar) -> HandlerResult {
    let table = state.store.table().await?;
    let mut rows = downloader::numbered_rows(&table);
    let header = if rows.is_empty() {
        downloader::numbered_rows(&[header_row()]).remove(0)
    } else {
        rows.remove(0)
    };

    render(
        &state,
        jar,
        "view",
        json!({ "title": "View Sheet", "header": header, "rows": rows }),
        StatusCode::OK,
    )
}

// Record form

const FORM_FIELDS: [(&str, &str, &str); 8] = [
    ("pregnancies", "Pregnancies", "1"),
    ("glucose", "Glucose", "1"),
    ("blood_pressure", "Blood Pressure", "1"),
    ("skin_thickness", "Skin Thickness", "1"),
    ("insulin", "Insulin", "1"),
    ("bmi", "BMI", "any"),
    ("diabetes_pedigree_function", "Diabetes Pedigree Function", "any"),
    ("age", "Age", "1"),
];

fn record_form_data(title: &str, action: &str, form: &DiabetesForm, errors: &FieldErrors) -> Value {
    let values = serde_json::to_value(form).unwrap_or(Value::Null);
    let fields: Vec<Value> = FORM_FIELDS
        .iter()
        .map(|(name, label, step)| {
            json!({
                "name": name,
                "label": label,
                "step": step,
                "value": values.get(*name).cloned().unwrap_or(Value::Null),
                "error": errors.get(name),
            })
        })
        .collect();

    json!({
        "title": title,
        "action": action,
        "fields": fields,
        "outcome": form.outcome,
        "outcome_error": errors.get("outcome"),
        "form_error": errors.get("csrf_token"),
    })
}

fn csrf_rejected() -> FieldErrors {
    let mut errors = FieldErrors::new();
    errors.insert("csrf_token", CSRF_MESSAGE.to_string());
    errors
}

async fn add_form(State(state): State<SharedState>, jar: CookieJar) -> HandlerResult {
    let data = record_form_data("Add Record", "/add", &DiabetesForm::default(), &FieldErrors::new());
    render(&state, jar, "record_form", data, StatusCode::OK)
}

async fn add_record(
    State(state): State<SharedState>,
    jar: CookieJar,
    Form(form): Form<DiabetesForm>,
) -> HandlerResult {
    if !verify_csrf(&jar, &form.csrf_token) {
        let data = record_form_data("Add Record", "/add", &form, &csrf_rejected());
        return render(&state, jar, "record_form", data, StatusCode::BAD_REQUEST);
    }
    match form.validate() {
        Ok(input) => {
            let id = state.store.create(&input).await?;
            log::debug!("form created record {}", id);
            Ok(flash_redirect(jar, "success", "Data submitted successfully!", "/"))
        }
        Err(errors) => {
            let data = record_form_data("Add Record", "/add", &form, &errors);
            render(&state, jar, "record_form", data, StatusCode::UNPROCESSABLE_ENTITY)
        }
    }
}

fn parse_row_number(raw: &str) -> Option<RecordId> {
    raw.trim().parse::<usize>().ok().filter(|n| *n > 0).map(RecordId)
}

async fn existing(state: &AppState, raw: &str) -> Result<Option<(RecordId, Record)>, AppError> {
    let Some(id) = parse_row_number(raw) else {
        return Ok(None);
    };
    Ok(state.store.get(id).await?.map(|record| (id, record)))
}

async fn edit_form(
    State(state): State<SharedState>,
    jar: CookieJar,
    Path(row_number): Path<String>,
) -> HandlerResult {
    let Some((id, record)) = existing(&state, &row_number).await? else {
        return Ok(flash_redirect(jar, "danger", NOT_FOUND_MESSAGE, "/update"));
    };
    let data = record_form_data(
        &format!("Edit Row {}", id),
        &format!("/edit_row/{}", id),
        &DiabetesForm::from_record(&record),
        &FieldErrors::new(),
    );
    render(&state, jar, "record_form", data, StatusCode::OK)
}

async fn edit_record(
    State(state): State<SharedState>,
    jar: CookieJar,
    Path(row_number): Path<String>,
    Form(form): Form<DiabetesForm>,
) -> HandlerResult {
    let Some((id, _)) = existing(&state, &row_number).await? else {
        return Ok(flash_redirect(jar, "danger", NOT_FOUND_MESSAGE, "/update"));
    };
    let title = format!("Edit Row {}", id);
    let action = format!("/edit_row/{}", id);

    if !verify_csrf(&jar, &form.csrf_token) {
        let data = record_form_data(&title, &action, &form, &csrf_rejected());
        return render(&state, jar, "record_form", data, StatusCode::BAD_REQUEST);
    }
    let input = match form.validate() {
        Ok(input) => input,
        Err(errors) => {
            let data = record_form_data(&title, &action, &form, &errors);
            return render(&state, jar, "record_form", data, StatusCode::UNPROCESSABLE_ENTITY);
        }
    };

    match state.store.update(id, &input).await {
        Ok(()) => Ok(flash_redirect(jar, "success", "Row updated successfully!", "/")),
        Err(StoreError::NotFound(_)) => {
            Ok(flash_redirect(jar, "danger", NOT_FOUND_MESSAGE, "/update"))
        }
        Err(e) => Err(e.into()),
    }
}

// Row number forms

async fn row_number_page(
    state: &AppState,
    jar: CookieJar,
    kind: &str,
    form: &RowNumberForm,
    error: Option<&str>,
    status: StatusCode,
) -> HandlerResult {
    let max_rows = state.store.data_row_count().await?;
    let (title, action, button) = match kind {
        "delete" => ("Delete Row", "/delete", "Delete"),
        _ => ("Update Row", "/update", "Edit"),
    };
    render(
        state,
        jar,
        "row_number",
        json!({
            "title": title,
            "action": action,
            "button": button,
            "danger": kind == "delete",
            "max_rows": max_rows,
            "row_number": form.row_number,
            "error": error,
        }),
        status,
    )
}

async fn update_form(State(state): State<SharedState>, jar: CookieJar) -> HandlerResult {
    row_number_page(&state, jar, "update", &RowNumberForm::default(), None, StatusCode::OK).await
}

async fn update_lookup(
    State(state): State<SharedState>,
    jar: CookieJar,
    Form(form): Form<RowNumberForm>,
) -> HandlerResult {
    if !verify_csrf(&jar, &form.csrf_token) {
        return row_number_page(&state, jar, "update", &form, Some(CSRF_MESSAGE), StatusCode::BAD_REQUEST)
            .await;
    }
    let max_rows = state.store.data_row_count().await?;
    match form.validate(max_rows) {
        Ok(id) => Ok(Redirect::to(&format!("/edit_row/{}", id)).into_response()),
        Err(error) => {
            row_number_page(&state, jar, "update", &form, Some(&error), StatusCode::UNPROCESSABLE_ENTITY)
                .await
        }
    }
}

async fn delete_form(State(state): State<SharedState>, jar: CookieJar) -> HandlerResult {
    row_number_page(&state, jar, "delete", &RowNumberForm::default(), None, StatusCode::OK).await
}

async fn delete_record(
    State(state): State<SharedState>,
    jar: CookieJar,
    Form(form): Form<RowNumberForm>,
) -> HandlerResult {
    if !verify_csrf(&jar, &form.csrf_token) {
        return row_number_page(&state, jar, "delete", &form, Some(CSRF_MESSAGE), StatusCode::BAD_REQUEST)
            .await;
    }
    let max_rows = state.store.data_row_count().await?;
    let id = match form.validate(max_rows) {
        Ok(id) => id,
        Err(error) => {
            return row_number_page(
                &state,
                jar,
                "delete",
                &form,
                Some(&error),
                StatusCode::UNPROCESSABLE_ENTITY,
            )
            .await;
        }
    };

    match state.store.delete(id).await {
        Ok(()) => Ok(flash_redirect(jar, "success", "Row deleted successfully!", "/")),
        Err(StoreError::NotFound(_)) => {
            Ok(flash_redirect(jar, "danger", NOT_FOUND_MESSAGE, "/update"))
        }
        Err(e) => Err(e.into()),
    }
}
