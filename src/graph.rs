#![cfg(feature = "web")]
//! Chart definitions for the dashboard.
//!
//! A [`ChartKind`] knows which reducer feeds it and how it is drawn. The HTML
//! pages hand [`ChartData`] to Chart.js as JSON; [`render_png`] draws the same
//! data server-side with plotters.

use image::ImageEncoder;
use image::codecs::png::PngEncoder;
use plotters::prelude::*;
use serde::Serialize;

use crate::aggregate::{self, Series, StackedSeries};
use crate::record::Record;

/// Every chart the dashboard can show.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChartKind {
    OutcomeCount,
    Prevalence,
    Insulin,
    BloodPressure,
    SkinThickness,
    Glucose,
    Pedigree,
    PregnancyOutcomes,
    BmiOutcomes,
}

impl ChartKind {
    pub const ALL: [ChartKind; 9] = [
        ChartKind::OutcomeCount,
        ChartKind::Prevalence,
        ChartKind::Insulin,
        ChartKind::BloodPressure,
        ChartKind::SkinThickness,
        ChartKind::Glucose,
        ChartKind::Pedigree,
        ChartKind::PregnancyOutcomes,
        ChartKind::BmiOutcomes,
    ];

    /// Name used in URLs and element ids.
    pub fn slug(&self) -> &'static str {
        match self {
            ChartKind::OutcomeCount => "diabetes-count",
            ChartKind::Prevalence => "prevalence",
            ChartKind::Insulin => "insulin",
            ChartKind::BloodPressure => "blood-pressure",
            ChartKind::SkinThickness => "skin-thickness",
            ChartKind::Glucose => "glucose",
            ChartKind::Pedigree => "pedigree",
            ChartKind::PregnancyOutcomes => "pregnancies",
            ChartKind::BmiOutcomes => "bmi-class",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        ChartKind::ALL.into_iter().find(|kind| kind.slug() == slug)
    }

    pub fn title(&self) -> &'static str {
        match self {
            ChartKind::OutcomeCount => "Diabetes Count by Age Group",
            ChartKind::Prevalence => "Diabetes Prevalence by Age Group (%)",
            ChartKind::Insulin => "Average Insulin by Age Group",
            ChartKind::BloodPressure => "Average Blood Pressure by Age Group",
            ChartKind::SkinThickness => "Average Skin Thickness by Age Group",
            ChartKind::Glucose => "Average Glucose by Age Group",
            ChartKind::Pedigree => "Average Diabetes Pedigree Function by Age Group",
            ChartKind::PregnancyOutcomes => "Outcomes Where Pregnancies > 0",
            ChartKind::BmiOutcomes => "Outcome by BMI Class",
        }
    }

    fn y_label(&self) -> &'static str {
        match self {
            ChartKind::OutcomeCount | ChartKind::PregnancyOutcomes | ChartKind::BmiOutcomes => {
                "Records"
            }
            ChartKind::Prevalence => "Percent",
            ChartKind::Insulin => "Insulin",
            ChartKind::BloodPressure => "Blood pressure",
            ChartKind::SkinThickness => "Skin thickness",
            ChartKind::Glucose => "Glucose",
            ChartKind::Pedigree => "Pedigree function",
        }
    }

    /// Chart.js chart type.
    pub fn chart_type(&self) -> &'static str {
        match self {
            ChartKind::PregnancyOutcomes => "pie",
            _ => "bar",
        }
    }

    pub fn data(&self, records: &[Record]) -> ChartData {
        let (labels, datasets) = match self {
            ChartKind::OutcomeCount => {
                single(self, counts(aggregate::outcome_count_by_age_band(records)))
            }
            ChartKind::Prevalence => single(self, aggregate::prevalence_by_age_band(records)),
            ChartKind::Insulin => single(self, aggregate::mean_insulin_by_age_band(records)),
            ChartKind::BloodPressure => {
                single(self, aggregate::mean_blood_pressure_by_age_band(records))
            }
            ChartKind::SkinThickness => {
                single(self, aggregate::mean_skin_thickness_by_age_band(records))
            }
            ChartKind::Glucose => single(self, aggregate::mean_glucose_by_age_band(records)),
            ChartKind::Pedigree => single(self, aggregate::mean_pedigree_by_age_band(records)),
            ChartKind::PregnancyOutcomes => {
                let series = aggregate::outcome_counts_with_pregnancies(records);
                let labels = series
                    .labels
                    .iter()
                    .map(|code| format!("Outcome {}", code))
                    .collect();
                let values = series.values.iter().map(|v| *v as f64).collect();
                (
                    labels,
                    vec![Dataset {
                        label: "Records".to_string(),
                        values,
                    }],
                )
            }
            ChartKind::BmiOutcomes => stacked(aggregate::outcome_counts_by_bmi_class(records)),
        };

        ChartData {
            name: self.slug(),
            title: self.title(),
            chart_type: self.chart_type(),
            stacked: *self == ChartKind::BmiOutcomes,
            labels,
            datasets,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Dataset {
    pub label: String,
    pub values: Vec<f64>,
}

/// What a chart page needs: labels plus one or more value rows.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChartData {
    pub name: &'static str,
    pub title: &'static str,
    pub chart_type: &'static str,
    pub stacked: bool,
    pub labels: Vec<String>,
    pub datasets: Vec<Dataset>,
}

fn counts(series: Series<u32>) -> Series<f64> {
    Series {
        labels: series.labels,
        values: series.values.into_iter().map(f64::from).collect(),
    }
}

fn single(kind: &ChartKind, series: Series<f64>) -> (Vec<String>, Vec<Dataset>) {
    (
        series.labels,
        vec![Dataset {
            label: kind.y_label().to_string(),
            values: series.values,
        }],
    )
}

fn stacked(series: StackedSeries) -> (Vec<String>, Vec<Dataset>) {
    let as_f64 = |values: Vec<u32>| -> Vec<f64> { values.into_iter().map(f64::from).collect() };
    (
        series.labels,
        vec![
            Dataset {
                label: "Outcome 0".to_string(),
                values: as_f64(series.negative),
            },
            Dataset {
                label: "Outcome 1".to_string(),
                values: as_f64(series.positive),
            },
        ],
    )
}

/// Size and caption for a rendered chart.
#[derive(Clone, Debug)]
pub struct GraphOptions {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub width: u32,
    pub height: u32,
}

impl GraphOptions {
    pub fn for_kind(kind: ChartKind) -> Self {
        let x_label = match kind {
            ChartKind::PregnancyOutcomes => "Outcome",
            ChartKind::BmiOutcomes => "BMI class",
            _ => "Age group",
        };
        GraphOptions {
            title: kind.title().to_string(),
            x_label: x_label.to_string(),
            y_label: kind.y_label().to_string(),
            ..GraphOptions::default()
        }
    }
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            title: "Chart".to_string(),
            x_label: String::new(),
            y_label: String::new(),
            width: 800,
            height: 600,
        }
    }
}

const PALETTE: [RGBColor; 2] = [RGBColor(54, 162, 235), RGBColor(255, 99, 132)];

/// Draw `chart` as a bar chart (stacked when it has several datasets) and
/// return PNG bytes.
pub fn render_png(
    chart: &ChartData,
    options: &GraphOptions,
) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let (width, height) = (options.width, options.height);
    let mut pixels = vec![0u8; (width * height * 3) as usize];

    {
        let root = BitMapBackend::with_buffer(&mut pixels, (width, height)).into_drawing_area();
        root.fill(&WHITE)?;

        let n = chart.labels.len();
        let top = stack_height(chart).max(1.0) * 1.1;
        // integer ranges are inclusive, so 0..n-1 yields n segments
        let last = n.saturating_sub(1) as i32;

        let mut ctx = ChartBuilder::on(&root)
            .caption(&options.title, ("sans-serif", 26).into_font())
            .margin(15)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d((0..last).into_segmented(), 0f64..top)?;

        let labels = &chart.labels;
        ctx.configure_mesh()
            .disable_x_mesh()
            .x_desc(&options.x_label)
            .y_desc(&options.y_label)
            .x_labels(n.max(1))
            .x_label_formatter(&|value: &SegmentValue<i32>| match value {
                SegmentValue::CenterOf(i) | SegmentValue::Exact(i) => {
                    labels.get(*i as usize).cloned().unwrap_or_default()
                }
                SegmentValue::Last => String::new(),
            })
            .draw()?;

        let mut base = vec![0f64; n];
        for (d, dataset) in chart.datasets.iter().enumerate() {
            let color = PALETTE[d % PALETTE.len()];
            let bars: Vec<_> = dataset
                .values
                .iter()
                .take(n)
                .enumerate()
                .map(|(i, value)| {
                    let bottom = base[i];
                    base[i] += value;
                    let left = SegmentValue::Exact(i as i32);
                    let right = if i + 1 < n {
                        SegmentValue::Exact(i as i32 + 1)
                    } else {
                        SegmentValue::Last
                    };
                    let mut bar = Rectangle::new([(left, bottom), (right, bottom + value)], color.filled());
                    bar.set_margin(0, 0, 8, 8);
                    bar
                })
                .collect();

            ctx.draw_series(bars)?
                .label(dataset.label.as_str())
                .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));
        }

        if !chart.datasets.is_empty() {
            ctx.configure_series_labels()
                .background_style(WHITE.mix(0.8))
                .border_style(BLACK)
                .draw()?;
        }

        root.present()?;
    }

    let mut png = Vec::new();
    PngEncoder::new(&mut png).write_image(&pixels, width, height, image::ColorType::Rgb8)?;
    Ok(png)
}

fn stack_height(chart: &ChartData) -> f64 {
    (0..chart.labels.len())
        .map(|i| {
            chart
                .datasets
                .iter()
                .filter_map(|d| d.values.get(i))
                .sum::<f64>()
        })
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Row;

    fn records() -> Vec<Record> {
        let rows: [&[&str]; 3] = [
            &["6", "148", "72", "35", "0", "33.6", "0.627", "50", "1", "50-60", "Obese"],
            &["1", "85", "66", "29", "0", "26.6", "0.351", "31", "0", "30-40", "Overweight"],
            &["0", "137", "40", "35", "168", "43.1", "2.288", "33", "1", "30-40", "Obese"],
        ];
        rows.iter()
            .filter_map(|cells| {
                let row: Row = cells.iter().map(|c| c.to_string()).collect();
                Record::from_row(&row)
            })
            .collect()
    }

    #[test]
    fn slugs_round_trip() {
        for kind in ChartKind::ALL {
            assert_eq!(ChartKind::from_slug(kind.slug()), Some(kind));
        }
        assert_eq!(ChartKind::from_slug("nope"), None);
    }

    #[test]
    fn bmi_chart_is_stacked_with_two_datasets() {
        let data = ChartKind::BmiOutcomes.data(&records());
        assert!(data.stacked);
        assert_eq!(data.labels, vec!["Obese", "Overweight"]);
        assert_eq!(data.datasets[0].values, vec![0.0, 1.0]);
        assert_eq!(data.datasets[1].values, vec![2.0, 0.0]);
        assert_eq!(stack_height(&data), 2.0);
    }

    #[test]
    fn pregnancy_chart_is_a_pie() {
        let data = ChartKind::PregnancyOutcomes.data(&records());
        assert_eq!(data.chart_type, "pie");
        assert_eq!(data.labels, vec!["Outcome 1", "Outcome 0"]);
        assert_eq!(data.datasets[0].values, vec![1.0, 1.0]);
    }

    #[test]
    fn age_band_charts_use_first_seen_order() {
        let data = ChartKind::OutcomeCount.data(&records());
        assert_eq!(data.labels, vec!["50-60", "30-40"]);
        assert_eq!(data.datasets[0].values, vec![1.0, 1.0]);
    }
}
