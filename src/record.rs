use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One row of the backing sheet, cell by cell, as text.
pub type Row = Vec<String>;

pub const COLUMN_COUNT: usize = 11;

/// Header row of the backing sheet, in column order.
pub const HEADER: [&str; COLUMN_COUNT] = [
    "Pregnancies",
    "Glucose",
    "BloodPressure",
    "SkinThickness",
    "Insulin",
    "BMI",
    "DiabetesPedigreeFunction",
    "Age",
    "Outcome",
    "AgeGroup",
    "BMIClass",
];

// Column positions
pub const PREGNANCIES: usize = 0;
pub const GLUCOSE: usize = 1;
pub const BLOOD_PRESSURE: usize = 2;
pub const SKIN_THICKNESS: usize = 3;
pub const INSULIN: usize = 4;
pub const BMI: usize = 5;
pub const PEDIGREE: usize = 6;
pub const AGE: usize = 7;
pub const OUTCOME: usize = 8;
pub const AGE_GROUP: usize = 9;
pub const BMI_CLASS: usize = 10;

pub fn header_row() -> Row {
    HEADER.iter().map(|h| h.to_string()).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown label {0:?}")]
pub struct UnknownLabel(pub String);

/// Age bucket derived from a record's age.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgeBand {
    Twenties,
    Thirties,
    Forties,
    Fifties,
    Sixties,
    Others,
}

impl AgeBand {
    pub const ALL: [AgeBand; 6] = [
        AgeBand::Twenties,
        AgeBand::Thirties,
        AgeBand::Forties,
        AgeBand::Fifties,
        AgeBand::Sixties,
        AgeBand::Others,
    ];

    /// Buckets are half-open `[lower, lower + 10)`; everything outside
    /// `[20, 70)` lands in `Others`.
    pub fn from_age(age: u32) -> Self {
        match age {
            20..=29 => AgeBand::Twenties,
            30..=39 => AgeBand::Thirties,
            40..=49 => AgeBand::Forties,
            50..=59 => AgeBand::Fifties,
            60..=69 => AgeBand::Sixties,
            _ => AgeBand::Others,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AgeBand::Twenties => "20-30",
            AgeBand::Thirties => "30-40",
            AgeBand::Forties => "40-50",
            AgeBand::Fifties => "50-60",
            AgeBand::Sixties => "60-70",
            AgeBand::Others => "Others",
        }
    }
}

impl fmt::Display for AgeBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for AgeBand {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        AgeBand::ALL
            .into_iter()
            .find(|band| band.label() == s)
            .ok_or_else(|| UnknownLabel(s.to_string()))
    }
}

/// BMI bucket derived from a record's BMI.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BmiClass {
    Underweight,
    Healthy,
    Overweight,
    Obese,
}

impl BmiClass {
    pub const ALL: [BmiClass; 4] = [
        BmiClass::Underweight,
        BmiClass::Healthy,
        BmiClass::Overweight,
        BmiClass::Obese,
    ];

    /// WHO cutoffs: 18.5, 25.0 and 30.0. Total over `f64`; NaN falls
    /// through to `Obese`.
    pub fn from_bmi(bmi: f64) -> Self {
        if bmi < 18.5 {
            BmiClass::Underweight
        } else if bmi < 25.0 {
            BmiClass::Healthy
        } else if bmi < 30.0 {
            BmiClass::Overweight
        } else {
            BmiClass::Obese
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BmiClass::Underweight => "Underweight",
            BmiClass::Healthy => "Healthy",
            BmiClass::Overweight => "Overweight",
            BmiClass::Obese => "Obese",
        }
    }
}

impl fmt::Display for BmiClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for BmiClass {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        BmiClass::ALL
            .into_iter()
            .find(|class| class.label() == s)
            .ok_or_else(|| UnknownLabel(s.to_string()))
    }
}

pub fn age_band(age: u32) -> AgeBand {
    AgeBand::from_age(age)
}

pub fn bmi_class(bmi: f64) -> BmiClass {
    BmiClass::from_bmi(bmi)
}

/// Screening result, stored as `"0"` / `"1"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Negative,
    Positive,
}

impl Outcome {
    pub fn code(&self) -> &'static str {
        match self {
            Outcome::Negative => "0",
            Outcome::Positive => "1",
        }
    }

    pub fn is_positive(&self) -> bool {
        matches!(self, Outcome::Positive)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Outcome {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "0" => Ok(Outcome::Negative),
            "1" => Ok(Outcome::Positive),
            other => Err(UnknownLabel(other.to_string())),
        }
    }
}

/// A screening record as read back from the sheet.
///
/// Every field is optional: a blank or unparseable cell reads as `None`.
/// `age_band` and `bmi_class` hold whatever label the sheet stores; use
/// [`Record::band`] and [`Record::class`] to fall back to derived labels.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub pregnancies: Option<u32>,
    pub glucose: Option<f64>,
    pub blood_pressure: Option<f64>,
    pub skin_thickness: Option<f64>,
    pub insulin: Option<f64>,
    pub bmi: Option<f64>,
    pub pedigree: Option<f64>,
    pub age: Option<u32>,
    pub outcome: Option<Outcome>,
    pub age_band: Option<AgeBand>,
    pub bmi_class: Option<BmiClass>,
}

impl Record {
    /// Parse one sheet row. Short rows are treated as padded with blanks
    /// (the Sheets API drops trailing empty cells); a row with no content
    /// at all is a cleared row and yields `None`.
    pub fn from_row(row: &[String]) -> Option<Self> {
        if row.iter().all(|cell| cell.trim().is_empty()) {
            return None;
        }
        let cell = |i: usize| row.get(i).map(|s| s.trim()).unwrap_or("");

        Some(Record {
            pregnancies: parse_count(cell(PREGNANCIES)),
            glucose: parse_measure(cell(GLUCOSE)),
            blood_pressure: parse_measure(cell(BLOOD_PRESSURE)),
            skin_thickness: parse_measure(cell(SKIN_THICKNESS)),
            insulin: parse_measure(cell(INSULIN)),
            bmi: parse_measure(cell(BMI)),
            pedigree: parse_measure(cell(PEDIGREE)),
            age: parse_count(cell(AGE)),
            outcome: cell(OUTCOME).parse().ok(),
            age_band: cell(AGE_GROUP).parse().ok(),
            bmi_class: cell(BMI_CLASS).parse().ok(),
        })
    }

    /// Stored age band, or the one derived from age when the cell is blank
    /// or holds an unknown label.
    pub fn band(&self) -> Option<AgeBand> {
        self.age_band.or_else(|| self.age.map(age_band))
    }

    /// Stored BMI class, or the one derived from BMI.
    pub fn class(&self) -> Option<BmiClass> {
        self.bmi_class.or_else(|| self.bmi.map(bmi_class))
    }
}

/// A complete, validated record ready to be written.
///
/// The derived labels are not part of the input; [`RecordInput::to_row`]
/// computes them from `age` and `bmi` every time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordInput {
    pub pregnancies: u32,
    pub glucose: u32,
    pub blood_pressure: u32,
    pub skin_thickness: u32,
    pub insulin: u32,
    pub bmi: f64,
    pub pedigree: f64,
    pub age: u32,
    pub outcome: Outcome,
}

impl RecordInput {
    pub fn age_band(&self) -> AgeBand {
        age_band(self.age)
    }

    pub fn bmi_class(&self) -> BmiClass {
        bmi_class(self.bmi)
    }

    pub fn to_row(&self) -> Row {
        vec![
            self.pregnancies.to_string(),
            self.glucose.to_string(),
            self.blood_pressure.to_string(),
            self.skin_thickness.to_string(),
            self.insulin.to_string(),
            self.bmi.to_string(),
            self.pedigree.to_string(),
            self.age.to_string(),
            self.outcome.code().to_string(),
            self.age_band().label().to_string(),
            self.bmi_class().label().to_string(),
        ]
    }
}

impl From<&RecordInput> for Record {
    fn from(input: &RecordInput) -> Self {
        Record {
            pregnancies: Some(input.pregnancies),
            glucose: Some(input.glucose as f64),
            blood_pressure: Some(input.blood_pressure as f64),
            skin_thickness: Some(input.skin_thickness as f64),
            insulin: Some(input.insulin as f64),
            bmi: Some(input.bmi),
            pedigree: Some(input.pedigree),
            age: Some(input.age),
            outcome: Some(input.outcome),
            age_band: Some(input.age_band()),
            bmi_class: Some(input.bmi_class()),
        }
    }
}

fn parse_measure(raw: &str) -> Option<f64> {
    if raw.is_empty() {
        return None;
    }
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

// Counts may have been written as floats ("2.0") by other tools.
fn parse_count(raw: &str) -> Option<u32> {
    if let Ok(v) = raw.parse::<u32>() {
        return Some(v);
    }
    parse_measure(raw)
        .filter(|v| *v >= 0.0 && v.fract() == 0.0 && *v <= u32::MAX as f64)
        .map(|v| v as u32)
}
