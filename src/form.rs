use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::record::{Outcome, Record, RecordInput};
use crate::store::RecordId;

/// Field name -> message, for re-rendering a rejected form.
pub type FieldErrors = BTreeMap<&'static str, String>;

const REQUIRED: &str = "This field is required.";

/// Raw record form submission. Field names match the HTML form.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiabetesForm {
    pub pregnancies: String,
    pub glucose: String,
    pub blood_pressure: String,
    pub skin_thickness: String,
    pub insulin: String,
    pub bmi: String,
    pub diabetes_pedigree_function: String,
    pub age: String,
    pub outcome: String,
    pub csrf_token: String,
}

impl DiabetesForm {
    /// Prefill from a stored record. Missing cells stay blank.
    pub fn from_record(record: &Record) -> Self {
        fn text<T: ToString>(value: Option<T>) -> String {
            value.map(|v| v.to_string()).unwrap_or_default()
        }

        DiabetesForm {
            pregnancies: text(record.pregnancies),
            glucose: text(record.glucose),
            blood_pressure: text(record.blood_pressure),
            skin_thickness: text(record.skin_thickness),
            insulin: text(record.insulin),
            bmi: text(record.bmi),
            diabetes_pedigree_function: text(record.pedigree),
            age: text(record.age),
            outcome: text(record.outcome),
            csrf_token: String::new(),
        }
    }

    pub fn validate(&self) -> Result<RecordInput, FieldErrors> {
        let mut errors = FieldErrors::new();

        let pregnancies = int_field(&mut errors, "pregnancies", &self.pregnancies, 0, 18);
        let glucose = int_field(&mut errors, "glucose", &self.glucose, 0, 200);
        let blood_pressure = int_field(&mut errors, "blood_pressure", &self.blood_pressure, 0, 200);
        let skin_thickness = int_field(&mut errors, "skin_thickness", &self.skin_thickness, 0, 100);
        let insulin = int_field(&mut errors, "insulin", &self.insulin, 0, 1000);
        let bmi = float_field(&mut errors, "bmi", &self.bmi, 0.0, 100.0);
        let pedigree = float_field(
            &mut errors,
            "diabetes_pedigree_function",
            &self.diabetes_pedigree_function,
            0.0,
            3.0,
        );
        let age = int_field(&mut errors, "age", &self.age, 20, 120);
        let outcome = match self.outcome.trim() {
            "" => {
                errors.insert("outcome", REQUIRED.to_string());
                None
            }
            raw => match raw.parse::<Outcome>() {
                Ok(outcome) => Some(outcome),
                Err(_) => {
                    errors.insert("outcome", "Not a valid choice.".to_string());
                    None
                }
            },
        };

        match (
            pregnancies,
            glucose,
            blood_pressure,
            skin_thickness,
            insulin,
            bmi,
            pedigree,
            age,
            outcome,
        ) {
            (
                Some(pregnancies),
                Some(glucose),
                Some(blood_pressure),
                Some(skin_thickness),
                Some(insulin),
                Some(bmi),
                Some(pedigree),
                Some(age),
                Some(outcome),
            ) if errors.is_empty() => Ok(RecordInput {
                pregnancies,
                glucose,
                blood_pressure,
                skin_thickness,
                insulin,
                bmi,
                pedigree,
                age,
                outcome,
            }),
            _ => Err(errors),
        }
    }
}

fn int_field(
    errors: &mut FieldErrors,
    name: &'static str,
    raw: &str,
    min: u32,
    max: u32,
) -> Option<u32> {
    let raw = raw.trim();
    if raw.is_empty() {
        errors.insert(name, REQUIRED.to_string());
        return None;
    }
    match raw.parse::<i64>() {
        Ok(v) if v >= min as i64 && v <= max as i64 => Some(v as u32),
        Ok(_) => {
            errors.insert(name, format!("Number must be between {} and {}.", min, max));
            None
        }
        Err(_) => {
            errors.insert(name, "Not a valid integer value.".to_string());
            None
        }
    }
}

fn float_field(
    errors: &mut FieldErrors,
    name: &'static str,
    raw: &str,
    min: f64,
    max: f64,
) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        errors.insert(name, REQUIRED.to_string());
        return None;
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= min && v <= max => Some(v),
        Ok(_) => {
            errors.insert(name, format!("Number must be between {} and {}.", min, max));
            None
        }
        Err(_) => {
            errors.insert(name, "Not a valid float value.".to_string());
            None
        }
    }
}

/// "Which row?" form used by the update and delete pages.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RowNumberForm {
    pub row_number: String,
    pub csrf_token: String,
}

impl RowNumberForm {
    /// Accepts `1..=max_rows`.
    pub fn validate(&self, max_rows: usize) -> Result<RecordId, String> {
        let raw = self.row_number.trim();
        if raw.is_empty() {
            return Err(REQUIRED.to_string());
        }
        let n: i64 = raw
            .parse()
            .map_err(|_| "Not a valid integer value.".to_string())?;
        if max_rows == 0 {
            return Err("There are no rows yet.".to_string());
        }
        if n < 1 || n > max_rows as i64 {
            return Err(format!("Number must be between 1 and {}.", max_rows));
        }
        Ok(RecordId(n as usize))
    }
}
