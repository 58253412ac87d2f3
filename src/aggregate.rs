//! Reducers that turn the record table into chart series.
//!
//! Each reducer makes one pass over the records and groups them in the
//! order categories are first seen. Every age-banded reducer emits every
//! band present in the input, so series computed from the same records
//! share one label sequence and can be drawn on a common axis.

use crate::record::{AgeBand, BmiClass, Outcome, Record};
use serde::Serialize;
use std::fmt::Display;

/// Parallel label / value sequences, ready for a chart.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Series<T> {
    pub labels: Vec<String>,
    pub values: Vec<T>,
}

impl<T> Series<T> {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Two count sequences (outcome 0 and outcome 1) over one label sequence.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StackedSeries {
    pub labels: Vec<String>,
    pub negative: Vec<u32>,
    pub positive: Vec<u32>,
}

/// Numeric fields that can be averaged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Metric {
    Glucose,
    BloodPressure,
    SkinThickness,
    Insulin,
    Bmi,
    Pedigree,
}

impl Metric {
    /// The field's value when it counts as measured: present and non-zero.
    pub fn measured(&self, record: &Record) -> Option<f64> {
        let value = match self {
            Metric::Glucose => record.glucose,
            Metric::BloodPressure => record.blood_pressure,
            Metric::SkinThickness => record.skin_thickness,
            Metric::Insulin => record.insulin,
            Metric::Bmi => record.bmi,
            Metric::Pedigree => record.pedigree,
        };
        value.filter(|v| *v != 0.0)
    }
}

// Insertion-ordered group-by. Category sets here are tiny (at most six
// bands), so a linear scan beats hashing.
struct Groups<K, A> {
    keys: Vec<K>,
    accs: Vec<A>,
}

impl<K: PartialEq + Display, A: Default> Groups<K, A> {
    fn new() -> Self {
        Groups {
            keys: Vec::new(),
            accs: Vec::new(),
        }
    }

    fn entry(&mut self, key: K) -> &mut A {
        match self.keys.iter().position(|k| *k == key) {
            Some(i) => &mut self.accs[i],
            None => {
                self.keys.push(key);
                self.accs.push(A::default());
                let last = self.accs.len() - 1;
                &mut self.accs[last]
            }
        }
    }

    fn into_series<T>(self, value: impl Fn(&A) -> T) -> Series<T> {
        Series {
            labels: self.keys.iter().map(|k| k.to_string()).collect(),
            values: self.accs.iter().map(value).collect(),
        }
    }
}

#[derive(Default)]
struct Mean {
    sum: f64,
    count: u32,
}

impl Mean {
    fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn value(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            round2(self.sum / self.count as f64)
        }
    }
}

#[derive(Default)]
struct Tally {
    positive: u32,
    total: u32,
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn percentage(part: u32, whole: u32) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round2(part as f64 / whole as f64 * 100.0)
    }
}

/// Number of positive outcomes per age band.
pub fn outcome_count_by_age_band(records: &[Record]) -> Series<u32> {
    let mut groups: Groups<AgeBand, u32> = Groups::new();
    for record in records {
        let Some(band) = record.band() else { continue };
        let count = groups.entry(band);
        if record.outcome.is_some_and(|o| o.is_positive()) {
            *count += 1;
        }
    }
    groups.into_series(|count| *count)
}

/// Share of positive outcomes per age band, in percent.
pub fn prevalence_by_age_band(records: &[Record]) -> Series<f64> {
    let mut groups: Groups<AgeBand, Tally> = Groups::new();
    for record in records {
        let Some(band) = record.band() else { continue };
        let tally = groups.entry(band);
        tally.total += 1;
        if record.outcome.is_some_and(|o| o.is_positive()) {
            tally.positive += 1;
        }
    }
    groups.into_series(|t| percentage(t.positive, t.total))
}

/// Mean of `metric` per age band over measured values only. A band whose
/// records all lack the measurement reports 0.
pub fn mean_by_age_band(records: &[Record], metric: Metric) -> Series<f64> {
    let mut groups: Groups<AgeBand, Mean> = Groups::new();
    for record in records {
        let Some(band) = record.band() else { continue };
        let mean = groups.entry(band);
        if let Some(value) = metric.measured(record) {
            mean.add(value);
        }
    }
    groups.into_series(Mean::value)
}

pub fn mean_insulin_by_age_band(records: &[Record]) -> Series<f64> {
    mean_by_age_band(records, Metric::Insulin)
}

pub fn mean_blood_pressure_by_age_band(records: &[Record]) -> Series<f64> {
    mean_by_age_band(records, Metric::BloodPressure)
}

pub fn mean_skin_thickness_by_age_band(records: &[Record]) -> Series<f64> {
    mean_by_age_band(records, Metric::SkinThickness)
}

pub fn mean_glucose_by_age_band(records: &[Record]) -> Series<f64> {
    mean_by_age_band(records, Metric::Glucose)
}

pub fn mean_pedigree_by_age_band(records: &[Record]) -> Series<f64> {
    mean_by_age_band(records, Metric::Pedigree)
}

/// Mean of `metric` over the whole table; 0 when nothing is measured.
pub fn global_mean(records: &[Record], metric: Metric) -> f64 {
    let mut mean = Mean::default();
    for value in records.iter().filter_map(|r| metric.measured(r)) {
        mean.add(value);
    }
    mean.value()
}

/// Records with a pregnancies value present. Zero is an observed value
/// and counts.
pub fn pregnancy_record_count(records: &[Record]) -> usize {
    records.iter().filter(|r| r.pregnancies.is_some()).count()
}

/// Outcome counts among records with at least one pregnancy.
pub fn outcome_counts_with_pregnancies(records: &[Record]) -> Series<u32> {
    let mut groups: Groups<Outcome, u32> = Groups::new();
    for record in records {
        if !record.pregnancies.is_some_and(|p| p > 0) {
            continue;
        }
        if let Some(outcome) = record.outcome {
            *groups.entry(outcome) += 1;
        }
    }
    groups.into_series(|count| *count)
}

/// Outcome breakdown per BMI class. Records missing either the class or
/// the outcome are skipped.
pub fn outcome_counts_by_bmi_class(records: &[Record]) -> StackedSeries {
    let mut groups: Groups<BmiClass, (u32, u32)> = Groups::new();
    for record in records {
        let (Some(class), Some(outcome)) = (record.class(), record.outcome) else {
            continue;
        };
        let counts = groups.entry(class);
        match outcome {
            Outcome::Negative => counts.0 += 1,
            Outcome::Positive => counts.1 += 1,
        }
    }
    let negative = groups.accs.iter().map(|c| c.0).collect();
    let positive = groups.accs.iter().map(|c| c.1).collect();
    StackedSeries {
        labels: groups.keys.iter().map(|k| k.to_string()).collect(),
        negative,
        positive,
    }
}

/// Everything the dashboard page shows, computed from one fetch.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DashboardStats {
    pub diabetes_counts: Series<u32>,
    pub diabetes_prevalence: Series<f64>,
    pub avg_insulin: Series<f64>,
    pub avg_blood_pressure: Series<f64>,
    pub avg_skin_thickness: Series<f64>,
    pub avg_glucose: Series<f64>,
    pub avg_pedigree: Series<f64>,
    pub pregnancy_outcomes: Series<u32>,
    pub bmi_outcomes: StackedSeries,
    pub total_diabetes_count: u32,
    pub total_pregnancies_count: u32,
    pub average_glucose: f64,
    pub average_blood_pressure: f64,
    pub average_bmi: f64,
    /// Records with a pregnancies value.
    pub count: usize,
    /// Live records, whatever fields they hold.
    pub record_count: usize,
}

impl DashboardStats {
    pub fn compute(records: &[Record]) -> Self {
        let diabetes_counts = outcome_count_by_age_band(records);
        let pregnancy_outcomes = outcome_counts_with_pregnancies(records);

        DashboardStats {
            total_diabetes_count: diabetes_counts.values.iter().sum(),
            total_pregnancies_count: pregnancy_outcomes.values.iter().sum(),
            diabetes_counts,
            diabetes_prevalence: prevalence_by_age_band(records),
            avg_insulin: mean_insulin_by_age_band(records),
            avg_blood_pressure: mean_blood_pressure_by_age_band(records),
            avg_skin_thickness: mean_skin_thickness_by_age_band(records),
            avg_glucose: mean_glucose_by_age_band(records),
            avg_pedigree: mean_pedigree_by_age_band(records),
            pregnancy_outcomes,
            bmi_outcomes: outcome_counts_by_bmi_class(records),
            average_glucose: global_mean(records, Metric::Glucose),
            average_blood_pressure: global_mean(records, Metric::BloodPressure),
            average_bmi: global_mean(records, Metric::Bmi),
            count: pregnancy_record_count(records),
            record_count: records.len(),
        }
    }
}
