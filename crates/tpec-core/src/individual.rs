//! One sampled hyperparameter configuration and the scores it earns.
//!
//! Scores arrive one at a time from the optimization loop. Each may be
//! recorded exactly once and read only after it has been recorded.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    TrainPerformance,
    ValPerformance,
    ExpectedImprovement,
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Score::TrainPerformance => "train performance",
            Score::ValPerformance => "validation performance",
            Score::ExpectedImprovement => "expected improvement",
        })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndividualError {
    #[error("{0} has already been set")]
    AlreadySet(Score),
    #[error("{0} has not been set yet")]
    NotSet(Score),
}

/// A cell that accepts a single write.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(transparent)]
pub struct WriteOnce<T>(Option<T>);

impl<T> Default for WriteOnce<T> {
    fn default() -> Self {
        Self(None)
    }
}

impl<T: Copy> WriteOnce<T> {
    pub const fn new() -> Self {
        Self(None)
    }

    /// Returns `false` and leaves the cell untouched if it was already set.
    pub fn set(&mut self, value: T) -> bool {
        if self.0.is_some() {
            return false;
        }
        self.0 = Some(value);
        true
    }

    pub fn get(&self) -> Option<T> {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Individual {
    params: BTreeMap<String, Value>,
    model_type: String,
    train_performance: WriteOnce<f64>,
    val_performance: WriteOnce<f64>,
    expected_improvement: WriteOnce<f64>,
}

impl Individual {
    pub fn new(params: BTreeMap<String, Value>, model_type: impl Into<String>) -> Self {
        Self {
            params,
            model_type: model_type.into(),
            train_performance: WriteOnce::new(),
            val_performance: WriteOnce::new(),
            expected_improvement: WriteOnce::new(),
        }
    }

    /// Snapshot of the parameters; changes to it never reach `self`.
    pub fn params(&self) -> BTreeMap<String, Value> {
        self.params.clone()
    }

    pub fn model_type(&self) -> &str {
        &self.model_type
    }

    pub fn set_train_performance(&mut self, value: f64) -> Result<(), IndividualError> {
        store(&mut self.train_performance, Score::TrainPerformance, value)
    }

    pub fn train_performance(&self) -> Result<f64, IndividualError> {
        load(&self.train_performance, Score::TrainPerformance)
    }

    pub fn set_val_performance(&mut self, value: f64) -> Result<(), IndividualError> {
        store(&mut self.val_performance, Score::ValPerformance, value)
    }

    pub fn val_performance(&self) -> Result<f64, IndividualError> {
        load(&self.val_performance, Score::ValPerformance)
    }

    pub fn set_expected_improvement(&mut self, value: f64) -> Result<(), IndividualError> {
        store(
            &mut self.expected_improvement,
            Score::ExpectedImprovement,
            value,
        )
    }

    pub fn expected_improvement(&self) -> Result<f64, IndividualError> {
        load(&self.expected_improvement, Score::ExpectedImprovement)
    }
}

impl fmt::Display for Individual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params = serde_json::to_string(&self.params).map_err(|_| fmt::Error)?;
        write!(f, "Individual(params={})", params)
    }
}

fn store(cell: &mut WriteOnce<f64>, score: Score, value: f64) -> Result<(), IndividualError> {
    if cell.set(value) {
        Ok(())
    } else {
        Err(IndividualError::AlreadySet(score))
    }
}

fn load(cell: &WriteOnce<f64>, score: Score) -> Result<f64, IndividualError> {
    cell.get().ok_or(IndividualError::NotSet(score))
}
