//! Shared building blocks for the TPEC benchmark tooling: the on-disk
//! results layout, replicate classification, and the `Individual` value
//! object used by the hyperparameter search.

use anyhow::{anyhow, Result};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

pub mod individual;
pub mod status;

pub use individual::{Individual, IndividualError, Score, WriteOnce};
pub use status::{
    check_replicate_status, read_test_accuracy, FailureReason, ReplicateRecord, ReplicateStatus,
};

/// Primary artifact; carries the `time_exceeded` flag.
pub const GLOBAL_RESULTS_FILE: &str = "global_accuracy_results.json";
/// Secondary artifact; carries `test_accuracy`.
pub const BEST_MODEL_RESULTS_FILE: &str = "best_model_results.json";
pub const DEFAULT_NUM_REPLICATES: u32 = 10;
pub const DEFAULT_MODEL_SUFFIX: &str = "_Timing";

/// `<root>/<model_folder>/task_<task_id>`
pub fn task_dir(results_root: &Path, model_folder: &str, task_id: &str) -> PathBuf {
    results_root
        .join(model_folder)
        .join(format!("task_{}", task_id))
}

/// `<task_dir>/Replicate_<index>`
pub fn replicate_dir(task_dir: &Path, index: u32) -> PathBuf {
    task_dir.join(format!("Replicate_{}", index))
}

/// Display name of a model folder, e.g. `DT` for `DT_Timing`.
pub fn model_display_name<'a>(model_folder: &'a str, suffix: &str) -> &'a str {
    model_folder.strip_suffix(suffix).unwrap_or(model_folder)
}

pub fn dir_is_empty(path: &Path) -> std::io::Result<bool> {
    Ok(fs::read_dir(path)?.next().is_none())
}

pub fn load_json_file(path: &Path) -> Result<Value> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub fn load_json_object(path: &Path) -> Result<Map<String, Value>> {
    match load_json_file(path)? {
        Value::Object(map) => Ok(map),
        other => Err(anyhow!(
            "expected a JSON object, found {}",
            value_type_name(&other)
        )),
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
