//! Classification of a single replicate directory.
//!
//! A replicate is usable only when both artifacts exist, the global results
//! parse, and the run did not exceed its time budget. Anything else is
//! folded into a [`FailureReason`]; malformed files are logged and never
//! surface as errors.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::path::Path;
use tracing::warn;

use crate::{
    dir_is_empty, load_json_object, replicate_dir, BEST_MODEL_RESULTS_FILE, GLOBAL_RESULTS_FILE,
};

/// Ordered so that `max` picks the dominant reason:
/// `None < TimeLimit < MemoryLimit`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum FailureReason {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "time-limit")]
    TimeLimit,
    #[serde(rename = "memory-limit")]
    MemoryLimit,
}

impl FailureReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureReason::None => "none",
            FailureReason::TimeLimit => "time-limit",
            FailureReason::MemoryLimit => "memory-limit",
        }
    }

    pub fn is_failure(self) -> bool {
        self != FailureReason::None
    }

    /// Dominant reason over a set of observations; `None` when empty.
    pub fn dominant<I>(reasons: I) -> FailureReason
    where
        I: IntoIterator<Item = FailureReason>,
    {
        reasons.into_iter().max().unwrap_or_default()
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicateStatus {
    pub valid: bool,
    pub reason: Option<FailureReason>,
}

impl ReplicateStatus {
    pub const fn usable() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    pub const fn failed(reason: FailureReason) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
        }
    }
}

pub fn check_replicate_status(replicate_dir: &Path) -> ReplicateStatus {
    match dir_is_empty(replicate_dir) {
        Ok(false) => {}
        Ok(true) => return ReplicateStatus::failed(FailureReason::MemoryLimit),
        Err(err) => {
            warn!(
                path = %replicate_dir.display(),
                error = %err,
                "could not list replicate directory"
            );
            return ReplicateStatus::failed(FailureReason::MemoryLimit);
        }
    }

    let global_path = replicate_dir.join(GLOBAL_RESULTS_FILE);
    if !global_path.exists() {
        return ReplicateStatus::failed(FailureReason::MemoryLimit);
    }
    match load_json_object(&global_path) {
        Ok(global) => {
            if global.get("time_exceeded").map(json_truthy).unwrap_or(false) {
                return ReplicateStatus::failed(FailureReason::TimeLimit);
            }
        }
        Err(err) => {
            warn!(path = %global_path.display(), error = %err, "could not read global results");
            return ReplicateStatus::failed(FailureReason::MemoryLimit);
        }
    }

    if !replicate_dir.join(BEST_MODEL_RESULTS_FILE).exists() {
        return ReplicateStatus::failed(FailureReason::MemoryLimit);
    }
    ReplicateStatus::usable()
}

/// `test_accuracy` from the best-model artifact, if it is present and numeric.
pub fn read_test_accuracy(replicate_dir: &Path) -> Option<f64> {
    let path = replicate_dir.join(BEST_MODEL_RESULTS_FILE);
    match load_json_object(&path) {
        Ok(best) => best.get("test_accuracy").and_then(Value::as_f64),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "could not read best model results");
            None
        }
    }
}

fn json_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Observed state of one `Replicate_<n>` slot of a task directory.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicateRecord {
    pub index: u32,
    pub exists: bool,
    pub status: ReplicateStatus,
    pub test_accuracy: Option<f64>,
}

impl ReplicateRecord {
    /// A missing directory is classified as memory-limit. The accuracy is
    /// only read for usable replicates.
    pub fn inspect(task_dir: &Path, index: u32) -> Self {
        let dir = replicate_dir(task_dir, index);
        if !dir.exists() {
            return Self {
                index,
                exists: false,
                status: ReplicateStatus::failed(FailureReason::MemoryLimit),
                test_accuracy: None,
            };
        }
        let status = check_replicate_status(&dir);
        let test_accuracy = if status.valid {
            read_test_accuracy(&dir)
        } else {
            None
        };
        Self {
            index,
            exists: true,
            status,
            test_accuracy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;
    use std::fs;
    use std::path::PathBuf;

    fn temp_replicate(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "tpec_status_{}_{}_{}",
            label,
            std::process::id(),
            Utc::now().timestamp_micros()
        ));
        fs::create_dir_all(&dir).expect("temp replicate");
        dir
    }

    fn write(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(name), body).expect("write artifact");
    }

    #[test]
    fn empty_replicate_is_memory_limit() {
        let dir = temp_replicate("empty");
        assert_eq!(
            check_replicate_status(&dir),
            ReplicateStatus::failed(FailureReason::MemoryLimit)
        );
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn missing_global_results_is_memory_limit() {
        let dir = temp_replicate("no_global");
        write(&dir, BEST_MODEL_RESULTS_FILE, r#"{"test_accuracy": 0.9}"#);
        assert_eq!(
            check_replicate_status(&dir),
            ReplicateStatus::failed(FailureReason::MemoryLimit)
        );
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn unparseable_global_results_is_memory_limit() {
        let dir = temp_replicate("bad_global");
        write(&dir, GLOBAL_RESULTS_FILE, "{not json");
        write(&dir, BEST_MODEL_RESULTS_FILE, r#"{"test_accuracy": 0.9}"#);
        assert_eq!(
            check_replicate_status(&dir),
            ReplicateStatus::failed(FailureReason::MemoryLimit)
        );
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn time_exceeded_wins_even_with_best_model_present() {
        let dir = temp_replicate("time_exceeded");
        write(&dir, GLOBAL_RESULTS_FILE, r#"{"time_exceeded": true}"#);
        write(&dir, BEST_MODEL_RESULTS_FILE, r#"{"test_accuracy": 0.9}"#);
        assert_eq!(
            check_replicate_status(&dir),
            ReplicateStatus::failed(FailureReason::TimeLimit)
        );
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn missing_best_model_is_memory_limit() {
        let dir = temp_replicate("no_best");
        write(&dir, GLOBAL_RESULTS_FILE, r#"{"time_exceeded": false}"#);
        assert_eq!(
            check_replicate_status(&dir),
            ReplicateStatus::failed(FailureReason::MemoryLimit)
        );
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn complete_replicate_is_usable_and_reports_accuracy() {
        let dir = temp_replicate("complete");
        write(&dir, GLOBAL_RESULTS_FILE, r#"{"time_limit": 3600}"#);
        write(&dir, BEST_MODEL_RESULTS_FILE, r#"{"test_accuracy": 0.875}"#);
        assert_eq!(check_replicate_status(&dir), ReplicateStatus::usable());
        assert_eq!(read_test_accuracy(&dir), Some(0.875));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_accuracy_absent_or_malformed_is_none() {
        let dir = temp_replicate("accuracy");
        assert_eq!(read_test_accuracy(&dir), None);
        write(&dir, BEST_MODEL_RESULTS_FILE, r#"{"val_accuracy": 0.7}"#);
        assert_eq!(read_test_accuracy(&dir), None);
        write(&dir, BEST_MODEL_RESULTS_FILE, r#"{"test_accuracy": "0.7"}"#);
        assert_eq!(read_test_accuracy(&dir), None);
        write(&dir, BEST_MODEL_RESULTS_FILE, "garbage");
        assert_eq!(read_test_accuracy(&dir), None);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn non_object_global_results_is_memory_limit() {
        let dir = temp_replicate("array_global");
        write(&dir, GLOBAL_RESULTS_FILE, "[1, 2]");
        write(&dir, BEST_MODEL_RESULTS_FILE, r#"{"test_accuracy": 0.9}"#);
        assert_eq!(
            check_replicate_status(&dir),
            ReplicateStatus::failed(FailureReason::MemoryLimit)
        );
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn replicate_path_that_is_a_file_is_memory_limit() {
        let task = temp_replicate("file_slot");
        fs::write(replicate_dir(&task, 0), "not a directory").expect("file slot");
        assert_eq!(
            check_replicate_status(&replicate_dir(&task, 0)),
            ReplicateStatus::failed(FailureReason::MemoryLimit)
        );
        let record = ReplicateRecord::inspect(&task, 0);
        assert!(record.exists);
        assert_eq!(record.status.reason, Some(FailureReason::MemoryLimit));
        assert_eq!(record.test_accuracy, None);
        let _ = fs::remove_dir_all(task);
    }

    #[test]
    fn truthiness_matches_json_values() {
        assert!(json_truthy(&serde_json::json!(true)));
        assert!(json_truthy(&serde_json::json!(1)));
        assert!(json_truthy(&serde_json::json!("yes")));
        assert!(!json_truthy(&serde_json::json!(false)));
        assert!(!json_truthy(&serde_json::json!(0)));
        assert!(!json_truthy(&serde_json::json!(null)));
        assert!(!json_truthy(&serde_json::json!([])));
    }

    #[test]
    fn inspect_missing_replicate_reports_memory_limit() {
        let task = temp_replicate("task");
        let record = ReplicateRecord::inspect(&task, 4);
        assert!(!record.exists);
        assert_eq!(record.status.reason, Some(FailureReason::MemoryLimit));
        assert_eq!(record.test_accuracy, None);
        let _ = fs::remove_dir_all(task);
    }

    #[test]
    fn failure_reason_strings() {
        assert_eq!(FailureReason::None.to_string(), "none");
        assert_eq!(FailureReason::TimeLimit.to_string(), "time-limit");
        assert_eq!(
            serde_json::to_value(FailureReason::MemoryLimit).expect("serialize"),
            serde_json::json!("memory-limit")
        );
    }

    fn any_reason() -> impl Strategy<Value = FailureReason> {
        prop_oneof![
            Just(FailureReason::None),
            Just(FailureReason::TimeLimit),
            Just(FailureReason::MemoryLimit),
        ]
    }

    proptest! {
        #[test]
        fn dominance_prefers_memory_then_time(reasons in proptest::collection::vec(any_reason(), 0..16)) {
            let expected = if reasons.contains(&FailureReason::MemoryLimit) {
                FailureReason::MemoryLimit
            } else if reasons.contains(&FailureReason::TimeLimit) {
                FailureReason::TimeLimit
            } else {
                FailureReason::None
            };
            prop_assert_eq!(FailureReason::dominant(reasons), expected);
        }
    }
}
