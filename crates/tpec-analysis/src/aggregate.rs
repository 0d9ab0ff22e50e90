use anyhow::{anyhow, Result};
use std::path::Path;
use tpec_core::{task_dir, FailureReason, ReplicateRecord};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct TaskModelResult {
    pub average_accuracy: Option<f64>,
    pub failure: FailureReason,
    pub usable_replicates: usize,
}

impl TaskModelResult {
    fn absent() -> Self {
        Self {
            average_accuracy: None,
            failure: FailureReason::None,
            usable_replicates: 0,
        }
    }
}

/// Averages `test_accuracy` over the usable replicates of one task and
/// reports the dominant failure seen across all `num_replicates` slots.
///
/// A task directory that does not exist at all is not a failure: the
/// model simply has no results for it.
pub fn process_task_model(
    results_root: &Path,
    model_folder: &str,
    task_id: &str,
    num_replicates: u32,
) -> TaskModelResult {
    let task_path = task_dir(results_root, model_folder, task_id);
    if !task_path.exists() {
        debug!(model = model_folder, task_id, "task directory absent");
        return TaskModelResult::absent();
    }

    let mut accuracies = Vec::new();
    let mut failures = Vec::new();
    for index in 0..num_replicates {
        let record = ReplicateRecord::inspect(&task_path, index);
        if !record.exists {
            debug!(model = model_folder, task_id, replicate = index, "replicate directory missing");
        }
        if let Some(reason) = record.status.reason {
            failures.push(reason);
        }
        if record.status.valid {
            if let Some(accuracy) = record.test_accuracy {
                accuracies.push(accuracy);
            }
        }
    }

    TaskModelResult {
        average_accuracy: mean(&accuracies),
        failure: FailureReason::dominant(failures),
        usable_replicates: accuracies.len(),
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Immediate subdirectories of `results_root` whose names end in `suffix`,
/// sorted lexically.
pub fn discover_model_folders(results_root: &Path, suffix: &str) -> Result<Vec<String>> {
    let mut folders = Vec::new();
    for entry in walkdir::WalkDir::new(results_root)
        .min_depth(1)
        .max_depth(1)
    {
        let entry = entry.map_err(|e| {
            anyhow!(
                "timing_results_unreadable: {}: {}",
                results_root.display(),
                e
            )
        })?;
        if !entry.path().is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if name.ends_with(suffix) {
            folders.push(name.to_string());
        }
    }
    folders.sort();
    Ok(folders)
}
