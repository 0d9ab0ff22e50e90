//! Merge per-model replicate averages into the task summary table.
//!
//! Each input row is one OpenML task. One numeric column per discovered
//! model is written (or overwritten), then tasks with any failure, and
//! optionally tasks that some model already solves at or above a
//! threshold, are dropped before the table is written back out.

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use tpec_core::{model_display_name, FailureReason, DEFAULT_MODEL_SUFFIX, DEFAULT_NUM_REPLICATES};
use tracing::{debug, info};

use crate::aggregate::{discover_model_folders, process_task_model};

const TASK_ID_COLUMN: &str = "task_id";
const FAILURE_COLUMN: &str = "Failure";

#[derive(Debug, Clone)]
pub struct AggregateOptions {
    pub tasks_csv: PathBuf,
    pub timing_results: PathBuf,
    /// Defaults to overwriting `tasks_csv`.
    pub output: Option<PathBuf>,
    pub threshold: Option<f64>,
    pub num_replicates: u32,
    pub model_suffix: String,
}

impl AggregateOptions {
    pub fn new(tasks_csv: impl Into<PathBuf>, timing_results: impl Into<PathBuf>) -> Self {
        Self {
            tasks_csv: tasks_csv.into(),
            timing_results: timing_results.into(),
            output: None,
            threshold: None,
            num_replicates: DEFAULT_NUM_REPLICATES,
            model_suffix: DEFAULT_MODEL_SUFFIX.to_string(),
        }
    }

    pub fn output_path(&self) -> &Path {
        self.output.as_deref().unwrap_or(self.tasks_csv.as_path())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelColumn {
    /// Directory name under the results root, e.g. `DT_Timing`.
    pub folder: String,
    /// Column name in the table, e.g. `DT`.
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskSummary {
    pub task_id: String,
    /// Aligned with `SummaryReport::models`.
    pub accuracies: Vec<Option<f64>>,
    /// Replicates that contributed to each average, aligned the same way.
    pub usable_replicates: Vec<usize>,
    pub failure: FailureReason,
}

#[derive(Debug, Clone)]
pub struct SummaryReport {
    pub models: Vec<ModelColumn>,
    pub total_tasks: usize,
    pub kept: Vec<TaskSummary>,
    pub excluded_by_failure: usize,
    pub excluded_by_threshold: usize,
    pub threshold: Option<f64>,
    pub output: PathBuf,
}

impl SummaryReport {
    pub fn excluded(&self) -> usize {
        self.total_tasks - self.kept.len()
    }
}

/// Row-oriented CSV table; every cell is kept as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TaskTable {
    /// Rows shorter than the header are padded with empty cells; longer
    /// rows keep their extra cells.
    pub fn read(path: &Path) -> Result<Self> {
        let invalid = |e: csv::Error| anyhow!("tasks_csv_invalid: {}: {}", path.display(), e);
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .map_err(|e| anyhow!("tasks_csv_unreadable: {}: {}", path.display(), e))?;
        let headers: Vec<String> = reader
            .headers()
            .map_err(invalid)?
            .iter()
            .map(str::to_string)
            .collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(invalid)?;
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            if row.len() != headers.len() {
                debug!(
                    line = record.position().map(|p| p.line()),
                    fields = row.len(),
                    "resizing ragged row to header width"
                );
                row.resize(headers.len(), String::new());
            }
            rows.push(row);
        }
        Ok(Self { headers, rows })
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .map_err(|e| anyhow!("output_csv_unwritable: {}: {}", path.display(), e))?;
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Index of `name`, appending an empty column if it does not exist yet.
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(index) = self.column_index(name) {
            return index;
        }
        self.headers.push(name.to_string());
        for row in &mut self.rows {
            row.push(String::new());
        }
        self.headers.len() - 1
    }

    pub fn drop_column(&mut self, name: &str) {
        let Some(index) = self.column_index(name) else {
            return;
        };
        self.headers.remove(index);
        for row in &mut self.rows {
            if index < row.len() {
                row.remove(index);
            }
        }
    }

    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn set_cell(&mut self, row: usize, column: usize, value: String) {
        if let Some(r) = self.rows.get_mut(row) {
            if r.len() <= column {
                r.resize(column + 1, String::new());
            }
            r[column] = value;
        }
    }

    /// Keeps row `i` iff `keep[i]`.
    pub fn retain_rows(&mut self, keep: &[bool]) {
        let mut index = 0;
        self.rows.retain(|_| {
            let kept = keep.get(index).copied().unwrap_or(false);
            index += 1;
            kept
        });
    }
}

pub fn aggregate_results(options: &AggregateOptions) -> Result<SummaryReport> {
    if !options.tasks_csv.exists() {
        return Err(anyhow!(
            "tasks_csv_not_found: {}",
            options.tasks_csv.display()
        ));
    }
    if !options.timing_results.exists() {
        return Err(anyhow!(
            "timing_results_not_found: {}",
            options.timing_results.display()
        ));
    }

    let models: Vec<ModelColumn> =
        discover_model_folders(&options.timing_results, &options.model_suffix)?
            .into_iter()
            .map(|folder| ModelColumn {
                name: model_display_name(&folder, &options.model_suffix).to_string(),
                folder,
            })
            .collect();

    let mut table = TaskTable::read(&options.tasks_csv)?;
    table.drop_column(FAILURE_COLUMN);
    let task_column = table.column_index(TASK_ID_COLUMN).ok_or_else(|| {
        anyhow!(
            "tasks_csv_missing_task_id_column: {}",
            options.tasks_csv.display()
        )
    })?;
    let model_columns: Vec<usize> = models
        .iter()
        .map(|model| table.ensure_column(&model.name))
        .collect();
    info!(
        models = models.len(),
        tasks = table.len(),
        "aggregating timing results"
    );

    let mut tasks = Vec::with_capacity(table.len());
    for row in 0..table.len() {
        let task_id = table.cell(row, task_column).trim().to_string();
        info!(task_id = %task_id, "processing task");
        let mut accuracies = Vec::with_capacity(models.len());
        let mut usable_replicates = Vec::with_capacity(models.len());
        let mut failures = Vec::with_capacity(models.len());
        for (model, &column) in models.iter().zip(&model_columns) {
            let result = process_task_model(
                &options.timing_results,
                &model.folder,
                &task_id,
                options.num_replicates,
            );
            table.set_cell(row, column, format_cell(result.average_accuracy));
            accuracies.push(result.average_accuracy);
            usable_replicates.push(result.usable_replicates);
            failures.push(result.failure);
        }
        tasks.push(TaskSummary {
            task_id,
            accuracies,
            usable_replicates,
            failure: FailureReason::dominant(failures),
        });
    }

    let total_tasks = tasks.len();
    let mut excluded_by_failure = 0;
    let mut excluded_by_threshold = 0;
    let keep: Vec<bool> = tasks
        .iter()
        .map(|task| {
            if task.failure.is_failure() {
                excluded_by_failure += 1;
                return false;
            }
            match options.threshold {
                Some(threshold) if exceeds_threshold(&task.accuracies, threshold) => {
                    excluded_by_threshold += 1;
                    false
                }
                _ => true,
            }
        })
        .collect();

    table.retain_rows(&keep);
    let kept: Vec<TaskSummary> = tasks
        .into_iter()
        .zip(&keep)
        .filter_map(|(task, &k)| k.then_some(task))
        .collect();

    let output = options.output_path().to_path_buf();
    table.write(&output)?;
    info!(
        kept = kept.len(),
        total = total_tasks,
        output = %output.display(),
        "wrote task summary"
    );

    Ok(SummaryReport {
        models,
        total_tasks,
        kept,
        excluded_by_failure,
        excluded_by_threshold,
        threshold: options.threshold,
        output,
    })
}

/// True when any recorded accuracy is at or above `threshold`.
pub fn exceeds_threshold(accuracies: &[Option<f64>], threshold: f64) -> bool {
    accuracies.iter().flatten().any(|&a| a >= threshold)
}

/// Report form: six decimals, or `N/A`.
pub fn format_accuracy(accuracy: Option<f64>) -> String {
    match accuracy {
        Some(a) => format!("{:.6}", a),
        None => "N/A".to_string(),
    }
}

fn format_cell(accuracy: Option<f64>) -> String {
    // Debug keeps the shortest round-trip form and always shows a fraction.
    accuracy.map(|a| format!("{:?}", a)).unwrap_or_default()
}
