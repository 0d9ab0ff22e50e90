//! Aggregation and auditing over a timing-results tree laid out as
//! `<root>/<model>_Timing/task_<id>/Replicate_<n>/`.
//!
//! * [`aggregate`] averages replicate accuracies for one (model, task) pair.
//! * [`summary`] merges those averages into the task summary CSV.
//! * [`audit`] finds empty replicate slots and their batch array ids.

pub mod aggregate;
pub mod audit;
pub mod summary;

pub use aggregate::{discover_model_folders, process_task_model, TaskModelResult};
pub use audit::{
    array_id, check_timing_results, AuditEvent, AuditPlan, AuditReport, AuditSlot, ModelAudit,
    TimingResultsAudit,
};
pub use summary::{
    aggregate_results, exceeds_threshold, format_accuracy, AggregateOptions, ModelColumn,
    SummaryReport, TaskSummary, TaskTable,
};
