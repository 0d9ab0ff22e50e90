use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use tpec_analysis::audit::{format_slot_header, format_slot_row};
use tpec_analysis::{
    AggregateOptions, AuditEvent, AuditPlan, AuditReport, SummaryReport, TimingResultsAudit,
};
use tpec_core::{DEFAULT_MODEL_SUFFIX, DEFAULT_NUM_REPLICATES};

const RULE: &str = "================================================================================";
const THIN_RULE: &str = "--------------------------------------------------------------------------------";
const REPORT_RULE: &str = "============================================================";

#[derive(Parser)]
#[command(name = "tpec", version, about = "TPEC benchmark result tooling")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Average replicate accuracies into the task summary CSV
    Aggregate {
        #[arg(long = "tasks-csv", env = "TPEC_TASKS_CSV")]
        tasks_csv: PathBuf,
        #[arg(long = "timing-results", env = "TPEC_TIMING_RESULTS")]
        timing_results: PathBuf,
        /// Defaults to overwriting --tasks-csv
        #[arg(long)]
        output: Option<PathBuf>,
        /// Drop tasks where any model scores at or above this accuracy
        #[arg(long)]
        threshold: Option<f64>,
        #[arg(long, default_value_t = DEFAULT_NUM_REPLICATES)]
        num_replicates: u32,
        #[arg(long, default_value = DEFAULT_MODEL_SUFFIX)]
        model_suffix: String,
        #[arg(long)]
        json: bool,
    },
    /// List empty replicate folders and the array ids to resubmit
    CheckJobs {
        #[arg(long = "timing_results_dir")]
        timing_results_dir: PathBuf,
        /// YAML file overriding the task order, model folders or replicate count
        #[arg(long)]
        plan: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let json_mode = command_json_mode(&cli.command);
    let result = run_command(cli.command);
    match result {
        Ok(Some(payload)) => {
            emit_json(&payload);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => {
            if json_mode {
                emit_json(&json_error("command_failed", err.to_string(), json!({})));
                std::process::exit(1);
            }
            Err(err)
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_command(command: Commands) -> Result<Option<Value>> {
    match command {
        Commands::Aggregate {
            tasks_csv,
            timing_results,
            output,
            threshold,
            num_replicates,
            model_suffix,
            json,
        } => {
            let options = AggregateOptions {
                tasks_csv,
                timing_results,
                output,
                threshold,
                num_replicates,
                model_suffix,
            };
            let report = tpec_analysis::aggregate_results(&options)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "aggregate",
                    "generated_at": Utc::now().to_rfc3339(),
                    "summary": summary_report_to_json(&report),
                })));
            }
            print_summary_report(&report);
        }
        Commands::CheckJobs {
            timing_results_dir,
            plan,
            json,
        } => {
            let plan = match plan {
                Some(path) => AuditPlan::load(&path)?,
                None => AuditPlan::default(),
            };
            let audit = TimingResultsAudit::open(&timing_results_dir, &plan)?;
            if json {
                let report = audit.run(|_| {});
                return Ok(Some(json!({
                    "ok": true,
                    "command": "check-jobs",
                    "generated_at": Utc::now().to_rfc3339(),
                    "timing_results_dir": timing_results_dir.display().to_string(),
                    "audit": audit_report_to_json(&report),
                })));
            }
            println!("{}", RULE);
            println!("Checking for empty replicate folders...");
            println!("{}", RULE);
            println!("{}", format_slot_header());
            println!("{}", THIN_RULE);
            let report = audit.run(|event| match event {
                AuditEvent::ModelFolderMissing { folder } => {
                    println!("WARNING: Model folder not found: {}", folder);
                }
                AuditEvent::EmptySlot(slot) => println!("{}", format_slot_row(slot)),
            });
            print_audit_summary(&report);
        }
    }
    Ok(None)
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"code\":\"serialization_error\",\"message\":\"failed to serialize JSON payload\",\"details\":{{}}}}}}"
        ),
    }
}

fn json_error(code: &str, message: String, details: Value) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": message,
            "details": details
        }
    })
}

fn command_json_mode(command: &Commands) -> bool {
    match command {
        Commands::Aggregate { json, .. } | Commands::CheckJobs { json, .. } => *json,
    }
}

fn summary_report_to_json(report: &SummaryReport) -> Value {
    let kept: Vec<Value> = report
        .kept
        .iter()
        .map(|task| {
            let mut accuracies = Map::new();
            let mut usable = Map::new();
            for ((model, accuracy), count) in report
                .models
                .iter()
                .zip(&task.accuracies)
                .zip(&task.usable_replicates)
            {
                accuracies.insert(model.name.clone(), json!(accuracy));
                usable.insert(model.name.clone(), json!(count));
            }
            json!({
                "task_id": task.task_id,
                "accuracies": accuracies,
                "usable_replicates": usable,
            })
        })
        .collect();
    json!({
        "models": report.models.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
        "total_tasks": report.total_tasks,
        "kept_tasks": report.kept.len(),
        "excluded_tasks": report.excluded(),
        "excluded_by_failure": report.excluded_by_failure,
        "excluded_by_threshold": report.excluded_by_threshold,
        "threshold": report.threshold,
        "output": report.output.display().to_string(),
        "kept": kept,
    })
}

fn found_models_line(report: &SummaryReport) -> String {
    let folders: Vec<&str> = report.models.iter().map(|m| m.folder.as_str()).collect();
    format!("Found {} ML models: {}", folders.len(), folders.join(", "))
}

fn print_summary_report(report: &SummaryReport) {
    let names: Vec<&str> = report.models.iter().map(|m| m.name.as_str()).collect();
    println!("{}", found_models_line(report));
    println!("Processed {} tasks", report.total_tasks);
    if let Some(threshold) = report.threshold {
        println!(
            "Applied threshold filter: removed tasks with any model performance >= {}",
            threshold
        );
    }

    println!();
    println!("{}", REPORT_RULE);
    println!("Tasks included in final CSV:");
    println!("{}", REPORT_RULE);
    for task in &report.kept {
        println!();
        println!("Task {} Results:", task.task_id);
        for (name, accuracy) in names.iter().zip(&task.accuracies) {
            println!("  {}: {}", name, tpec_analysis::format_accuracy(*accuracy));
        }
    }

    println!();
    println!("{}", REPORT_RULE);
    println!("Filtering Summary:");
    println!("{}", REPORT_RULE);
    println!("Total tasks processed: {}", report.total_tasks);
    println!("Tasks in final CSV: {}", report.kept.len());
    println!("Tasks excluded: {}", report.excluded());
    println!("  - Failures (memory-limit/time-limit): {}", report.excluded_by_failure);
    if let Some(threshold) = report.threshold {
        println!(
            "  - Threshold filter applied: >= {} ({} tasks)",
            threshold, report.excluded_by_threshold
        );
    }
    println!();
    println!("Results saved to: {}", report.output.display());
    println!(
        "Added {} model columns (Failure column excluded from final output)",
        names.len()
    );
}

fn audit_report_to_json(report: &AuditReport) -> Value {
    let slots: Vec<Value> = report
        .slots
        .iter()
        .map(|slot| {
            json!({
                "model": slot.model,
                "task_index": slot.task_index,
                "task_id": slot.task_id,
                "replicate": slot.replicate,
                "array_id": slot.array_id,
            })
        })
        .collect();
    let models: Vec<Value> = report
        .models
        .iter()
        .map(|m| {
            json!({
                "model": m.model,
                "folder": m.folder,
                "folder_present": m.folder_present,
                "count": m.count(),
                "array_ids": m.array_ids,
            })
        })
        .collect();
    json!({
        "empty_count": report.empty_count(),
        "slots": slots,
        "models": models,
    })
}

fn print_audit_summary(report: &AuditReport) {
    println!("{}", THIN_RULE);
    println!(
        "Total empty replicate folders found: {}",
        report.empty_count()
    );
    println!("{}", RULE);

    println!();
    println!("{}", RULE);
    println!("Array IDs to Rerun by Model");
    println!("{}", RULE);
    for model in &report.models {
        println!();
        println!("{}:", model.model);
        println!("  Count: {}", model.count());
        if model.array_ids.is_empty() {
            println!("  All replicates complete!");
        } else {
            let ids: Vec<String> = model.array_ids.iter().map(u64::to_string).collect();
            println!("  Array IDs: {}", ids.join(","));
        }
    }
    println!();
    println!("{}", RULE);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tpec_analysis::{AuditSlot, ModelAudit, ModelColumn, TaskSummary};
    use tpec_core::FailureReason;

    #[test]
    fn cli_accepts_documented_flag_spellings() {
        let cli = Cli::try_parse_from([
            "tpec",
            "aggregate",
            "--tasks-csv",
            "tasks.csv",
            "--timing-results",
            "Timing_Results",
            "--threshold",
            "0.95",
        ])
        .expect("aggregate args");
        match cli.command {
            Commands::Aggregate {
                threshold,
                num_replicates,
                model_suffix,
                output,
                ..
            } => {
                assert_eq!(threshold, Some(0.95));
                assert_eq!(num_replicates, 10);
                assert_eq!(model_suffix, "_Timing");
                assert!(output.is_none());
            }
            _ => panic!("expected aggregate"),
        }

        let cli = Cli::try_parse_from([
            "tpec",
            "check-jobs",
            "--timing_results_dir",
            "Timing_Results",
            "--json",
        ])
        .expect("check-jobs args");
        assert!(command_json_mode(&cli.command));
    }

    #[test]
    fn check_jobs_requires_results_dir() {
        assert!(Cli::try_parse_from(["tpec", "check-jobs"]).is_err());
    }

    #[test]
    fn summary_json_maps_accuracies_by_model() {
        let report = SummaryReport {
            models: vec![
                ModelColumn {
                    folder: "DT_Timing".into(),
                    name: "DT".into(),
                },
                ModelColumn {
                    folder: "RF_Timing".into(),
                    name: "RF".into(),
                },
            ],
            total_tasks: 3,
            kept: vec![TaskSummary {
                task_id: "146818".into(),
                accuracies: vec![Some(0.8), None],
                usable_replicates: vec![10, 0],
                failure: FailureReason::None,
            }],
            excluded_by_failure: 2,
            excluded_by_threshold: 0,
            threshold: None,
            output: PathBuf::from("out.csv"),
        };
        let value = summary_report_to_json(&report);
        assert_eq!(value["excluded_tasks"], json!(2));
        assert_eq!(value["kept"][0]["accuracies"]["DT"], json!(0.8));
        assert_eq!(value["kept"][0]["accuracies"]["RF"], json!(null));
        assert_eq!(value["kept"][0]["usable_replicates"]["DT"], json!(10));
        assert_eq!(value["kept"][0]["usable_replicates"]["RF"], json!(0));
        assert_eq!(
            found_models_line(&report),
            "Found 2 ML models: DT_Timing, RF_Timing"
        );
    }

    #[test]
    fn audit_json_lists_models_in_plan_order() {
        let report = AuditReport {
            slots: vec![AuditSlot {
                model: "DT".into(),
                task_index: 1,
                task_id: 146818,
                replicate: 3,
                array_id: 13,
            }],
            models: vec![
                ModelAudit {
                    model: "DT".into(),
                    folder: "DT_Timing".into(),
                    folder_present: true,
                    array_ids: vec![13],
                },
                ModelAudit {
                    model: "ET".into(),
                    folder: "ET_Timing".into(),
                    folder_present: false,
                    array_ids: vec![],
                },
            ],
        };
        let value = audit_report_to_json(&report);
        assert_eq!(value["empty_count"], json!(1));
        assert_eq!(value["slots"][0]["array_id"], json!(13));
        assert_eq!(value["models"][1]["model"], json!("ET"));
        assert_eq!(value["models"][1]["count"], json!(0));
    }
}
