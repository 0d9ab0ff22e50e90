//! Find replicate slots that produced nothing and map them back to the
//! batch array ids that must be resubmitted.
//!
//! Slot order and array ids mirror the submission script: models outer,
//! tasks by their position in the plan, replicates inner, with
//! `array_id = task_index * num_replicates + replicate`. The task order is
//! therefore load-bearing and must match the one used at submission time.
//!
//! Only directory emptiness is checked here. Artifact contents are the
//! concern of [`crate::aggregate`].

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tpec_core::{
    dir_is_empty, model_display_name, replicate_dir, task_dir, DEFAULT_MODEL_SUFFIX,
    DEFAULT_NUM_REPLICATES,
};
use tracing::warn;

/// Task order of the submission script.
pub const DEFAULT_TASK_IDS: [u64; 34] = [
    190412, 146818, 359955, 168757, 359956, 359958, 359962, 190137, 168911, 190392, 189922, 359965,
    359966, 359967, 190411, 146820, 359968, 359975, 359972, 168350, 359973, 190410, 359971, 359988,
    359989, 359979, 359980, 359992, 359982, 167120, 359990, 189354, 360114, 359994,
];

pub const DEFAULT_MODEL_FOLDERS: [&str; 7] = [
    "DT_Timing",
    "ET_Timing",
    "GB_Timing",
    "KSVC_Timing",
    "LSGD_Timing",
    "LSVC_Timing",
    "RF_Timing",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditPlan {
    pub task_ids: Vec<u64>,
    pub model_folders: Vec<String>,
    pub num_replicates: u32,
    pub model_suffix: String,
}

impl Default for AuditPlan {
    fn default() -> Self {
        Self {
            task_ids: DEFAULT_TASK_IDS.to_vec(),
            model_folders: DEFAULT_MODEL_FOLDERS.iter().map(|m| m.to_string()).collect(),
            num_replicates: DEFAULT_NUM_REPLICATES,
            model_suffix: DEFAULT_MODEL_SUFFIX.to_string(),
        }
    }
}

impl AuditPlan {
    /// Reads a YAML plan; fields it omits keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .map_err(|e| anyhow!("plan_unreadable: {}: {}", path.display(), e))?;
        let plan: AuditPlan = serde_yaml::from_str(&data)
            .map_err(|e| anyhow!("plan_invalid: {}: {}", path.display(), e))?;
        plan.validate()?;
        Ok(plan)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_replicates == 0 {
            return Err(anyhow!("plan_invalid: num_replicates must be > 0"));
        }
        if self.task_ids.is_empty() {
            return Err(anyhow!("plan_invalid: task_ids must not be empty"));
        }
        if self.model_folders.is_empty() {
            return Err(anyhow!("plan_invalid: model_folders must not be empty"));
        }
        Ok(())
    }
}

pub fn array_id(task_index: usize, replicate: u32, num_replicates: u32) -> u64 {
    task_index as u64 * u64::from(num_replicates) + u64::from(replicate)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditSlot {
    pub model: String,
    pub task_index: usize,
    pub task_id: u64,
    pub replicate: u32,
    pub array_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEvent<'a> {
    ModelFolderMissing { folder: &'a str },
    EmptySlot(&'a AuditSlot),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelAudit {
    pub model: String,
    pub folder: String,
    pub folder_present: bool,
    /// Sorted ascending.
    pub array_ids: Vec<u64>,
}

impl ModelAudit {
    pub fn count(&self) -> usize {
        self.array_ids.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditReport {
    /// In scan order.
    pub slots: Vec<AuditSlot>,
    /// In plan order.
    pub models: Vec<ModelAudit>,
}

impl AuditReport {
    pub fn empty_count(&self) -> usize {
        self.slots.len()
    }
}

pub struct TimingResultsAudit<'a> {
    results_root: &'a Path,
    plan: &'a AuditPlan,
}

impl<'a> TimingResultsAudit<'a> {
    pub fn open(results_root: &'a Path, plan: &'a AuditPlan) -> Result<Self> {
        if !results_root.exists() {
            return Err(anyhow!(
                "timing_results_dir_not_found: {}",
                results_root.display()
            ));
        }
        plan.validate()?;
        Ok(Self { results_root, plan })
    }

    /// Scans every slot, reporting each event to `on_event` as it is found.
    pub fn run<F>(&self, mut on_event: F) -> AuditReport
    where
        F: FnMut(AuditEvent<'_>),
    {
        let mut slots = Vec::new();
        let mut models = Vec::with_capacity(self.plan.model_folders.len());

        for folder in &self.plan.model_folders {
            let model = model_display_name(folder, &self.plan.model_suffix).to_string();
            let folder_present = self.results_root.join(folder).exists();
            let mut audit = ModelAudit {
                model: model.clone(),
                folder: folder.clone(),
                folder_present,
                array_ids: Vec::new(),
            };
            if !folder_present {
                warn!(folder = %folder, "model folder not found");
                on_event(AuditEvent::ModelFolderMissing { folder });
                models.push(audit);
                continue;
            }

            for (task_index, &task_id) in self.plan.task_ids.iter().enumerate() {
                let task_path = task_dir(self.results_root, folder, &task_id.to_string());
                for replicate in 0..self.plan.num_replicates {
                    if !is_folder_empty(&replicate_dir(&task_path, replicate)) {
                        continue;
                    }
                    let slot = AuditSlot {
                        model: model.clone(),
                        task_index,
                        task_id,
                        replicate,
                        array_id: array_id(task_index, replicate, self.plan.num_replicates),
                    };
                    on_event(AuditEvent::EmptySlot(&slot));
                    audit.array_ids.push(slot.array_id);
                    slots.push(slot);
                }
            }
            audit.array_ids.sort_unstable();
            models.push(audit);
        }

        AuditReport { slots, models }
    }
}

pub fn check_timing_results(results_root: &Path, plan: &AuditPlan) -> Result<AuditReport> {
    Ok(TimingResultsAudit::open(results_root, plan)?.run(|_| {}))
}

/// Missing paths and non-directories count as empty.
fn is_folder_empty(path: &Path) -> bool {
    if !path.is_dir() {
        return true;
    }
    match dir_is_empty(path) {
        Ok(empty) => empty,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "could not list replicate directory");
            true
        }
    }
}

/// Column header for the slot table.
pub fn format_slot_header() -> String {
    format!(
        "{:<15} {:<10} {:<10} {:<10}",
        "Model", "Task ID", "Replicate", "Array ID"
    )
}

pub fn format_slot_row(slot: &AuditSlot) -> String {
    format!(
        "{:<15} {:<10} {:<10} {:<10}",
        slot.model, slot.task_id, slot.replicate, slot.array_id
    )
}
