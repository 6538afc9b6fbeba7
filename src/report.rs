use crate::consensus::agent::AgentStatus;
use crate::consensus::types::{AgentId, TaskId};
use crate::navigation::Navigator;
use crate::sim::Simulation;
use crate::telemetry::{DropReason, EventKind, TelemetryEvent};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize)]
pub struct FinalAssignment {
    pub task_id: TaskId,
    pub agent_id: Option<AgentId>,
}

#[derive(Debug, Serialize)]
pub struct DroppedTask {
    pub task_id: TaskId,
    pub reason: DropReason,
}

#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub ticks: u64,
    pub agent_count: usize,
    pub task_count: usize,
    pub messages_delivered: usize,
    pub assignments: Vec<FinalAssignment>,
    pub dropped_tasks: Vec<DroppedTask>,
    pub agents: Vec<AgentStatus>,
    pub events: Vec<TelemetryEvent>,
}

pub fn build_report<N: Navigator>(sim: &Simulation<N>) -> SimulationReport {
    let fabric = &sim.fabric;
    let mut table: BTreeMap<TaskId, Option<AgentId>> = BTreeMap::new();

    let dropped = fabric.events().dropped_tasks();
    for (task_id, _) in &dropped {
        table.insert(task_id.clone(), None);
    }
    for agent in fabric.agents() {
        for assignment in agent.assigned_tasks() {
            table.insert(assignment.task_id.clone(), Some(agent.id().clone()));
        }
    }
    // Announced tasks nobody holds any more
    for event in fabric.events().events() {
        if let EventKind::TaskAnnounced { task_id } = &event.kind {
            table.entry(task_id.clone()).or_insert(None);
        }
    }

    let task_count = table.len();
    let assignments = table
        .into_iter()
        .map(|(task_id, agent_id)| FinalAssignment { task_id, agent_id })
        .collect();

    SimulationReport {
        ticks: sim.tick().0,
        agent_count: fabric.ring().len(),
        task_count,
        messages_delivered: fabric.messages_delivered(),
        assignments,
        dropped_tasks: dropped
            .into_iter()
            .map(|(task_id, reason)| DroppedTask { task_id, reason })
            .collect(),
        agents: fabric.agents().map(|a| a.status()).collect(),
        events: fabric.events().events().to_vec(),
    }
}

/// Write `<result_dir>/summary.json`, creating the directory if needed.
pub fn write_report_json<P: AsRef<Path>>(report: &SimulationReport, result_dir: P) -> Result<PathBuf> {
    let result_dir = result_dir.as_ref();
    fs::create_dir_all(result_dir).context("Failed to create report directory")?;
    let summary_path = result_dir.join("summary.json");
    let mut summary_file = File::create(&summary_path).context("Failed to create summary file")?;
    serde_json::to_writer_pretty(&mut summary_file, report).context("Failed to write summary json")?;
    Ok(summary_path)
}
