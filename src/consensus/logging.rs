use crate::consensus::agent::VehicleAgent;
use crate::consensus::relay::RelayFabric;
use crate::consensus::types::{AgentId, TaskId};
use crate::navigation::Navigator;
use std::collections::BTreeMap;

#[macro_export]
macro_rules! relay_info {
    ($($arg:tt)+) => {
        tracing::info!(target: "relay", $($arg)+)
    }
}

#[macro_export]
macro_rules! relay_debug {
    ($($arg:tt)+) => {
        tracing::debug!(target: "relay", $($arg)+)
    }
}

#[macro_export]
macro_rules! agent_info {
    ($($arg:tt)+) => {
        tracing::info!(target: "agent", $($arg)+)
    }
}

#[macro_export]
macro_rules! agent_debug {
    ($($arg:tt)+) => {
        tracing::debug!(target: "agent", $($arg)+)
    }
}

/// Log one line per agent with its load and assignments
pub fn log_fleet_status<N: Navigator>(agents: &[&VehicleAgent<N>]) {
    relay_info!("Fleet status:");
    for agent in agents {
        let tasks = agent
            .assigned_tasks()
            .iter()
            .map(|a| a.task_id.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        relay_info!(
            "  {} load {:.1}/{:.1} battery {:.1}% completed {} assigned [{}]",
            agent.id(),
            agent.load(),
            agent.capacity(),
            agent.battery(),
            agent.completed_tasks(),
            tasks
        );
    }
}

/// Log the final task assignment table, listing dropped tasks as unassigned
pub fn log_assignment_table<N: Navigator>(fabric: &RelayFabric<N>) {
    relay_info!("Final Task Assignment Table:");
    let mut table: BTreeMap<TaskId, Option<AgentId>> = BTreeMap::new();

    for (task_id, _) in fabric.events().dropped_tasks() {
        table.insert(task_id, None);
    }
    for agent in fabric.agents() {
        for assignment in agent.assigned_tasks() {
            table.insert(assignment.task_id.clone(), Some(agent.id().clone()));
        }
    }

    for (task_id, agent_id) in table {
        match agent_id {
            Some(agent_id) => relay_info!("{}: {}", task_id, agent_id),
            None => relay_info!("{}: None", task_id),
        }
    }
}
