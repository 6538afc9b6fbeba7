//! Messages exchanged between the warehouse, the relay fabric and agents

use crate::consensus::types::{AgentId, BestBid, NodeId, Task, TaskId};
use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Announcement traveling around the ring, collecting bids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardAnnouncement {
    pub task: Task,
    /// Every hop visited so far, starting with the warehouse.
    pub path: Vec<NodeId>,
    pub best: BestBid,
}

impl ForwardAnnouncement {
    /// First hop of a fresh traversal: `[warehouse, first]` with an open best bid.
    pub fn seed(task: Task, first: AgentId) -> Self {
        Self {
            task,
            path: vec![NodeId::Warehouse, NodeId::Agent(first)],
            best: BestBid::open(),
        }
    }

    pub fn last_hop(&self) -> Option<&NodeId> {
        self.path.last()
    }

    pub fn has_visited(&self, agent: &AgentId) -> bool {
        self.path.iter().any(|hop| hop.agent() == Some(agent))
    }

    /// Agents on the path, in visiting order.
    pub fn visited_agents(&self) -> impl Iterator<Item = &AgentId> {
        self.path.iter().filter_map(NodeId::agent)
    }
}

/// Final decision for a task, relayed back toward the warehouse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WinnerDecision {
    pub task: Task,
    pub winner: AgentId,
    pub best: BestBid,
    /// Winner first, then each earlier hop back toward the warehouse.
    /// Absent for start-of-day assignments.
    #[serde(default)]
    pub backtrace_route: Option<Vec<AgentId>>,
}

/// Everything that flows through the relay. Values are moved on send,
/// so a sender can never observe or mutate an in-flight message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    TaskAnnouncement { task: Task },
    ForwardAnnouncement(ForwardAnnouncement),
    WinnerDecision(WinnerDecision),
}

impl Message {
    pub fn task(&self) -> &Task {
        match self {
            Message::TaskAnnouncement { task } => task,
            Message::ForwardAnnouncement(fwd) => &fwd.task,
            Message::WinnerDecision(decision) => &decision.task,
        }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task().task_id
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Message::TaskAnnouncement { .. } => "TASK_ANNOUNCEMENT",
            Message::ForwardAnnouncement(_) => "FORWARD_ANNOUNCEMENT",
            Message::WinnerDecision(_) => "WINNER_DECISION",
        }
    }

    /// Structural checks applied wherever a message crosses into the
    /// relay (on `send`) or into an agent (on `receive`).
    pub fn validate(&self) -> Result<(), Error> {
        self.task()
            .validate()
            .map_err(|e| Error::MalformedMessage(e.to_string()))?;

        match self {
            Message::TaskAnnouncement { .. } => Ok(()),
            Message::ForwardAnnouncement(fwd) => {
                validate_best(&fwd.best)?;
                validate_path(&fwd.path)
            }
            Message::WinnerDecision(decision) => {
                validate_best(&decision.best)?;
                if let Some(holder) = &decision.best.holder
                    && *holder != decision.winner
                {
                    return Err(Error::MalformedMessage(format!(
                        "winner {} disagrees with best holder {}",
                        decision.winner, holder
                    )));
                }
                if let Some(route) = &decision.backtrace_route
                    && route.is_empty()
                {
                    return Err(Error::MalformedMessage("empty backtrace route".to_string()));
                }
                Ok(())
            }
        }
    }
}

fn validate_best(best: &BestBid) -> Result<(), Error> {
    if !best.bid.is_finite() || best.bid < 0.0 {
        return Err(Error::MalformedMessage(format!("invalid best bid {}", best.bid)));
    }
    Ok(())
}

fn validate_path(path: &[NodeId]) -> Result<(), Error> {
    match path.first() {
        Some(NodeId::Warehouse) => {}
        Some(other) => {
            return Err(Error::MalformedMessage(format!(
                "path must start at the warehouse, starts at {other}"
            )));
        }
        None => return Err(Error::MalformedMessage("empty path".to_string())),
    }

    let mut seen = HashSet::new();
    for hop in &path[1..] {
        match hop {
            NodeId::Warehouse => {
                return Err(Error::MalformedMessage(
                    "warehouse may only appear at the head of a path".to_string(),
                ));
            }
            NodeId::Agent(id) => {
                if !seen.insert(id) {
                    return Err(Error::MalformedMessage(format!("{id} appears twice in path")));
                }
            }
        }
    }
    Ok(())
}
