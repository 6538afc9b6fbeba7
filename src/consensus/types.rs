//! Core identifiers and value types for the ring auction

use crate::error::Error;
use serde::{Deserialize, Serialize};

/// Bid value that marks a task as infeasible for the bidder. Also the
/// upper clamp for every computed bid.
pub const VERY_HIGH_BID: f64 = 9_999_999_999.0;

/// Task id prefix of start-of-day tasks, which are assigned round-robin.
pub const SOD_PREFIX: &str = "SOD-";

const WAREHOUSE: &str = "warehouse";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AgentId(String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Result<Self, Error> {
        let id = id.into();
        if id.is_empty() {
            return Err(Error::InvalidIdentifier("agent id must not be empty".to_string()));
        }
        if id == WAREHOUSE {
            return Err(Error::InvalidIdentifier(format!("`{WAREHOUSE}` is reserved")));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AgentId {
    type Error = Error;

    fn try_from(id: String) -> Result<Self, Error> {
        Self::new(id)
    }
}

impl From<AgentId> for String {
    fn from(id: AgentId) -> Self {
        id.0
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_start_of_day(&self) -> bool {
        self.0.starts_with(SOD_PREFIX)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Road edge identifier understood by the navigation collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub String);

impl EdgeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Logical simulation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Tick(pub u64);

impl Tick {
    pub fn next(self) -> Self {
        Tick(self.0 + 1)
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64
    }
}

impl std::fmt::Display for Tick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Tick {
    fn from(v: u64) -> Self {
        Tick(v)
    }
}

/// A participant in the relay: the warehouse (task source and path origin)
/// or a ring agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeId {
    Warehouse,
    Agent(AgentId),
}

impl NodeId {
    pub fn agent(&self) -> Option<&AgentId> {
        match self {
            NodeId::Agent(id) => Some(id),
            NodeId::Warehouse => None,
        }
    }

    pub fn is_warehouse(&self) -> bool {
        matches!(self, NodeId::Warehouse)
    }
}

impl From<AgentId> for NodeId {
    fn from(id: AgentId) -> Self {
        NodeId::Agent(id)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeId::Warehouse => write!(f, "{WAREHOUSE}"),
            NodeId::Agent(id) => write!(f, "{id}"),
        }
    }
}

/// A delivery job. Immutable once announced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub pickup: EdgeId,
    pub delivery: EdgeId,
    pub weight: f64,
    #[serde(default)]
    pub due_by: Option<f64>,
}

impl Task {
    pub fn new(
        task_id: TaskId,
        pickup: EdgeId,
        delivery: EdgeId,
        weight: f64,
        due_by: Option<f64>,
    ) -> Result<Self, Error> {
        let task = Self {
            task_id,
            pickup,
            delivery,
            weight,
            due_by,
        };
        task.validate()?;
        Ok(task)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.task_id.0.is_empty() {
            return Err(Error::ValidationError("task_id must not be empty".to_string()));
        }
        if !self.weight.is_finite() || self.weight < 0.0 {
            return Err(Error::ValidationError(format!(
                "task {} weight must be finite and non-negative, got {}",
                self.task_id, self.weight
            )));
        }
        if let Some(due_by) = self.due_by
            && !due_by.is_finite()
        {
            return Err(Error::ValidationError(format!(
                "task {} due_by must be finite",
                self.task_id
            )));
        }
        Ok(())
    }

    pub fn is_start_of_day(&self) -> bool {
        self.task_id.is_start_of_day()
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.task_id)
    }
}

/// A single agent's offer for a task. Lower wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub value: f64,
    pub holder: AgentId,
}

impl Bid {
    pub fn is_feasible(&self) -> bool {
        self.value < VERY_HIGH_BID
    }
}

/// Running best bid carried by an announcement. `holder` stays `None`
/// until some agent beats `VERY_HIGH_BID`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestBid {
    pub bid: f64,
    pub holder: Option<AgentId>,
}

impl BestBid {
    pub fn open() -> Self {
        Self {
            bid: VERY_HIGH_BID,
            holder: None,
        }
    }

    pub fn held_by(bid: f64, holder: AgentId) -> Self {
        Self {
            bid,
            holder: Some(holder),
        }
    }

    /// Replace the incumbent only on a strictly lower bid, so ties stay
    /// with whoever reached the value first in traversal order.
    pub fn offer(&mut self, bid: &Bid) -> bool {
        if bid.value < self.bid {
            self.bid = bid.value;
            self.holder = Some(bid.holder.clone());
            true
        } else {
            false
        }
    }
}

impl Default for BestBid {
    fn default() -> Self {
        Self::open()
    }
}

/// Per-task progress as seen by one agent. `Lost` has no representation:
/// a task that was bid on but never won simply stays `Bidding`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskPhase {
    Unseen,
    Bidding,
    Won,
}
