//! Discrete protocol events for tests, reports and operators
//!
//! The relay records what happened (`{tick, kind, payload}`) without
//! deciding how it is persisted; [`EventLog`] keeps events in memory and
//! mirrors each one to `tracing` at debug level.

use crate::consensus::types::{AgentId, NodeId, TaskId, Tick};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    EmptyRing,
    NoFeasibleBid,
    UnknownWinner,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum EventKind {
    TaskAnnounced {
        task_id: TaskId,
    },
    SodAssigned {
        task_id: TaskId,
        winner: AgentId,
        index: usize,
    },
    BidComputed {
        task_id: TaskId,
        agent: AgentId,
        bid: f64,
        best_bid: f64,
        best_holder: Option<AgentId>,
    },
    Forwarded {
        task_id: TaskId,
        to: AgentId,
        hops: usize,
    },
    WinnerDecided {
        task_id: TaskId,
        winner: AgentId,
        bid: f64,
        route: Vec<AgentId>,
    },
    WinnerRelayed {
        task_id: TaskId,
        relay: AgentId,
        winner: AgentId,
    },
    TaskAssigned {
        task_id: TaskId,
        agent: AgentId,
    },
    TaskDropped {
        task_id: TaskId,
        reason: DropReason,
    },
    MessageRejected {
        sender: NodeId,
        message_type: String,
        reason: String,
    },
    DeliverySkipped {
        task_id: TaskId,
        recipient: AgentId,
    },
}

impl EventKind {
    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            EventKind::TaskAnnounced { task_id }
            | EventKind::SodAssigned { task_id, .. }
            | EventKind::BidComputed { task_id, .. }
            | EventKind::Forwarded { task_id, .. }
            | EventKind::WinnerDecided { task_id, .. }
            | EventKind::WinnerRelayed { task_id, .. }
            | EventKind::TaskAssigned { task_id, .. }
            | EventKind::TaskDropped { task_id, .. }
            | EventKind::DeliverySkipped { task_id, .. } => Some(task_id),
            EventKind::MessageRejected { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub tick: Tick,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<TelemetryEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, tick: Tick, kind: EventKind) {
        tracing::debug!(target: "telemetry", tick = tick.0, ?kind);
        self.events.push(TelemetryEvent { tick, kind });
    }

    pub fn events(&self) -> &[TelemetryEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events concerning one task, in recording order.
    pub fn for_task<'a>(&'a self, task_id: &'a TaskId) -> impl Iterator<Item = &'a TelemetryEvent> + 'a {
        self.events
            .iter()
            .filter(move |e| e.kind.task_id() == Some(task_id))
    }

    pub fn count(&self, predicate: impl Fn(&EventKind) -> bool) -> usize {
        self.events.iter().filter(|e| predicate(&e.kind)).count()
    }

    pub fn dropped_tasks(&self) -> Vec<(TaskId, DropReason)> {
        self.events
            .iter()
            .filter_map(|e| match &e.kind {
                EventKind::TaskDropped { task_id, reason } => Some((task_id.clone(), *reason)),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialises_as_tick_kind_payload() {
        let event = TelemetryEvent {
            tick: Tick(4),
            kind: EventKind::TaskDropped {
                task_id: TaskId::new("MID-1"),
                reason: DropReason::NoFeasibleBid,
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["tick"], 4);
        assert_eq!(json["kind"], "task_dropped");
        assert_eq!(json["payload"]["reason"], "no_feasible_bid");
    }

    #[test]
    fn test_log_queries() {
        let mut log = EventLog::new();
        let t1 = TaskId::new("T1");
        let t2 = TaskId::new("T2");
        log.record(Tick(0), EventKind::TaskAnnounced { task_id: t1.clone() });
        log.record(Tick(0), EventKind::TaskAnnounced { task_id: t2.clone() });
        log.record(
            Tick(1),
            EventKind::TaskDropped {
                task_id: t2.clone(),
                reason: DropReason::EmptyRing,
            },
        );

        assert_eq!(log.len(), 3);
        assert_eq!(log.for_task(&t1).count(), 1);
        assert_eq!(log.for_task(&t2).count(), 2);
        assert_eq!(log.count(|k| matches!(k, EventKind::TaskAnnounced { .. })), 2);
        assert_eq!(log.dropped_tasks(), vec![(t2, DropReason::EmptyRing)]);
    }
}
