//! Ring relay: message queue, traversal routing and winner backtrace

use crate::consensus::agent::VehicleAgent;
use crate::consensus::message::{ForwardAnnouncement, Message, WinnerDecision};
use crate::consensus::types::{AgentId, BestBid, NodeId, Task, Tick};
use crate::error::Error;
use crate::navigation::Navigator;
use crate::network::NetworkHandler;
use crate::telemetry::{DropReason, EventKind, EventLog};
use crate::{relay_debug, relay_info};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Parameters the relay consumes from the run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Informational only; ring members are always reachable.
    pub communication_range: f64,
    /// Where start-of-day round-robin begins.
    pub sod_start_index: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            communication_range: 600.0,
            sod_start_index: 0,
        }
    }
}

#[derive(Debug, Clone)]
struct Envelope {
    sender: NodeId,
    message: Message,
    tick: Option<Tick>,
}

/// Validate and enqueue; shared by the fabric's own `send` and the
/// per-agent outbox.
fn enqueue(
    queue: &mut VecDeque<Envelope>,
    events: &mut EventLog,
    now: Tick,
    sender: NodeId,
    message: Message,
    tick: Option<Tick>,
) -> bool {
    let checked = match (&message, &sender) {
        (Message::TaskAnnouncement { .. }, NodeId::Agent(_)) => {
            Err(Error::MalformedMessage("task announcements come only from the warehouse".to_string()))
        }
        _ => message.validate(),
    };
    if let Err(e) = checked {
        relay_debug!("dropping {} from {}: {}", message.kind(), sender, e);
        events.record(
            tick.unwrap_or(now),
            EventKind::MessageRejected {
                sender,
                message_type: message.kind().to_string(),
                reason: e.to_string(),
            },
        );
        return false;
    }
    queue.push_back(Envelope { sender, message, tick });
    true
}

/// The fabric as seen by one agent while it drains its inbox.
struct Outbox<'a> {
    queue: &'a mut VecDeque<Envelope>,
    events: &'a mut EventLog,
    now: Tick,
}

impl NetworkHandler for Outbox<'_> {
    fn send_message(&mut self, sender: NodeId, message: Message, tick: Option<Tick>) -> bool {
        enqueue(self.queue, self.events, self.now, sender, message, tick)
    }

    fn publish_event(&mut self, tick: Tick, event: EventKind) {
        self.events.record(tick, event);
    }
}

/// Owns the ring of agents and routes every message between them.
///
/// Nothing is delivered on [`send`](Self::send); messages wait in a FIFO
/// queue until [`deliver_messages`](Self::deliver_messages) drains it. A
/// driver alternates that with [`process_agents`](Self::process_agents), or
/// calls [`run_until_idle`](Self::run_until_idle) to do both until quiet.
pub struct RelayFabric<N: Navigator> {
    config: RelayConfig,
    ring: Vec<AgentId>,
    agents: HashMap<AgentId, VehicleAgent<N>>,
    queue: VecDeque<Envelope>,
    events: EventLog,
    sod_assign_index: usize,
    messages_delivered: usize,
    now: Tick,
}

impl<N: Navigator> RelayFabric<N> {
    /// Build the fabric. Ring order is the order of `agents` and never changes.
    pub fn new(agents: Vec<VehicleAgent<N>>, config: RelayConfig) -> Result<Self, Error> {
        let mut ring = Vec::with_capacity(agents.len());
        let mut registry = HashMap::with_capacity(agents.len());
        for agent in agents {
            let id = agent.id().clone();
            if registry.contains_key(&id) {
                return Err(Error::ItemAlreadyExists(format!("agent {id}")));
            }
            ring.push(id.clone());
            registry.insert(id, agent);
        }

        relay_info!(
            "Relay ring of {} agents: [{}]",
            ring.len(),
            ring.iter().map(AgentId::as_str).collect::<Vec<_>>().join(", ")
        );

        Ok(Self {
            sod_assign_index: config.sod_start_index,
            config,
            ring,
            agents: registry,
            queue: VecDeque::new(),
            events: EventLog::new(),
            messages_delivered: 0,
            now: Tick::default(),
        })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn ring(&self) -> &[AgentId] {
        &self.ring
    }

    pub fn sod_assign_index(&self) -> usize {
        self.sod_assign_index
    }

    pub fn agent(&self, id: &AgentId) -> Option<&VehicleAgent<N>> {
        self.agents.get(id)
    }

    pub fn agent_mut(&mut self, id: &AgentId) -> Option<&mut VehicleAgent<N>> {
        self.agents.get_mut(id)
    }

    /// Agents in ring order.
    pub fn agents(&self) -> impl Iterator<Item = &VehicleAgent<N>> {
        self.ring.iter().filter_map(|id| self.agents.get(id))
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn pending_messages(&self) -> usize {
        self.queue.len()
    }

    pub fn messages_delivered(&self) -> usize {
        self.messages_delivered
    }

    fn has_pending_inbox(&self) -> bool {
        self.agents.values().any(VehicleAgent::has_pending)
    }

    /// Queue a message. Malformed messages are dropped and reported, never queued.
    pub fn send(&mut self, sender: NodeId, message: Message, tick: Option<Tick>) -> bool {
        enqueue(&mut self.queue, &mut self.events, self.now, sender, message, tick)
    }

    /// Drain the queue in FIFO order. Messages queued while dispatching are
    /// delivered in the same call, after everything already ahead of them.
    pub fn deliver_messages(&mut self, tick: Tick) -> usize {
        self.now = tick;
        let mut delivered = 0;
        while let Some(envelope) = self.queue.pop_front() {
            let at = envelope.tick.unwrap_or(tick);
            self.dispatch(envelope.sender, envelope.message, at);
            delivered += 1;
        }
        self.messages_delivered += delivered;
        delivered
    }

    /// Let every agent drain its inbox, in ring order.
    pub fn process_agents(&mut self, tick: Tick) -> usize {
        self.now = tick;
        let mut handled = 0;
        for id in &self.ring {
            let Some(agent) = self.agents.get_mut(id) else {
                continue;
            };
            if !agent.has_pending() {
                continue;
            }
            let mut outbox = Outbox {
                queue: &mut self.queue,
                events: &mut self.events,
                now: tick,
            };
            handled += agent.process_messages(tick, &mut outbox);
        }
        handled
    }

    /// Alternate delivery and agent processing until nothing is in flight.
    /// Returns the number of messages delivered from the queue.
    pub fn run_until_idle(&mut self, tick: Tick) -> usize {
        let mut delivered = 0;
        loop {
            delivered += self.deliver_messages(tick);
            if !self.has_pending_inbox() {
                break;
            }
            self.process_agents(tick);
        }
        delivered
    }

    fn dispatch(&mut self, sender: NodeId, message: Message, tick: Tick) {
        match message {
            Message::TaskAnnouncement { task } => self.handle_announcement(sender, task, tick),
            Message::ForwardAnnouncement(fwd) => self.handle_forward(fwd, tick),
            Message::WinnerDecision(decision) => {
                let winner = decision.winner.clone();
                self.deliver_to(&winner, Message::WinnerDecision(decision), tick);
            }
        }
    }

    fn handle_announcement(&mut self, sender: NodeId, task: Task, tick: Tick) {
        relay_debug!("{} announced by {}", task.task_id, sender);
        self.events.record(
            tick,
            EventKind::TaskAnnounced {
                task_id: task.task_id.clone(),
            },
        );

        if self.ring.is_empty() {
            relay_info!("No agents in ring, dropping {}", task.task_id);
            self.events.record(
                tick,
                EventKind::TaskDropped {
                    task_id: task.task_id,
                    reason: DropReason::EmptyRing,
                },
            );
            return;
        }

        if task.is_start_of_day() {
            self.assign_start_of_day(task, tick);
            return;
        }

        let first = self.ring[0].clone();
        let fwd = ForwardAnnouncement::seed(task, first.clone());
        self.events.record(
            tick,
            EventKind::Forwarded {
                task_id: fwd.task.task_id.clone(),
                to: first.clone(),
                hops: 1,
            },
        );
        self.deliver_to(&first, Message::ForwardAnnouncement(fwd), tick);
    }

    fn assign_start_of_day(&mut self, task: Task, tick: Tick) {
        let index = self.sod_assign_index;
        let winner = self.ring[index % self.ring.len()].clone();
        self.sod_assign_index = index.wrapping_add(1);

        relay_info!("SOD task {} assigned to {} (round-robin {})", task.task_id, winner, index);
        self.events.record(
            tick,
            EventKind::SodAssigned {
                task_id: task.task_id.clone(),
                winner: winner.clone(),
                index,
            },
        );

        let decision = WinnerDecision {
            task,
            winner: winner.clone(),
            best: BestBid::held_by(0.0, winner.clone()),
            backtrace_route: None,
        };
        self.deliver_to(&winner, Message::WinnerDecision(decision), tick);
    }

    /// Next unvisited ring member, scanning circularly from just after the
    /// last hop (from the head of the ring when the last hop is the warehouse).
    fn next_hop(&self, fwd: &ForwardAnnouncement) -> Option<AgentId> {
        let len = self.ring.len();
        let start = match fwd.last_hop() {
            Some(NodeId::Agent(last)) => self.ring.iter().position(|id| id == last).map_or(0, |i| i + 1),
            _ => 0,
        };
        (0..len)
            .map(|offset| &self.ring[(start + offset) % len])
            .find(|id| !fwd.has_visited(id))
            .cloned()
    }

    fn handle_forward(&mut self, mut fwd: ForwardAnnouncement, tick: Tick) {
        match self.next_hop(&fwd) {
            Some(next) => {
                fwd.path.push(NodeId::Agent(next.clone()));
                relay_debug!(
                    "{} forwarded to {} (best {:.2} by {:?})",
                    fwd.task.task_id,
                    next,
                    fwd.best.bid,
                    fwd.best.holder
                );
                self.events.record(
                    tick,
                    EventKind::Forwarded {
                        task_id: fwd.task.task_id.clone(),
                        to: next.clone(),
                        hops: fwd.path.len() - 1,
                    },
                );
                self.deliver_to(&next, Message::ForwardAnnouncement(fwd), tick);
            }
            None => self.backtrace(fwd, tick),
        }
    }

    fn backtrace(&mut self, fwd: ForwardAnnouncement, tick: Tick) {
        let task_id = fwd.task.task_id.clone();
        let Some(winner) = fwd.best.holder.clone() else {
            relay_info!("No feasible bid for {}, task dropped", task_id);
            self.events.record(
                tick,
                EventKind::TaskDropped {
                    task_id,
                    reason: DropReason::NoFeasibleBid,
                },
            );
            return;
        };

        if !self.agents.contains_key(&winner) {
            relay_info!("Winner {} of {} is not registered, task dropped", winner, task_id);
            self.events.record(
                tick,
                EventKind::TaskDropped {
                    task_id,
                    reason: DropReason::UnknownWinner,
                },
            );
            return;
        }

        let route = backtrace_route(&fwd.path, &winner);
        relay_info!(
            "Winner for {}: {} with bid {:.2}, route [{}]",
            task_id,
            winner,
            fwd.best.bid,
            route.iter().map(AgentId::as_str).collect::<Vec<_>>().join(" -> ")
        );
        self.events.record(
            tick,
            EventKind::WinnerDecided {
                task_id,
                winner: winner.clone(),
                bid: fwd.best.bid,
                route: route.clone(),
            },
        );

        let decision = WinnerDecision {
            task: fwd.task,
            winner,
            best: fwd.best,
            backtrace_route: Some(route.clone()),
        };
        for hop in &route {
            self.deliver_to(hop, Message::WinnerDecision(decision.clone()), tick);
        }
    }

    fn deliver_to(&mut self, recipient: &AgentId, message: Message, tick: Tick) {
        match self.agents.get_mut(recipient) {
            Some(agent) => {
                agent.receive(message);
            }
            None => {
                relay_debug!("{} for {} skipped, unknown recipient {}", message.kind(), message.task_id(), recipient);
                self.events.record(
                    tick,
                    EventKind::DeliverySkipped {
                        task_id: message.task_id().clone(),
                        recipient: recipient.clone(),
                    },
                );
            }
        }
    }
}

impl<N: Navigator> NetworkHandler for RelayFabric<N> {
    fn send_message(&mut self, sender: NodeId, message: Message, tick: Option<Tick>) -> bool {
        self.send(sender, message, tick)
    }

    fn publish_event(&mut self, tick: Tick, event: EventKind) {
        self.events.record(tick, event);
    }
}

/// Winner first, then each earlier agent on the path back toward the
/// warehouse. A winner missing from the path gets a route of its own.
pub fn backtrace_route(path: &[NodeId], winner: &AgentId) -> Vec<AgentId> {
    match path.iter().position(|hop| hop.agent() == Some(winner)) {
        Some(idx) => path[..=idx].iter().rev().filter_map(NodeId::agent).cloned().collect(),
        None => vec![winner.clone()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::agent::Position;
    use crate::consensus::types::{EdgeId, TaskId};
    use crate::navigation::ConstantCost;

    fn agent_id(id: &str) -> AgentId {
        AgentId::new(id).unwrap()
    }

    fn vehicle(id: &str, cost: f64) -> VehicleAgent<ConstantCost> {
        VehicleAgent::new(
            agent_id(id),
            Position::default(),
            EdgeId::new("edge_warehouse"),
            10.0,
            100.0,
            ConstantCost(cost),
        )
        .unwrap()
    }

    fn task(id: &str) -> Task {
        Task::new(TaskId::new(id), EdgeId::new("edge_warehouse"), EdgeId::new("d1"), 3.0, None).unwrap()
    }

    fn fabric(ids: &[(&str, f64)]) -> RelayFabric<ConstantCost> {
        let agents = ids.iter().map(|(id, cost)| vehicle(id, *cost)).collect();
        RelayFabric::new(agents, RelayConfig::default()).unwrap()
    }

    #[test]
    fn test_duplicate_agents_rejected() {
        let result = RelayFabric::new(vec![vehicle("A", 1.0), vehicle("A", 2.0)], RelayConfig::default());
        assert!(matches!(result, Err(Error::ItemAlreadyExists(_))));
    }

    #[test]
    fn test_send_does_not_deliver() {
        let mut fabric = fabric(&[("A", 10.0)]);
        assert!(fabric.send(NodeId::Warehouse, Message::TaskAnnouncement { task: task("T1") }, None));
        assert_eq!(fabric.pending_messages(), 1);
        assert!(!fabric.agent(&agent_id("A")).unwrap().has_pending());

        assert_eq!(fabric.deliver_messages(Tick(0)), 1);
        assert_eq!(fabric.pending_messages(), 0);
        assert!(fabric.agent(&agent_id("A")).unwrap().has_pending());
    }

    #[test]
    fn test_malformed_message_never_queued() {
        let mut fabric = fabric(&[("A", 10.0)]);
        let mut bad = task("T1");
        bad.weight = f64::NAN;
        assert!(!fabric.send(NodeId::Warehouse, Message::TaskAnnouncement { task: bad }, None));
        assert_eq!(fabric.pending_messages(), 0);
        assert_eq!(fabric.events().count(|k| matches!(k, EventKind::MessageRejected { .. })), 1);
    }

    #[test]
    fn test_next_hop_scans_from_last_entry() {
        let fabric = fabric(&[("A", 1.0), ("B", 1.0), ("C", 1.0), ("D", 1.0)]);
        let mut fwd = ForwardAnnouncement::seed(task("T1"), agent_id("A"));
        assert_eq!(fabric.next_hop(&fwd), Some(agent_id("B")));

        // [warehouse, C] continues at D, then wraps to A
        fwd.path = vec![NodeId::Warehouse, NodeId::Agent(agent_id("C"))];
        assert_eq!(fabric.next_hop(&fwd), Some(agent_id("D")));
        fwd.path.push(NodeId::Agent(agent_id("D")));
        assert_eq!(fabric.next_hop(&fwd), Some(agent_id("A")));

        fwd.path = vec![NodeId::Warehouse];
        assert_eq!(fabric.next_hop(&fwd), Some(agent_id("A")));

        fwd.path = ["A", "B", "C", "D"].iter().fold(vec![NodeId::Warehouse], |mut p, id| {
            p.push(NodeId::Agent(agent_id(id)));
            p
        });
        assert_eq!(fabric.next_hop(&fwd), None);
    }

    #[test]
    fn test_backtrace_route_shapes() {
        let path = vec![
            NodeId::Warehouse,
            NodeId::Agent(agent_id("A")),
            NodeId::Agent(agent_id("B")),
            NodeId::Agent(agent_id("C")),
        ];
        assert_eq!(backtrace_route(&path, &agent_id("B")), vec![agent_id("B"), agent_id("A")]);
        assert_eq!(backtrace_route(&path, &agent_id("A")), vec![agent_id("A")]);
        assert_eq!(
            backtrace_route(&path, &agent_id("C")),
            vec![agent_id("C"), agent_id("B"), agent_id("A")]
        );
        assert_eq!(backtrace_route(&path, &agent_id("Z")), vec![agent_id("Z")]);
    }

    #[test]
    fn test_round_trip_auction() {
        let mut fabric = fabric(&[("A", 100.0), ("B", 50.0), ("C", 70.0)]);
        fabric.send(NodeId::Warehouse, Message::TaskAnnouncement { task: task("T1") }, None);
        fabric.run_until_idle(Tick(5));

        let b = fabric.agent(&agent_id("B")).unwrap();
        assert_eq!(b.assigned_tasks().len(), 1);
        assert_eq!(b.load(), 3.0);
        assert!(fabric.agent(&agent_id("A")).unwrap().assigned_tasks().is_empty());
        assert!(fabric.agent(&agent_id("C")).unwrap().assigned_tasks().is_empty());
        assert_eq!(fabric.events().count(|k| matches!(k, EventKind::WinnerDecided { .. })), 1);
        assert_eq!(fabric.pending_messages(), 0);
        // announcement + three forwards back from A, B and C
        assert_eq!(fabric.messages_delivered(), 4);
    }

    #[test]
    fn test_queued_tick_overrides_delivery_tick() {
        let mut fabric = fabric(&[("A", 10.0)]);
        fabric.send(NodeId::Warehouse, Message::TaskAnnouncement { task: task("T1") }, Some(Tick(2)));
        fabric.deliver_messages(Tick(9));
        assert_eq!(fabric.events().events()[0].tick, Tick(2));
    }

    #[test]
    fn test_sod_uses_configured_start_index() {
        let agents = vec![vehicle("A", 1.0), vehicle("B", 1.0), vehicle("C", 1.0)];
        let config = RelayConfig {
            sod_start_index: 2,
            ..RelayConfig::default()
        };
        let mut fabric = RelayFabric::new(agents, config).unwrap();
        fabric.send(NodeId::Warehouse, Message::TaskAnnouncement { task: task("SOD-1") }, None);
        fabric.run_until_idle(Tick(0));

        assert_eq!(fabric.agent(&agent_id("C")).unwrap().assigned_tasks().len(), 1);
        assert_eq!(fabric.sod_assign_index(), 3);
        assert_eq!(fabric.events().count(|k| matches!(k, EventKind::BidComputed { .. })), 0);
    }

    #[test]
    fn test_announcement_from_agent_is_rejected() {
        let mut fabric = fabric(&[("A", 10.0), ("B", 20.0)]);
        let b = NodeId::Agent(agent_id("B"));
        assert!(!fabric.send(b.clone(), Message::TaskAnnouncement { task: task("SOD-1") }, None));
        assert!(!fabric.send(b, Message::TaskAnnouncement { task: task("MID-1") }, None));
        assert_eq!(fabric.pending_messages(), 0);
        fabric.run_until_idle(Tick(0));

        assert_eq!(fabric.sod_assign_index(), 0);
        assert!(fabric.agents().all(|a| a.assigned_tasks().is_empty()));
        assert_eq!(fabric.events().count(|k| matches!(k, EventKind::MessageRejected { .. })), 2);
        assert_eq!(fabric.events().count(|k| matches!(k, EventKind::TaskAnnounced { .. })), 0);
    }

    #[test]
    fn test_sod_index_wraps_at_usize_max() {
        let config = RelayConfig {
            sod_start_index: usize::MAX,
            ..RelayConfig::default()
        };
        let mut fabric = RelayFabric::new(vec![vehicle("A", 1.0), vehicle("B", 1.0)], config).unwrap();
        fabric.send(NodeId::Warehouse, Message::TaskAnnouncement { task: task("SOD-1") }, None);
        fabric.send(NodeId::Warehouse, Message::TaskAnnouncement { task: task("SOD-2") }, None);
        fabric.run_until_idle(Tick(0));

        // usize::MAX is odd, so B first, then back to the head of the ring
        assert_eq!(fabric.sod_assign_index(), 1);
        assert_eq!(fabric.agent(&agent_id("B")).unwrap().assigned_tasks().len(), 1);
        assert_eq!(fabric.agent(&agent_id("A")).unwrap().assigned_tasks().len(), 1);
    }

    #[test]
    fn test_decision_for_unknown_agent_is_skipped() {
        let mut fabric = fabric(&[("A", 10.0)]);
        let decision = WinnerDecision {
            task: task("T1"),
            winner: agent_id("Z"),
            best: BestBid::held_by(1.0, agent_id("Z")),
            backtrace_route: None,
        };
        fabric.send(NodeId::Warehouse, Message::WinnerDecision(decision), None);
        fabric.run_until_idle(Tick(0));
        assert_eq!(fabric.events().count(|k| matches!(k, EventKind::DeliverySkipped { .. })), 1);
    }
}
