//! Vehicle agent: local state and the bidding side of the ring auction

use crate::consensus::message::{ForwardAnnouncement, Message, WinnerDecision};
use crate::consensus::pricing::shape_bid;
use crate::consensus::types::{AgentId, Bid, EdgeId, NodeId, Task, TaskId, TaskPhase, Tick, VERY_HIGH_BID};
use crate::error::Error;
use crate::navigation::Navigator;
use crate::network::NetworkHandler;
use crate::telemetry::EventKind;
use crate::{agent_debug, agent_info};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A committed task, unique per `task_id` within one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub task_id: TaskId,
    pub delivery: EdgeId,
    pub weight: f64,
}

/// What the agent knows about its surroundings when pricing a task.
#[derive(Debug, Clone, Copy)]
pub struct NetworkInfo<'a> {
    pub current_time: Tick,
    pub current_edge: &'a EdgeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub id: AgentId,
    pub position: Position,
    pub current_edge: EdgeId,
    pub battery: f64,
    pub load: f64,
    pub capacity: f64,
    pub assigned_tasks: usize,
    pub completed_tasks: u32,
    pub total_distance: f64,
}

/// One vehicle in the ring.
///
/// The relay pushes messages into the inbox with [`receive`](Self::receive);
/// nothing happens until [`process_messages`](Self::process_messages) drains
/// it, which is when bids are computed and forwarded.
#[derive(Debug)]
pub struct VehicleAgent<N: Navigator> {
    id: AgentId,
    position: Position,
    current_edge: EdgeId,
    capacity: f64,
    load: f64,
    battery: f64,
    inbox: VecDeque<Message>,
    assigned_tasks: Vec<Assignment>,
    bidding: HashSet<TaskId>,
    won: HashSet<TaskId>,
    completed_tasks: u32,
    total_distance: f64,
    navigator: N,
}

impl<N: Navigator> VehicleAgent<N> {
    pub fn new(
        id: AgentId,
        position: Position,
        current_edge: EdgeId,
        capacity: f64,
        battery: f64,
        navigator: N,
    ) -> Result<Self, Error> {
        if !capacity.is_finite() {
            return Err(Error::ValidationError(format!("{id}: capacity must be finite")));
        }
        if !battery.is_finite() || battery < 0.0 {
            return Err(Error::ValidationError(format!("{id}: battery must be finite and non-negative")));
        }

        Ok(Self {
            id,
            position,
            current_edge,
            capacity,
            load: 0.0,
            battery,
            inbox: VecDeque::new(),
            assigned_tasks: Vec::new(),
            bidding: HashSet::new(),
            won: HashSet::new(),
            completed_tasks: 0,
            total_distance: 0.0,
            navigator,
        })
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn update_position(&mut self, x: f64, y: f64) {
        self.position = Position { x, y };
    }

    pub fn current_edge(&self) -> &EdgeId {
        &self.current_edge
    }

    pub fn set_current_edge(&mut self, edge: EdgeId) {
        self.current_edge = edge;
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn load(&self) -> f64 {
        self.load
    }

    pub fn battery(&self) -> f64 {
        self.battery
    }

    pub fn drain_battery(&mut self, amount: f64) {
        self.battery = (self.battery - amount.max(0.0)).max(0.0);
    }

    pub fn assigned_tasks(&self) -> &[Assignment] {
        &self.assigned_tasks
    }

    pub fn completed_tasks(&self) -> u32 {
        self.completed_tasks
    }

    pub fn total_distance(&self) -> f64 {
        self.total_distance
    }

    pub fn has_pending(&self) -> bool {
        !self.inbox.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.inbox.len()
    }

    pub fn has_capacity(&self, weight: f64) -> bool {
        self.load + weight <= self.capacity
    }

    /// `Bidding` covers both a traversal still in flight and one lost to
    /// another agent; only a winner decision moves a task to `Won`.
    pub fn task_phase(&self, task_id: &TaskId) -> TaskPhase {
        if self.won.contains(task_id) {
            TaskPhase::Won
        } else if self.bidding.contains(task_id) {
            TaskPhase::Bidding
        } else {
            TaskPhase::Unseen
        }
    }

    pub fn status(&self) -> AgentStatus {
        AgentStatus {
            id: self.id.clone(),
            position: self.position,
            current_edge: self.current_edge.clone(),
            battery: self.battery,
            load: self.load,
            capacity: self.capacity,
            assigned_tasks: self.assigned_tasks.len(),
            completed_tasks: self.completed_tasks,
            total_distance: self.total_distance,
        }
    }

    /// Buffer a message for the next `process_messages`. Malformed
    /// messages are dropped here and never reach a handler.
    pub fn receive(&mut self, message: Message) -> bool {
        if let Err(e) = message.validate() {
            agent_debug!("{} dropped {} for {}: {}", self.id, message.kind(), message.task_id(), e);
            return false;
        }
        self.inbox.push_back(message);
        true
    }

    /// Drain the inbox in arrival order. Returns how many messages were handled.
    pub fn process_messages<H: NetworkHandler + ?Sized>(&mut self, tick: Tick, network: &mut H) -> usize {
        let mut handled = 0;
        while let Some(message) = self.inbox.pop_front() {
            match message {
                Message::TaskAnnouncement { task } => {
                    // Announcements reach agents only as forwards from the relay.
                    agent_debug!("{} ignoring direct announcement of {}", self.id, task.task_id);
                }
                Message::ForwardAnnouncement(fwd) => self.handle_forward(fwd, tick, network),
                Message::WinnerDecision(decision) => self.handle_winner(decision, tick, network),
            }
            handled += 1;
        }
        handled
    }

    /// Lowest truthful bid this vehicle can offer for `task`.
    ///
    /// Returns [`VERY_HIGH_BID`] when the task would overload the vehicle or
    /// the navigator knows no route to the delivery edge.
    pub fn compute_bid(&self, task: &Task, info: &NetworkInfo<'_>) -> f64 {
        if !self.has_capacity(task.weight) {
            return VERY_HIGH_BID;
        }

        let Some(base_cost) = self.navigator.estimate_cost(info.current_edge, &task.delivery) else {
            return VERY_HIGH_BID;
        };
        if !base_cost.is_finite() || base_cost >= VERY_HIGH_BID {
            return VERY_HIGH_BID;
        }

        shape_bid(
            base_cost.max(0.0),
            task.weight,
            self.load,
            self.capacity,
            task.due_by,
            info.current_time.as_secs_f64(),
        )
    }

    /// Record a won task. Returns false if it was already won.
    pub fn commit(&mut self, task: &Task) -> bool {
        if self.won.contains(&task.task_id) || self.assigned_tasks.iter().any(|a| a.task_id == task.task_id) {
            return false;
        }
        self.won.insert(task.task_id.clone());
        self.load += task.weight;
        self.assigned_tasks.push(Assignment {
            task_id: task.task_id.clone(),
            delivery: task.delivery.clone(),
            weight: task.weight,
        });
        true
    }

    /// Mark a delivery done: frees its weight and counts the distance driven.
    pub fn complete_task(&mut self, task_id: &TaskId, distance: f64) -> Result<Assignment, Error> {
        let Some(pos) = self.assigned_tasks.iter().position(|a| &a.task_id == task_id) else {
            return Err(Error::TaskNotFound(task_id.to_string()));
        };
        let done = self.assigned_tasks.remove(pos);
        self.load = (self.load - done.weight).max(0.0);
        self.completed_tasks += 1;
        self.total_distance += distance.max(0.0);
        self.current_edge = done.delivery.clone();
        agent_info!("{} completed task {}", self.id, task_id);
        Ok(done)
    }

    fn handle_forward<H: NetworkHandler + ?Sized>(&mut self, mut fwd: ForwardAnnouncement, tick: Tick, network: &mut H) {
        let info = NetworkInfo {
            current_time: tick,
            current_edge: &self.current_edge,
        };
        let bid = Bid {
            value: self.compute_bid(&fwd.task, &info),
            holder: self.id.clone(),
        };
        let improved = fwd.best.offer(&bid);
        self.bidding.insert(fwd.task.task_id.clone());

        if !fwd.has_visited(&self.id) {
            fwd.path.push(NodeId::Agent(self.id.clone()));
        }

        agent_debug!(
            "{} bid {:.2} on {} (best {:.2} by {:?}{})",
            self.id,
            bid.value,
            fwd.task.task_id,
            fwd.best.bid,
            fwd.best.holder,
            if improved { ", new holder" } else { "" }
        );
        network.publish_event(
            tick,
            EventKind::BidComputed {
                task_id: fwd.task.task_id.clone(),
                agent: self.id.clone(),
                bid: bid.value,
                best_bid: fwd.best.bid,
                best_holder: fwd.best.holder.clone(),
            },
        );

        network.send_message(NodeId::Agent(self.id.clone()), Message::ForwardAnnouncement(fwd), Some(tick));
    }

    fn handle_winner<H: NetworkHandler + ?Sized>(&mut self, decision: WinnerDecision, tick: Tick, network: &mut H) {
        let task_id = decision.task.task_id.clone();

        if decision.winner != self.id {
            agent_debug!("{} relayed winner {} of {}", self.id, decision.winner, task_id);
            network.publish_event(
                tick,
                EventKind::WinnerRelayed {
                    task_id,
                    relay: self.id.clone(),
                    winner: decision.winner,
                },
            );
            return;
        }

        if self.commit(&decision.task) {
            agent_info!("{} assigned task {}", self.id, task_id);
            network.publish_event(
                tick,
                EventKind::TaskAssigned {
                    task_id,
                    agent: self.id.clone(),
                },
            );
        } else {
            agent_debug!("{} already holds {}", self.id, task_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::types::BestBid;
    use crate::navigation::ConstantCost;

    /// Records everything an agent hands to the relay.
    #[derive(Default)]
    struct RecordingNetwork {
        sent: Vec<(NodeId, Message, Option<Tick>)>,
        events: Vec<EventKind>,
    }

    impl NetworkHandler for RecordingNetwork {
        fn send_message(&mut self, sender: NodeId, message: Message, tick: Option<Tick>) -> bool {
            self.sent.push((sender, message, tick));
            true
        }

        fn publish_event(&mut self, _tick: Tick, event: EventKind) {
            self.events.push(event);
        }
    }

    /// Reports no route at all.
    struct Unreachable;

    impl Navigator for Unreachable {
        fn estimate_cost(&self, _from: &EdgeId, _to: &EdgeId) -> Option<f64> {
            None
        }
    }

    fn agent_id(id: &str) -> AgentId {
        AgentId::new(id).unwrap()
    }

    fn vehicle(id: &str, cost: f64, capacity: f64) -> VehicleAgent<ConstantCost> {
        VehicleAgent::new(
            agent_id(id),
            Position::default(),
            EdgeId::new("edge_warehouse"),
            capacity,
            100.0,
            ConstantCost(cost),
        )
        .unwrap()
    }

    fn task(id: &str, weight: f64, due_by: Option<f64>) -> Task {
        Task::new(TaskId::new(id), EdgeId::new("edge_warehouse"), EdgeId::new("d1"), weight, due_by).unwrap()
    }

    fn info(edge: &EdgeId, tick: u64) -> NetworkInfo<'_> {
        NetworkInfo {
            current_time: Tick(tick),
            current_edge: edge,
        }
    }

    #[test]
    fn test_capacity_gate() {
        let mut a = vehicle("A", 100.0, 10.0);
        let edge = a.current_edge().clone();
        assert_eq!(a.compute_bid(&task("T", 10.0, None), &info(&edge, 0)), 0.5 * 100.0);
        assert_eq!(a.compute_bid(&task("T", 10.5, None), &info(&edge, 0)), VERY_HIGH_BID);

        a.commit(&task("T0", 8.0, None));
        assert_eq!(a.compute_bid(&task("T", 3.0, None), &info(&edge, 0)), VERY_HIGH_BID);
    }

    #[test]
    fn test_no_route_is_infeasible() {
        let a = VehicleAgent::new(agent_id("A"), Position::default(), EdgeId::new("e"), 10.0, 100.0, Unreachable).unwrap();
        let edge = EdgeId::new("e");
        assert_eq!(a.compute_bid(&task("T", 1.0, None), &info(&edge, 0)), VERY_HIGH_BID);
    }

    #[test]
    fn test_bid_combines_all_factors() {
        let mut a = vehicle("A", 100.0, 10.0);
        a.commit(&task("T0", 5.0, None));
        let edge = a.current_edge().clone();
        // light (1.5) * half full (2.0) * critical deadline (3.0)
        let bid = a.compute_bid(&task("T1", 1.0, Some(60.0)), &info(&edge, 0));
        assert_eq!(bid, 100.0 * 1.5 * 2.0 * 3.0);
    }

    #[test]
    fn test_forward_takes_best_when_strictly_lower() {
        let mut a = vehicle("A", 50.0, 10.0);
        let mut fwd = ForwardAnnouncement::seed(task("T1", 3.0, None), agent_id("B"));
        fwd.best = BestBid::held_by(80.0, agent_id("B"));
        fwd.path.push(NodeId::Agent(agent_id("A")));
        assert!(a.receive(Message::ForwardAnnouncement(fwd)));

        let mut net = RecordingNetwork::default();
        assert_eq!(a.process_messages(Tick(3), &mut net), 1);

        let (sender, msg, tick) = &net.sent[0];
        assert_eq!(sender, &NodeId::Agent(agent_id("A")));
        assert_eq!(*tick, Some(Tick(3)));
        let Message::ForwardAnnouncement(out) = msg else {
            panic!("expected forward, got {msg:?}");
        };
        assert_eq!(out.best, BestBid::held_by(50.0, agent_id("A")));
        // already on the path, not appended twice
        assert_eq!(out.path.len(), 3);
        assert_eq!(a.task_phase(&TaskId::new("T1")), TaskPhase::Bidding);
    }

    #[test]
    fn test_forward_keeps_incumbent_on_tie() {
        let mut a = vehicle("A", 80.0, 10.0);
        let mut fwd = ForwardAnnouncement::seed(task("T1", 3.0, None), agent_id("B"));
        fwd.best = BestBid::held_by(80.0, agent_id("B"));
        a.receive(Message::ForwardAnnouncement(fwd));

        let mut net = RecordingNetwork::default();
        a.process_messages(Tick(0), &mut net);
        let Message::ForwardAnnouncement(out) = &net.sent[0].1 else {
            panic!("expected forward");
        };
        assert_eq!(out.best.holder, Some(agent_id("B")));
        // appended because the path did not contain A yet
        assert_eq!(out.path.last(), Some(&NodeId::Agent(agent_id("A"))));
    }

    #[test]
    fn test_winner_decision_is_idempotent() {
        let mut a = vehicle("A", 50.0, 10.0);
        let decision = WinnerDecision {
            task: task("T1", 4.0, None),
            winner: agent_id("A"),
            best: BestBid::held_by(50.0, agent_id("A")),
            backtrace_route: Some(vec![agent_id("A")]),
        };
        a.receive(Message::WinnerDecision(decision.clone()));
        a.receive(Message::WinnerDecision(decision));

        let mut net = RecordingNetwork::default();
        a.process_messages(Tick(0), &mut net);

        assert_eq!(a.assigned_tasks().len(), 1);
        assert_eq!(a.load(), 4.0);
        assert_eq!(a.task_phase(&TaskId::new("T1")), TaskPhase::Won);
        assert_eq!(net.events.iter().filter(|e| matches!(e, EventKind::TaskAssigned { .. })).count(), 1);
        assert!(net.sent.is_empty());
    }

    #[test]
    fn test_relay_hop_does_not_commit() {
        let mut a = vehicle("A", 50.0, 10.0);
        a.receive(Message::WinnerDecision(WinnerDecision {
            task: task("T1", 4.0, None),
            winner: agent_id("B"),
            best: BestBid::held_by(50.0, agent_id("B")),
            backtrace_route: Some(vec![agent_id("B"), agent_id("A")]),
        }));
        let mut net = RecordingNetwork::default();
        a.process_messages(Tick(0), &mut net);
        assert!(a.assigned_tasks().is_empty());
        assert!(matches!(net.events[0], EventKind::WinnerRelayed { .. }));
    }

    #[test]
    fn test_direct_announcement_is_ignored() {
        let mut a = vehicle("A", 50.0, 10.0);
        a.receive(Message::TaskAnnouncement { task: task("T1", 1.0, None) });
        let mut net = RecordingNetwork::default();
        assert_eq!(a.process_messages(Tick(0), &mut net), 1);
        assert!(net.sent.is_empty());
        assert_eq!(a.task_phase(&TaskId::new("T1")), TaskPhase::Unseen);
    }

    #[test]
    fn test_receive_rejects_malformed() {
        let mut a = vehicle("A", 50.0, 10.0);
        let mut fwd = ForwardAnnouncement::seed(task("T1", 1.0, None), agent_id("B"));
        fwd.path.clear();
        assert!(!a.receive(Message::ForwardAnnouncement(fwd)));
        assert!(!a.has_pending());
    }

    #[test]
    fn test_complete_task() {
        let mut a = vehicle("A", 50.0, 10.0);
        a.commit(&task("T1", 4.0, None));
        let done = a.complete_task(&TaskId::new("T1"), 250.0).unwrap();
        assert_eq!(done.delivery, EdgeId::new("d1"));
        assert_eq!(a.load(), 0.0);
        assert_eq!(a.completed_tasks(), 1);
        assert_eq!(a.total_distance(), 250.0);
        assert_eq!(a.current_edge(), &EdgeId::new("d1"));
        assert!(matches!(a.complete_task(&TaskId::new("T1"), 0.0), Err(Error::TaskNotFound(_))));
        // a completed task stays won, a late duplicate decision is ignored
        assert!(!a.commit(&task("T1", 4.0, None)));
    }

    #[test]
    fn test_battery_floor() {
        let mut a = vehicle("A", 50.0, 10.0);
        a.drain_battery(30.0);
        assert_eq!(a.battery(), 70.0);
        a.drain_battery(500.0);
        assert_eq!(a.battery(), 0.0);
    }
}
