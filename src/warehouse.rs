//! Task source: generates, schedules and announces delivery tasks

use crate::config::TaskGenParams;
use crate::consensus::message::Message;
use crate::consensus::types::{EdgeId, NodeId, Task, TaskId, Tick};
use crate::network::NetworkHandler;
use anyhow::{Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub release_at: Tick,
    pub task: Task,
}

/// Holds tasks until their release tick, then announces them to the relay.
#[derive(Debug, Clone)]
pub struct Warehouse {
    edge: EdgeId,
    schedule: Vec<ScheduledTask>,
}

impl Warehouse {
    pub fn new(edge: EdgeId) -> Self {
        Self {
            edge,
            schedule: Vec::new(),
        }
    }

    pub fn with_schedule(edge: EdgeId, tasks: impl IntoIterator<Item = ScheduledTask>) -> Self {
        let mut warehouse = Self::new(edge);
        for scheduled in tasks {
            warehouse.schedule(scheduled.task, scheduled.release_at);
        }
        warehouse
    }

    pub fn edge(&self) -> &EdgeId {
        &self.edge
    }

    /// Tasks still waiting, ordered by release tick.
    pub fn pending(&self) -> &[ScheduledTask] {
        &self.schedule
    }

    pub fn is_empty(&self) -> bool {
        self.schedule.is_empty()
    }

    /// Queue a task for release. Tasks sharing a release tick keep insertion order.
    pub fn schedule(&mut self, task: Task, release_at: Tick) {
        let at = self.schedule.partition_point(|s| s.release_at <= release_at);
        self.schedule.insert(at, ScheduledTask { release_at, task });
    }

    /// Announce every task due at or before `now`. Returns how many were accepted.
    pub fn release_due<H: NetworkHandler + ?Sized>(&mut self, now: Tick, network: &mut H) -> usize {
        let due = self.schedule.partition_point(|s| s.release_at <= now);
        let mut sent = 0;
        for ScheduledTask { task, .. } in self.schedule.drain(..due) {
            let task_id = task.task_id.clone();
            if network.send_message(NodeId::Warehouse, Message::TaskAnnouncement { task }, Some(now)) {
                debug!("Released {} at tick {}", task_id, now);
                sent += 1;
            } else {
                warn!("Announcement for {} rejected", task_id);
            }
        }
        sent
    }
}

fn pick_delivery<R: Rng>(rng: &mut R, warehouse_edge: &EdgeId, delivery_edges: &[EdgeId]) -> EdgeId {
    if delivery_edges.is_empty() {
        return warehouse_edge.clone();
    }
    delivery_edges[rng.random_range(0..delivery_edges.len())].clone()
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Start-of-day tasks `SOD-<n>` released at tick 0, then mid-day tasks
/// `MID-<n>` whose deadline is an offset from their release tick.
pub fn generate_tasks<R: Rng>(
    params: &TaskGenParams,
    warehouse_edge: &EdgeId,
    delivery_edges: &[EdgeId],
    rng: &mut R,
) -> Vec<ScheduledTask> {
    let mut tasks = Vec::with_capacity(params.sod_tasks + params.mid_tasks);
    let (min_weight, max_weight) = params.weight_range;

    for i in 1..=params.sod_tasks {
        let (lo, hi) = params.sod_deadline_range;
        let task = Task {
            task_id: TaskId::new(format!("SOD-{i}")),
            pickup: warehouse_edge.clone(),
            delivery: pick_delivery(rng, warehouse_edge, delivery_edges),
            weight: round_tenth(rng.random_range(min_weight..=max_weight)),
            due_by: Some(rng.random_range(lo..=hi).round()),
        };
        tasks.push(ScheduledTask {
            release_at: Tick(0),
            task,
        });
    }

    for i in 1..=params.mid_tasks {
        let (first, last) = params.mid_release_range;
        let (lo, hi) = params.mid_deadline_offset_range;
        let release_at = Tick(rng.random_range(first..=last));
        let task = Task {
            task_id: TaskId::new(format!("MID-{i}")),
            pickup: warehouse_edge.clone(),
            delivery: pick_delivery(rng, warehouse_edge, delivery_edges),
            weight: round_tenth(rng.random_range(min_weight..=max_weight)),
            due_by: Some(release_at.as_secs_f64() + rng.random_range(lo..=hi).round()),
        };
        tasks.push(ScheduledTask { release_at, task });
    }

    tasks
}

pub fn load_tasks(path: &Path) -> Result<Vec<ScheduledTask>> {
    let json = fs::read_to_string(path).context("Failed to read tasks file")?;
    let tasks: Vec<ScheduledTask> = serde_json::from_str(&json).context("Failed to parse tasks json")?;
    for scheduled in &tasks {
        scheduled.task.validate().context("Invalid task in tasks file")?;
    }
    Ok(tasks)
}

pub fn save_tasks(tasks: &[ScheduledTask], path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(tasks).context("Failed to serialize tasks")?;
    fs::write(path, json).context("Failed to write tasks file")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::EventKind;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[derive(Default)]
    struct Collector {
        sent: Vec<(NodeId, Message, Option<Tick>)>,
    }

    impl NetworkHandler for Collector {
        fn send_message(&mut self, sender: NodeId, message: Message, tick: Option<Tick>) -> bool {
            self.sent.push((sender, message, tick));
            true
        }

        fn publish_event(&mut self, _tick: Tick, _event: EventKind) {}
    }

    fn task(id: &str) -> Task {
        Task::new(TaskId::new(id), EdgeId::new("w"), EdgeId::new("d"), 1.0, None).unwrap()
    }

    #[test]
    fn test_release_order_and_timing() {
        let mut warehouse = Warehouse::new(EdgeId::new("w"));
        warehouse.schedule(task("late"), Tick(10));
        warehouse.schedule(task("first"), Tick(2));
        warehouse.schedule(task("second"), Tick(2));

        let mut net = Collector::default();
        assert_eq!(warehouse.release_due(Tick(1), &mut net), 0);
        assert_eq!(warehouse.release_due(Tick(5), &mut net), 2);

        let ids: Vec<_> = net.sent.iter().map(|(_, m, _)| m.task_id().as_str().to_string()).collect();
        assert_eq!(ids, vec!["first", "second"]);
        assert!(net.sent.iter().all(|(sender, _, tick)| sender.is_warehouse() && *tick == Some(Tick(5))));
        assert_eq!(warehouse.pending().len(), 1);

        assert_eq!(warehouse.release_due(Tick(10), &mut net), 1);
        assert!(warehouse.is_empty());
    }

    #[test]
    fn test_generated_tasks_respect_params() {
        let params = TaskGenParams::default();
        let edges = vec![EdgeId::new("d1"), EdgeId::new("d2")];
        let mut rng = StdRng::seed_from_u64(7);
        let tasks = generate_tasks(&params, &EdgeId::new("w"), &edges, &mut rng);

        assert_eq!(tasks.len(), params.sod_tasks + params.mid_tasks);
        for scheduled in &tasks {
            let task = &scheduled.task;
            assert!(task.validate().is_ok());
            assert!(edges.contains(&task.delivery));
            assert!(task.weight >= 0.5 && task.weight <= 6.0);
            let due_by = task.due_by.unwrap();
            if task.is_start_of_day() {
                assert_eq!(scheduled.release_at, Tick(0));
                assert!((1800.0..=2000.0).contains(&due_by));
            } else {
                assert!((1..=1800).contains(&scheduled.release_at.0));
                let offset = due_by - scheduled.release_at.as_secs_f64();
                assert!((4000.0..=4200.0).contains(&offset));
            }
        }
        assert_eq!(tasks.iter().filter(|s| s.task.is_start_of_day()).count(), 5);
    }

    #[test]
    fn test_generation_is_reproducible() {
        let params = TaskGenParams::default();
        let a = generate_tasks(&params, &EdgeId::new("w"), &[], &mut StdRng::seed_from_u64(42));
        let b = generate_tasks(&params, &EdgeId::new("w"), &[], &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
        assert!(a.iter().all(|s| s.task.delivery == EdgeId::new("w")));
    }

    #[test]
    fn test_save_and_load_tasks() {
        let path = std::env::temp_dir().join(format!("dccbba_tasks_{}.json", std::process::id()));
        let tasks = vec![ScheduledTask {
            release_at: Tick(3),
            task: task("MID-1"),
        }];
        save_tasks(&tasks, &path).unwrap();
        let loaded = load_tasks(&path).unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(loaded, tasks);
    }
}
