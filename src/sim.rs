//! Tick driver composing the task source and the relay fabric

use crate::config::SimConfig;
use crate::consensus::logging::log_fleet_status;
use crate::consensus::relay::RelayFabric;
use crate::consensus::types::Tick;
use crate::navigation::Navigator;
use crate::warehouse::Warehouse;
use tracing::info;

pub struct Simulation<N: Navigator> {
    pub fabric: RelayFabric<N>,
    pub warehouse: Warehouse,
    tick: Tick,
    status_interval: u64,
    battery_drain: f64,
}

impl<N: Navigator> Simulation<N> {
    /// `status_interval` of 0 disables periodic status and battery drain.
    pub fn new(fabric: RelayFabric<N>, warehouse: Warehouse, status_interval: u64, battery_drain: f64) -> Self {
        Self {
            fabric,
            warehouse,
            tick: Tick::default(),
            status_interval,
            battery_drain,
        }
    }

    pub fn from_config(fabric: RelayFabric<N>, warehouse: Warehouse, config: &SimConfig) -> Self {
        Self::new(
            fabric,
            warehouse,
            config.logging.status_interval,
            config.logging.battery_drain_per_status,
        )
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    /// Run one tick: release due tasks, settle every auction they start,
    /// then advance time. Returns the number of messages delivered.
    pub fn step(&mut self) -> usize {
        let now = self.tick;
        let released = self.warehouse.release_due(now, &mut self.fabric);
        let delivered = self.fabric.run_until_idle(now);
        if released > 0 {
            info!("Tick {}: released {} tasks, {} messages delivered", now, released, delivered);
        }

        if self.status_interval > 0 && now.0 > 0 && now.0 % self.status_interval == 0 {
            let ids = self.fabric.ring().to_vec();
            for id in &ids {
                if let Some(agent) = self.fabric.agent_mut(id) {
                    agent.drain_battery(self.battery_drain);
                }
            }
            info!("Status at tick {}", now);
            let agents: Vec<_> = self.fabric.agents().collect();
            log_fleet_status(&agents);
        }

        self.tick = now.next();
        delivered
    }

    pub fn run(&mut self, ticks: u64) -> usize {
        let mut delivered = 0;
        for _ in 0..ticks {
            delivered += self.step();
        }
        delivered
    }
}
