//! # dccbba - Ring-relay auction for delivery fleets
//!
//! dccbba allocates delivery tasks across a fleet of vehicle agents with a
//! decentralized, consensus-based auction. Each task travels once around a
//! fixed ring of agents collecting bids, and the winning decision is relayed
//! back along the path that found it.
//!
//! ## Modules
//!
//! - [`consensus`] - Ring relay fabric, vehicle agents, messages and bid pricing
//! - [`navigation`] - Route cost collaborators (constant stub, road network)
//! - [`telemetry`] - Discrete protocol events
//! - [`warehouse`] - Task source: generation, scheduling and release
//! - [`sim`] - Tick driver
//! - [`report`] - Run summary
//! - [`config`] - Configuration structures and loading
//! - [`network`] - Agent to relay communication seam
//! - [`error`] - Error types and handling
//!
//! ## Quick Start
//!
//! ```rust
//! use dccbba::*;
//!
//! let agents = ["A", "B", "C"]
//!     .iter()
//!     .zip([100.0, 50.0, 80.0])
//!     .map(|(id, cost)| {
//!         VehicleAgent::new(
//!             AgentId::new(*id).unwrap(),
//!             Position::default(),
//!             EdgeId::new("edge_warehouse"),
//!             10.0,
//!             100.0,
//!             ConstantCost(cost),
//!         )
//!         .unwrap()
//!     })
//!     .collect();
//! let mut fabric = RelayFabric::new(agents, RelayConfig::default()).unwrap();
//!
//! let task = Task::new(
//!     TaskId::new("MID-1"),
//!     EdgeId::new("edge_warehouse"),
//!     EdgeId::new("edge_42"),
//!     3.0,
//!     None,
//! )
//! .unwrap();
//! fabric.send(NodeId::Warehouse, Message::TaskAnnouncement { task }, None);
//! fabric.run_until_idle(Tick(0));
//!
//! let b = fabric.agent(&AgentId::new("B").unwrap()).unwrap();
//! assert_eq!(b.assigned_tasks().len(), 1);
//! ```

pub mod config;
pub mod consensus;
pub mod error;
pub mod logger;
pub mod navigation;
pub mod network;
pub mod report;
pub mod sim;
pub mod telemetry;
pub mod warehouse;

pub use consensus::*;
pub use error::{Error, Result};
pub use navigation::{ConstantCost, Navigator, RoadNetwork};
pub use network::NetworkHandler;
pub use sim::Simulation;
pub use telemetry::{DropReason, EventKind, EventLog, TelemetryEvent};
pub use warehouse::{ScheduledTask, Warehouse};
