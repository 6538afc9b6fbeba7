pub mod logging;
pub mod types;
pub mod message;
pub mod pricing;
pub mod agent;
pub mod relay;

pub use agent::{AgentStatus, Assignment, NetworkInfo, Position, VehicleAgent};
pub use message::{ForwardAnnouncement, Message, WinnerDecision};
pub use relay::{RelayConfig, RelayFabric};
pub use types::*;
