//! Network communication abstractions

use crate::consensus::message::Message;
use crate::consensus::types::{NodeId, Tick};
use crate::telemetry::EventKind;

/// Trait for the relay side of agent communication
///
/// Agents only ever talk to the relay through this seam: they hand their
/// outgoing messages to `send_message` and report what they did through
/// `publish_event`. The relay fabric implements it over its own queue; tests
/// can substitute a recording handler to drive a single agent in isolation.
pub trait NetworkHandler {
    /// Queue a message for later delivery
    ///
    /// # Arguments
    ///
    /// * `sender` - Node the message originates from
    /// * `message` - The message, moved into the queue
    /// * `tick` - Tick to process it at, or `None` for the delivering tick
    ///
    /// # Returns
    ///
    /// true if the message was accepted, false if it was dropped as malformed
    fn send_message(&mut self, sender: NodeId, message: Message, tick: Option<Tick>) -> bool;

    /// Record a telemetry event
    fn publish_event(&mut self, tick: Tick, event: EventKind);
}
