// ABOUTME: Capability contract every chat backend implements
// ABOUTME: Lets the reply router address any backend without knowing its type

use crate::event::Event;
use anyhow::Result;
use async_trait::async_trait;

/// A chat backend adapter.
///
/// Events carry an `Arc<dyn Broker>` so replies can be delivered back to
/// wherever the inbound message came from. Implementations own their
/// transport; they hold no per-event state.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Stable name of this broker instance (used in preference scoping)
    fn name(&self) -> &str;

    /// Deliver an event's body to its room
    async fn send(&self, evt: Event) -> Result<()>;

    /// Deliver an event's body to its user as a direct message
    async fn send_dm(&self, evt: Event) -> Result<()>;

    /// Render and deliver tabular data in the event's room
    async fn send_table(&self, evt: Event, header: &[String], rows: &[Vec<String>]) -> Result<()>;

    fn room_id_to_name(&self, id: &str) -> String;

    fn room_name_to_id(&self, name: &str) -> String;

    fn user_id_to_name(&self, id: &str) -> String;

    fn user_name_to_id(&self, name: &str) -> String;
}

impl std::fmt::Debug for dyn Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker").field("name", &self.name()).finish()
    }
}
