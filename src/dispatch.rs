// ABOUTME: Routes forwarded events to the plugin instances bound to their broker and room
// ABOUTME: Attaches instance metadata to each copy and reports handler failures back to chat

use anyhow::Result;
use halyard_core::{Event, InstanceRegistry};
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct Dispatcher {
    registry: Arc<InstanceRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<InstanceRegistry>) -> Self {
        Self { registry }
    }

    /// Deliver one event to every matching instance, in registration order.
    ///
    /// Each handler gets its own copy with the instance attached. A handler
    /// error is replied to the event's origin; a failed reply is returned.
    pub async fn dispatch(&self, evt: &Event) -> Result<usize> {
        let instances = self.registry.matching(&evt.broker_name(), &evt.room_id);
        if instances.is_empty() {
            tracing::debug!(
                broker = %evt.broker_name(),
                room_id = %evt.room_id,
                "No plugin instances for event"
            );
            return Ok(0);
        }

        for instance in &instances {
            let mut scoped = evt.clone();
            scoped.attach(instance);

            if let Err(e) = instance.plugin.handler().handle(scoped.clone()).await {
                tracing::warn!(
                    plugin = %instance.plugin.name,
                    event_id = %evt.id,
                    error = %e,
                    "Plugin handler failed"
                );
                scoped.error(&e).await?;
            }
        }
        Ok(instances.len())
    }

    /// Consume events until every sender is gone
    pub async fn run(&self, mut rx: mpsc::Receiver<Event>) -> Result<()> {
        while let Some(evt) = rx.recv().await {
            tracing::trace!(event = %evt, "Dispatching event");
            self.dispatch(&evt).await?;
        }
        tracing::debug!("Event channel closed, dispatcher stopping");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use halyard_core::{Broker, Plugin, PluginHandler};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Sink {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Broker for Sink {
        fn name(&self) -> &str {
            "sink"
        }
        async fn send(&self, evt: Event) -> Result<()> {
            self.sent.lock().unwrap().push(evt.body);
            Ok(())
        }
        async fn send_dm(&self, evt: Event) -> Result<()> {
            self.send(evt).await
        }
        async fn send_table(&self, _evt: Event, _h: &[String], _r: &[Vec<String>]) -> Result<()> {
            Ok(())
        }
        fn room_id_to_name(&self, id: &str) -> String {
            id.to_string()
        }
        fn room_name_to_id(&self, name: &str) -> String {
            name.to_string()
        }
        fn user_id_to_name(&self, id: &str) -> String {
            id.to_string()
        }
        fn user_name_to_id(&self, name: &str) -> String {
            name.to_string()
        }
    }

    /// Records the plugin name it sees, then optionally fails
    struct Probe {
        seen: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl PluginHandler for Probe {
        async fn handle(&self, evt: Event) -> Result<()> {
            self.seen.lock().unwrap().push(evt.plugin_name());
            if self.fail {
                anyhow::bail!("probe exploded");
            }
            Ok(())
        }
    }

    fn probe(name: &str, seen: &Arc<Mutex<Vec<String>>>, fail: bool) -> Arc<Plugin> {
        Arc::new(Plugin::new(
            name,
            Arc::new(Probe {
                seen: Arc::clone(seen),
                fail,
            }),
        ))
    }

    #[tokio::test]
    async fn test_dispatch_to_matching_instances() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = InstanceRegistry::new();
        registry.register(probe("first", &seen, false), "sink", "room-1");
        registry.register(probe("other-room", &seen, false), "sink", "room-2");
        registry.register(probe("second", &seen, false), "sink", "room-1");

        let sink = Arc::new(Sink::default());
        let evt = Event::new()
            .with_room("Room", "room-1")
            .with_broker(sink.clone());

        let dispatcher = Dispatcher::new(Arc::new(registry));
        assert_eq!(dispatcher.dispatch(&evt).await.unwrap(), 2);
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
        // the caller's event is untouched
        assert_eq!(evt.plugin_name(), "");
    }

    #[tokio::test]
    async fn test_handler_error_is_replied() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = InstanceRegistry::new();
        registry.register(probe("boom", &seen, true), "sink", "r");

        let sink = Arc::new(Sink::default());
        let evt = Event::new().with_room("r", "r").with_broker(sink.clone());

        Dispatcher::new(Arc::new(registry)).dispatch(&evt).await.unwrap();
        assert_eq!(*sink.sent.lock().unwrap(), vec!["probe exploded"]);
    }

    #[tokio::test]
    async fn test_no_broker_matches_nothing() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = InstanceRegistry::new();
        registry.register(probe("p", &seen, false), "sink", "r");

        let evt = Event::new().with_room("r", "r");
        let count = Dispatcher::new(Arc::new(registry)).dispatch(&evt).await.unwrap();
        assert_eq!(count, 0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_when_senders_drop() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = InstanceRegistry::new();
        registry.register(probe("p", &seen, false), "sink", "r");

        let sink: Arc<dyn Broker> = Arc::new(Sink::default());
        let (tx, rx) = mpsc::channel(4);
        for body in ["a", "b"] {
            tx.send(Event::new().with_body(body).with_room("r", "r").with_broker(sink.clone()))
                .await
                .unwrap();
        }
        drop(tx);

        Dispatcher::new(Arc::new(registry)).run(rx).await.unwrap();
        assert_eq!(seen.lock().unwrap().len(), 2);
    }
}
