//! The host-facing facade.

use crate::coordinator::{ChannelInfo, ConnectOptions, ConnectionInfo, Coordinator, UserInfo};
use crate::dispatch::{Dispatcher, EventHandler};
use crate::engine::{EngineFactory, IrcEngineFactory};
use crate::error::Result;
use crate::registry::Registry;
use std::sync::Arc;

/// One registry, one coordinator and one dispatcher, wired together.
///
/// Every event from every connection reaches the handler given to
/// [`Bridge::new`], one at a time.
#[derive(Clone)]
pub struct Bridge {
    registry: Arc<Registry>,
    coordinator: Coordinator,
    dispatcher: Dispatcher,
}

impl Bridge {
    /// Must be called inside a tokio runtime.
    pub fn new(factory: impl EngineFactory, handler: impl EventHandler) -> Self {
        let dispatcher = Dispatcher::spawn(handler);
        let registry = Arc::new(Registry::new(factory, dispatcher.clone()));
        Self {
            coordinator: Coordinator::new(registry.clone()),
            registry,
            dispatcher,
        }
    }

    /// A bridge whose connections talk to real IRC servers.
    pub fn with_irc_engine(handler: impl EventHandler) -> Self {
        Self::new(IrcEngineFactory, handler)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn create(&self, id: &str) -> bool {
        self.registry.create(id)
    }

    pub async fn destroy(&self, id: &str) -> Result<()> {
        self.registry.destroy(id).await
    }

    pub async fn connect(
        &self,
        id: &str,
        nick: &str,
        host: &str,
        port: u32,
        options: ConnectOptions,
    ) -> Result<()> {
        self.coordinator.connect(id, nick, host, port, options).await
    }

    pub async fn join(&self, id: &str, channel: &str, password: Option<&str>) -> Result<()> {
        self.coordinator.join(id, channel, password).await
    }

    pub async fn part(&self, id: &str, channel: &str, message: Option<&str>) -> Result<()> {
        self.coordinator.part(id, channel, message).await
    }

    pub async fn quit(&self, id: &str, message: Option<&str>) -> Result<()> {
        self.coordinator.quit(id, message).await
    }

    pub async fn set_nick(&self, id: &str, nick: &str) -> Result<()> {
        self.coordinator.set_nick(id, nick).await
    }

    pub async fn send_raw(&self, id: &str, line: &str) -> Result<()> {
        self.coordinator.send_raw(id, line).await
    }

    pub async fn send_message(&self, id: &str, target: &str, message: &str) -> Result<()> {
        self.coordinator.send_message(id, target, message).await
    }

    pub async fn send_action(&self, id: &str, target: &str, message: &str) -> Result<()> {
        self.coordinator.send_action(id, target, message).await
    }

    pub fn info(&self, id: &str) -> Result<ConnectionInfo> {
        self.coordinator.info(id)
    }

    pub fn channel_info(&self, id: &str, channel: &str) -> Result<ChannelInfo> {
        self.coordinator.channel_info(id, channel)
    }

    pub fn user_info(&self, id: &str, nick: &str) -> Result<UserInfo> {
        self.coordinator.user_info(id, nick)
    }

    /// Destroy every connection, then stop the dispatcher. Call once, at
    /// process exit.
    pub async fn shutdown_all(&self) {
        self.registry.shutdown_all().await;
        self.dispatcher.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::stub::{recorder, StubFactory};
    use crate::error::{BridgeError, ErrorKind};
    use crate::event::{CanonicalEvent, EventKind, RawEvent};
    use parking_lot::Mutex;

    #[tokio::test]
    async fn test_full_session_through_facade() {
        let (handler, seen) = recorder();
        let factory = StubFactory::new();
        let bridge = Bridge::new(factory.clone(), handler);

        assert!(bridge.create("libera"));
        assert!(bridge.create("oftc"));
        bridge
            .connect("libera", "crab", "irc.libera.chat", 6697, ConnectOptions::sync())
            .await
            .unwrap();

        factory.sink("libera").emit(RawEvent::Welcome).await;
        bridge.join("libera", "#rust", None).await.unwrap();
        bridge.send_message("libera", "#rust", "hi").await.unwrap();

        let err = bridge.join("oftc", "#rust", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StatePrecondition);

        let names: Vec<&str> = seen.lock().iter().map(|e| e.kind.name()).collect();
        assert_eq!(names, vec!["irc_connected", "irc_welcomed"]);
        assert_eq!(bridge.info("libera").unwrap().channels, vec!["#rust"]);
        assert_eq!(bridge.user_info("libera", "CRAB").unwrap().channels.len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_all_closes_dispatcher() {
        let (handler, _seen) = recorder();
        let factory = StubFactory::new();
        let bridge = Bridge::new(factory.clone(), handler);
        bridge.create("alpha");
        bridge.create("beta");

        bridge.shutdown_all().await;

        assert!(bridge.registry().is_empty());
        assert_eq!(factory.count("alpha", "disconnect"), 1);
        assert_eq!(factory.count("beta", "disconnect"), 1);

        let err = bridge
            .dispatcher
            .deliver(CanonicalEvent::new("late", EventKind::Welcomed))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::DispatcherClosed));
    }

    #[tokio::test]
    async fn test_handler_may_drive_the_bridge() {
        let factory = StubFactory::new();
        let slot: Arc<Mutex<Option<Bridge>>> = Arc::new(Mutex::new(None));
        let joined = Arc::new(Mutex::new(Vec::new()));

        let handler_slot = slot.clone();
        let handler_joined = joined.clone();
        let handler = move |event: CanonicalEvent| -> anyhow::Result<()> {
            if event.kind == EventKind::Welcomed {
                let bridge = handler_slot.lock().clone();
                if let Some(bridge) = bridge {
                    let log = handler_joined.clone();
                    tokio::spawn(async move {
                        let result = bridge.join(&event.id, "#crabbridge", None).await;
                        log.lock().push(result.is_ok());
                    });
                }
            }
            Ok(())
        };

        let bridge = Bridge::new(factory.clone(), handler);
        *slot.lock() = Some(bridge.clone());
        bridge.create("bridge");
        bridge
            .connect("bridge", "crab", "irc.example.org", 6667, ConnectOptions::sync())
            .await
            .unwrap();
        factory.sink("bridge").emit(RawEvent::Welcome).await;

        for _ in 0..100 {
            if !joined.lock().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(*joined.lock(), vec![true]);
        assert_eq!(factory.count("bridge", "join"), 1);
    }
}
