//! Recording engine for tests: no network, every call logged.

use super::{ChannelInfo, ChannelUser, ConnectTarget, Engine, EngineFactory, Membership, Profile, UserInfo};
use crate::dispatch::EventSink;
use crate::error::TransportError;
use crate::event::{CanonicalEvent, RawEvent};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct Shared {
    calls: Mutex<Vec<(String, String)>>,
    sinks: Mutex<HashMap<String, EventSink>>,
    connect_error: Mutex<Option<TransportError>>,
    connect_delay: Mutex<Option<Duration>>,
}

/// Factory handle shared between a test and the engines it creates.
#[derive(Clone, Default)]
pub(crate) struct StubFactory {
    shared: Arc<Shared>,
}

impl StubFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent connect fail with this error.
    pub fn fail_connect(&self, err: TransportError) {
        *self.shared.connect_error.lock() = Some(err);
    }

    /// Make every subsequent connect take this long.
    pub fn delay_connect(&self, delay: Duration) {
        *self.shared.connect_delay.lock() = Some(delay);
    }

    /// The sink handed to the engine for `id`, to fire events by hand.
    pub fn sink(&self, id: &str) -> EventSink {
        self.shared.sinks.lock()[id].clone()
    }

    /// Operation names invoked on the engine for `id`, in call order.
    pub fn calls(&self, id: &str) -> Vec<String> {
        self.shared
            .calls
            .lock()
            .iter()
            .filter(|(engine, _)| engine == id)
            .map(|(_, op)| op.clone())
            .collect()
    }

    pub fn count(&self, id: &str, op: &str) -> usize {
        self.calls(id).iter().filter(|c| c.as_str() == op).count()
    }
}

impl EngineFactory for StubFactory {
    fn create(&self, id: &str, sink: EventSink) -> Box<dyn Engine> {
        self.shared.sinks.lock().insert(id.to_string(), sink.clone());
        Box::new(StubEngine {
            id: id.to_string(),
            sink,
            shared: self.shared.clone(),
            profile: Mutex::new(Profile::default()),
            channels: Mutex::new(Vec::new()),
        })
    }
}

struct StubEngine {
    id: String,
    sink: EventSink,
    shared: Arc<Shared>,
    profile: Mutex<Profile>,
    channels: Mutex<Vec<String>>,
}

impl StubEngine {
    fn record(&self, op: &str) {
        self.shared
            .calls
            .lock()
            .push((self.id.clone(), op.to_string()));
    }
}

#[async_trait]
impl Engine for StubEngine {
    async fn connect(&self, target: &ConnectTarget) -> Result<(), TransportError> {
        self.record("connect");
        let delay = *self.shared.connect_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let error = self.shared.connect_error.lock().clone();
        if let Some(err) = error {
            return Err(err);
        }
        self.sink
            .emit(RawEvent::Connected {
                server: target.host.clone(),
                port: target.port,
            })
            .await;
        Ok(())
    }

    async fn disconnect(&self, _force: bool) -> Result<(), TransportError> {
        self.record("disconnect");
        self.sink.emit(RawEvent::Disconnected { clean: true }).await;
        Ok(())
    }

    async fn join(&self, channel: &str, _password: Option<&str>) -> Result<(), TransportError> {
        self.record("join");
        self.channels.lock().push(channel.to_string());
        Ok(())
    }

    async fn part(&self, channel: &str, _message: Option<&str>) -> Result<(), TransportError> {
        self.record("part");
        self.channels.lock().retain(|c| c != channel);
        Ok(())
    }

    async fn quit(&self, _message: Option<&str>) -> Result<(), TransportError> {
        self.record("quit");
        Ok(())
    }

    async fn set_nick(&self, nick: &str) -> Result<(), TransportError> {
        self.record("set_nick");
        self.profile.lock().nickname = Some(nick.to_string());
        Ok(())
    }

    async fn send_raw(&self, _line: &str) -> Result<(), TransportError> {
        self.record("send_raw");
        Ok(())
    }

    async fn send_message(&self, _target: &str, _message: &str) -> Result<(), TransportError> {
        self.record("send_message");
        Ok(())
    }

    async fn send_action(&self, _target: &str, _message: &str) -> Result<(), TransportError> {
        self.record("send_action");
        Ok(())
    }

    fn set_profile(&self, profile: Profile) {
        self.record("set_profile");
        let mut current = self.profile.lock();
        if profile.nickname.is_some() {
            current.nickname = profile.nickname;
        }
        if profile.username.is_some() {
            current.username = profile.username;
        }
        if profile.realname.is_some() {
            current.realname = profile.realname;
        }
    }

    fn nickname(&self) -> String {
        self.profile.lock().nickname.clone().unwrap_or_default()
    }

    fn channels(&self) -> Vec<String> {
        self.channels.lock().clone()
    }

    fn channel(&self, channel: &str) -> Option<ChannelInfo> {
        let joined = self.channels.lock().iter().any(|c| c == channel);
        joined.then(|| ChannelInfo {
            name: channel.to_string(),
            topic: None,
            modes: None,
            users: vec![ChannelUser {
                nick: self.nickname(),
                modes: String::new(),
            }],
        })
    }

    fn user(&self, nick: &str) -> Option<UserInfo> {
        let own = self.nickname();
        if !own.eq_ignore_ascii_case(nick) {
            return None;
        }
        Some(UserInfo {
            nick: own,
            hostmask: None,
            channels: self
                .channels()
                .into_iter()
                .map(|channel| Membership {
                    channel,
                    modes: String::new(),
                })
                .collect(),
        })
    }
}

/// A handler that appends every event it sees to a shared list.
pub(crate) fn recorder() -> (
    impl FnMut(CanonicalEvent) -> anyhow::Result<()> + Send + 'static,
    Arc<Mutex<Vec<CanonicalEvent>>>,
) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    let handler = move |event: CanonicalEvent| -> anyhow::Result<()> {
        log.lock().push(event);
        Ok(())
    };
    (handler, seen)
}
