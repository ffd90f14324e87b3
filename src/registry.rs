//! Named connection instances.
//!
//! The [`Registry`] maps a case-insensitive id to exactly one [`Connection`].
//! Every lookup and mutation of the map is a single critical section, so two
//! callers racing on the same id always observe one order.

use crate::dispatch::{Dispatcher, EventSink};
use crate::engine::{Engine, EngineFactory};
use crate::error::{BridgeError, Result};
use crate::event::ConnectionState;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Ids are compared case-insensitively.
pub fn normalize_id(id: &str) -> String {
    id.to_lowercase()
}

/// One logical IRC connection.
pub struct Connection {
    id: String,
    engine: Box<dyn Engine>,
    events: EventSink,
    state: Arc<Mutex<ConnectionState>>,
    pending_connect: Mutex<Option<JoinHandle<()>>>,
}

impl Connection {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn engine(&self) -> &dyn Engine {
        self.engine.as_ref()
    }

    pub fn events(&self) -> &EventSink {
        &self.events
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }

    /// Move from `from` to `to`; returns false and changes nothing if the
    /// current state is not `from`.
    pub fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        let mut state = self.state.lock();
        if *state != from {
            return false;
        }
        *state = to;
        true
    }

    /// Claim the connection for a new connect attempt.
    pub(crate) fn begin_connect(&self) -> Result<()> {
        let mut state = self.state.lock();
        match *state {
            ConnectionState::Connecting | ConnectionState::Connected => {
                Err(BridgeError::AlreadyConnecting {
                    id: self.id.clone(),
                })
            }
            ConnectionState::Uninitialized | ConnectionState::Disconnected => {
                *state = ConnectionState::Connecting;
                Ok(())
            }
        }
    }

    pub(crate) fn track_connect(&self, handle: JoinHandle<()>) {
        *self.pending_connect.lock() = Some(handle);
    }

    /// Stop event delivery, cancel any background connect and force the
    /// engine down. Disconnect failures are logged and ignored.
    async fn teardown(&self) {
        self.events.unsubscribe();

        let pending = self.pending_connect.lock().take();
        if let Some(handle) = pending {
            if !handle.is_finished() {
                tracing::debug!(id = %self.id, "aborting in-flight connect");
                handle.abort();
            }
        }

        if let Err(e) = self.engine.disconnect(true).await {
            tracing::warn!(id = %self.id, "disconnect during teardown failed: {}", e);
        }
        self.set_state(ConnectionState::Disconnected);
    }
}

/// Owns every live [`Connection`], keyed by normalized id.
pub struct Registry {
    instances: Mutex<HashMap<String, Arc<Connection>>>,
    factory: Box<dyn EngineFactory>,
    dispatcher: Dispatcher,
}

impl Registry {
    pub fn new(factory: impl EngineFactory, dispatcher: Dispatcher) -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
            factory: Box::new(factory),
            dispatcher,
        }
    }

    /// Register a new connection. Returns false, changing nothing, if the id
    /// is already taken.
    pub fn create(&self, id: &str) -> bool {
        let id = normalize_id(id);
        let mut instances = self.instances.lock();
        if instances.contains_key(&id) {
            tracing::debug!(id = %id, "connection already exists");
            return false;
        }

        let state = Arc::new(Mutex::new(ConnectionState::Uninitialized));
        let events = self.dispatcher.subscribe(&id, state.clone());
        let engine = self.factory.create(&id, events.clone());
        instances.insert(
            id.clone(),
            Arc::new(Connection {
                id: id.clone(),
                engine,
                events,
                state,
                pending_connect: Mutex::new(None),
            }),
        );

        tracing::info!(id = %id, "created connection");
        true
    }

    pub fn get(&self, id: &str) -> Result<Arc<Connection>> {
        let id = normalize_id(id);
        self.instances
            .lock()
            .get(&id)
            .cloned()
            .ok_or(BridgeError::NotFound { id })
    }

    pub fn get_connected(&self, id: &str) -> Result<Arc<Connection>> {
        let connection = self.get(id)?;
        if !connection.is_connected() {
            return Err(BridgeError::NotConnected {
                id: connection.id.clone(),
            });
        }
        Ok(connection)
    }

    /// Remove a connection and force it down. Delivery for the old instance
    /// stops before the id can be reused.
    pub async fn destroy(&self, id: &str) -> Result<()> {
        let id = normalize_id(id);
        let connection = {
            let mut instances = self.instances.lock();
            let connection = instances
                .remove(&id)
                .ok_or_else(|| BridgeError::NotFound { id: id.clone() })?;
            connection.events().unsubscribe();
            connection
        };

        tracing::info!(id = %id, "destroying connection");
        connection.teardown().await;
        Ok(())
    }

    /// Tear down every connection. Meant to run once, at process shutdown.
    pub async fn shutdown_all(&self) {
        let drained: Vec<Arc<Connection>> = self.instances.lock().drain().map(|(_, c)| c).collect();
        tracing::info!(count = drained.len(), "shutting down all connections");
        for connection in drained {
            connection.teardown().await;
        }
    }

    pub fn len(&self) -> usize {
        self.instances.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.lock().is_empty()
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.instances.lock().keys().cloned().collect();
        ids.sort();
        ids
    }
}
