//! Serialized event delivery.
//!
//! Engines emit events from their own tokio tasks. The [`Dispatcher`] hands
//! every event to one consumer task that runs the host's [`EventHandler`],
//! and the emitting task waits until the handler has returned. Only one
//! handler invocation is ever in flight, events reach the host in the order
//! `deliver` was called, and a slow handler stalls the producers instead of
//! letting a queue grow.

use crate::error::{BridgeError, Result};
use crate::event::{translate, CanonicalEvent, ConnectionState, EventKind, RawEvent};
use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

tokio::task_local! {
    /// Set while running inside the consumer task.
    static CONSUMER: ();
}

/// The host's single event hook.
///
/// Never invoked concurrently with itself. An `Err` is logged and dispatch
/// carries on with the next event.
pub trait EventHandler: Send + 'static {
    fn handle(&mut self, event: CanonicalEvent)
        -> impl Future<Output = anyhow::Result<()>> + Send;
}

impl<F> EventHandler for F
where
    F: FnMut(CanonicalEvent) -> anyhow::Result<()> + Send + 'static,
{
    fn handle(&mut self, event: CanonicalEvent) -> impl Future<Output = anyhow::Result<()>> + Send {
        std::future::ready((*self)(event))
    }
}

enum Delivery {
    Event {
        event: CanonicalEvent,
        subscription: Option<Arc<Subscription>>,
        ack: Option<oneshot::Sender<()>>,
    },
    Shutdown(oneshot::Sender<()>),
}

/// Marshals events from any number of producers onto one consumer task.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<Delivery>,
    consumer: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Dispatcher {
    /// Start the consumer task. Must be called inside a tokio runtime.
    pub fn spawn<H: EventHandler>(handler: H) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let consumer = tokio::spawn(CONSUMER.scope((), run_consumer(handler, rx)));
        Self {
            tx,
            consumer: Arc::new(Mutex::new(Some(consumer))),
        }
    }

    /// Register a connection and return the sink its engine emits into.
    pub fn subscribe(&self, id: &str, state: Arc<Mutex<ConnectionState>>) -> EventSink {
        EventSink {
            subscription: Arc::new(Subscription {
                id: id.to_string(),
                active: AtomicBool::new(true),
                state,
            }),
            dispatcher: self.clone(),
        }
    }

    /// Hand an event to the host and wait until the handler has returned.
    pub async fn deliver(&self, event: CanonicalEvent) -> Result<()> {
        self.send(event, None).await
    }

    async fn send(&self, event: CanonicalEvent, subscription: Option<Arc<Subscription>>) -> Result<()> {
        // The consumer cannot wait on itself: events raised from inside the
        // handler are queued behind the current one.
        if CONSUMER.try_with(|_| ()).is_ok() {
            return self
                .tx
                .send(Delivery::Event {
                    event,
                    subscription,
                    ack: None,
                })
                .map_err(|_| BridgeError::DispatcherClosed);
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(Delivery::Event {
                event,
                subscription,
                ack: Some(ack_tx),
            })
            .map_err(|_| BridgeError::DispatcherClosed)?;
        ack_rx.await.map_err(|_| BridgeError::DispatcherClosed)
    }

    /// Stop the consumer once it has finished everything queued before this
    /// call. Later deliveries fail with [`BridgeError::DispatcherClosed`].
    pub async fn shutdown(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Delivery::Shutdown(done_tx)).is_ok() && CONSUMER.try_with(|_| ()).is_err() {
            let _ = done_rx.await;
        }
        let handle = self.consumer.lock().take();
        if let Some(handle) = handle {
            if CONSUMER.try_with(|_| ()).is_err() {
                let _ = handle.await;
            }
        }
    }
}

async fn run_consumer<H: EventHandler>(mut handler: H, mut rx: mpsc::UnboundedReceiver<Delivery>) {
    tracing::debug!("event consumer started");

    while let Some(delivery) = rx.recv().await {
        let (event, subscription, ack) = match delivery {
            Delivery::Event {
                event,
                subscription,
                ack,
            } => (event, subscription, ack),
            Delivery::Shutdown(done) => {
                let _ = done.send(());
                break;
            }
        };

        let live = subscription.as_ref().map_or(true, |s| s.is_active());
        if live {
            let id = event.id.clone();
            let name = event.kind.name();
            match AssertUnwindSafe(async { handler.handle(event).await })
                .catch_unwind()
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(id = %id, event = name, "event handler failed: {:#}", e);
                }
                Err(_) => {
                    tracing::error!(id = %id, event = name, "event handler panicked");
                }
            }
        } else {
            tracing::debug!(id = %event.id, event = event.kind.name(), "dropping event for destroyed connection");
        }

        if let Some(ack) = ack {
            let _ = ack.send(());
        }
    }

    tracing::debug!("event consumer stopped");
}

/// Per-connection delivery state: Subscribed until [`EventSink::unsubscribe`],
/// then Unsubscribed for good.
pub struct Subscription {
    id: String,
    active: AtomicBool,
    state: Arc<Mutex<ConnectionState>>,
}

impl Subscription {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// Where an engine sends its events. Cheap to clone.
#[derive(Clone)]
pub struct EventSink {
    subscription: Arc<Subscription>,
    dispatcher: Dispatcher,
}

impl EventSink {
    pub fn id(&self) -> &str {
        self.subscription.id()
    }

    pub fn is_active(&self) -> bool {
        self.subscription.is_active()
    }

    /// Translate a raw engine event and deliver it. Events that do not
    /// translate, or arrive after unsubscribe, are dropped.
    pub async fn emit(&self, raw: RawEvent) {
        if !self.is_active() {
            tracing::debug!(id = %self.id(), "dropping late engine event: {:?}", raw);
            return;
        }
        let Some(kind) = translate(self.id(), raw) else {
            return;
        };
        if let Err(e) = self.deliver(kind).await {
            tracing::debug!(id = %self.id(), "event not delivered: {}", e);
        }
    }

    /// Deliver an already-canonical event for this connection, applying the
    /// state change it implies first.
    pub async fn deliver(&self, kind: EventKind) -> Result<()> {
        if !self.is_active() {
            return Ok(());
        }
        if let Some(state) = kind.implied_state() {
            *self.subscription.state.lock() = state;
        }
        let event = CanonicalEvent::new(self.id(), kind);
        self.dispatcher
            .send(event, Some(self.subscription.clone()))
            .await
    }

    /// Stop delivering for this connection, including events already queued.
    pub fn unsubscribe(&self) {
        self.subscription.active.store(false, Ordering::Release);
    }
}
