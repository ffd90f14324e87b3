use anyhow::Result;
use crabbridge::config::nickname::alternate_nickname;
use crabbridge::config::{self, ConnectionPreset};
use crabbridge::logging::{self, EventLogger};
use crabbridge::registry::normalize_id;
use crabbridge::{Bridge, CanonicalEvent, EventHandler, EventKind};
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Follow-up work requested by the handler, run outside of it.
#[derive(Debug)]
enum Action {
    JoinChannels { id: String },
    ChangeNick { id: String, nick: String },
}

struct HostHandler {
    logger: EventLogger,
    actions: mpsc::UnboundedSender<Action>,
}

impl EventHandler for HostHandler {
    async fn handle(&mut self, event: CanonicalEvent) -> anyhow::Result<()> {
        self.logger.log_event(&event);

        let id = event.id;
        match event.kind {
            EventKind::RawLine { line } => tracing::trace!(id = %id, "<< {}", line),
            EventKind::Welcomed => {
                tracing::info!(id = %id, "registered");
                self.actions.send(Action::JoinChannels { id })?;
            }
            EventKind::NickInUse { nick } => {
                let nick = alternate_nickname(&nick);
                tracing::warn!(id = %id, "nickname in use, trying {}", nick);
                self.actions.send(Action::ChangeNick { id, nick })?;
            }
            EventKind::ConnectionFailure { kind, message } => {
                tracing::error!(id = %id, kind = %kind, "connection failed: {}", message);
            }
            other => tracing::info!(id = %id, event = other.name(), "{:?}", other),
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = config::load_config()?;
    logging::init_tracing(&cfg.logging)?;

    let (action_tx, mut action_rx) = mpsc::unbounded_channel::<Action>();
    let bridge = Bridge::with_irc_engine(HostHandler {
        logger: EventLogger::new(&cfg.logging),
        actions: action_tx,
    });

    let presets: HashMap<String, ConnectionPreset> = cfg
        .connections
        .iter()
        .map(|p| (normalize_id(&p.name), p.clone()))
        .collect();

    for preset in cfg.connections.iter().filter(|p| p.auto_connect) {
        if !bridge.create(&preset.name) {
            tracing::warn!(id = %preset.name, "duplicate connection name, skipping");
            continue;
        }
        let result = bridge
            .connect(
                &preset.name,
                &preset.nickname,
                &preset.host,
                preset.port(&cfg.defaults),
                preset.options(&cfg.defaults),
            )
            .await;
        if let Err(e) = result {
            tracing::error!(id = %preset.name, "connect failed: {}", e);
        }
    }

    if bridge.registry().is_empty() {
        tracing::info!(
            "no auto_connect presets in {}, nothing to do",
            config::config_path().display()
        );
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            action = action_rx.recv() => {
                let Some(action) = action else { break };
                if let Err(e) = run_action(&bridge, &presets, action).await {
                    tracing::warn!("action failed: {}", e);
                }
            }
        }
    }

    tracing::info!("shutting down");
    bridge.shutdown_all().await;
    Ok(())
}

async fn run_action(
    bridge: &Bridge,
    presets: &HashMap<String, ConnectionPreset>,
    action: Action,
) -> crabbridge::Result<()> {
    match action {
        Action::JoinChannels { id } => {
            let Some(preset) = presets.get(&id) else {
                return Ok(());
            };
            for channel in &preset.channels {
                bridge.join(&id, channel, None).await?;
            }
        }
        Action::ChangeNick { id, nick } => bridge.set_nick(&id, &nick).await?,
    }
    Ok(())
}
