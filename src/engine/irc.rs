//! [`Engine`] backed by the `irc` crate.

use super::{
    ChannelInfo, ChannelUser, ConnectTarget, Engine, EngineFactory, Membership, Profile, UserInfo,
};
use crate::dispatch::EventSink;
use crate::error::TransportError;
use crate::event::RawEvent;
use ::irc::client::data::AccessLevel;
use ::irc::client::prelude::{Client, Command, Config, Message, Prefix, Response};
use ::irc::client::ClientStream;
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Creates one [`IrcEngine`] per connection instance.
#[derive(Debug, Default, Clone, Copy)]
pub struct IrcEngineFactory;

impl EngineFactory for IrcEngineFactory {
    fn create(&self, id: &str, sink: EventSink) -> Box<dyn Engine> {
        Box::new(IrcEngine::new(id, sink))
    }
}

struct Session {
    client: Client,
    sender: ::irc::client::Sender,
    /// Owns the `ClientStream`, and with it the socket.
    reader: JoinHandle<()>,
}

/// Channel and user details the `irc` client does not track itself.
#[derive(Debug, Default)]
struct Tracking {
    topics: HashMap<String, String>,
    modes: HashMap<String, String>,
    /// Keyed by lowercased nickname.
    hostmasks: HashMap<String, String>,
}

impl Tracking {
    fn observe(&mut self, message: &Message) {
        if let Some(Prefix::Nickname(nick, user, host)) = &message.prefix {
            if !user.is_empty() && !host.is_empty() {
                self.hostmasks
                    .insert(nick.to_lowercase(), format!("{}!{}@{}", nick, user, host));
            }
        }

        match &message.command {
            Command::TOPIC(channel, Some(topic)) => {
                self.topics.insert(channel.clone(), topic.clone());
            }
            Command::Response(Response::RPL_TOPIC, args) if args.len() >= 3 => {
                self.topics.insert(args[1].clone(), args[2].clone());
            }
            Command::Response(Response::RPL_NOTOPIC, args) if args.len() >= 2 => {
                self.topics.remove(&args[1]);
            }
            Command::Response(Response::RPL_CHANNELMODEIS, args) if args.len() >= 3 => {
                self.modes.insert(args[1].clone(), args[2..].join(" "));
            }
            Command::NICK(new) => {
                let Some(old) = message.source_nickname() else {
                    return;
                };
                if let Some(mask) = self.hostmasks.remove(&old.to_lowercase()) {
                    let rest = mask.split_once('!').map(|(_, r)| r).unwrap_or_default();
                    self.hostmasks
                        .insert(new.to_lowercase(), format!("{}!{}", new, rest));
                }
            }
            Command::QUIT(_) => {
                if let Some(nick) = message.source_nickname() {
                    self.hostmasks.remove(&nick.to_lowercase());
                }
            }
            _ => {}
        }
    }

    fn forget_channel(&mut self, channel: &str) {
        self.topics.remove(channel);
        self.modes.remove(channel);
    }
}

fn prefix_modes(levels: &[AccessLevel]) -> String {
    levels
        .iter()
        .filter_map(|level| match level {
            AccessLevel::Owner => Some('~'),
            AccessLevel::Admin => Some('&'),
            AccessLevel::Oper => Some('@'),
            AccessLevel::HalfOp => Some('%'),
            AccessLevel::Voice => Some('+'),
            AccessLevel::Member => None,
        })
        .collect()
}

fn cancelled() -> TransportError {
    TransportError::new("Cancelled", "disconnected while the connection was being opened")
}

pub struct IrcEngine {
    id: String,
    sink: EventSink,
    profile: Mutex<Profile>,
    session: Mutex<Option<Session>>,
    /// Reader left running after a QUIT so the server can close cleanly.
    draining: Mutex<Option<JoinHandle<()>>>,
    tracking: Arc<Mutex<Tracking>>,
    connecting: AtomicBool,
    closing: Arc<AtomicBool>,
}

impl IrcEngine {
    pub fn new(id: &str, sink: EventSink) -> Self {
        Self {
            id: id.to_string(),
            sink,
            profile: Mutex::new(Profile::default()),
            session: Mutex::new(None),
            draining: Mutex::new(None),
            tracking: Arc::new(Mutex::new(Tracking::default())),
            connecting: AtomicBool::new(false),
            closing: Arc::new(AtomicBool::new(false)),
        }
    }

    fn sender(&self) -> Result<::irc::client::Sender, TransportError> {
        self.session
            .lock()
            .as_ref()
            .map(|s| s.sender.clone())
            .ok_or_else(|| TransportError::new("NotConnected", "no open session"))
    }

    fn send(&self, command: Command) -> Result<(), TransportError> {
        self.sender()?.send(command)?;
        Ok(())
    }

    /// Open the socket, register and install the session. The read loop is
    /// held back until `Connected` has been delivered, so it is always the
    /// first event of a session and commands issued while handling it are
    /// queued on a live sender.
    async fn open(&self, target: &ConnectTarget) -> Result<(), TransportError> {
        let profile = self.profile.lock().clone();
        let config = Config {
            server: Some(target.host.clone()),
            port: Some(target.port),
            use_tls: Some(target.tls),
            nickname: profile.nickname,
            username: profile.username,
            realname: profile.realname,
            password: target.password.clone(),
            ..Config::default()
        };

        let mut client = Client::from_config(config).await?;
        client.identify()?;

        let sender = client.sender();
        let stream = client.stream()?;
        let (start_tx, start_rx) = oneshot::channel();
        let reader = tokio::spawn(read_loop(
            self.id.clone(),
            self.sink.clone(),
            self.closing.clone(),
            self.tracking.clone(),
            stream,
            start_rx,
        ));

        {
            let mut slot = self.session.lock();
            if self.closing.load(Ordering::SeqCst) {
                reader.abort();
                tracing::debug!(id = %self.id, "disconnect arrived during handshake");
                return Err(cancelled());
            }
            let previous = slot.replace(Session {
                client,
                sender,
                reader,
            });
            if let Some(previous) = previous {
                previous.reader.abort();
            }
        }

        self.sink
            .emit(RawEvent::Connected {
                server: target.host.clone(),
                port: target.port,
            })
            .await;

        if self.session.lock().is_none() {
            return Err(cancelled());
        }
        // The reader is gone if the session was replaced meanwhile
        let _ = start_tx.send(());
        Ok(())
    }
}

async fn read_loop(
    id: String,
    sink: EventSink,
    closing: Arc<AtomicBool>,
    tracking: Arc<Mutex<Tracking>>,
    mut stream: ClientStream,
    start: oneshot::Receiver<()>,
) {
    if start.await.is_err() {
        return;
    }

    let clean = loop {
        match stream.next().await {
            Some(Ok(message)) => {
                tracking.lock().observe(&message);
                for raw in raw_events(&message) {
                    sink.emit(raw).await;
                }
            }
            Some(Err(e)) => {
                tracing::warn!(id = %id, "read loop failed: {}", e);
                break false;
            }
            None => break closing.load(Ordering::SeqCst),
        }
    };
    tracing::info!(id = %id, clean, "connection closed");
    sink.emit(RawEvent::Disconnected { clean }).await;
}

impl Drop for IrcEngine {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.reader.abort();
        }
        if let Some(reader) = self.draining.get_mut().take() {
            reader.abort();
        }
    }
}

#[async_trait]
impl Engine for IrcEngine {
    async fn connect(&self, target: &ConnectTarget) -> Result<(), TransportError> {
        if self.connecting.swap(true, Ordering::SeqCst) {
            return Err(TransportError::new(
                "AlreadyConnecting",
                "a connect attempt is already in progress",
            ));
        }
        tracing::debug!(id = %self.id, host = %target.host, port = target.port, "opening connection");
        self.closing.store(false, Ordering::SeqCst);
        let result = self.open(target).await;
        self.connecting.store(false, Ordering::SeqCst);
        result
    }

    async fn disconnect(&self, force: bool) -> Result<(), TransportError> {
        self.closing.store(true, Ordering::SeqCst);
        let session = self.session.lock().take();

        if force {
            let draining = self.draining.lock().take();
            let live = session.is_some() || draining.as_ref().is_some_and(|r| !r.is_finished());
            if let Some(session) = session {
                session.reader.abort();
            }
            if let Some(reader) = draining {
                reader.abort();
            }
            if live {
                self.sink.emit(RawEvent::Disconnected { clean: true }).await;
            }
            return Ok(());
        }

        let Some(session) = session else {
            return Ok(());
        };
        let result = session.sender.send_quit("");
        if let Some(previous) = self.draining.lock().replace(session.reader) {
            previous.abort();
        }
        result?;
        Ok(())
    }

    async fn join(&self, channel: &str, password: Option<&str>) -> Result<(), TransportError> {
        self.send(Command::JOIN(
            channel.to_string(),
            password.map(|p| p.to_string()),
            None,
        ))?;
        // Ask for the channel modes so channel() can report them
        self.send(Command::Raw("MODE".to_string(), vec![channel.to_string()]))
    }

    async fn part(&self, channel: &str, message: Option<&str>) -> Result<(), TransportError> {
        self.tracking.lock().forget_channel(channel);
        self.send(Command::PART(
            channel.to_string(),
            message.map(|m| m.to_string()),
        ))
    }

    async fn quit(&self, message: Option<&str>) -> Result<(), TransportError> {
        self.closing.store(true, Ordering::SeqCst);
        self.send(Command::QUIT(message.map(|m| m.to_string())))
    }

    async fn set_nick(&self, nick: &str) -> Result<(), TransportError> {
        self.profile.lock().nickname = Some(nick.to_string());
        self.send(Command::NICK(nick.to_string()))
    }

    async fn send_raw(&self, line: &str) -> Result<(), TransportError> {
        self.send(Command::Raw(line.to_string(), vec![]))
    }

    async fn send_message(&self, target: &str, message: &str) -> Result<(), TransportError> {
        // No CTCP injection through plain messages
        let clean = message.replace('\x01', "");
        self.send(Command::PRIVMSG(target.to_string(), clean))
    }

    async fn send_action(&self, target: &str, message: &str) -> Result<(), TransportError> {
        let clean = message.replace('\x01', "");
        self.send(Command::PRIVMSG(
            target.to_string(),
            format!("\x01ACTION {}\x01", clean),
        ))
    }

    fn set_profile(&self, profile: Profile) {
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
        if let Some(session) = self.session.lock().as_ref() {
            return session.client.current_nickname().to_string();
        }
        self.profile.lock().nickname.clone().unwrap_or_default()
    }

    fn channels(&self) -> Vec<String> {
        self.session
            .lock()
            .as_ref()
            .and_then(|s| s.client.list_channels())
            .unwrap_or_default()
    }

    fn channel(&self, channel: &str) -> Option<ChannelInfo> {
        let users = {
            let session = self.session.lock();
            session.as_ref()?.client.list_users(channel)?
        };
        let tracking = self.tracking.lock();
        Some(ChannelInfo {
            name: channel.to_string(),
            topic: tracking.topics.get(channel).cloned(),
            modes: tracking.modes.get(channel).cloned(),
            users: users
                .iter()
                .map(|u| ChannelUser {
                    nick: u.get_nickname().to_string(),
                    modes: prefix_modes(&u.access_levels()),
                })
                .collect(),
        })
    }

    fn user(&self, nick: &str) -> Option<UserInfo> {
        let mut found: Option<(String, Option<String>)> = None;
        let mut channels = Vec::new();
        {
            let session = self.session.lock();
            let client = &session.as_ref()?.client;
            for channel in client.list_channels().unwrap_or_default() {
                let users = client.list_users(&channel).unwrap_or_default();
                let Some(user) = users
                    .iter()
                    .find(|u| u.get_nickname().eq_ignore_ascii_case(nick))
                else {
                    continue;
                };
                if found.is_none() {
                    let mask = match (user.get_username(), user.get_hostname()) {
                        (Some(name), Some(host)) => {
                            Some(format!("{}!{}@{}", user.get_nickname(), name, host))
                        }
                        _ => None,
                    };
                    found = Some((user.get_nickname().to_string(), mask));
                }
                channels.push(Membership {
                    channel,
                    modes: prefix_modes(&user.access_levels()),
                });
            }
        }

        let seen = self.tracking.lock().hostmasks.get(&nick.to_lowercase()).cloned();
        let (nick, hostmask) = match (found, seen) {
            (Some((name, listed)), seen) => (name, seen.or(listed)),
            (None, Some(mask)) => (mask.split('!').next().unwrap_or(nick).to_string(), Some(mask)),
            (None, None) => return None,
        };
        Some(UserInfo {
            nick,
            hostmask,
            channels,
        })
    }
}

/// Classify one received line. The verbatim line always comes first.
pub fn raw_events(message: &Message) -> Vec<RawEvent> {
    let who = message.source_nickname().unwrap_or_default().to_string();
    let mut events = vec![RawEvent::Line(message.to_string().trim_end().to_string())];

    match &message.command {
        Command::JOIN(channel, _, _) => events.push(RawEvent::Join {
            who,
            channel: channel.clone(),
        }),
        Command::PART(channel, _) => events.push(RawEvent::Part {
            who,
            channel: channel.clone(),
        }),
        Command::QUIT(reason) => events.push(RawEvent::Quit {
            who,
            message: reason.clone().unwrap_or_default(),
        }),
        Command::NICK(new) => events.push(RawEvent::Nick {
            old: who,
            new: new.clone(),
        }),
        Command::PRIVMSG(target, text) => {
            if text.len() >= 2 && text.starts_with('\x01') && text.ends_with('\x01') {
                let ctcp = &text[1..text.len() - 1];
                let (command, rest) = ctcp.split_once(' ').unwrap_or((ctcp, ""));
                events.push(RawEvent::Ctcp {
                    who,
                    target: target.clone(),
                    command: command.to_string(),
                    message: rest.to_string(),
                });
            } else {
                events.push(RawEvent::Privmsg {
                    who,
                    target: target.clone(),
                    message: text.clone(),
                });
            }
        }
        Command::ERROR(message) => events.push(RawEvent::Error(message.clone())),
        Command::Response(Response::RPL_WELCOME, _) => events.push(RawEvent::Welcome),
        Command::Response(Response::ERR_NICKNAMEINUSE, args) => events.push(RawEvent::NickInUse {
            nick: args.get(1).cloned().unwrap_or_default(),
        }),
        Command::Response(resp, args) => {
            let (message, args) = match args.split_last() {
                Some((last, rest)) => (last.clone(), rest.to_vec()),
                None => (String::new(), Vec::new()),
            };
            events.push(RawEvent::Numeric {
                code: *resp as u16,
                name: format!("{:?}", resp),
                args,
                message,
            });
        }
        _ => {}
    }

    events
}
