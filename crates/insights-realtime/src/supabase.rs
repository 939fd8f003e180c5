//! Hosted realtime client (Phoenix channels over a websocket).
//!
//! A background task owns the socket. It joins every registered channel,
//! sends heartbeats, routes change frames to the registry and reconnects
//! with exponential backoff, rejoining all live channels afterwards.

use crate::protocol::{self, Incoming, PhoenixMessage};
use crate::{
    ChangeFeed, ChangeHandler, ChannelRegistry, ChannelSpec, RealtimeError, RealtimeResult,
    Subscription,
};
use futures_util::{Sink, SinkExt, StreamExt};
use insights_config::RealtimeSettings;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use url::Url;

const WEBSOCKET_PATH: &str = "realtime/v1/websocket";
const PROTOCOL_VERSION: &str = "1.0.0";

/// Realtime client configuration.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Websocket endpoint without query parameters.
    pub endpoint: Url,
    /// Project API key sent on connect.
    pub api_key: String,
    pub heartbeat_interval: Duration,
    pub events_per_second: u32,
    pub reconnect_base_delay: Duration,
    pub reconnect_max_delay: Duration,
    pub max_reconnect_attempts: u32,
}

impl RealtimeConfig {
    /// Derive the websocket endpoint from a project URL
    /// (`https://x.supabase.co` becomes `wss://x.supabase.co/realtime/v1/websocket`).
    pub fn for_project(
        project_url: &Url,
        api_key: &str,
        settings: &RealtimeSettings,
    ) -> RealtimeResult<Self> {
        let raw = project_url.as_str();
        let socket_base = if let Some(rest) = raw.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = raw.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            return Err(RealtimeError::InvalidEndpoint(raw.to_string()));
        };
        let base = if socket_base.ends_with('/') {
            socket_base
        } else {
            format!("{socket_base}/")
        };
        let endpoint = Url::parse(&base)?.join(WEBSOCKET_PATH)?;

        Ok(Self {
            endpoint,
            api_key: api_key.to_string(),
            heartbeat_interval: Duration::from_secs(settings.heartbeat_interval_secs.max(1)),
            events_per_second: settings.events_per_second,
            reconnect_base_delay: Duration::from_millis(settings.reconnect_base_delay_ms),
            reconnect_max_delay: Duration::from_millis(settings.reconnect_max_delay_ms),
            max_reconnect_attempts: settings.max_reconnect_attempts,
        })
    }

    /// Endpoint with the connect parameters.
    pub fn socket_url(&self) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("apikey", &self.api_key)
            .append_pair("eventsPerSecond", &self.events_per_second.to_string())
            .append_pair("vsn", PROTOCOL_VERSION);
        url
    }

    /// Delay before reconnect attempt `attempt` (1-based).
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.reconnect_base_delay
            .saturating_mul(factor)
            .min(self.reconnect_max_delay)
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Reconnecting,
    /// Reconnect attempts exhausted.
    Failed,
    /// Shut down by the owner.
    Closed,
}

enum Command {
    Join(ChannelSpec),
    Leave(String),
    AccessToken(Option<String>),
    Shutdown,
}

enum Exit {
    Shutdown,
    Dropped,
}

/// Change feed backed by the hosted realtime service.
pub struct SupabaseRealtime {
    registry: Arc<ChannelRegistry>,
    commands: mpsc::UnboundedSender<Command>,
    state: Arc<RwLock<ConnectionState>>,
}

impl SupabaseRealtime {
    /// Spawn the connection task. Must be called inside a tokio runtime.
    pub fn connect(config: RealtimeConfig, access_token: Option<String>) -> Self {
        let registry = Arc::new(ChannelRegistry::new());
        let state = Arc::new(RwLock::new(ConnectionState::Connecting));
        let (commands, receiver) = mpsc::unbounded_channel();

        let worker = Worker {
            config,
            registry: registry.clone(),
            state: state.clone(),
            access_token,
            next_ref: 0,
        };
        tokio::spawn(worker.run(receiver));

        Self {
            registry,
            commands,
            state,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Close the socket and stop reconnecting.
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

impl Drop for SupabaseRealtime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for SupabaseRealtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseRealtime")
            .field("state", &self.state())
            .field("registry", &self.registry)
            .finish()
    }
}

impl ChangeFeed for SupabaseRealtime {
    fn subscribe(
        &self,
        spec: ChannelSpec,
        handler: ChangeHandler,
    ) -> RealtimeResult<Subscription> {
        let key = spec.key.clone();
        let (id, superseded) = self.registry.register(spec.clone(), handler);
        if superseded {
            let _ = self.commands.send(Command::Leave(key.clone()));
        }
        if self.commands.send(Command::Join(spec)).is_err() {
            self.registry.remove(&key, id);
            return Err(RealtimeError::Closed);
        }

        let commands = self.commands.clone();
        let leave_key = key.clone();
        Ok(Subscription::new(key, id, &self.registry).on_release(move || {
            let _ = commands.send(Command::Leave(leave_key));
        }))
    }

    fn set_access_token(&self, access_token: Option<String>) {
        let _ = self.commands.send(Command::AccessToken(access_token));
    }
}

struct Worker {
    config: RealtimeConfig,
    registry: Arc<ChannelRegistry>,
    state: Arc<RwLock<ConnectionState>>,
    access_token: Option<String>,
    next_ref: u64,
}

impl Worker {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let mut attempts: u32 = 0;
        loop {
            self.set_state(if attempts == 0 {
                ConnectionState::Connecting
            } else {
                ConnectionState::Reconnecting
            });
            info!(endpoint = %self.config.endpoint, "Connecting to realtime");

            match connect_async(self.config.socket_url().as_str()).await {
                Ok((socket, _)) => {
                    attempts = 0;
                    self.set_state(ConnectionState::Connected);
                    info!("Realtime connected");
                    if let Exit::Shutdown = self.serve(socket, &mut commands).await {
                        self.set_state(ConnectionState::Closed);
                        info!("Realtime shut down");
                        return;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Realtime connect failed");
                }
            }

            attempts += 1;
            if attempts > self.config.max_reconnect_attempts {
                error!(attempts, "Max realtime reconnect attempts reached");
                self.set_state(ConnectionState::Failed);
                return;
            }
            let delay = self.config.reconnect_delay(attempts);
            info!(attempt = attempts, delay_ms = delay.as_millis() as u64, "Scheduling realtime reconnect");
            if self.wait_or_shutdown(delay, &mut commands).await {
                self.set_state(ConnectionState::Closed);
                return;
            }
        }
    }

    async fn serve<S>(&mut self, socket: S, commands: &mut mpsc::UnboundedReceiver<Command>) -> Exit
    where
        S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
            + Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
            + Unpin,
    {
        let (mut sink, mut stream) = socket.split();

        // Keys joined on this socket; a join queued before connect is not repeated.
        let mut joined: HashSet<String> = HashSet::new();
        let rejoin: Vec<PhoenixMessage> = self
            .registry
            .specs()
            .iter()
            .map(|spec| {
                joined.insert(spec.key.clone());
                self.join_message(spec)
            })
            .collect();
        if !rejoin.is_empty() {
            debug!(channels = rejoin.len(), "Joining registered channels");
        }
        for message in rejoin {
            if let Err(e) = send(&mut sink, &message).await {
                warn!(error = %e, "Realtime join failed");
                return Exit::Dropped;
            }
        }

        let mut heartbeat = interval(self.config.heartbeat_interval);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                command = commands.recv() => {
                    let outgoing = match command {
                        Some(Command::Join(spec)) if joined.insert(spec.key.clone()) => {
                            vec![self.join_message(&spec)]
                        }
                        Some(Command::Join(_)) => Vec::new(),
                        Some(Command::Leave(key)) if joined.remove(&key) => {
                            let reference = self.reference();
                            vec![PhoenixMessage::leave(&key, reference)]
                        }
                        Some(Command::Leave(_)) => Vec::new(),
                        Some(Command::AccessToken(token)) => {
                            self.access_token = token;
                            self.registry
                                .specs()
                                .iter()
                                .map(|spec| {
                                    let reference = self.reference();
                                    PhoenixMessage::access_token(
                                        &spec.key,
                                        self.access_token.as_deref(),
                                        reference,
                                    )
                                })
                                .collect()
                        }
                        Some(Command::Shutdown) | None => {
                            let _ = sink.close().await;
                            return Exit::Shutdown;
                        }
                    };
                    for message in outgoing {
                        if let Err(e) = send(&mut sink, &message).await {
                            warn!(error = %e, "Realtime send failed");
                            return Exit::Dropped;
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    let message = PhoenixMessage::heartbeat(self.reference());
                    if let Err(e) = send(&mut sink, &message).await {
                        warn!(error = %e, "Realtime heartbeat failed");
                        return Exit::Dropped;
                    }
                }
                incoming = stream.next() => match incoming {
                    Some(Ok(Message::Text(text))) => self.handle_text(&text),
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Realtime connection closed");
                        self.set_state(ConnectionState::Reconnecting);
                        return Exit::Dropped;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!(error = %e, "Realtime websocket error");
                        self.set_state(ConnectionState::Reconnecting);
                        return Exit::Dropped;
                    }
                },
            }
        }
    }

    fn handle_text(&self, text: &str) {
        match protocol::decode_incoming(text) {
            Ok(Incoming::Change { key, event }) => {
                if !self.registry.dispatch_to(&key, &event) {
                    debug!(key = %key, "Change for released channel");
                }
            }
            Ok(Incoming::Reply {
                topic,
                ok: false,
                response,
            }) => {
                warn!(topic = %topic, response = %response, "Realtime request rejected");
            }
            Ok(Incoming::ChannelDown { topic, event }) => {
                warn!(topic = %topic, event = %event, "Realtime channel down");
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "Failed to parse realtime message");
            }
        }
    }

    /// Returns true when shutdown was requested while waiting.
    async fn wait_or_shutdown(
        &mut self,
        delay: Duration,
        commands: &mut mpsc::UnboundedReceiver<Command>,
    ) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return false,
                command = commands.recv() => match command {
                    Some(Command::AccessToken(token)) => self.access_token = token,
                    Some(Command::Shutdown) | None => return true,
                    // Registry changes are picked up on rejoin.
                    Some(Command::Join(_)) | Some(Command::Leave(_)) => {}
                },
            }
        }
    }

    fn join_message(&mut self, spec: &ChannelSpec) -> PhoenixMessage {
        let reference = self.reference();
        PhoenixMessage::join(spec, self.access_token.as_deref(), reference)
    }

    fn reference(&mut self) -> String {
        self.next_ref += 1;
        self.next_ref.to_string()
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }
}

async fn send<S>(sink: &mut S, message: &PhoenixMessage) -> RealtimeResult<()>
where
    S: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let json = message.to_json()?;
    sink.send(Message::Text(json.into())).await?;
    Ok(())
}
