//! WebSocket adapter for the realtime change feed.
//!
//! Each subscription runs its own socket task. The task joins the channel,
//! keeps the connection alive with heartbeats, forwards decoded frames as
//! [`ChannelMessage`]s, and obeys resubscribe/unsubscribe commands from the
//! [`ChannelHandle`].

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep_until, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::services::backend::{AuthService, ChannelHandle, RealtimeChannel, RealtimeService};
use crate::services::realtime_protocol::{self, Inbound, PhoenixMessage};
use crate::types::errors::SubscriptionError;
use crate::types::realtime::{ChannelMessage, ChannelStatus, SubscriptionRequest};
use crate::types::settings::AppConfig;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum Command {
    Resubscribe,
    Unsubscribe,
}

struct SocketHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl ChannelHandle for SocketHandle {
    fn resubscribe(&self) {
        let _ = self.commands.send(Command::Resubscribe);
    }

    fn unsubscribe(&self) {
        let _ = self.commands.send(Command::Unsubscribe);
    }
}

/// Realtime service backed by one WebSocket per channel.
pub struct RealtimeSocket {
    config: AppConfig,
    auth: Arc<dyn AuthService>,
}

impl RealtimeSocket {
    pub fn new(config: AppConfig, auth: Arc<dyn AuthService>) -> Self {
        Self { config, auth }
    }
}

impl RealtimeService for RealtimeSocket {
    fn subscribe(&self, request: SubscriptionRequest) -> Result<RealtimeChannel, SubscriptionError> {
        if !self.config.backend.is_configured() {
            return Err(SubscriptionError::Transport("backend is not configured".to_string()));
        }
        let url = realtime_protocol::socket_url(
            &self.config.backend.url,
            &self.config.backend.anon_key,
            self.config.realtime.events_per_second,
        )?;
        let (messages_tx, messages) = mpsc::unbounded_channel();
        let (commands, commands_rx) = mpsc::unbounded_channel();

        let task = ChannelTask {
            url,
            topic: request.topic(),
            request,
            auth: Arc::clone(&self.auth),
            out: messages_tx,
            join_timeout: Duration::from_millis(self.config.realtime.join_timeout_ms),
            heartbeat: Duration::from_millis(self.config.realtime.heartbeat_interval_ms),
            next_ref: 0,
        };
        tokio::spawn(task.run(commands_rx));

        Ok(RealtimeChannel {
            messages,
            handle: Box::new(SocketHandle { commands }),
        })
    }
}

struct ChannelTask {
    url: Url,
    topic: String,
    request: SubscriptionRequest,
    auth: Arc<dyn AuthService>,
    out: mpsc::UnboundedSender<ChannelMessage>,
    join_timeout: Duration,
    heartbeat: Duration,
    next_ref: u64,
}

impl ChannelTask {
    fn emit(&self, message: ChannelMessage) {
        let _ = self.out.send(message);
    }

    fn reference(&mut self) -> String {
        self.next_ref += 1;
        self.next_ref.to_string()
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        self.emit(ChannelMessage::Status(ChannelStatus::Connecting));
        let mut socket: Option<Socket> = None;
        let mut pending_join: Option<(String, Instant)> = None;
        self.connect_and_join(&mut socket, &mut pending_join).await;

        let mut heartbeat = interval_at(Instant::now() + self.heartbeat, self.heartbeat);

        loop {
            let deadline = pending_join.as_ref().map(|(_, at)| *at);
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Resubscribe) => {
                        self.connect_and_join(&mut socket, &mut pending_join).await;
                    }
                    Some(Command::Unsubscribe) | None => {
                        self.leave(&mut socket).await;
                        return;
                    }
                },
                frame = next_frame(&mut socket) => match frame {
                    Some(Ok(Message::Text(text))) => {
                        self.on_text(text.as_str(), &mut pending_join);
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::warn!("realtime socket closed by server");
                        socket = None;
                        pending_join = None;
                        self.emit(ChannelMessage::Status(ChannelStatus::TimedOut));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "realtime socket read failed");
                        socket = None;
                        pending_join = None;
                        self.emit(ChannelMessage::Status(ChannelStatus::TimedOut));
                    }
                },
                _ = heartbeat.tick() => {
                    let frame = PhoenixMessage::heartbeat(&self.reference());
                    if let Some(ws) = socket.as_mut() {
                        if let Err(e) = send_frame(ws, &frame).await {
                            tracing::warn!(error = %e, "heartbeat failed");
                        }
                    }
                },
                _ = sleep_until_opt(deadline) => {
                    tracing::warn!(topic = %self.topic, "no join reply before timeout");
                    pending_join = None;
                    self.emit(ChannelMessage::Status(ChannelStatus::TimedOut));
                },
            }
        }
    }

    /// Connects if needed, then sends a join frame and arms the join timer.
    async fn connect_and_join(
        &mut self,
        socket: &mut Option<Socket>,
        pending_join: &mut Option<(String, Instant)>,
    ) {
        if socket.is_none() {
            match connect_async(self.url.as_str()).await {
                Ok((ws, _)) => *socket = Some(ws),
                Err(e) => {
                    tracing::warn!(error = %e, "realtime socket connect failed");
                    *pending_join = None;
                    self.emit(ChannelMessage::Status(ChannelStatus::TimedOut));
                    return;
                }
            }
        }

        let token = match self.auth.current_session().await {
            Ok(Some(session)) => Some(session.access_token.clone()),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "joining realtime without a user token");
                None
            }
        };
        let reference = self.reference();
        let frame = PhoenixMessage::join(&self.request, token.as_deref(), &reference);
        let Some(ws) = socket.as_mut() else {
            return;
        };
        match send_frame(ws, &frame).await {
            Ok(()) => *pending_join = Some((reference, Instant::now() + self.join_timeout)),
            Err(e) => {
                tracing::warn!(error = %e, "failed to send join");
                *socket = None;
                *pending_join = None;
                self.emit(ChannelMessage::Status(ChannelStatus::TimedOut));
            }
        }
    }

    fn on_text(&self, text: &str, pending_join: &mut Option<(String, Instant)>) {
        let frame = match PhoenixMessage::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring realtime frame");
                return;
            }
        };
        match realtime_protocol::classify(&self.topic, &frame) {
            Inbound::Reply { reference, ok, reason } => {
                if pending_join.as_ref().map(|(r, _)| r) != Some(&reference) {
                    return;
                }
                *pending_join = None;
                if ok {
                    self.emit(ChannelMessage::Status(ChannelStatus::Subscribed));
                } else {
                    tracing::error!(reason = ?reason, "realtime join rejected");
                    self.emit(ChannelMessage::Status(ChannelStatus::ChannelError));
                }
            }
            Inbound::Change(event) => self.emit(ChannelMessage::Change(event)),
            Inbound::Status(status) => self.emit(ChannelMessage::Status(status)),
            Inbound::Ignored => {}
        }
    }

    async fn leave(&mut self, socket: &mut Option<Socket>) {
        if let Some(mut ws) = socket.take() {
            let reference = self.reference();
            let frame = PhoenixMessage::leave(&self.topic, &reference);
            if let Err(e) = send_frame(&mut ws, &frame).await {
                tracing::debug!(error = %e, "leave frame not delivered");
            }
            let _ = ws.close(None).await;
        }
        self.emit(ChannelMessage::Status(ChannelStatus::Closed));
    }
}

async fn send_frame(ws: &mut Socket, frame: &PhoenixMessage) -> Result<(), SubscriptionError> {
    let text = frame.encode()?;
    ws.send(Message::text(text))
        .await
        .map_err(|e| SubscriptionError::Transport(e.to_string()))
}

async fn next_frame(
    socket: &mut Option<Socket>,
) -> Option<Result<Message, tokio_tungstenite::tungstenite::Error>> {
    match socket.as_mut() {
        Some(ws) => ws.next().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
