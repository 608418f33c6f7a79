//! Native/Desktop driver using tokio-tungstenite.
//!
//! One task owns the [`ChatClient`] and the socket. It executes effects, then
//! waits on whichever comes first: a handshake result, a frame, a timer, or
//! a user command. Nothing in the loop awaits the network directly except
//! sending a frame.

use std::collections::VecDeque;
use std::time::Duration;

use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::future::BoxFuture;
use futures_util::stream::FuturesUnordered;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::events::{ChatEvent, Effect};
use crate::session::ChatClient;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Handshake = BoxFuture<'static, Result<Socket, String>>;

/// Input from the user side of the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    Send(String),
    Reconnect,
    Shutdown,
}

/// Handle for sending commands to a running chat task
#[derive(Debug, Clone)]
pub struct ChatHandle {
    sender: UnboundedSender<UserCommand>,
}

impl ChatHandle {
    fn command(&self, cmd: UserCommand) -> Result<(), String> {
        self.sender
            .unbounded_send(cmd)
            .map_err(|e| format!("Failed to send: {}", e))
    }

    pub fn send_message(&self, text: impl Into<String>) -> Result<(), String> {
        self.command(UserCommand::Send(text.into()))
    }

    pub fn reconnect(&self) -> Result<(), String> {
        self.command(UserCommand::Reconnect)
    }

    pub fn shutdown(&self) -> Result<(), String> {
        self.command(UserCommand::Shutdown)
    }
}

enum Timer {
    Reconnect(u64),
    Notice(u64),
}

/// Spawn the chat loop on the current tokio runtime.
///
/// The join handle yields the client back after shutdown.
pub fn spawn_chat(
    client: ChatClient,
    connect_timeout: Duration,
) -> (ChatHandle, UnboundedReceiver<ChatEvent>, JoinHandle<ChatClient>) {
    let (cmd_tx, cmd_rx) = unbounded();
    let (event_tx, event_rx) = unbounded();
    let task = tokio::spawn(run_chat(client, cmd_rx, event_tx, connect_timeout));
    (ChatHandle { sender: cmd_tx }, event_rx, task)
}

/// Drive `client` until a shutdown command arrives or the command channel closes.
pub async fn run_chat(
    mut client: ChatClient,
    mut commands: UnboundedReceiver<UserCommand>,
    events: UnboundedSender<ChatEvent>,
    connect_timeout: Duration,
) -> ChatClient {
    let mut socket: Option<Socket> = None;
    let mut pending_connect: Option<Handshake> = None;
    let mut timers: FuturesUnordered<BoxFuture<'static, Timer>> = FuturesUnordered::new();
    let mut queue: VecDeque<Effect> = client.start().into();

    loop {
        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::Connect { url } => {
                    socket = None;
                    pending_connect = Some(handshake(url.to_string(), connect_timeout));
                }
                Effect::Transmit { payload } => {
                    let result = match socket.as_mut() {
                        Some(ws) => {
                            crate::log_debug!("Sending: {}", payload);
                            ws.send(Message::Text(payload.into()))
                                .await
                                .map_err(|e| e.to_string())
                        }
                        None => Err("socket is not open".to_string()),
                    };
                    if let Err(detail) = result {
                        queue.extend(client.handle_send_failed(&detail));
                    }
                }
                Effect::ScheduleReconnect { delay, token } => {
                    timers.push(Box::pin(async move {
                        tokio::time::sleep(delay).await;
                        Timer::Reconnect(token)
                    }));
                }
                Effect::ScheduleNoticeExpiry { id, delay } => {
                    timers.push(Box::pin(async move {
                        tokio::time::sleep(delay).await;
                        Timer::Notice(id)
                    }));
                }
                Effect::Emit(event) => {
                    // The receiver may be gone; the chat keeps running headless.
                    let _ = events.unbounded_send(event);
                }
            }
        }

        tokio::select! {
            result = next_handshake(&mut pending_connect) => {
                pending_connect = None;
                match result {
                    Ok(stream) => {
                        socket = Some(stream);
                        queue.extend(client.handle_open());
                    }
                    Err(detail) => {
                        queue.extend(client.handle_transport_error(&detail));
                        queue.extend(client.handle_close(None, &detail));
                    }
                }
            },
            frame = next_frame(&mut socket) => match frame {
                Some(Ok(Message::Text(text))) => {
                    crate::log_debug!("WebSocket received: {}", text.as_str());
                    queue.extend(client.handle_message(&text));
                }
                Some(Ok(Message::Close(frame))) => {
                    socket = None;
                    let (code, reason) = match frame {
                        Some(f) => (Some(u16::from(f.code)), f.reason.as_str().to_string()),
                        None => (None, String::new()),
                    };
                    queue.extend(client.handle_close(code, &reason));
                }
                Some(Ok(_)) => {
                    // Ping/pong are answered by tungstenite; binary frames are not part of the protocol.
                }
                Some(Err(e)) => {
                    socket = None;
                    let detail = e.to_string();
                    queue.extend(client.handle_transport_error(&detail));
                    queue.extend(client.handle_close(None, &detail));
                }
                None => {
                    socket = None;
                    queue.extend(client.handle_close(None, "stream ended"));
                }
            },
            Some(timer) = timers.next(), if !timers.is_empty() => match timer {
                Timer::Reconnect(token) => queue.extend(client.handle_reconnect_timer(token)),
                Timer::Notice(id) => queue.extend(client.handle_notice_expired(id)),
            },
            command = commands.next() => match command {
                Some(UserCommand::Send(text)) => queue.extend(client.submit(&text)),
                Some(UserCommand::Reconnect) => queue.extend(client.reconnect_now()),
                Some(UserCommand::Shutdown) | None => {
                    if let Some(mut ws) = socket.take() {
                        let _ = ws.close(None).await;
                    }
                    crate::log_info!("Chat loop stopped");
                    break;
                }
            },
        }
    }

    client
}

fn handshake(url: String, connect_timeout: Duration) -> Handshake {
    Box::pin(async move {
        match tokio::time::timeout(connect_timeout, connect_async(url)).await {
            Ok(Ok((stream, _response))) => Ok(stream),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err("connection attempt timed out".to_string()),
        }
    })
}

async fn next_handshake(pending: &mut Option<Handshake>) -> Result<Socket, String> {
    match pending.as_mut() {
        Some(handshake) => handshake.await,
        None => std::future::pending().await,
    }
}

async fn next_frame(
    socket: &mut Option<Socket>,
) -> Option<Result<Message, tokio_tungstenite::tungstenite::Error>> {
    match socket.as_mut() {
        Some(ws) => ws.next().await,
        None => std::future::pending().await,
    }
}
