//! The tokio driver against an in-process WebSocket server.
#![cfg(not(target_arch = "wasm32"))]

use std::time::Duration;

use futures_channel::mpsc::UnboundedReceiver;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use wschat_client::ws::spawn_chat;
use wschat_client::{ChatClient, ChatEvent, ClientConfig, ConnectionState, StoreChange};

async fn next_event(events: &mut UnboundedReceiver<ChatEvent>) -> ChatEvent {
    tokio::time::timeout(Duration::from_secs(5), events.next())
        .await
        .expect("timed out waiting for an event")
        .expect("event stream ended")
}

async fn wait_for(
    events: &mut UnboundedReceiver<ChatEvent>,
    mut pred: impl FnMut(&ChatEvent) -> bool,
) -> ChatEvent {
    loop {
        let event = next_event(events).await;
        if pred(&event) {
            return event;
        }
    }
}

fn config_for(addr: std::net::SocketAddr) -> ClientConfig {
    let mut config = ClientConfig::default();
    config.origin = format!("http://{addr}");
    config.reconnect.base_delay = Duration::from_millis(50);
    config.persist = false;
    config
}

#[tokio::test]
async fn round_trip_through_a_live_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        ws.send(Message::Text(
            r#"{"type":"init","connection_id":"abc","history":[]}"#.into(),
        ))
        .await
        .unwrap();

        while let Some(Ok(frame)) = ws.next().await {
            if let Message::Text(text) = frame {
                let sent: serde_json::Value = serde_json::from_str(&text).unwrap();
                assert_eq!(sent["type"], "message");
                let echo = serde_json::json!({
                    "type": "message",
                    "text": sent["text"],
                    "connection_id": "abc",
                    "user_message_number": 1,
                    "created_at": "2024-05-01T10:00:00Z",
                });
                ws.send(Message::Text(echo.to_string().into())).await.unwrap();
            }
        }
    });

    let client = ChatClient::new(&config_for(addr), None).unwrap();
    let (handle, mut events, task) = spawn_chat(client, Duration::from_secs(5));

    assert_eq!(
        next_event(&mut events).await,
        ChatEvent::Status(ConnectionState::Connecting)
    );
    assert_eq!(
        next_event(&mut events).await,
        ChatEvent::Status(ConnectionState::Open)
    );
    assert_eq!(
        next_event(&mut events).await,
        ChatEvent::IdentityAssigned("abc".into())
    );

    handle.send_message("hello").unwrap();
    let event = wait_for(&mut events, |e| matches!(e, ChatEvent::Messages { .. })).await;
    let ChatEvent::Messages { change, log } = event else {
        unreachable!()
    };
    assert_eq!(change, StoreChange::Inserted { index: 0 });
    assert_eq!(log[0].message.text, "hello");
    assert!(log[0].own);

    handle.shutdown().unwrap();
    let client = task.await.unwrap();
    assert_eq!(client.snapshot().len(), 1);
    server.await.unwrap();
}

#[tokio::test]
async fn unreachable_server_exhausts_the_budget() {
    // Bind then drop to get a port nothing listens on.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let mut config = config_for(addr);
    config.reconnect.max_attempts = 2;

    let client = ChatClient::new(&config, None).unwrap();
    let (handle, mut events, task) = spawn_chat(client, Duration::from_secs(2));

    let mut statuses = Vec::new();
    loop {
        if let ChatEvent::Status(state) = next_event(&mut events).await {
            statuses.push(state);
            if state.is_terminal() {
                break;
            }
        }
    }
    assert_eq!(
        statuses,
        vec![
            ConnectionState::Connecting,
            ConnectionState::Closed,
            ConnectionState::Connecting,
            ConnectionState::Closed,
            ConnectionState::Connecting,
            ConnectionState::Closed,
            ConnectionState::Failed,
        ]
    );

    handle.shutdown().unwrap();
    let client = task.await.unwrap();
    assert_eq!(client.state(), ConnectionState::Failed);
}

#[tokio::test]
async fn stalled_handshake_does_not_block_commands() {
    // Accepts TCP but never answers the WebSocket upgrade.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        drop(stream);
    });

    let client = ChatClient::new(&config_for(addr), None).unwrap();
    let (handle, mut events, task) = spawn_chat(client, Duration::from_secs(5));
    assert_eq!(
        next_event(&mut events).await,
        ChatEvent::Status(ConnectionState::Connecting)
    );

    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.send_message("hi").unwrap();
    let notice = tokio::time::timeout(
        Duration::from_secs(1),
        wait_for(&mut events, |e| matches!(e, ChatEvent::NoticeShown(_))),
    )
    .await
    .expect("send was not handled while connecting");
    let ChatEvent::NoticeShown(notice) = notice else {
        unreachable!()
    };
    assert_eq!(notice.text, "Not connected to the server");

    handle.shutdown().unwrap();
    let client = tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("shutdown waited for the handshake")
        .unwrap();
    assert_eq!(client.state(), ConnectionState::Connecting);
    server.abort();
}
