//! Shared test utilities: an in-process websocket peer standing in for the
//! exchange.

#![allow(dead_code)]

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tickwire::models::{ChannelId, FeedType};
use tickwire::websocket::StreamSession;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tungstenite::Message;

/// How long a test waits for any single expected event.
pub const WAIT: Duration = Duration::from_secs(5);

pub const SEND_TIMEOUT: Duration = Duration::from_secs(2);

enum Command {
    Send(String),
    Close,
}

/// A single-connection websocket server on a loopback port.
pub struct MockExchange {
    pub url: String,
    inbound: mpsc::UnboundedReceiver<String>,
    outbound: mpsc::UnboundedSender<Command>,
}

impl MockExchange {
    /// Binds a loopback port and serves the first connection it accepts.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind loopback listener");
        let url = format!("ws://{}", listener.local_addr().expect("no local addr"));
        let (in_tx, inbound) = mpsc::unbounded_channel();
        let (outbound, mut out_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let Ok(ws) = accept_async(stream).await else {
                return;
            };
            let (mut write, mut read) = ws.split();

            loop {
                tokio::select! {
                    msg = read.next() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            let _ = in_tx.send(text.to_string());
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    },
                    cmd = out_rx.recv() => match cmd {
                        Some(Command::Send(text)) => {
                            if write.send(Message::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        Some(Command::Close) | None => {
                            let _ = write.send(Message::Close(None)).await;
                            break;
                        }
                    },
                }
            }
        });

        Self {
            url,
            inbound,
            outbound,
        }
    }

    /// Pushes a raw text frame to the client.
    pub fn push(&self, text: &str) {
        self.outbound
            .send(Command::Send(text.to_string()))
            .expect("mock exchange task is gone");
    }

    /// Closes the connection from the server side.
    pub fn close(&self) {
        let _ = self.outbound.send(Command::Close);
    }

    /// Next frame received from the client, parsed as JSON.
    pub async fn next_request(&mut self) -> serde_json::Value {
        let text = tokio::time::timeout(WAIT, self.inbound.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("mock exchange task is gone");
        serde_json::from_str(&text).expect("client sent invalid JSON")
    }
}

/// A connected session against a fresh [`MockExchange`].
pub async fn connected_session() -> (StreamSession, MockExchange) {
    let exchange = MockExchange::start().await;
    let session = StreamSession::new(exchange.url.clone(), SEND_TIMEOUT);
    session.connect().await.expect("failed to connect to mock exchange");
    (session, exchange)
}

/// Waits until the session has registered a channel for `(symbol, feed)`.
pub async fn wait_for_channel(session: &StreamSession, symbol: &str, feed: FeedType) -> ChannelId {
    tokio::time::timeout(WAIT, async {
        loop {
            if let Some(chan_id) = session.channel_for(symbol, feed) {
                return chan_id;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("acknowledgement was never registered")
}

/// Receives the next item from a listener-fed channel.
pub async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}
