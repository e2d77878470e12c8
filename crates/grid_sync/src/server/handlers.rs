//! Connection handling logic for WebSocket clients.
//!
//! This module contains the connection handling logic that manages the
//! lifecycle of individual client connections, including WebSocket
//! handshaking, message processing, and cleanup.

use crate::{
    engine::{Engine, GameEvent, Outcome},
    error::ServerError,
    messaging::route_client_message,
    security::RateLimiter,
};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, trace, warn};

/// Handles a single client connection from establishment to cleanup.
///
/// # Connection Flow
///
/// 1. Perform WebSocket handshake
/// 2. Allocate a connection ID and attach its outbox to the engine
/// 3. Start message handling tasks (incoming and outgoing)
/// 4. Handle connection termination
/// 5. Raise the disconnect event and drop the rate limit bucket
///
/// # Message Handling
///
/// Two tasks run concurrently:
///
/// * **Incoming Task**: Receives frames from the client and routes them to the engine
/// * **Outgoing Task**: Drains the connection's outbox into the socket
///
/// These tasks run until the connection is closed or an error occurs.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    engine: Arc<Engine>,
    rate_limiter: Arc<RateLimiter>,
    max_message_size: usize,
) -> Result<(), ServerError> {
    // Perform WebSocket handshake
    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| ServerError::Network(format!("WebSocket handshake failed: {e}")))?;

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (outbox, mut inbox) = mpsc::unbounded_channel();
    let (pong_sender, mut pong_receiver) = mpsc::unbounded_channel();

    let connection_id = engine.allocate_connection_id();
    engine
        .process(GameEvent::Connect {
            connection_id,
            outbox,
        })
        .await;
    debug!("🔗 Connection {} opened from {}", connection_id, addr);

    // Incoming message task - routes raw frames to the engine
    let incoming_task = {
        let engine = engine.clone();
        let rate_limiter = rate_limiter.clone();

        async move {
            while let Some(msg) = ws_receiver.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if !rate_limiter.check_rate_limit(connection_id).await {
                            trace!("⏱️ Frame from connection {} rate limited", connection_id);
                            continue;
                        }
                        match route_client_message(&text, connection_id, max_message_size, &engine)
                            .await
                        {
                            Ok(Outcome::Applied) => {}
                            Ok(Outcome::Dropped(reason)) => {
                                trace!("Frame from connection {} dropped: {:?}", connection_id, reason);
                            }
                            Err(e) => {
                                warn!("❌ Rejected frame from connection {}: {}", connection_id, e);
                            }
                        }
                    }
                    Ok(Message::Close(_)) => {
                        debug!("🔌 Client {} requested close", connection_id);
                        break;
                    }
                    Ok(Message::Ping(data)) => {
                        let _ = pong_sender.send(data);
                    }
                    Err(e) => {
                        error!("WebSocket error for connection {}: {}", connection_id, e);
                        break;
                    }
                    _ => {}
                }
            }
        }
    };

    // Outgoing message task
    let outgoing_task = async move {
        loop {
            let frame = tokio::select! {
                message = inbox.recv() => match message {
                    Some(message) => match serde_json::to_string(message.as_ref()) {
                        Ok(text) => Message::Text(text.into()),
                        Err(e) => {
                            error!("Failed to serialize {}: {}", message.event_name(), e);
                            continue;
                        }
                    },
                    None => break,
                },
                pong = pong_receiver.recv() => match pong {
                    Some(data) => Message::Pong(data),
                    None => break,
                },
            };
            if let Err(e) = ws_sender.send(frame).await {
                debug!("Failed to send message to connection {}: {}", connection_id, e);
                break;
            }
        }
    };

    // Run both tasks concurrently until one completes
    tokio::select! {
        _ = incoming_task => {},
        _ = outgoing_task => {},
    }

    engine
        .process(GameEvent::Disconnect { connection_id })
        .await;
    rate_limiter.forget(connection_id).await;
    debug!("🔌 Connection {} from {} closed", connection_id, addr);
    Ok(())
}
