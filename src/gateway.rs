// Observer push gateway
// Fan-out of serialized state snapshots, best-effort per observer

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use log::{info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{sleep, Duration};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use uuid::Uuid;

/// Registry of connected observers. A send failure only drops the failing
/// observer; it never blocks delivery to the others or the tick path.
#[derive(Clone, Default)]
pub struct BroadcastSink {
    observers: Arc<RwLock<HashMap<Uuid, mpsc::UnboundedSender<String>>>>,
}

impl BroadcastSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self) -> (Uuid, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        self.observers.write().await.insert(id, tx);
        (id, rx)
    }

    pub async fn deregister(&self, id: Uuid) {
        self.observers.write().await.remove(&id);
    }

    pub async fn observer_count(&self) -> usize {
        self.observers.read().await.len()
    }

    /// Serialize once, deliver to every observer. Each send is independent;
    /// observers whose channel is gone are dropped afterwards.
    pub async fn broadcast<T: serde::Serialize>(&self, message: &T) -> Result<()> {
        let payload = serde_json::to_string(message)?;
        let mut dead: Vec<Uuid> = Vec::new();
        {
            let observers = self.observers.read().await;
            for (id, tx) in observers.iter() {
                if tx.send(payload.clone()).is_err() {
                    dead.push(*id);
                }
            }
        }
        if !dead.is_empty() {
            let mut observers = self.observers.write().await;
            for id in dead {
                observers.remove(&id);
                warn!("GATEWAY: dropped unreachable observer {id}");
            }
        }
        Ok(())
    }
}

/// Bind the push websocket and serve it forever. Only the bind itself is
/// fatal; everything after that is handled inside the accept loop.
pub async fn run_gateway(sink: BroadcastSink, bind_addr: String) -> Result<()> {
    let listener = TcpListener::bind(&bind_addr).await?;
    info!("GATEWAY: listening on ws://{bind_addr}");
    serve(listener, sink).await
}

/// Accept loop for the push websocket. Each connection registers an observer,
/// forwards queued snapshots to the socket and deregisters on close or error.
/// Inbound frames are drained and ignored. A failed accept (e.g. fd pressure)
/// is logged and the loop keeps accepting; it never propagates out and takes
/// the gateway task down with it.
pub async fn serve(listener: TcpListener, sink: BroadcastSink) -> Result<()> {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(err) => {
                warn!("GATEWAY: accept failed: {err}");
                sleep(Duration::from_millis(100)).await;
                continue;
            }
        };
        let sink = sink.clone();
        tokio::spawn(async move {
            let ws = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(err) => {
                    warn!("GATEWAY: handshake with {peer} failed: {err:?}");
                    return;
                }
            };
            info!("GATEWAY: observer connected from {peer}");
            let (id, mut rx) = sink.register().await;
            let (mut write, mut read) = ws.split();

            loop {
                tokio::select! {
                    queued = rx.recv() => {
                        match queued {
                            Some(payload) => {
                                if write.send(Message::Text(payload)).await.is_err() {
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                    inbound = read.next() => {
                        match inbound {
                            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                            // Observers have nothing to say; drain and ignore.
                            Some(Ok(_)) => {}
                        }
                    }
                }
            }

            sink.deregister(id).await;
            info!("GATEWAY: observer {peer} disconnected");
        });
    }
}
