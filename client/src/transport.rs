use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tower_common::protocol::{Envelope, Operation};
use tracing::{debug, info, warn};

use crate::{GameError, Result};

/// Callback invoked with an incoming frame for the operation it was
/// registered under.
///
/// Persistent handlers ignore the return value. A one-shot handler returns
/// `true` once it has consumed a frame and is then removed; returning `false`
/// leaves it registered for the next frame of that operation.
pub type Handler = Box<dyn FnMut(&Envelope) -> bool + Send>;

/// Socket surface the round logic is written against.
pub trait Transport: Send + Sync {
    fn send(&self, envelope: Envelope) -> std::result::Result<(), GameError>;

    /// Register a persistent handler, replacing any previous one for `operation`.
    fn on(&self, operation: Operation, handler: Handler);

    /// Register a one-shot handler, replacing any pending one for `operation`.
    fn once(&self, operation: Operation, handler: Handler);

    /// Drop every handler registered for `operation`.
    fn off(&self, operation: Operation);

    fn is_connected(&self) -> bool;
}

/// Handler table shared between a transport and its reader task.
///
/// No lock is held while a handler runs, so handlers may register or remove
/// other handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    persistent: Mutex<HashMap<Operation, Handler>>,
    one_shot: Mutex<HashMap<Operation, Handler>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, operation: Operation, handler: Handler) {
        if lock(&self.persistent).insert(operation, handler).is_some() {
            debug!("Replaced persistent handler for {}", operation);
        }
    }

    pub fn once(&self, operation: Operation, handler: Handler) {
        if lock(&self.one_shot).insert(operation, handler).is_some() {
            debug!("Replaced pending one-shot handler for {}", operation);
        }
    }

    pub fn off(&self, operation: Operation) {
        lock(&self.persistent).remove(&operation);
        lock(&self.one_shot).remove(&operation);
    }

    /// Remove every handler. Pending one-shot handlers are dropped unanswered.
    pub fn clear(&self) {
        lock(&self.persistent).clear();
        lock(&self.one_shot).clear();
    }

    pub fn has_handler(&self, operation: Operation) -> bool {
        lock(&self.persistent).contains_key(&operation)
            || lock(&self.one_shot).contains_key(&operation)
    }

    /// Deliver a frame. Returns `false` when nothing consumed it.
    pub fn dispatch(&self, envelope: &Envelope) -> bool {
        let operation = envelope.operation;
        let mut delivered = false;

        let one_shot = lock(&self.one_shot).remove(&operation);
        if let Some(mut handler) = one_shot {
            if handler(envelope) {
                delivered = true;
            } else {
                // Not for this handler; put it back unless it was replaced meanwhile.
                lock(&self.one_shot).entry(operation).or_insert(handler);
            }
        }

        let persistent = lock(&self.persistent).remove(&operation);
        if let Some(mut handler) = persistent {
            handler(envelope);
            delivered = true;
            lock(&self.persistent).entry(operation).or_insert(handler);
        }

        if !delivered {
            debug!(
                "Dropping {} frame (request {:?}): no handler waiting",
                operation, envelope.request_id
            );
        }
        delivered
    }
}

/// [`Transport`] over a websocket connection to the game server.
pub struct SocketTransport {
    sender: Mutex<Option<mpsc::UnboundedSender<Envelope>>>,
    handlers: Arc<HandlerRegistry>,
    connected: Arc<AtomicBool>,
    writer_task: Mutex<Option<JoinHandle<()>>>,
    reader_task: JoinHandle<()>,
}

impl SocketTransport {
    /// Connect to the game socket and start the reader and writer tasks.
    pub async fn connect(url: &str) -> Result<Self> {
        info!("Connecting to WebSocket: {}", url);

        let (ws_stream, _) = connect_async(url).await?;
        info!("WebSocket connected successfully");

        let (mut writer, mut reader) = ws_stream.split();
        let (sender, mut receiver) = mpsc::unbounded_channel::<Envelope>();
        let handlers = Arc::new(HandlerRegistry::new());
        let connected = Arc::new(AtomicBool::new(true));

        let writer_connected = connected.clone();
        let writer_task = tokio::spawn(async move {
            while let Some(envelope) = receiver.recv().await {
                let json = match serde_json::to_string(&envelope) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("Failed to serialize {} frame: {}", envelope.operation, e);
                        continue;
                    }
                };

                debug!("Sending frame: {}", json);
                if let Err(e) = writer.send(Message::Text(json.into())).await {
                    warn!("Failed to send WebSocket message: {}", e);
                    writer_connected.store(false, Ordering::SeqCst);
                    break;
                }
            }

            let _ = writer.close().await;
        });

        let reader_handlers = handlers.clone();
        let reader_connected = connected.clone();
        let reader_task = tokio::spawn(async move {
            while let Some(message) = reader.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        debug!("Received frame: {}", text);
                        match serde_json::from_str::<Envelope>(&text) {
                            Ok(envelope) => {
                                reader_handlers.dispatch(&envelope);
                            }
                            Err(e) => warn!("Ignoring malformed frame: {}", e),
                        }
                    }
                    Ok(Message::Close(_)) => {
                        info!("WebSocket connection closed");
                        break;
                    }
                    Ok(_) => {
                        // Ignore ping/pong and binary messages
                    }
                    Err(e) => {
                        warn!("Error receiving WebSocket message: {}", e);
                        break;
                    }
                }
            }

            reader_connected.store(false, Ordering::SeqCst);
            // Pending requests see their channel close and fail as disconnected.
            reader_handlers.clear();
        });

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            handlers,
            connected,
            writer_task: Mutex::new(Some(writer_task)),
            reader_task,
        })
    }

    /// Close the connection and wait for the writer to flush. Later calls
    /// are no-ops.
    pub async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.handlers.clear();
        self.reader_task.abort();

        // Dropping the sender lets the writer task finish and close the socket
        lock(&self.sender).take();
        let writer_task = lock(&self.writer_task).take();
        if let Some(writer_task) = writer_task {
            let _ = writer_task.await;
            info!("WebSocket transport closed");
        }
    }
}

impl Transport for SocketTransport {
    fn send(&self, envelope: Envelope) -> std::result::Result<(), GameError> {
        if !self.is_connected() {
            return Err(GameError::Disconnected);
        }
        match lock(&self.sender).as_ref() {
            Some(sender) => sender
                .send(envelope)
                .map_err(|_| GameError::Send("WebSocket sender channel closed".to_string())),
            None => Err(GameError::Disconnected),
        }
    }

    fn on(&self, operation: Operation, handler: Handler) {
        self.handlers.on(operation, handler);
    }

    fn once(&self, operation: Operation, handler: Handler) {
        self.handlers.once(operation, handler);
    }

    fn off(&self, operation: Operation) {
        self.handlers.off(operation);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn frame(operation: Operation, request_id: Option<u64>) -> Envelope {
        Envelope {
            operation,
            request_id,
            data: serde_json::json!({ "status": "200 OK" }),
        }
    }

    #[test]
    fn one_shot_handler_fires_once() {
        let registry = HandlerRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        registry.once(
            Operation::GetBalance,
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            }),
        );

        assert!(registry.dispatch(&frame(Operation::GetBalance, None)));
        assert!(!registry.dispatch(&frame(Operation::GetBalance, None)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!registry.has_handler(Operation::GetBalance));
    }

    #[test]
    fn declined_frame_keeps_one_shot_handler() {
        let registry = HandlerRegistry::new();
        registry.once(
            Operation::Select,
            Box::new(|frame| frame.request_id == Some(7)),
        );

        assert!(!registry.dispatch(&frame(Operation::Select, Some(6))));
        assert!(registry.has_handler(Operation::Select));
        assert!(registry.dispatch(&frame(Operation::Select, Some(7))));
        assert!(!registry.has_handler(Operation::Select));
    }

    #[test]
    fn persistent_handler_survives_and_off_removes_it() {
        let registry = HandlerRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        registry.on(
            Operation::GetBalance,
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                false
            }),
        );

        registry.dispatch(&frame(Operation::GetBalance, None));
        registry.dispatch(&frame(Operation::GetBalance, None));
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        registry.off(Operation::GetBalance);
        assert!(!registry.dispatch(&frame(Operation::GetBalance, None)));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn frames_for_other_operations_are_dropped() {
        let registry = HandlerRegistry::new();
        registry.once(Operation::PlaceBet, Box::new(|_| true));
        assert!(!registry.dispatch(&frame(Operation::Select, None)));
        assert!(registry.has_handler(Operation::PlaceBet));
    }
}
