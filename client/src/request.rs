use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tower_common::protocol::{Envelope, Operation, StatusResponse};
use tracing::{debug, warn};

use crate::{GameError, Transport};

/// Typed request/response layer over a [`Transport`].
///
/// Each request gets a locally generated id folded into the envelope and a
/// single one-shot slot for its operation. Responses carrying another id are
/// left alone, and on timeout the slot is cleared so a late response finds
/// nobody waiting and is dropped.
pub struct RequestClient {
    transport: Arc<dyn Transport>,
    next_id: AtomicU64,
    timeout: Duration,
}

impl RequestClient {
    pub fn new(transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self {
            transport,
            next_id: AtomicU64::new(1),
            timeout,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub async fn request<Req, Resp>(&self, operation: Operation, payload: &Req) -> Result<Resp, GameError>
    where
        Req: Serialize,
        Resp: DeserializeOwned + Send + 'static,
    {
        self.request_matching(operation, payload, |_: &Resp| true)
            .await
    }

    /// Send a request and wait for the first response that `accept` agrees
    /// belongs to it. Operations multiplexing several request kinds use
    /// `accept` to check the echoed request kind.
    pub async fn request_matching<Req, Resp, F>(
        &self,
        operation: Operation,
        payload: &Req,
        accept: F,
    ) -> Result<Resp, GameError>
    where
        Req: Serialize,
        Resp: DeserializeOwned + Send + 'static,
        F: Fn(&Resp) -> bool + Send + 'static,
    {
        if !self.transport.is_connected() {
            warn!("Cannot send {}: socket not connected", operation);
            return Err(GameError::Disconnected);
        }

        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = Envelope::new(operation, Some(request_id), payload)
            .map_err(|e| GameError::Send(e.to_string()))?;

        let (tx, rx) = oneshot::channel::<Result<Resp, GameError>>();
        let mut tx = Some(tx);
        self.transport.once(
            operation,
            Box::new(move |frame: &Envelope| {
                if frame.request_id.is_some_and(|id| id != request_id) {
                    debug!(
                        "Ignoring {} response for request {:?}, waiting for {}",
                        operation, frame.request_id, request_id
                    );
                    return false;
                }

                let result = match serde_json::from_value::<Resp>(frame.data.clone()) {
                    Ok(response) if !accept(&response) => {
                        debug!("Ignoring {} response meant for another request", operation);
                        return false;
                    }
                    Ok(response) => Ok(response),
                    Err(e) => Err(GameError::InvalidResponse {
                        operation,
                        reason: e.to_string(),
                    }),
                };

                if let Some(tx) = tx.take() {
                    let _ = tx.send(result);
                }
                true
            }),
        );

        debug!("Sending {} request {}", operation, request_id);
        if let Err(e) = self.transport.send(envelope) {
            self.transport.off(operation);
            return Err(e);
        }

        match timeout(self.timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                warn!("{} request {} dropped before a response arrived", operation, request_id);
                Err(GameError::Disconnected)
            }
            Err(_) => {
                self.transport.off(operation);
                warn!(
                    "{} request {} timed out after {:?}",
                    operation, request_id, self.timeout
                );
                Err(GameError::Timeout { operation })
            }
        }
    }
}

/// Turn a non-success status into [`GameError::ServerRejected`].
pub(crate) fn ensure_ok<R: StatusResponse>(operation: Operation, response: R) -> Result<R, GameError> {
    if response.is_ok() {
        Ok(response)
    } else {
        warn!("{} failed with status {:?}", operation, response.status());
        Err(GameError::ServerRejected {
            operation,
            status: response.status().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::ScriptedTransport;
    use serde_json::json;
    use tower_common::protocol::{BalanceResponse, GetBalanceRequest};

    fn client(transport: &Arc<ScriptedTransport>) -> RequestClient {
        RequestClient::new(transport.clone(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn request_resolves_with_scripted_reply() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.reply(Operation::GetBalance, json!({ "status": "200 OK", "balance": 42.5 }));

        let response: BalanceResponse = client(&transport)
            .request(Operation::GetBalance, &GetBalanceRequest {})
            .await
            .unwrap();

        assert_eq!(response.balance, Some(42.5));
        assert_eq!(transport.sent_operations(), vec![Operation::GetBalance]);
    }

    #[tokio::test]
    async fn disconnected_transport_sends_nothing() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.set_connected(false);

        let result: Result<BalanceResponse, _> = client(&transport)
            .request(Operation::GetBalance, &GetBalanceRequest {})
            .await;

        assert_eq!(result, Err(GameError::Disconnected));
        assert!(transport.sent_operations().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_deregisters_handler_and_drops_late_reply() {
        let transport = Arc::new(ScriptedTransport::new());

        let result: Result<BalanceResponse, _> = client(&transport)
            .request(Operation::GetBalance, &GetBalanceRequest {})
            .await;

        assert_eq!(
            result,
            Err(GameError::Timeout {
                operation: Operation::GetBalance
            })
        );
        assert!(!transport.has_handler(Operation::GetBalance));

        let request_id = transport.last_request_id();
        assert!(!transport.deliver(Operation::GetBalance, request_id, json!({ "status": "200 OK", "balance": 1.0 })));
    }

    #[tokio::test]
    async fn reply_for_another_request_id_is_ignored() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.reply_with_id(Operation::GetBalance, Some(999), json!({ "status": "200 OK", "balance": 1.0 }));
        transport.reply(Operation::GetBalance, json!({ "status": "200 OK", "balance": 2.0 }));

        let response: BalanceResponse = client(&transport)
            .request(Operation::GetBalance, &GetBalanceRequest {})
            .await
            .unwrap();

        assert_eq!(response.balance, Some(2.0));
    }

    #[tokio::test]
    async fn malformed_reply_is_invalid_response() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.reply(Operation::GetBalance, json!({ "status": 200 }));

        let result: Result<BalanceResponse, _> = client(&transport)
            .request(Operation::GetBalance, &GetBalanceRequest {})
            .await;

        assert!(matches!(result, Err(GameError::InvalidResponse { .. })));
    }

    #[test]
    fn ensure_ok_forwards_status() {
        let response = BalanceResponse {
            status: "500".into(),
            balance: None,
        };
        assert_eq!(
            ensure_ok(Operation::GetBalance, response),
            Err(GameError::ServerRejected {
                operation: Operation::GetBalance,
                status: "500".into()
            })
        );
    }
}
