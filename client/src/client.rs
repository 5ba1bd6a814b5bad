use reqwest::Client;
use tower_common::models::CreateSessionResponse;
use tracing::info;
use url::Url;

use crate::Result;

/// HTTP client for the session endpoint of the game server.
#[derive(Debug)]
pub struct TowerClient {
    client: Client,
    base_url: Url,
}

impl TowerClient {
    /// Create a new client connecting to the specified server URL
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        let client = Client::new();

        Ok(Self { client, base_url })
    }

    /// Create a player session. The token authenticates the socket.
    pub async fn create_session(&self) -> Result<CreateSessionResponse> {
        let session_url = self.base_url.join("/session")?;

        let response = self.client.post(session_url).send().await?;

        if !response.status().is_success() {
            return Err(format!("Failed to create session: {}", response.status()).into());
        }

        let session: CreateSessionResponse = response.json().await?;
        info!("Session created with balance {}", session.balance);
        Ok(session)
    }

    /// Socket URL for a session token
    pub fn websocket_url(&self, token: &str) -> Result<String> {
        let mut ws_url = self.base_url.clone();
        ws_url
            .set_scheme(match self.base_url.scheme() {
                "https" => "wss",
                _ => "ws",
            })
            .map_err(|_| "Failed to set WebSocket scheme")?;
        ws_url.set_path("/ws");
        ws_url.query_pairs_mut().clear().append_pair("token", token);

        Ok(ws_url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn websocket_url_switches_scheme_and_carries_token() {
        let client = assert_ok!(TowerClient::new("http://localhost:8000"));
        assert_eq!(
            assert_ok!(client.websocket_url("abc")),
            "ws://localhost:8000/ws?token=abc"
        );

        let secure = assert_ok!(TowerClient::new("https://tower.example.com/app"));
        assert_eq!(
            assert_ok!(secure.websocket_url("a b")),
            "wss://tower.example.com/ws?token=a+b"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert_err!(TowerClient::new("not a url"));
    }
}
