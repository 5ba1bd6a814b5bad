use std::{env, time::Duration};

/// Table the game joins when nothing else is configured.
pub const DEFAULT_TABLE_ID: &str = "STGMS101";

/// How a `"200 OK"` pending-game reply without a `hasExistingGame` flag is read.
///
/// Two host builds disagreed on this, so it is a deliberate setting rather
/// than a guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingExistingGameFlag {
    /// Treat the reply as "no pending game" and start fresh.
    #[default]
    NoPendingGame,
    /// Report a pending game to the boot sequence (the loading overlay waits
    /// for the fallback timeout) without restoring any state.
    AwaitRestore,
}

/// Client settings. [`ClientConfig::from_env`] reads the `TOWER_*` variables.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: String,
    pub table_id: String,
    /// Deadline for every socket request.
    pub request_timeout: Duration,
    /// Delay between restoring state and firing the restore signal.
    pub restore_settle_delay: Duration,
    /// Hard deadline after which the loading overlay is removed regardless.
    pub overlay_fallback: Duration,
    pub missing_existing_game: MissingExistingGameFlag,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8000".to_string(),
            table_id: DEFAULT_TABLE_ID.to_string(),
            request_timeout: Duration::from_secs(5),
            restore_settle_delay: Duration::from_millis(500),
            overlay_fallback: Duration::from_secs(5),
            missing_existing_game: MissingExistingGameFlag::default(),
        }
    }
}

fn env_millis(name: &str, default: Duration) -> Duration {
    env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let missing_existing_game = match env::var("TOWER_MISSING_EXISTING_GAME").as_deref() {
            Ok("await_restore") => MissingExistingGameFlag::AwaitRestore,
            _ => MissingExistingGameFlag::NoPendingGame,
        };

        Self {
            server_url: env::var("TOWER_SERVER_URL").unwrap_or(defaults.server_url),
            table_id: env::var("TOWER_TABLE_ID").unwrap_or(defaults.table_id),
            request_timeout: env_millis("TOWER_REQUEST_TIMEOUT_MS", defaults.request_timeout),
            restore_settle_delay: env_millis(
                "TOWER_RESTORE_SETTLE_MS",
                defaults.restore_settle_delay,
            ),
            overlay_fallback: env_millis("TOWER_OVERLAY_FALLBACK_MS", defaults.overlay_fallback),
            missing_existing_game,
        }
    }

    pub fn with_server_url(mut self, server_url: impl Into<String>) -> Self {
        self.server_url = server_url.into();
        self
    }

    pub fn with_table_id(mut self, table_id: impl Into<String>) -> Self {
        self.table_id = table_id.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_missing_existing_game(mut self, policy: MissingExistingGameFlag) -> Self {
        self.missing_existing_game = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_backend_conventions() {
        let config = ClientConfig::default();
        assert_eq!(config.table_id, "STGMS101");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.overlay_fallback, Duration::from_secs(5));
        assert_eq!(
            config.missing_existing_game,
            MissingExistingGameFlag::NoPendingGame
        );
    }

    #[test]
    fn builder_overrides_fields() {
        let config = ClientConfig::default()
            .with_table_id("T2")
            .with_request_timeout(Duration::from_millis(250))
            .with_missing_existing_game(MissingExistingGameFlag::AwaitRestore);
        assert_eq!(config.table_id, "T2");
        assert_eq!(config.request_timeout, Duration::from_millis(250));
        assert_eq!(
            config.missing_existing_game,
            MissingExistingGameFlag::AwaitRestore
        );
    }
}
