use std::{env, time::Duration};

use tokio::time;
use tracing::{debug, info};

use crate::logic::Players;

pub async fn start_cleanup_task(players: Players) {
    let cleanup_interval_secs: u64 = env::var("CLEANUP_INTERVAL_SECONDS")
        .unwrap_or_else(|_| "60".to_string())
        .parse()
        .unwrap_or(60);

    let inactive_timeout_secs: u64 = env::var("INACTIVE_PLAYER_TIMEOUT_SECONDS")
        .unwrap_or_else(|_| "3600".to_string())
        .parse()
        .unwrap_or(3600);

    let mut interval = time::interval(Duration::from_secs(cleanup_interval_secs.max(1)));

    info!(
        "Started session cleanup task: checking every {}s, inactive timeout: {}s",
        cleanup_interval_secs, inactive_timeout_secs
    );

    loop {
        interval.tick().await;
        cleanup_players(&players, inactive_timeout_secs);
    }
}

/// Drop sessions with no connection that have been idle past the timeout.
pub fn cleanup_players(players: &Players, inactive_timeout_secs: u64) -> usize {
    let mut players_to_remove = Vec::new();

    // First pass: identify sessions to remove
    for entry in players.iter() {
        // Try to lock the player, skip if we can't (probably in use)
        if let Ok(player) = entry.value().try_lock()
            && player.should_cleanup(inactive_timeout_secs)
        {
            players_to_remove.push(entry.key().clone());
        }
    }

    // Second pass: remove identified sessions
    let removed_count = players_to_remove.len();
    for token in players_to_remove {
        players.remove(&token);
        debug!("Cleaned up idle session");
    }

    if removed_count > 0 {
        info!("Cleaned up {} inactive sessions", removed_count);
    }
    removed_count
}
