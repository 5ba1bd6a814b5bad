use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use crate::gate::AppShell;
use crate::round::{PendingCheck, RoundCoordinator};
use crate::GameError;

/// How the boot sequence left the game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootOutcome {
    /// No open round; the player starts fresh.
    Fresh,
    /// An open round was loaded and is being repainted.
    Restored { round_id: String },
    /// The server hinted at an open round without describing it; the loading
    /// overlay stays up until the fallback removes it.
    AwaitingRestore,
}

/// Removes the loading overlay at most once, whoever asks first.
struct OverlayGuard {
    shell: Arc<dyn AppShell>,
    removed: AtomicBool,
}

impl OverlayGuard {
    fn new(shell: Arc<dyn AppShell>) -> Self {
        Self {
            shell,
            removed: AtomicBool::new(false),
        }
    }

    fn remove(&self, cause: &str) {
        if !self.removed.swap(true, Ordering::SeqCst) {
            info!("Removing loading overlay ({})", cause);
            self.shell.remove_loading_overlay();
        }
    }

    fn is_removed(&self) -> bool {
        self.removed.load(Ordering::SeqCst)
    }
}

impl RoundCoordinator {
    /// Boot sequence: balance, pending-game check, restore if needed, then
    /// attach the Start control and take down the loading overlay.
    ///
    /// A failed request still leaves the game playable: the Start control is
    /// attached and the overlay removed before the error is returned.
    pub async fn boot(&self) -> Result<BootOutcome, GameError> {
        let overlay = Arc::new(OverlayGuard::new(self.shell().clone()));

        let on_complete = overlay.clone();
        let subscription = self
            .store()
            .subscribe_pending_game_restore_complete(move || {
                on_complete.remove("restore complete");
                Ok(())
            });

        let result = self.detect_and_restore().await;
        self.shell().attach_start_control();

        match &result {
            Ok(BootOutcome::Fresh) | Err(_) => {
                self.store().unsubscribe(subscription);
                overlay.remove("nothing to restore");
            }
            Ok(BootOutcome::Restored { .. }) | Ok(BootOutcome::AwaitingRestore) => {
                let store = self.store().clone();
                let fallback = self.config().overlay_fallback;
                tokio::spawn(async move {
                    tokio::time::sleep(fallback).await;
                    if !overlay.is_removed() {
                        warn!("Restore did not complete within {:?}", fallback);
                    }
                    overlay.remove("fallback");
                    store.unsubscribe(subscription);
                });
            }
        }

        if let Err(e) = &result {
            warn!("Boot failed: {}", e);
        }
        result
    }

    async fn detect_and_restore(&self) -> Result<BootOutcome, GameError> {
        self.fetch_balance().await?;

        match self.check_pending_game().await? {
            PendingCheck::None => Ok(BootOutcome::Fresh),
            PendingCheck::Unconfirmed => Ok(BootOutcome::AwaitingRestore),
            PendingCheck::Resumable(pending) => {
                let round_id = pending.round_id.clone();
                self.restore_pending_game(pending)?;
                Ok(BootOutcome::Restored { round_id })
            }
        }
    }
}
