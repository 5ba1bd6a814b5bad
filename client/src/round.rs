use std::sync::{Arc, Mutex, PoisonError};

use tower_common::models::{GridShape, RevealedMatrix, STATUS_NOT_FOUND, STATUS_OK};
use tower_common::protocol::{
    BalanceResponse, GameLoadRequest, GameLoadResponse, GetBalanceRequest, Operation,
    PlaceBetRequest, PlaceBetResponse, RoundEndReason, RoundEvent, RoundEventResponse,
    StatusResponse,
};
use tracing::{debug, info, warn};

use crate::board::{BoardAdapter, reveal_all_mines};
use crate::config::{ClientConfig, MissingExistingGameFlag};
use crate::gate::{AppShell, UiGate};
use crate::request::{RequestClient, ensure_ok};
use crate::state::GameStore;
use crate::{GameError, Transport};

/// Where the round state machine currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoundPhase {
    #[default]
    Idle,
    /// Round-start and place-bet in flight.
    Starting,
    /// Waiting for a cell click or collect.
    Active,
    /// A click or collect is being resolved with the server.
    Resolving,
    /// A pending round is being loaded at boot.
    Restoring,
}

/// Round left open by a previous session, as reported by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingGame {
    pub round_id: String,
    pub grid: GridShape,
    pub bet_amount: Option<f64>,
    pub revealed_matrix: RevealedMatrix,
    /// Payout multipliers in climb order.
    pub row_rewards: Vec<f64>,
    pub completed_rows: Option<usize>,
}

impl PendingGame {
    fn from_response(response: GameLoadResponse, fallback_grid: GridShape) -> Result<Self, GameError> {
        let invalid = |reason: String| GameError::InvalidResponse {
            operation: Operation::GameLoad,
            reason,
        };

        let grid = match response.grid_option.as_deref() {
            Some(option) => option.parse::<GridShape>().map_err(|e| invalid(e.to_string()))?,
            None => fallback_grid,
        };
        if !grid.is_supported() {
            return Err(invalid(format!("unsupported grid {}", grid)));
        }

        Ok(Self {
            round_id: response.round_id.unwrap_or_default(),
            grid,
            bet_amount: response.bet_amount,
            revealed_matrix: response.revealed_matrix.unwrap_or_default(),
            row_rewards: response.row_rewards.unwrap_or_else(|| grid.row_rewards()),
            completed_rows: response.completed_rows,
        })
    }

    /// Client row the player continues from.
    pub fn current_row(&self) -> Result<usize, GameError> {
        match self.completed_rows {
            None => Ok(self.grid.bottom_row()),
            Some(completed) if completed < self.grid.rows => {
                Ok(self.grid.bottom_row() - completed)
            }
            Some(completed) => Err(GameError::InvalidResponse {
                operation: Operation::GameLoad,
                reason: format!("{} completed rows on a {} grid", completed, self.grid),
            }),
        }
    }

    /// Payout for the rows already climbed, 0 when none were.
    pub fn reward(&self) -> f64 {
        match (self.completed_rows, self.bet_amount) {
            (Some(completed), Some(bet)) if completed >= 1 => self
                .row_rewards
                .get(completed - 1)
                .map(|multiplier| bet * multiplier)
                .unwrap_or(0.0),
            _ => 0.0,
        }
    }
}

/// Result of the pending-game check at boot.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingCheck {
    None,
    Resumable(PendingGame),
    /// The server answered `"200 OK"` without saying whether a game exists.
    Unconfirmed,
}

/// Drives a round from start to its end and restores open rounds at boot.
pub struct RoundCoordinator {
    store: Arc<GameStore>,
    requests: RequestClient,
    board: Arc<dyn BoardAdapter>,
    gate: Arc<UiGate>,
    shell: Arc<dyn AppShell>,
    config: ClientConfig,
    phase: Mutex<RoundPhase>,
}

impl RoundCoordinator {
    pub fn new(
        store: Arc<GameStore>,
        transport: Arc<dyn Transport>,
        board: Arc<dyn BoardAdapter>,
        gate: Arc<UiGate>,
        shell: Arc<dyn AppShell>,
        config: ClientConfig,
    ) -> Self {
        let requests = RequestClient::new(transport, config.request_timeout);
        Self {
            store,
            requests,
            board,
            gate,
            shell,
            config,
            phase: Mutex::new(RoundPhase::Idle),
        }
    }

    pub fn store(&self) -> &Arc<GameStore> {
        &self.store
    }

    pub fn board(&self) -> &Arc<dyn BoardAdapter> {
        &self.board
    }

    pub fn gate(&self) -> &Arc<UiGate> {
        &self.gate
    }

    pub(crate) fn shell(&self) -> &Arc<dyn AppShell> {
        &self.shell
    }

    pub(crate) fn requests(&self) -> &RequestClient {
        &self.requests
    }

    pub(crate) fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn phase(&self) -> RoundPhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_phase(&self, phase: RoundPhase) {
        let previous = std::mem::replace(
            &mut *self.phase.lock().unwrap_or_else(PoisonError::into_inner),
            phase,
        );
        if previous != phase {
            debug!("Round phase {:?} -> {:?}", previous, phase);
        }
    }

    /// Claim the round for a click or collect. Only one may resolve at a time.
    pub(crate) fn begin_resolving(&self) -> Result<(), GameError> {
        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        match *phase {
            RoundPhase::Idle | RoundPhase::Active => {
                *phase = RoundPhase::Resolving;
                Ok(())
            }
            busy => {
                debug!("Rejecting action while {:?}", busy);
                Err(GameError::Busy)
            }
        }
    }

    /// Hand the round back to the player after a non-terminal resolution.
    pub(crate) fn end_resolving(&self) {
        self.set_phase(RoundPhase::Active);
    }

    /// Change the grid. Only allowed while no round is starting or live.
    pub fn select_grid(&self, grid: GridShape) -> Result<(), GameError> {
        if !grid.is_supported() {
            warn!("Rejecting unsupported grid {}", grid);
            return Err(GameError::UnsupportedGrid(grid));
        }
        self.ensure_between_rounds()?;
        self.store.set_grid_dimensions(grid.cols, grid.rows);
        Ok(())
    }

    /// Change the stake. Only allowed while no round is starting or live.
    pub fn set_stake(&self, amount: f64) -> Result<(), GameError> {
        self.ensure_between_rounds()?;
        self.store.set_stake_amount(amount);
        Ok(())
    }

    fn ensure_between_rounds(&self) -> Result<(), GameError> {
        if self.store.game_started() || self.phase() != RoundPhase::Idle {
            return Err(GameError::Busy);
        }
        Ok(())
    }

    /// Request the balance and store it.
    pub async fn fetch_balance(&self) -> Result<f64, GameError> {
        let response: BalanceResponse = self
            .requests
            .request(Operation::GetBalance, &GetBalanceRequest {})
            .await?;
        // Balance replies may omit the status; only an explicit one is checked.
        let response = if response.status().is_empty() {
            response
        } else {
            ensure_ok(Operation::GetBalance, response)?
        };

        let balance = response.balance.ok_or_else(|| GameError::InvalidResponse {
            operation: Operation::GetBalance,
            reason: "missing balance".to_string(),
        })?;
        info!("Balance: {}", balance);
        self.store.set_balance(balance);
        Ok(balance)
    }

    /// Ask the server whether a round is still open on this table.
    pub async fn check_pending_game(&self) -> Result<PendingCheck, GameError> {
        let request = GameLoadRequest {
            table_id: self.store.table_id(),
        };
        let response: GameLoadResponse = self.requests.request(Operation::GameLoad, &request).await?;

        match response.status() {
            STATUS_NOT_FOUND => {
                info!("No pending game found");
                return Ok(PendingCheck::None);
            }
            STATUS_OK => {}
            other => {
                warn!("Pending game check returned status {:?}, starting fresh", other);
                return Ok(PendingCheck::None);
            }
        }

        match response.has_existing_game {
            Some(false) => Ok(PendingCheck::None),
            None => match self.config.missing_existing_game {
                MissingExistingGameFlag::NoPendingGame => {
                    debug!("Pending game reply has no existing-game flag, starting fresh");
                    Ok(PendingCheck::None)
                }
                MissingExistingGameFlag::AwaitRestore => {
                    debug!("Pending game reply has no existing-game flag, awaiting restore");
                    Ok(PendingCheck::Unconfirmed)
                }
            },
            Some(true) => {
                let pending = PendingGame::from_response(response, self.store.grid())?;
                if pending.round_id.is_empty() {
                    info!("Existing game reported without a round id, starting fresh");
                    return Ok(PendingCheck::None);
                }
                info!("Pending game found: {}", pending.round_id);
                Ok(PendingCheck::Resumable(pending))
            }
        }
    }

    /// Load a pending round into the store, then fire the restore signal once
    /// the settle delay has passed.
    pub fn restore_pending_game(&self, pending: PendingGame) -> Result<(), GameError> {
        let current_row = pending.current_row()?;
        let reward = pending.reward();
        self.set_phase(RoundPhase::Restoring);

        info!(
            "Restoring round {} on {} at row {}",
            pending.round_id, pending.grid, current_row
        );
        self.store
            .set_grid_dimensions(pending.grid.cols, pending.grid.rows);
        if let Some(bet) = pending.bet_amount {
            self.store.set_stake_amount(bet);
        }
        self.store.set_round_id(Some(pending.round_id));
        self.store.set_revealed_matrix(pending.revealed_matrix);
        self.store.set_current_row(current_row);
        self.store.set_reward(reward);
        // Restore listeners pick the started look from this flag.
        self.store.set_game_started(true);
        self.set_phase(RoundPhase::Active);

        let store = self.store.clone();
        let delay = self.config.restore_settle_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            store.trigger_pending_game_restore();
        });
        Ok(())
    }

    /// Open a round: round-start then place-bet. On failure the round is
    /// rolled back and the caller restores the controls.
    pub async fn start(&self) -> Result<(), GameError> {
        let stake = self.claim_start()?;
        self.run_start(stake).await
    }

    /// Move from Idle to Starting if the stake is covered. Nothing else is
    /// touched when this fails.
    fn claim_start(&self) -> Result<f64, GameError> {
        let stake = self.store.stake_amount();
        let balance = self.store.balance();

        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        if *phase != RoundPhase::Idle {
            debug!("Rejecting start while {:?}", *phase);
            return Err(GameError::Busy);
        }
        if stake > balance {
            drop(phase);
            warn!("Stake {} exceeds balance {}", stake, balance);
            self.shell.show_low_balance_prompt(stake, balance);
            return Err(GameError::InsufficientBalance { stake, balance });
        }
        *phase = RoundPhase::Starting;
        Ok(stake)
    }

    async fn run_start(&self, stake: f64) -> Result<(), GameError> {
        match self.open_round(stake).await {
            Ok(()) => {
                self.store.set_game_started(true);
                self.set_phase(RoundPhase::Active);
                info!("Round started");
                Ok(())
            }
            Err(e) => {
                warn!("Failed to start round: {}", e);
                self.store.set_game_started(false);
                self.store.set_round_id(None);
                self.set_phase(RoundPhase::Idle);
                Err(e)
            }
        }
    }

    async fn open_round(&self, stake: f64) -> Result<(), GameError> {
        let table_id = self.store.table_id();
        let start = RoundEvent::Start {
            table_id: table_id.clone(),
        };
        let response: RoundEventResponse = self
            .requests
            .request_matching(Operation::RoundEvents, &start, echoes("round_start"))
            .await?;
        let response = ensure_ok(Operation::RoundEvents, response)?;

        let round_id = response
            .round_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| GameError::InvalidResponse {
                operation: Operation::RoundEvents,
                reason: "round start without a round id".to_string(),
            })?;
        debug!("Round {} opened", round_id);
        self.store.set_round_id(Some(round_id.clone()));
        if let Some(matrix) = response.revealed_matrix {
            self.store.set_revealed_matrix(matrix);
        }

        let bet = PlaceBetRequest {
            table_id,
            round_id,
            stake_amount: stake.to_string(),
            grid_option: self.store.grid_option(),
        };
        let response: PlaceBetResponse = self.requests.request(Operation::PlaceBet, &bet).await?;
        let response = ensure_ok(Operation::PlaceBet, response)?;
        if let Some(balance) = response.balance {
            self.store.set_balance(balance);
        }
        Ok(())
    }

    /// Start wrapper for the Start button: once the start is claimed, locks
    /// the controls and clears the board, highlights the start row on success
    /// and unlocks again on failure. A rejected claim leaves everything as it
    /// was.
    pub async fn start_round(&self) -> Result<(), GameError> {
        let stake = self.claim_start()?;

        self.gate.disable_ui_components();
        self.board.reset_grid();
        self.store.set_reward(0.0);
        self.store.set_current_row(self.store.grid().bottom_row());

        match self.run_start(stake).await {
            Ok(()) => {
                self.board
                    .set_row_green_overlay(self.store.current_row(), true);
                Ok(())
            }
            Err(e) => {
                self.gate.enable_ui_components();
                Err(e)
            }
        }
    }

    /// Send round-end and apply whatever state the server returns.
    pub async fn end_round(&self, reason: RoundEndReason) -> Result<RoundEventResponse, GameError> {
        let round_id = self.store.round_id().ok_or(GameError::NotStarted)?;
        let event = RoundEvent::End {
            reason,
            round_id,
            table_id: self.store.table_id(),
        };
        info!("Ending round: {}", reason);

        let response: RoundEventResponse = self
            .requests
            .request_matching(Operation::RoundEvents, &event, echoes("round_end"))
            .await?;
        let response = ensure_ok(Operation::RoundEvents, response)?;

        if let Some(matrix) = response.revealed_matrix.clone() {
            self.store.set_revealed_matrix(matrix);
        }
        if let Some(reward) = response.reward {
            self.store.set_reward(reward);
        }
        if let Some(balance) = response.balance {
            self.store.set_balance(balance);
        }
        Ok(response)
    }

    /// Close the local round: back to the start row with controls unlocked.
    pub(crate) fn finish_round(&self) {
        self.store.set_game_started(false);
        self.store.set_round_id(None);
        self.store.set_current_row(self.store.grid().bottom_row());
        self.gate.enable_ui_components();
        self.set_phase(RoundPhase::Idle);
    }

    /// Cash out the current reward. Reveals every mine and closes the round,
    /// even when the server call fails.
    pub async fn collect(&self) -> Result<f64, GameError> {
        if !self.store.game_started() {
            return Err(GameError::NotStarted);
        }
        if self.store.current_row() == self.store.grid().bottom_row() {
            return Err(GameError::NothingToCollect);
        }
        self.begin_resolving()?;

        let result = self.end_round(RoundEndReason::Collect).await;
        match result {
            Ok(_) => {
                reveal_all_mines(
                    self.board.as_ref(),
                    &self.store.revealed_matrix(),
                    self.store.grid(),
                );
                let reward = self.store.reward();
                info!("Collected {}", reward);
                self.finish_round();
                Ok(reward)
            }
            Err(e) => {
                warn!("Collect failed: {}", e);
                self.finish_round();
                Err(e)
            }
        }
    }
}

/// Accept a `round_events` response only if it echoes `event_type`.
fn echoes(event_type: &'static str) -> impl Fn(&RoundEventResponse) -> bool + Send + 'static {
    move |response: &RoundEventResponse| {
        response
            .event_type
            .as_deref()
            .is_none_or(|echoed| echoed == event_type)
    }
}
