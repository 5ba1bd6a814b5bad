use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tower_common::models::{GridShape, RevealedMatrix};
use tracing::{debug, error, info, warn};

use crate::config::DEFAULT_TABLE_ID;

/// What a store listener returns; an `Err` is logged and otherwise ignored.
pub type ListenerResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

type Listener<T> = Arc<dyn Fn(&T) -> ListenerResult + Send + Sync>;

pub const DEFAULT_BET_STEPS: [f64; 19] = [
    0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0,
    10000.0,
];

pub const DEFAULT_STAKE: f64 = 1.0;

/// Change events a listener can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreEvent {
    GameStarted,
    GameEnded,
    BalanceChanged,
    GridDimensionsChanged,
    CurrentRowChanged,
    BetStepsChanged,
    StakeAmountChanged,
    PendingGameRestore,
    PendingGameRestoreComplete,
}

/// Handle returned by every `subscribe_*` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
    event: StoreEvent,
    id: u64,
}

impl Subscription {
    pub fn event(&self) -> StoreEvent {
        self.event
    }
}

/// Everything the client knows about the player and the current round.
#[derive(Debug, Clone, PartialEq)]
pub struct GameSession {
    pub balance: f64,
    pub stake_amount: f64,
    pub grid: GridShape,
    pub round_id: Option<String>,
    /// Client row of the next clickable row; `grid.rows - 1` is the start row.
    pub current_row: usize,
    pub revealed_matrix: RevealedMatrix,
    pub reward: f64,
    pub game_started: bool,
    pub current_bet_index: usize,
    pub bet_steps: Vec<f64>,
    pub table_id: String,
    pub token: Option<String>,
}

impl Default for GameSession {
    fn default() -> Self {
        let grid = GridShape::default();
        let current_bet_index = DEFAULT_BET_STEPS
            .iter()
            .position(|step| *step == DEFAULT_STAKE)
            .unwrap_or(0);
        Self {
            balance: 0.0,
            stake_amount: DEFAULT_STAKE,
            grid,
            round_id: None,
            current_row: grid.bottom_row(),
            revealed_matrix: Vec::new(),
            reward: 0.0,
            game_started: false,
            current_bet_index,
            bet_steps: DEFAULT_BET_STEPS.to_vec(),
            table_id: DEFAULT_TABLE_ID.to_string(),
            token: None,
        }
    }
}

struct Listeners<T> {
    name: &'static str,
    entries: Mutex<Vec<(u64, Listener<T>)>>,
}

impl<T> Listeners<T> {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Mutex::new(Vec::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, Vec<(u64, Listener<T>)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn add(&self, id: u64, listener: Listener<T>) {
        let mut entries = self.entries();
        entries.push((id, listener));
        debug!("Added {} listener. Total listeners: {}", self.name, entries.len());
    }

    fn remove(&self, id: u64) -> bool {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        let removed = entries.len() != before;
        if removed {
            debug!("Removed {} listener. Remaining listeners: {}", self.name, entries.len());
        }
        removed
    }

    /// Call every listener in registration order. The list is snapshotted
    /// first so listeners can subscribe, unsubscribe or call setters.
    fn emit(&self, value: &T) {
        let snapshot: Vec<Listener<T>> = self
            .entries()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        debug!("Triggering {} {} listeners", snapshot.len(), self.name);
        for (index, listener) in snapshot.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| listener(value))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Error in {} listener {}: {}", self.name, index + 1, e),
                Err(_) => error!("{} listener {} panicked", self.name, index + 1),
            }
        }
    }
}

/// Sole owner of the [`GameSession`].
///
/// Setters notify the listeners of their change event synchronously, and only
/// when the value actually changed. The session lock is released before any
/// listener runs, so by the time a listener sees a change every field written
/// by that setter is already visible.
pub struct GameStore {
    session: Mutex<GameSession>,
    next_listener_id: AtomicU64,
    game_started: Listeners<()>,
    game_ended: Listeners<()>,
    balance: Listeners<f64>,
    grid: Listeners<GridShape>,
    current_row: Listeners<usize>,
    bet_steps: Listeners<Vec<f64>>,
    stake_amount: Listeners<f64>,
    restore: Listeners<()>,
    restore_complete: Listeners<()>,
}

impl Default for GameStore {
    fn default() -> Self {
        Self::with_session(GameSession::default())
    }
}

impl GameStore {
    pub fn new(table_id: impl Into<String>) -> Self {
        Self::with_session(GameSession {
            table_id: table_id.into(),
            ..GameSession::default()
        })
    }

    pub fn with_session(session: GameSession) -> Self {
        Self {
            session: Mutex::new(session),
            next_listener_id: AtomicU64::new(1),
            game_started: Listeners::new("game started"),
            game_ended: Listeners::new("game ended"),
            balance: Listeners::new("balance change"),
            grid: Listeners::new("grid dimension change"),
            current_row: Listeners::new("current row change"),
            bet_steps: Listeners::new("bet steps change"),
            stake_amount: Listeners::new("stake amount change"),
            restore: Listeners::new("pending game restore"),
            restore_complete: Listeners::new("pending game restore complete"),
        }
    }

    fn session(&self) -> MutexGuard<'_, GameSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the whole session.
    pub fn snapshot(&self) -> GameSession {
        self.session().clone()
    }

    // Subscriptions

    fn subscribe<T>(
        &self,
        event: StoreEvent,
        listeners: &Listeners<T>,
        listener: Listener<T>,
    ) -> Subscription {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        listeners.add(id, listener);
        Subscription { event, id }
    }

    pub fn subscribe_game_started(
        &self,
        listener: impl Fn() -> ListenerResult + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribe(StoreEvent::GameStarted, &self.game_started, Arc::new(move |_: &()| listener()))
    }

    pub fn subscribe_game_ended(
        &self,
        listener: impl Fn() -> ListenerResult + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribe(StoreEvent::GameEnded, &self.game_ended, Arc::new(move |_: &()| listener()))
    }

    pub fn subscribe_balance(
        &self,
        listener: impl Fn(f64) -> ListenerResult + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribe(
            StoreEvent::BalanceChanged,
            &self.balance,
            Arc::new(move |balance: &f64| listener(*balance)),
        )
    }

    pub fn subscribe_grid_dimensions(
        &self,
        listener: impl Fn(GridShape) -> ListenerResult + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribe(
            StoreEvent::GridDimensionsChanged,
            &self.grid,
            Arc::new(move |grid: &GridShape| listener(*grid)),
        )
    }

    pub fn subscribe_current_row(
        &self,
        listener: impl Fn(usize) -> ListenerResult + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribe(
            StoreEvent::CurrentRowChanged,
            &self.current_row,
            Arc::new(move |row: &usize| listener(*row)),
        )
    }

    pub fn subscribe_bet_steps(
        &self,
        listener: impl Fn(&[f64]) -> ListenerResult + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribe(
            StoreEvent::BetStepsChanged,
            &self.bet_steps,
            Arc::new(move |steps: &Vec<f64>| listener(steps)),
        )
    }

    pub fn subscribe_stake_amount(
        &self,
        listener: impl Fn(f64) -> ListenerResult + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribe(
            StoreEvent::StakeAmountChanged,
            &self.stake_amount,
            Arc::new(move |amount: &f64| listener(*amount)),
        )
    }

    pub fn subscribe_pending_game_restore(
        &self,
        listener: impl Fn() -> ListenerResult + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribe(StoreEvent::PendingGameRestore, &self.restore, Arc::new(move |_: &()| listener()))
    }

    pub fn subscribe_pending_game_restore_complete(
        &self,
        listener: impl Fn() -> ListenerResult + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribe(
            StoreEvent::PendingGameRestoreComplete,
            &self.restore_complete,
            Arc::new(move |_: &()| listener()),
        )
    }

    /// Remove one listener. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let id = subscription.id;
        match subscription.event {
            StoreEvent::GameStarted => self.game_started.remove(id),
            StoreEvent::GameEnded => self.game_ended.remove(id),
            StoreEvent::BalanceChanged => self.balance.remove(id),
            StoreEvent::GridDimensionsChanged => self.grid.remove(id),
            StoreEvent::CurrentRowChanged => self.current_row.remove(id),
            StoreEvent::BetStepsChanged => self.bet_steps.remove(id),
            StoreEvent::StakeAmountChanged => self.stake_amount.remove(id),
            StoreEvent::PendingGameRestore => self.restore.remove(id),
            StoreEvent::PendingGameRestoreComplete => self.restore_complete.remove(id),
        }
    }

    // Round state

    pub fn game_started(&self) -> bool {
        self.session().game_started
    }

    /// Fires game-started on false→true and game-ended on true→false only.
    pub fn set_game_started(&self, started: bool) {
        let was_started = {
            let mut session = self.session();
            std::mem::replace(&mut session.game_started, started)
        };
        debug!("Game started state changed to: {}", started);

        match (was_started, started) {
            (false, true) => self.game_started.emit(&()),
            (true, false) => self.game_ended.emit(&()),
            _ => {}
        }
    }

    pub fn round_id(&self) -> Option<String> {
        self.session().round_id.clone()
    }

    pub fn set_round_id(&self, round_id: Option<String>) {
        debug!("Round ID set: {:?}", round_id);
        self.session().round_id = round_id;
    }

    pub fn revealed_matrix(&self) -> RevealedMatrix {
        self.session().revealed_matrix.clone()
    }

    pub fn set_revealed_matrix(&self, matrix: RevealedMatrix) {
        self.session().revealed_matrix = matrix;
        debug!("Game matrix updated");
    }

    pub fn reward(&self) -> f64 {
        self.session().reward
    }

    pub fn set_reward(&self, reward: f64) {
        let previous = std::mem::replace(&mut self.session().reward, reward);
        debug!("Reward updated from {} to {}", previous, reward);
    }

    pub fn current_row(&self) -> usize {
        self.session().current_row
    }

    /// Rows past the bottom of the grid are clamped to the start row.
    pub fn set_current_row(&self, row: usize) {
        let (previous, row) = {
            let mut session = self.session();
            let bottom = session.grid.bottom_row();
            let row = if row > bottom {
                warn!("Row {} is outside a {} grid, clamping to {}", row, session.grid, bottom);
                bottom
            } else {
                row
            };
            (std::mem::replace(&mut session.current_row, row), row)
        };

        if previous != row {
            debug!("Current row changed from {} to {}", previous, row);
            self.current_row.emit(&row);
        }
    }

    // Grid

    pub fn grid(&self) -> GridShape {
        self.session().grid
    }

    pub fn rows(&self) -> usize {
        self.session().grid.rows
    }

    pub fn cols(&self) -> usize {
        self.session().grid.cols
    }

    /// Wire form of the grid, e.g. `"3x6"`.
    pub fn grid_option(&self) -> String {
        self.grid().option()
    }

    pub fn multipliers(&self) -> Vec<f64> {
        self.grid().multipliers()
    }

    /// Set the grid shape and move the current row back to the start row.
    pub fn set_grid_dimensions(&self, cols: usize, rows: usize) {
        if cols == 0 || rows == 0 {
            warn!("Ignoring empty grid dimensions {}x{}", cols, rows);
            return;
        }
        let grid = GridShape::new(cols, rows);
        let (previous, previous_row) = {
            let mut session = self.session();
            let previous = std::mem::replace(&mut session.grid, grid);
            let previous_row = std::mem::replace(&mut session.current_row, grid.bottom_row());
            (previous, previous_row)
        };
        info!("Grid dimensions updated: {} (previous: {})", grid, previous);

        if previous != grid {
            self.grid.emit(&grid);
        }
        if previous_row != grid.bottom_row() {
            self.current_row.emit(&grid.bottom_row());
        }
    }

    // Wallet

    pub fn balance(&self) -> f64 {
        self.session().balance
    }

    pub fn set_balance(&self, balance: f64) {
        let previous = std::mem::replace(&mut self.session().balance, balance);
        info!("Balance updated from {} to {}", previous, balance);
        if previous != balance {
            self.balance.emit(&balance);
        }
    }

    pub fn stake_amount(&self) -> f64 {
        self.session().stake_amount
    }

    pub fn current_bet_index(&self) -> usize {
        self.session().current_bet_index
    }

    /// Set the stake. When it matches a bet step the bet index follows it,
    /// otherwise the index is left where it was.
    pub fn set_stake_amount(&self, amount: f64) {
        let previous = {
            let mut session = self.session();
            match session.bet_steps.iter().position(|step| *step == amount) {
                Some(index) => session.current_bet_index = index,
                None => debug!(
                    "Amount {} not found in bet steps, keeping bet index {}",
                    amount, session.current_bet_index
                ),
            }
            std::mem::replace(&mut session.stake_amount, amount)
        };
        debug!("Stake amount set to: {}", amount);

        if previous != amount {
            self.stake_amount.emit(&amount);
        }
    }

    pub fn bet_steps(&self) -> Vec<f64> {
        self.session().bet_steps.clone()
    }

    /// Replace the bet steps. An empty list is ignored; the bet index is reset
    /// to 0 when it falls outside the new list and the stake follows the step
    /// at the index.
    pub fn set_bet_steps(&self, steps: Vec<f64>) {
        if steps.is_empty() {
            warn!("Ignoring empty bet steps");
            return;
        }

        let stake = {
            let mut session = self.session();
            if session.current_bet_index >= steps.len() {
                session.current_bet_index = 0;
            }
            session.bet_steps = steps.clone();
            steps[session.current_bet_index]
        };

        self.set_stake_amount(stake);
        self.bet_steps.emit(&steps);
    }

    // Table / host

    pub fn table_id(&self) -> String {
        self.session().table_id.clone()
    }

    pub fn token(&self) -> Option<String> {
        self.session().token.clone()
    }

    pub fn set_token(&self, token: impl Into<String>) {
        self.session().token = Some(token.into());
    }

    // Pending game restoration signals

    pub fn trigger_pending_game_restore(&self) {
        info!("Triggering pending game restore");
        self.restore.emit(&());
    }

    pub fn trigger_pending_game_restore_complete(&self) {
        info!("Triggering pending game restore completion");
        self.restore_complete.emit(&());
    }
}
