use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::info;

use crate::board::install_restore_painter;
use crate::state::Subscription;
use crate::{
    AppShell, BoardAdapter, BootOutcome, CellInteraction, ClickOutcome, ClientConfig, GameError,
    GameStore, GridShape, Result, RoundCoordinator, SocketTransport, TowerClient, UiGate,
};

/// Events emitted by the tower game
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    GameStarted,
    GameEnded,
    BalanceChanged { balance: f64 },
    GridChanged { grid: GridShape },
    /// The player may now click `row`.
    CurrentRowChanged { row: usize },
    StakeChanged { amount: f64 },
    /// A restored round has been repainted.
    RestoreComplete,
}

/// High-level tower game client: one player session over one socket.
pub struct TowerGame {
    client: TowerClient,
    transport: Arc<SocketTransport>,
    store: Arc<GameStore>,
    coordinator: Arc<RoundCoordinator>,
    cells: CellInteraction,
    event_subscriptions: Mutex<Vec<Subscription>>,
}

impl TowerGame {
    /// Create a session over HTTP, connect the socket and wire the round
    /// logic to the given board, controls and shell.
    pub async fn connect(
        config: ClientConfig,
        board: Arc<dyn BoardAdapter>,
        gate: Arc<UiGate>,
        shell: Arc<dyn AppShell>,
    ) -> Result<Self> {
        let client = TowerClient::new(&config.server_url)?;
        let session = client.create_session().await?;

        let ws_url = client.websocket_url(&session.token)?;
        let transport = Arc::new(SocketTransport::connect(&ws_url).await?);
        info!("Connected to table {}", config.table_id);

        let store = Arc::new(GameStore::new(config.table_id.clone()));
        store.set_token(session.token);
        store.set_balance(session.balance);
        install_restore_painter(&store, board.clone(), gate.clone());

        let coordinator = Arc::new(RoundCoordinator::new(
            store.clone(),
            transport.clone(),
            board,
            gate,
            shell,
            config,
        ));
        let cells = CellInteraction::new(coordinator.clone());

        Ok(Self {
            client,
            transport,
            store,
            coordinator,
            cells,
            event_subscriptions: Mutex::new(Vec::new()),
        })
    }

    pub fn client(&self) -> &TowerClient {
        &self.client
    }

    pub fn store(&self) -> &Arc<GameStore> {
        &self.store
    }

    pub fn coordinator(&self) -> &Arc<RoundCoordinator> {
        &self.coordinator
    }

    /// Subscribe to game events. Returns a receiver for game events.
    /// Subscribing again replaces the previous receiver.
    pub fn subscribe_to_events(&self) -> mpsc::UnboundedReceiver<GameEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let store = &self.store;

        let mut subscriptions = self
            .event_subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for subscription in subscriptions.drain(..) {
            store.unsubscribe(subscription);
        }

        let tx = sender.clone();
        subscriptions.push(store.subscribe_game_started(move || {
            tx.send(GameEvent::GameStarted)?;
            Ok(())
        }));
        let tx = sender.clone();
        subscriptions.push(store.subscribe_game_ended(move || {
            tx.send(GameEvent::GameEnded)?;
            Ok(())
        }));
        let tx = sender.clone();
        subscriptions.push(store.subscribe_balance(move |balance| {
            tx.send(GameEvent::BalanceChanged { balance })?;
            Ok(())
        }));
        let tx = sender.clone();
        subscriptions.push(store.subscribe_grid_dimensions(move |grid| {
            tx.send(GameEvent::GridChanged { grid })?;
            Ok(())
        }));
        let tx = sender.clone();
        subscriptions.push(store.subscribe_current_row(move |row| {
            tx.send(GameEvent::CurrentRowChanged { row })?;
            Ok(())
        }));
        let tx = sender.clone();
        subscriptions.push(store.subscribe_stake_amount(move |amount| {
            tx.send(GameEvent::StakeChanged { amount })?;
            Ok(())
        }));
        subscriptions.push(store.subscribe_pending_game_restore_complete(move || {
            sender.send(GameEvent::RestoreComplete)?;
            Ok(())
        }));

        receiver
    }

    pub async fn boot(&self) -> std::result::Result<BootOutcome, GameError> {
        self.coordinator.boot().await
    }

    /// Start a round with the current stake on the current grid.
    pub async fn start(&self) -> std::result::Result<(), GameError> {
        self.coordinator.start_round().await
    }

    pub async fn click(&self, row: usize, col: usize) -> std::result::Result<ClickOutcome, GameError> {
        self.cells.handle_cell_click(row, col).await
    }

    pub async fn collect(&self) -> std::result::Result<f64, GameError> {
        self.coordinator.collect().await
    }

    /// Change the grid between rounds.
    pub fn select_grid(&self, grid: GridShape) -> std::result::Result<(), GameError> {
        self.coordinator.select_grid(grid)
    }

    /// Change the stake between rounds.
    pub fn set_stake(&self, amount: f64) -> std::result::Result<(), GameError> {
        self.coordinator.set_stake(amount)
    }

    pub fn is_connected(&self) -> bool {
        self.coordinator.requests().is_connected()
    }

    /// Close the connection and clean up
    pub async fn disconnect(&self) {
        let subscriptions: Vec<Subscription> = self
            .event_subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for subscription in subscriptions {
            self.store.unsubscribe(subscription);
        }

        self.transport.close().await;
        info!("Disconnected from game");
    }
}
