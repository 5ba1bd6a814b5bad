//! In-memory doubles for the transport, board and shell used by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tower_common::models::GridShape;
use tower_common::protocol::{Envelope, Operation};

use crate::board::BoardAdapter;
use crate::cell::CellInteraction;
use crate::config::ClientConfig;
use crate::gate::{AppShell, Gateable, UiGate};
use crate::round::{RoundCoordinator, RoundPhase};
use crate::state::GameStore;
use crate::transport::{Handler, HandlerRegistry, Transport};
use crate::GameError;

type Frame = (Option<u64>, Value);

/// Transport that answers each send with replies queued for its operation.
///
/// Replies are delivered synchronously from `send`. A reply queued without
/// an id echoes the request id of the frame that triggered it.
#[derive(Default)]
pub struct ScriptedTransport {
    handlers: HandlerRegistry,
    disconnected: AtomicBool,
    script: Mutex<HashMap<Operation, VecDeque<Vec<Frame>>>>,
    prelude: Mutex<HashMap<Operation, Vec<Frame>>>,
    sent: Mutex<Vec<Envelope>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_batch(&self, operation: Operation, frames: Vec<Frame>) {
        let mut batch = self
            .prelude
            .lock()
            .unwrap()
            .remove(&operation)
            .unwrap_or_default();
        batch.extend(frames);
        self.script
            .lock()
            .unwrap()
            .entry(operation)
            .or_default()
            .push_back(batch);
    }

    /// Queue the reply to the next `operation` request.
    pub fn reply(&self, operation: Operation, data: Value) {
        self.push_batch(operation, vec![(None, data)]);
    }

    /// Queue several frames delivered in order for one request.
    pub fn reply_batch(&self, operation: Operation, frames: Vec<Value>) {
        self.push_batch(operation, frames.into_iter().map(|data| (None, data)).collect());
    }

    /// Queue a frame with a fixed request id, delivered just before the next
    /// reply queued for `operation`.
    pub fn reply_with_id(&self, operation: Operation, request_id: Option<u64>, data: Value) {
        self.prelude
            .lock()
            .unwrap()
            .entry(operation)
            .or_default()
            .push((request_id, data));
    }

    pub fn set_connected(&self, connected: bool) {
        self.disconnected.store(!connected, Ordering::SeqCst);
    }

    /// Push a frame as if the server had sent it unprompted.
    pub fn deliver(&self, operation: Operation, request_id: Option<u64>, data: Value) -> bool {
        self.handlers.dispatch(&Envelope {
            operation,
            request_id,
            data,
        })
    }

    pub fn has_handler(&self, operation: Operation) -> bool {
        self.handlers.has_handler(operation)
    }

    pub fn sent_operations(&self) -> Vec<Operation> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|envelope| envelope.operation)
            .collect()
    }

    pub fn last_sent(&self, operation: Operation) -> Option<Envelope> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|envelope| envelope.operation == operation)
            .cloned()
    }

    pub fn last_request_id(&self) -> Option<u64> {
        self.sent
            .lock()
            .unwrap()
            .last()
            .and_then(|envelope| envelope.request_id)
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, envelope: Envelope) -> Result<(), GameError> {
        if !self.is_connected() {
            return Err(GameError::Disconnected);
        }

        let operation = envelope.operation;
        let request_id = envelope.request_id;
        self.sent.lock().unwrap().push(envelope);

        let batch = self
            .script
            .lock()
            .unwrap()
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
            .unwrap_or_default();
        for (id, data) in batch {
            self.deliver(operation, id.or(request_id), data);
        }
        Ok(())
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
        !self.disconnected.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardCall {
    Pressed(usize, bool),
    Green(usize, bool),
    Flag(usize, usize),
    Mine(usize, usize),
    Bomb(usize, usize),
    Revert(usize, usize),
    Blast(usize, usize),
    Reset,
}

pub struct RecordingBoard {
    grid: GridShape,
    calls: Mutex<Vec<BoardCall>>,
}

impl RecordingBoard {
    pub fn new(grid: GridShape) -> Self {
        Self {
            grid,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<BoardCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: BoardCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl BoardAdapter for RecordingBoard {
    fn set_row_pressed(&self, row: usize, pressed: bool) {
        self.record(BoardCall::Pressed(row, pressed));
    }

    fn set_row_green_overlay(&self, row: usize, visible: bool) {
        self.record(BoardCall::Green(row, visible));
    }

    fn add_green_flag(&self, row: usize, col: usize) {
        self.record(BoardCall::Flag(row, col));
    }

    fn add_mine_overlay(&self, row: usize, col: usize) {
        self.record(BoardCall::Mine(row, col));
    }

    fn add_bomb_overlay(&self, row: usize, col: usize) {
        self.record(BoardCall::Bomb(row, col));
    }

    fn revert_cell_overlay(&self, row: usize, col: usize) {
        self.record(BoardCall::Revert(row, col));
    }

    fn play_blast_animation(&self, row: usize, col: usize) {
        self.record(BoardCall::Blast(row, col));
    }

    fn reset_grid(&self) {
        self.record(BoardCall::Reset);
    }

    fn dimensions(&self) -> GridShape {
        self.grid
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellCall {
    AttachStart,
    RemoveOverlay,
    LowBalance,
}

#[derive(Default)]
pub struct RecordingShell {
    calls: Mutex<Vec<ShellCall>>,
}

impl RecordingShell {
    pub fn calls(&self) -> Vec<ShellCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: ShellCall) -> usize {
        self.calls().iter().filter(|c| **c == call).count()
    }
}

impl AppShell for RecordingShell {
    fn attach_start_control(&self) {
        self.calls.lock().unwrap().push(ShellCall::AttachStart);
    }

    fn remove_loading_overlay(&self) {
        self.calls.lock().unwrap().push(ShellCall::RemoveOverlay);
    }

    fn show_low_balance_prompt(&self, _stake: f64, _balance: f64) {
        self.calls.lock().unwrap().push(ShellCall::LowBalance);
    }
}

pub struct RecordingControl {
    name: String,
    enabled: AtomicBool,
}

impl RecordingControl {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            enabled: AtomicBool::new(true),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

impl Gateable for RecordingControl {
    fn name(&self) -> &str {
        &self.name
    }

    fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }
}

/// Everything wired together over a [`ScriptedTransport`] on a 3x6 grid.
pub struct Harness {
    pub transport: Arc<ScriptedTransport>,
    pub store: Arc<GameStore>,
    pub board: Arc<RecordingBoard>,
    pub gate: Arc<UiGate>,
    pub shell: Arc<RecordingShell>,
    pub coordinator: Arc<RoundCoordinator>,
    pub cells: CellInteraction,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_config(config: ClientConfig) -> Self {
        let transport = Arc::new(ScriptedTransport::new());
        let store = Arc::new(GameStore::new(config.table_id.clone()));
        let board = Arc::new(RecordingBoard::new(GridShape::new(3, 6)));
        let gate = Arc::new(UiGate::new());
        let shell = Arc::new(RecordingShell::default());
        let coordinator = Arc::new(RoundCoordinator::new(
            store.clone(),
            transport.clone(),
            board.clone(),
            gate.clone(),
            shell.clone(),
            config,
        ));
        let cells = CellInteraction::new(coordinator.clone());

        Self {
            transport,
            store,
            board,
            gate,
            shell,
            coordinator,
            cells,
        }
    }

    /// A started round with 100 balance, waiting on `row`.
    pub fn active_round(row: usize) -> Self {
        let h = Self::new();
        h.store.set_balance(100.0);
        h.store.set_round_id(Some("r-1".to_string()));
        h.store.set_current_row(row);
        h.store.set_game_started(true);
        h.gate.disable_ui_components();
        h.coordinator.set_phase(RoundPhase::Active);
        h
    }
}
