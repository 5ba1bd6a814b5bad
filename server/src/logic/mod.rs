use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Instant,
};

use dashmap::DashMap;
use nanoid::nanoid;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use tower_common::{
    models::{GridShape, STATUS_NOT_FOUND, STATUS_OK},
    protocol::{
        BalanceResponse, Envelope, GameLoadRequest, GameLoadResponse, Operation,
        PlaceBetRequest, PlaceBetResponse, RoundEndReason, RoundEvent, RoundEventResponse,
        SelectRequest, SelectResponse,
    },
};

use crate::data::{Round, generate_mines};

pub type Players = Arc<DashMap<String, Arc<Mutex<Player>>>>;

pub const STATUS_BAD_REQUEST: &str = "422 Invalid request";
pub const STATUS_NO_FUNDS: &str = "402 Insufficient balance";
pub const STATUS_NO_ROUND: &str = "404 Round not found";
pub const STATUS_CONFLICT: &str = "409 Conflict";

/// Status-only reply for rejected requests.
fn rejected(status: &str) -> Value {
    json!({ "status": status })
}

fn reply<T: Serialize>(response: &T) -> Value {
    serde_json::to_value(response).unwrap_or_else(|e| {
        warn!("Failed to serialize response: {}", e);
        rejected(STATUS_BAD_REQUEST)
    })
}

/// A player's wallet and open rounds, one per table.
pub struct Player {
    balance: f64,
    rounds: HashMap<String, Round>,
    connections: HashSet<Uuid>,
    last_activity: Instant,
}

impl Player {
    #[instrument(level = "trace")]
    pub fn new(balance: f64) -> Self {
        info!("Creating new player with balance {}", balance);
        Self {
            balance,
            rounds: HashMap::new(),
            connections: HashSet::new(),
            last_activity: Instant::now(),
        }
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn round(&self, table_id: &str) -> Option<&Round> {
        self.rounds.get(table_id)
    }

    pub fn add_connection(&mut self) -> Uuid {
        let id = Uuid::new_v4();
        self.connections.insert(id);
        self.last_activity = Instant::now();
        info!(
            "Connection {} added, total connections: {}",
            id,
            self.connections.len()
        );
        id
    }

    pub fn remove_connection(&mut self, id: &Uuid) {
        if self.connections.remove(id) {
            info!(
                "Connection {} removed, remaining connections: {}",
                id,
                self.connections.len()
            );
        } else {
            warn!("Attempted to remove non-existent connection: {}", id);
        }
        self.last_activity = Instant::now()
    }

    pub fn has_active_connections(&self) -> bool {
        !self.connections.is_empty()
    }

    pub fn should_cleanup(&self, inactive_timeout_secs: u64) -> bool {
        if self.has_active_connections() {
            return false;
        }

        let elapsed = Instant::now().duration_since(self.last_activity).as_secs();
        elapsed > inactive_timeout_secs
    }

    /// Answer one request frame. The reply carries the same operation and
    /// request id.
    #[instrument(level = "trace", skip(self, envelope), fields(operation = %envelope.operation, request_id = ?envelope.request_id))]
    pub fn handle(&mut self, envelope: &Envelope) -> Envelope {
        self.last_activity = Instant::now();

        let data = match envelope.operation {
            Operation::GetBalance => reply(&BalanceResponse {
                status: STATUS_OK.to_string(),
                balance: Some(self.balance),
            }),
            Operation::GameLoad => parse(envelope).map_or_else(|e| e, |req| reply(&self.game_load(req))),
            Operation::RoundEvents => {
                parse(envelope).map_or_else(|e| e, |req| reply(&self.round_event(req)))
            }
            Operation::PlaceBet => parse(envelope).map_or_else(|e| e, |req| reply(&self.place_bet(req))),
            Operation::Select => parse(envelope).map_or_else(|e| e, |req| reply(&self.select(req))),
        };

        Envelope {
            operation: envelope.operation,
            request_id: envelope.request_id,
            data,
        }
    }

    fn game_load(&mut self, request: GameLoadRequest) -> GameLoadResponse {
        let Some(round) = self.rounds.get(&request.table_id) else {
            debug!("No round on table {}", request.table_id);
            return GameLoadResponse {
                status: STATUS_NOT_FOUND.to_string(),
                ..Default::default()
            };
        };

        if !round.is_open() {
            debug!("Dropping closed round {} on table {}", round.id, request.table_id);
            self.rounds.remove(&request.table_id);
            return GameLoadResponse {
                status: STATUS_NOT_FOUND.to_string(),
                ..Default::default()
            };
        }

        info!("Resuming round {} at row {}", round.id, round.next_row());
        GameLoadResponse {
            status: STATUS_OK.to_string(),
            has_existing_game: Some(true),
            round_id: Some(round.id.clone()),
            current_row: Some(round.next_row()),
            bet_amount: round.bet,
            grid_option: Some(round.grid.option()),
            revealed_matrix: Some(round.revealed_matrix(false)),
            row_rewards: Some(round.grid.row_rewards()),
            completed_rows: Some(round.completed_rows()),
        }
    }

    fn round_event(&mut self, event: RoundEvent) -> RoundEventResponse {
        let event_type = Some(event.event_type().to_string());
        let response = match event {
            RoundEvent::Start { table_id } => self.start_round(table_id),
            RoundEvent::End {
                reason,
                round_id,
                table_id,
            } => self.end_round(reason, &round_id, &table_id),
        };

        RoundEventResponse {
            event_type,
            ..response
        }
    }

    fn start_round(&mut self, table_id: String) -> RoundEventResponse {
        if let Some(round) = self.rounds.get(&table_id)
            && round.is_open()
        {
            warn!("Round {} still open on table {}", round.id, table_id);
            return RoundEventResponse {
                status: STATUS_CONFLICT.to_string(),
                ..Default::default()
            };
        }

        let round = Round::new(nanoid!(), table_id.clone());
        info!("Opened round {} on table {}", round.id, table_id);
        let round_id = round.id.clone();
        self.rounds.insert(table_id, round);

        RoundEventResponse {
            status: STATUS_OK.to_string(),
            round_id: Some(round_id),
            ..Default::default()
        }
    }

    fn end_round(&mut self, reason: RoundEndReason, round_id: &str, table_id: &str) -> RoundEventResponse {
        let Some(round) = self.rounds.get(table_id).filter(|round| round.id == round_id) else {
            warn!("Round end for unknown round {} on table {}", round_id, table_id);
            return RoundEventResponse {
                status: STATUS_NO_ROUND.to_string(),
                ..Default::default()
            };
        };

        let reward = round.reward();
        if reason == RoundEndReason::MineHit && round.hit.is_none() {
            warn!("Round {} ended as mine hit without a hit mine", round.id);
        }
        let matrix = round.revealed_matrix(true);
        self.balance += reward;
        info!(
            "Round {} ended ({}), paid {}, balance {}",
            round_id, reason, reward, self.balance
        );
        self.rounds.remove(table_id);

        RoundEventResponse {
            status: STATUS_OK.to_string(),
            round_id: Some(round_id.to_string()),
            revealed_matrix: Some(matrix),
            reward: Some(reward),
            balance: Some(self.balance),
            ..Default::default()
        }
    }

    fn place_bet(&mut self, request: PlaceBetRequest) -> PlaceBetResponse {
        let rejected = |status: &str| PlaceBetResponse {
            status: status.to_string(),
            balance: None,
        };

        let grid = match request.grid_option.parse::<GridShape>() {
            Ok(grid) if grid.is_supported() => grid,
            _ => {
                warn!("Unsupported grid option {:?}", request.grid_option);
                return rejected(STATUS_BAD_REQUEST);
            }
        };
        let stake = match request.stake_amount.trim().parse::<f64>() {
            Ok(stake) if stake.is_finite() && stake > 0.0 => stake,
            _ => {
                warn!("Invalid stake {:?}", request.stake_amount);
                return rejected(STATUS_BAD_REQUEST);
            }
        };
        if stake > self.balance {
            warn!("Stake {} exceeds balance {}", stake, self.balance);
            return rejected(STATUS_NO_FUNDS);
        }

        let Some(round) = self
            .rounds
            .get_mut(&request.table_id)
            .filter(|round| round.id == request.round_id)
        else {
            return rejected(STATUS_NO_ROUND);
        };
        if round.is_betted() {
            return rejected(STATUS_CONFLICT);
        }

        round.place_bet(stake, grid, generate_mines(grid));
        self.balance -= stake;
        info!(
            "Bet {} on {} for round {}, balance {}",
            stake, grid, round.id, self.balance
        );

        PlaceBetResponse {
            status: STATUS_OK.to_string(),
            balance: Some(self.balance),
        }
    }

    fn select(&mut self, request: SelectRequest) -> SelectResponse {
        let rejected = |status: &str| SelectResponse {
            status: status.to_string(),
            ..Default::default()
        };

        let Some(round) = self
            .rounds
            .get_mut(&request.table_id)
            .filter(|round| round.id == request.round_id)
        else {
            return rejected(STATUS_NO_ROUND);
        };
        if !round.is_open() {
            return rejected(STATUS_CONFLICT);
        }
        if request.row != round.next_row() {
            warn!(
                "Pick on row {} but round {} is on row {}",
                request.row,
                round.id,
                round.next_row()
            );
            return rejected(STATUS_CONFLICT);
        }
        if request.col >= round.grid.cols {
            return rejected(STATUS_BAD_REQUEST);
        }

        let hit_mine = round.mines.get(request.row) == Some(&request.col);
        if hit_mine {
            info!("Round {} hit a mine at ({}, {})", round.id, request.row, request.col);
            round.hit = Some((request.row, request.col));
        } else {
            round.picks.push(request.col);
            debug!("Round {} cleared row {}", round.id, request.row);
        }

        SelectResponse {
            status: STATUS_OK.to_string(),
            revealed_matrix: Some(round.revealed_matrix(false)),
            reward: Some(round.reward()),
            hit_mine: Some(hit_mine),
        }
    }
}

fn parse<T: DeserializeOwned>(envelope: &Envelope) -> Result<T, Value> {
    serde_json::from_value(envelope.data.clone()).map_err(|e| {
        warn!("Invalid {} payload: {}", envelope.operation, e);
        rejected(STATUS_BAD_REQUEST)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower_common::models::CellState;

    const TABLE: &str = "STGMS101";

    fn call(player: &mut Player, operation: Operation, data: Value) -> Value {
        let response = player.handle(&Envelope {
            operation,
            request_id: Some(7),
            data,
        });
        assert_eq!(response.operation, operation);
        assert_eq!(response.request_id, Some(7));
        response.data
    }

    /// Open and bet a 3x6 round, then pin the mines to known columns.
    fn betted(player: &mut Player, stake: &str) -> String {
        let start = call(
            player,
            Operation::RoundEvents,
            json!({ "eventType": "round_start", "tableId": TABLE }),
        );
        assert_eq!(start["status"], STATUS_OK);
        assert_eq!(start["eventType"], "round_start");
        let round_id = start["roundId"].as_str().unwrap().to_string();

        let bet = call(
            player,
            Operation::PlaceBet,
            json!({ "tableId": TABLE, "roundId": round_id, "stakeAmount": stake, "gridOption": "3x6" }),
        );
        assert_eq!(bet["status"], STATUS_OK);

        player.rounds.get_mut(TABLE).unwrap().mines = vec![0, 0, 0, 0, 0, 0];
        round_id
    }

    fn select(player: &mut Player, round_id: &str, row: usize, col: usize) -> Value {
        call(
            player,
            Operation::Select,
            json!({ "tableId": TABLE, "roundId": round_id, "row": row, "col": col }),
        )
    }

    #[test]
    fn balance_is_reported() {
        let mut player = Player::new(50.0);
        let response = call(&mut player, Operation::GetBalance, json!({}));
        assert_eq!(response, json!({ "status": STATUS_OK, "balance": 50.0 }));
    }

    #[test]
    fn no_open_round_loads_as_not_found() {
        let mut player = Player::new(50.0);
        let response = call(&mut player, Operation::GameLoad, json!({ "tableId": TABLE }));
        assert_eq!(response["status"], STATUS_NOT_FOUND);
    }

    #[test]
    fn bet_above_balance_is_refused() {
        let mut player = Player::new(5.0);
        let start = call(
            &mut player,
            Operation::RoundEvents,
            json!({ "eventType": "round_start", "tableId": TABLE }),
        );
        let bet = call(
            &mut player,
            Operation::PlaceBet,
            json!({ "tableId": TABLE, "roundId": start["roundId"], "stakeAmount": "10", "gridOption": "3x6" }),
        );
        assert_eq!(bet["status"], STATUS_NO_FUNDS);
        assert_eq!(player.balance(), 5.0);
    }

    #[test]
    fn climbing_and_collecting_pays_row_reward() {
        let mut player = Player::new(100.0);
        let round_id = betted(&mut player, "10");
        assert_eq!(player.balance(), 90.0);

        for row in 0..2 {
            let response = select(&mut player, &round_id, row, 1);
            assert_eq!(response["hitMine"], false);
        }

        let end = call(
            &mut player,
            Operation::RoundEvents,
            json!({ "eventType": "round_end", "reason": "collect", "roundId": round_id, "tableId": TABLE }),
        );
        let expected = 10.0 * GridShape::new(3, 6).row_rewards()[1];
        assert_eq!(end["eventType"], "round_end");
        assert!((end["reward"].as_f64().unwrap() - expected).abs() < 1e-9);
        assert!((player.balance() - (90.0 + expected)).abs() < 1e-9);

        let matrix: Vec<Vec<CellState>> = serde_json::from_value(end["revealedMatrix"].clone()).unwrap();
        assert!(matrix.iter().all(|row| row[0] == CellState::Mine));
        assert!(player.round(TABLE).is_none());
    }

    #[test]
    fn mine_hit_pays_nothing() {
        let mut player = Player::new(100.0);
        let round_id = betted(&mut player, "10");
        select(&mut player, &round_id, 0, 2);

        let response = select(&mut player, &round_id, 1, 0);
        assert_eq!(response["hitMine"], true);
        assert_eq!(response["reward"], 0.0);
        assert_eq!(response["revealedMatrix"][1][0], "MINE_HIT");

        // No further picks once a mine went off.
        assert_eq!(select(&mut player, &round_id, 1, 1)["status"], STATUS_CONFLICT);

        let end = call(
            &mut player,
            Operation::RoundEvents,
            json!({ "eventType": "round_end", "reason": "mine_hit", "roundId": round_id, "tableId": TABLE }),
        );
        assert_eq!(end["reward"], 0.0);
        assert_eq!(player.balance(), 90.0);
    }

    #[test]
    fn picks_must_follow_row_order() {
        let mut player = Player::new(100.0);
        let round_id = betted(&mut player, "1");
        assert_eq!(select(&mut player, &round_id, 1, 1)["status"], STATUS_CONFLICT);
        assert_eq!(select(&mut player, &round_id, 0, 3)["status"], STATUS_BAD_REQUEST);
    }

    #[test]
    fn open_round_is_offered_for_resume() {
        let mut player = Player::new(100.0);
        let round_id = betted(&mut player, "2");
        select(&mut player, &round_id, 0, 1);
        select(&mut player, &round_id, 1, 2);

        let load = call(&mut player, Operation::GameLoad, json!({ "tableId": TABLE }));
        assert_eq!(load["status"], STATUS_OK);
        assert_eq!(load["hasExistingGame"], true);
        assert_eq!(load["roundId"], round_id.as_str());
        assert_eq!(load["completedRows"], 2);
        assert_eq!(load["gridOption"], "3x6");
        assert_eq!(load["betAmount"], 2.0);
        assert_eq!(load["rowRewards"][0], 1.47);

        let second_start = call(
            &mut player,
            Operation::RoundEvents,
            json!({ "eventType": "round_start", "tableId": TABLE }),
        );
        assert_eq!(second_start["status"], STATUS_CONFLICT);
    }

    #[test]
    fn malformed_payload_is_rejected() {
        let mut player = Player::new(100.0);
        let response = call(&mut player, Operation::Select, json!({ "row": "top" }));
        assert_eq!(response["status"], STATUS_BAD_REQUEST);
    }
}
