use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{RevealedMatrix, STATUS_OK};

/// Operation names multiplexed over the game socket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    #[serde(rename = "getbalance")]
    GetBalance,
    #[serde(rename = "minesweeper_game_load")]
    GameLoad,
    #[serde(rename = "round_events")]
    RoundEvents,
    #[serde(rename = "placebet")]
    PlaceBet,
    #[serde(rename = "minesweeper_select")]
    Select,
}

impl Operation {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Operation::GetBalance => "getbalance",
            Operation::GameLoad => "minesweeper_game_load",
            Operation::RoundEvents => "round_events",
            Operation::PlaceBet => "placebet",
            Operation::Select => "minesweeper_select",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Frame sent in both directions. The server echoes `requestId` back so the
/// client can pair a response with the request that produced it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub operation: Operation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Envelope {
    pub fn new<T: Serialize>(
        operation: Operation,
        request_id: Option<u64>,
        data: &T,
    ) -> serde_json::Result<Self> {
        Ok(Self {
            operation,
            request_id,
            data: serde_json::to_value(data)?,
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct GetBalanceRequest {}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameLoadRequest {
    pub table_id: String,
}

/// Why a round is being closed.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundEndReason {
    #[serde(rename = "mine_hit")]
    MineHit,
    #[serde(rename = "collect")]
    Collect,
    #[serde(rename = "last_row")]
    LastRow,
}

impl fmt::Display for RoundEndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RoundEndReason::MineHit => "mine_hit",
            RoundEndReason::Collect => "collect",
            RoundEndReason::LastRow => "last_row",
        })
    }
}

/// Payload of the shared `round_events` operation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "eventType", rename_all_fields = "camelCase")]
pub enum RoundEvent {
    #[serde(rename = "round_start")]
    Start { table_id: String },
    #[serde(rename = "round_end")]
    End {
        reason: RoundEndReason,
        round_id: String,
        table_id: String,
    },
}

impl RoundEvent {
    /// Value of the `eventType` tag, echoed back by the server.
    pub const fn event_type(&self) -> &'static str {
        match self {
            RoundEvent::Start { .. } => "round_start",
            RoundEvent::End { .. } => "round_end",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlaceBetRequest {
    pub table_id: String,
    pub round_id: String,
    pub stake_amount: String,
    pub grid_option: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SelectRequest {
    pub table_id: String,
    pub round_id: String,
    pub row: usize,
    pub col: usize,
}

/// Common accessor over every response payload.
pub trait StatusResponse {
    fn status(&self) -> &str;

    fn is_ok(&self) -> bool {
        self.status() == STATUS_OK
    }
}

macro_rules! status_response {
    ($($ty:ty),*) => {
        $(impl StatusResponse for $ty {
            fn status(&self) -> &str {
                &self.status
            }
        })*
    };
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct BalanceResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct GameLoadResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_existing_game: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_row: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bet_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grid_option: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revealed_matrix: Option<RevealedMatrix>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_rewards: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_rows: Option<usize>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct RoundEventResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revealed_matrix: Option<RevealedMatrix>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct PlaceBetResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct SelectResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revealed_matrix: Option<RevealedMatrix>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hit_mine: Option<bool>,
}

status_response!(
    BalanceResponse,
    GameLoadResponse,
    RoundEventResponse,
    PlaceBetResponse,
    SelectResponse
);
