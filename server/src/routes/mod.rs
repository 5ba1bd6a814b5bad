use std::{env, sync::Arc};

use dashmap::Entry;
use nanoid::nanoid;
use rocket::{
    State,
    futures::{SinkExt, StreamExt},
    get,
    http::Status,
    post,
    serde::json::Json,
};
use rocket_ws::{Channel, Message, WebSocket};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use tower_common::{models::CreateSessionResponse, protocol::Envelope};

use crate::{
    logic::{Player, Players},
    rate_limit::{ClientIp, RateLimiter, check_rate_limit},
};

fn starting_balance() -> f64 {
    env::var("STARTING_BALANCE")
        .unwrap_or_else(|_| "1000".to_string())
        .parse()
        .unwrap_or(1000.0)
}

#[instrument(level = "trace", skip(players, player))]
fn add_player(players: &Players, player: Player) -> String {
    let mut token_length = 21;
    let max_attempts_per_length = 10;

    loop {
        for _ in 0..max_attempts_per_length {
            let token = nanoid!(token_length);
            match players.entry(token.clone()) {
                Entry::Occupied(_) => {
                    debug!("Session token collision, trying another");
                    continue;
                }
                Entry::Vacant(entry) => {
                    entry.insert(Arc::new(Mutex::new(player)));
                    info!("Created new player session");
                    return token;
                }
            }
        }

        warn!(
            "Exhausted token attempts at length {}, increasing to {}",
            token_length,
            token_length + 1
        );
        token_length += 1;
    }
}

#[post("/session")]
#[instrument(level = "trace", skip(players, rate_limiter), fields(client_ip = %client_ip.0))]
pub fn create_session(
    players: &State<Players>,
    rate_limiter: &State<RateLimiter>,
    client_ip: ClientIp,
) -> Result<Json<CreateSessionResponse>, Status> {
    info!("Session request from {}", client_ip.0);

    if let Err(status) = check_rate_limit(rate_limiter, &client_ip) {
        warn!("Rate limit exceeded for client {}", client_ip.0);
        return Err(status);
    }

    let balance = starting_balance();
    let token = add_player(players, Player::new(balance));

    info!("Successfully created session for client {}", client_ip.0);
    Ok(Json(CreateSessionResponse { token, balance }))
}

#[get("/ws?<token>")]
#[instrument(level = "trace", skip(ws, players, token))]
pub fn websocket_handler(
    ws: WebSocket,
    players: &State<Players>,
    token: String,
) -> Result<Channel<'static>, Status> {
    let player = match players.get(&token) {
        None => {
            warn!("WebSocket connection attempt with unknown session token");
            return Err(Status::Unauthorized);
        }
        Some(value) => value.value().clone(),
    };

    Ok(ws.channel(move |stream| {
        Box::pin(async move {
            let (mut write, mut read) = stream.split();

            let connection_id = player.lock().await.add_connection();
            info!("Client connected (connection: {})", connection_id);

            while let Some(message) = read.next().await {
                match message {
                    Ok(Message::Text(text)) => match serde_json::from_str::<Envelope>(&text) {
                        Ok(request) => {
                            debug!(
                                "Received {} request {:?} on {}",
                                request.operation, request.request_id, connection_id
                            );
                            let response = player.lock().await.handle(&request);
                            match serde_json::to_string(&response) {
                                Ok(json) => {
                                    if let Err(e) = write.send(Message::Text(json)).await {
                                        error!("Failed to send on {}: {}", connection_id, e);
                                        break;
                                    }
                                }
                                Err(e) => warn!("Failed to serialize response: {}", e),
                            }
                        }
                        Err(e) => {
                            warn!(
                                "Invalid message format on {}: {} - Error: {}",
                                connection_id, text, e
                            );
                        }
                    },
                    Ok(Message::Close(_)) => {
                        info!("WebSocket connection closed (connection: {})", connection_id);
                        break;
                    }
                    Err(e) => {
                        error!("WebSocket error on {}: {}", connection_id, e);
                        break;
                    }
                    _ => {
                        debug!("Received non-text message on {}, ignoring", connection_id);
                    }
                }
            }

            player.lock().await.remove_connection(&connection_id);
            info!("Client disconnected (connection: {})", connection_id);
            Ok(())
        })
    }))
}
