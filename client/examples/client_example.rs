use std::sync::Arc;
use std::time::Duration;

use tower_client::{
    BalanceResponse, GameLoadRequest, GameLoadResponse, GetBalanceRequest, Operation,
    RequestClient, SocketTransport, TowerClient,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Create a client connecting to the server
    let client = TowerClient::new("http://localhost:8000")?;

    // Open a player session
    let session = client.create_session().await?;
    println!("Session created, starting balance {}", session.balance);

    // Get the WebSocket URL for the session
    let ws_url = client.websocket_url(&session.token)?;
    println!("Connecting to WebSocket: {}", ws_url);

    let transport = Arc::new(SocketTransport::connect(&ws_url).await?);
    let requests = RequestClient::new(transport.clone(), Duration::from_secs(5));

    // Ask for the balance
    let balance: BalanceResponse = requests
        .request(Operation::GetBalance, &GetBalanceRequest {})
        .await?;
    println!("Balance reply: {:?}", balance);

    // Check whether a round is still open on the default table
    let pending: GameLoadResponse = requests
        .request(
            Operation::GameLoad,
            &GameLoadRequest {
                table_id: "STGMS101".to_string(),
            },
        )
        .await?;
    println!(
        "Pending game: status {}, existing game {:?}",
        pending.status, pending.has_existing_game
    );

    transport.close().await;
    println!("Connection closed");

    Ok(())
}
