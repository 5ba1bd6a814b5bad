use dashmap::DashMap;
use rocket::{
    Build, Rocket,
    fairing::{Fairing, Info, Kind},
    routes,
};
use std::sync::Arc;
use tower_server::{
    cleanup::start_cleanup_task,
    cors::create_cors,
    logic::Players,
    rate_limit::create_rate_limiter,
    routes::{create_session, websocket_handler},
};
use tracing::{error, info, warn};

struct CleanupFairing;

#[rocket::async_trait]
impl Fairing for CleanupFairing {
    fn info(&self) -> Info {
        Info {
            name: "Cleanup Task",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        if let Some(players) = rocket.state::<Players>() {
            info!("Starting cleanup task for player sessions");
            let players_for_cleanup = players.clone();
            tokio::spawn(async move {
                start_cleanup_task(players_for_cleanup).await;
            });
        } else {
            warn!("Failed to get player state for cleanup task");
        }
        Ok(rocket)
    }
}

#[rocket::launch]
fn rocket() -> Rocket<Build> {
    tracing_subscriber::fmt::init();
    info!("🚀 Starting Tower Mines server");

    let players: Players = Arc::new(DashMap::new());
    let rate_limiter = create_rate_limiter();

    info!("📊 Initialized player storage and rate limiter");

    let mut rocket = rocket::build()
        .attach(CleanupFairing)
        .manage(players)
        .manage(rate_limiter)
        .mount("/", routes![create_session, websocket_handler]);

    match create_cors() {
        Ok(cors) => rocket = rocket.attach(cors),
        Err(e) => error!("Invalid CORS configuration, serving without CORS: {}", e),
    }

    info!("📡 Endpoints: POST /session, GET /ws");

    rocket
}
