use std::sync::Arc;

use tower_client::{
    BoardAdapter, ClickOutcome, ClientConfig, GameError, GameEvent, GridShape, NullShell,
    TowerGame, UiGate,
};

/// Board that prints what it would draw.
struct ConsoleBoard {
    grid: GridShape,
}

impl BoardAdapter for ConsoleBoard {
    fn set_row_pressed(&self, row: usize, pressed: bool) {
        println!("  row {} pressed: {}", row, pressed);
    }

    fn set_row_green_overlay(&self, row: usize, visible: bool) {
        if visible {
            println!("  ▶ row {} is now playable", row);
        }
    }

    fn add_green_flag(&self, row: usize, col: usize) {
        println!("  🚩 ({}, {})", row, col);
    }

    fn add_mine_overlay(&self, row: usize, col: usize) {
        println!("  💥 ({}, {})", row, col);
    }

    fn add_bomb_overlay(&self, row: usize, col: usize) {
        println!("  💣 ({}, {})", row, col);
    }

    fn revert_cell_overlay(&self, _row: usize, _col: usize) {}

    fn play_blast_animation(&self, _row: usize, _col: usize) {}

    fn reset_grid(&self) {
        println!("  board cleared");
    }

    fn dimensions(&self) -> GridShape {
        self.grid
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let config = ClientConfig::from_env();
    let board = Arc::new(ConsoleBoard {
        grid: GridShape::default(),
    });
    let game = TowerGame::connect(config, board, Arc::new(UiGate::new()), Arc::new(NullShell)).await?;

    // Spawn background task to handle events
    let mut event_receiver = game.subscribe_to_events();
    let event_handler = tokio::spawn(async move {
        while let Some(event) = event_receiver.recv().await {
            match event {
                GameEvent::BalanceChanged { balance } => println!("💰 Balance: {:.2}", balance),
                GameEvent::GameStarted => println!("🎮 Round started"),
                GameEvent::GameEnded => println!("🏁 Round over"),
                GameEvent::RestoreComplete => println!("♻️  Previous round restored"),
                _ => {}
            }
        }
    });

    let outcome = game.boot().await?;
    println!("Boot: {:?}", outcome);

    if !game.store().game_started() {
        game.set_stake(1.0)?;
        game.start().await?;
    }

    // Always pick the first column and collect after three rows
    let mut climbed = 0;
    loop {
        let row = game.store().current_row();
        match game.click(row, 0).await {
            Ok(ClickOutcome::Advanced { next_row, reward }) => {
                climbed += 1;
                println!("Safe! Next row {}, reward {:.2}", next_row, reward);
                if climbed == 3 {
                    let collected = game.collect().await?;
                    println!("🎉 Collected {:.2}", collected);
                    break;
                }
            }
            Ok(ClickOutcome::TopReached { reward }) => {
                println!("🎉 Reached the top, won {:.2}", reward);
                break;
            }
            Ok(ClickOutcome::MineHit { row, col }) => {
                println!("💣 Mine at ({}, {})", row, col);
                break;
            }
            Err(GameError::Timeout { operation }) => {
                println!("{} timed out, retrying", operation);
            }
            Err(e) => return Err(e.into()),
        }
    }

    game.disconnect().await;
    event_handler.abort();

    Ok(())
}
