//! Two scripted bots fight a duel over an in-process store while an
//! observer prints the combat log.
//!
//! ```text
//! cargo run -p local-duel [config.json]
//! ```
//!
//! The optional JSON file holds a partial `RoomConfig`; missing fields
//! take their defaults.

use std::sync::Arc;
use std::time::Duration;

use manaduel::prelude::*;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Bots
// ---------------------------------------------------------------------------

/// Picks an allocation from the bot's current mana.
type Strategy = fn(u32) -> RawAllocation;

fn berserker(mana: u32) -> RawAllocation {
    RawAllocation::new(i64::from(mana), 0, 0, 0)
}

fn turtle(mana: u32) -> RawAllocation {
    let half = i64::from(mana / 2);
    RawAllocation::new(half, half, 0, i64::from(mana) - 2 * half)
}

/// Resubmits once per plan phase until the duel ends.
async fn play(room: Arc<RoomController<MemoryStore, SystemClock>>, strategy: Strategy) {
    let Ok(mut watch) = room.watch().await else {
        return;
    };
    let me = room.participant_id().clone();
    let mut planned = 0;
    while let Some(snapshot) = watch.next().await {
        if snapshot.is_finished() {
            break;
        }
        let Some(tick) = snapshot.tick else { continue };
        if snapshot.phase() != Some(Phase::Plan) || tick.round == planned {
            continue;
        }
        let Some(mana) = snapshot.participants.get(&me).map(|p| p.mana) else {
            continue;
        };
        match room.submit(&strategy(mana)).await {
            Ok(allocation) => {
                planned = tick.round;
                info!(participant = %me, round = tick.round, ?allocation, "submitted");
            }
            Err(e) => warn!(participant = %me, error = %e, "submit failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn load_config() -> Result<RoomConfig, Box<dyn std::error::Error>> {
    match std::env::args().nth(1) {
        Some(path) => Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?),
        None => Ok(RoomConfig {
            plan_duration_ms: 1_500,
            ..RoomConfig::default()
        }),
    }
}

async fn connect(
    backend: &MemoryBackend,
    id: &str,
    config: &RoomConfig,
) -> Result<DuelClient<MemoryStore>, DuelError> {
    DuelClient::builder(backend.client())
        .participant(id)
        .config(config.clone())
        .connect()
        .await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let config = load_config()?;
    let backend = MemoryBackend::new();

    let red = connect(&backend, "red", &config).await?;
    let blue = connect(&backend, "blue", &config).await?;
    let crowd = connect(&backend, "crowd", &config).await?;

    let (red_room, _) = red.join("pit", "Red", JoinRole::Fighter).await?;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let (blue_room, _) = blue.join("pit", "Blue", JoinRole::Fighter).await?;
    let (crowd_room, seat) = crowd.join("pit", "Crowd", JoinRole::Observer).await?;
    info!(?seat, "observer seated");

    red_room.start().await?;

    let red_bot = tokio::spawn(play(red_room.clone(), berserker));
    let blue_bot = tokio::spawn(play(blue_room.clone(), turtle));
    let red_driver = red.drive(&red_room);
    let blue_driver = blue.drive(&blue_room);

    let mut watch = crowd_room.watch().await?;
    let mut printed = 0;
    while let Some(snapshot) = watch.next().await {
        for entry in snapshot.log.values().skip(printed) {
            println!("{}", entry.summary);
        }
        printed = snapshot.log.len();
        if snapshot.is_finished() {
            break;
        }
    }

    let winner = red_driver.finished().await;
    match winner {
        Some(Winner::Draw) => println!("The duel ends in a draw."),
        Some(Winner::Participant(id)) => println!("{id} wins the duel."),
        None => println!("The duel was abandoned."),
    }

    let stats = blue_driver.shutdown().await.ok();
    info!(?stats, "blue driver stats");
    red_bot.abort();
    blue_bot.abort();

    red.disconnect().await?;
    blue.disconnect().await?;
    crowd.disconnect().await?;
    Ok(())
}
