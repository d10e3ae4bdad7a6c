//! Bubble wall demo driver
//!
//! Runs a host wall and a crowd of guests over the in-process substrate,
//! or resolves a launch location into a role and room.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::seq::SliceRandom;

use bubble_wall::{
    BubbleColor, BubbleIcon, GuestSession, LaunchConfig, MessagePayload, MessageWall, RoomId,
    SimSubstrate, Surface, WallConfig,
};

#[derive(Parser)]
#[command(name = "bubble-wall", about = "Peer-to-peer message wall")]
struct Cli {
    /// JSON file overriding the default wall settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Host a wall and feed it messages from simulated guests
    Demo {
        /// Room to host; generated when omitted
        #[arg(long)]
        room: Option<String>,

        #[arg(long, default_value_t = 5)]
        guests: usize,

        /// Frames to run after the last message
        #[arg(long, default_value_t = 120)]
        frames: u64,

        #[arg(long, default_value_t = 1920.0)]
        width: f64,

        #[arg(long, default_value_t = 1080.0)]
        height: f64,
    },
    /// Resolve a location like `https://wall.example/?mode=host#room=ABC123`
    Launch { location: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => WallConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => WallConfig::default(),
    };

    match cli.command {
        Command::Demo {
            room,
            guests,
            frames,
            width,
            height,
        } => {
            let room = match room {
                Some(room) => room.parse::<RoomId>().context("Invalid --room")?,
                None => RoomId::generate(),
            };
            run_demo(config, room, guests, frames, Surface::new(width, height)).await
        }
        Command::Launch { location } => {
            let launch = LaunchConfig::from_location(&location);
            println!("{}", serde_json::to_string_pretty(&launch)?);
            Ok(())
        }
    }
}

async fn run_demo(config: WallConfig, room: RoomId, guests: usize, frames: u64, surface: Surface) -> Result<()> {
    let substrate = SimSubstrate::new();
    let wall = MessageWall::start(substrate.clone(), room.clone(), &config, surface)
        .await
        .context("Failed to start host")?;
    log::info!("Hosting room {}", room);

    for i in 0..guests {
        let guest = GuestSession::new(substrate.clone(), room.clone(), &config);
        if let Err(e) = guest.connect().await {
            log::warn!("Guest {} could not connect: {}", i, e);
            continue;
        }
        let (color, icon) = {
            let mut rng = rand::thread_rng();
            (
                *BubbleColor::ALL.choose(&mut rng).unwrap_or(&BubbleColor::Orange),
                *BubbleIcon::ALL.choose(&mut rng).unwrap_or(&BubbleIcon::Heart),
            )
        };
        let payload = MessagePayload::compose(
            &format!("Guest {}", i + 1),
            "",
            &format!("Hello from guest {}!", i + 1),
            color,
            icon,
        )?;
        if let Err(e) = guest.send_message(&payload).await {
            log::warn!("Guest {} could not send: {}", i, e);
        }
        guest.disconnect().await;
    }

    let frame = config.frame_interval();
    let target = wall.frames() + frames;
    while wall.frames() < target {
        tokio::time::sleep(frame).await;
    }
    // Let the last payloads land before the snapshot.
    tokio::time::sleep(Duration::from_millis(10)).await;

    let bubbles = wall.snapshot().await;
    println!("{}", serde_json::to_string_pretty(&bubbles)?);
    log::info!("{} / {} bubbles after {} frames", bubbles.len(), config.max_bubbles, wall.frames());

    wall.shutdown().await;
    Ok(())
}
