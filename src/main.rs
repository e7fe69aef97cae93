use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use deeptime_core::{SimulationEngine, TurnCommand};
use deeptime_io::Database;
use deeptime_lib::model::config::AppConfig;
use deeptime_lib::server::{serve, AppState};
use deeptime_net::{EmbeddingProvider, EmbeddingService, ModelRouter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Mode to run in
    #[arg(short, long, value_enum, default_value = "serve")]
    mode: Mode,

    /// Custom config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Headless mode: number of natural-evolution turns to run
    #[arg(long, default_value_t = 10)]
    turns: u32,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum Mode {
    Serve,
    Headless,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = AppConfig::load(&args.config);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("deeptime={}", config.log.level)),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db = Database::open(&config.database_url)?;
    deeptime_io::seed_world(
        &db,
        config.world.map_seed,
        config.world.map_width,
        config.world.map_height,
    )?;

    let router = config.router_config().map(|rc| Arc::new(ModelRouter::new(rc)));
    let embeddings = Arc::new(match config.embedding.provider.as_str() {
        "openai" | "remote" => EmbeddingService::new(
            EmbeddingProvider::Remote {
                base_url: config
                    .embedding
                    .base_url
                    .clone()
                    .unwrap_or_else(|| "https://api.openai.com".to_string()),
                api_key: config.embedding.api_key.clone(),
                model: config.embedding.model.clone(),
            },
            Some(config.embedding.cache_dir.clone().into()),
        ),
        _ => EmbeddingService::new(
            EmbeddingProvider::Local,
            Some(config.embedding.cache_dir.clone().into()),
        ),
    });

    let engine = Arc::new(SimulationEngine::new(
        db,
        router,
        embeddings,
        config.sim_config(),
    ));

    match args.mode {
        Mode::Serve => {
            let state = Arc::new(AppState::new(engine, config));
            serve(state).await?;
        }
        Mode::Headless => {
            tracing::info!(turns = args.turns, "running headless simulation");
            for _ in 0..args.turns {
                let reports = engine
                    .run_turn(TurnCommand {
                        rounds: 1,
                        pressures: vec![deeptime_data::PressureSpec {
                            kind: deeptime_data::PressureKind::NaturalEvolution,
                            intensity: 0.0,
                            region: None,
                            narrative: None,
                        }],
                    })
                    .await?;
                for report in &reports {
                    println!(
                        "turn {:>3}: {:>3} species | {}",
                        report.turn_index,
                        report.species.len(),
                        report.narrative
                    );
                }
                if engine.db.species().count_alive()? == 0 {
                    println!("The world has gone silent.");
                    break;
                }
            }
        }
    }
    Ok(())
}
