//! Bicameral - gateway server and offline tools

use bicameral::cli::{evaluate_consent, init_tracing, load_config, Cli, Commands, ServeArgs, TOKEN_ENV};
use bicameral_core::TemporalSpine;
use bicameral_gateway::{start_gateway, Gateway};
use bicameral_llm::{OllamaEngine, ReasoningEngine};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Serve(ServeArgs::default()));

    match command {
        Commands::Serve(args) => serve(&cli.config, args).await?,

        Commands::Pulse { count } => {
            let config = load_config(&cli.config);
            let spine = TemporalSpine::new(config.spine.drift_tolerance());
            for _ in 0..count {
                println!("{}", serde_json::to_string(&spine.pulse())?);
            }
        }

        Commands::Consent { text, output, system } => {
            let config = load_config(&cli.config);
            let decision = evaluate_consent(&config, &text, output.as_deref(), system);
            println!("{}", serde_json::to_string_pretty(&decision)?);
        }

        Commands::Config => print!("{}", load_config(&cli.config).to_toml()),

        Commands::Version => {
            println!("bicameral v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

async fn serve(config_path: &Path, args: ServeArgs) -> anyhow::Result<()> {
    let _log_guard = init_tracing(args.log_file.as_deref())?;
    let mut config = load_config(config_path);
    args.apply(&mut config, std::env::var(TOKEN_ENV).ok());

    let engine = Arc::new(OllamaEngine::from_config(&config.engine));
    let health = engine.health_check().await;
    if health.reachable {
        info!("Reasoning engine at {} ({} models)", engine.base_url(), health.models.len());
    } else {
        warn!(
            "Reasoning engine at {} unreachable: {}",
            engine.base_url(),
            health.error.unwrap_or_default()
        );
    }

    let gateway = Arc::new(Gateway::new(&config, engine));
    start_gateway(gateway).await
}
