//! Command line interface

use bicameral_core::{
    AuthMode, BicameralConfig, BindMode, ConnectionRequest, ConsentDecision, TemporalSpine,
};
use bicameral_pipeline::{ConsentGate, PolicyTable};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

/// Environment variable consulted when no gateway token is configured.
pub const TOKEN_ENV: &str = "BICAMERAL_GATEWAY_TOKEN";

const DEFAULT_FILTER: &str = "bicameral=info,tower_http=info";

#[derive(Parser, Debug)]
#[command(name = "bicameral", about = "Bicameral - two-hemisphere reasoning gateway")]
pub struct Cli {
    /// TOML config file (missing or unreadable files fall back to defaults)
    #[arg(short, long, global = true, default_value = "bicameral.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the gateway server
    Serve(ServeArgs),
    /// Issue pulses from a fresh temporal spine
    Pulse {
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,
    },
    /// Evaluate the consent policy offline
    Consent {
        /// Request payload
        text: String,
        /// Candidate output to inspect along with the payload
        #[arg(long)]
        output: Option<String>,
        /// Mark the request as coming from SYSTEM
        #[arg(long)]
        system: bool,
    },
    /// Print the effective configuration as TOML
    Config,
    /// Show version
    Version,
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    #[arg(short, long)]
    pub port: Option<u16>,
    /// loopback or lan
    #[arg(short, long)]
    pub bind: Option<String>,
    #[arg(short, long)]
    pub token: Option<String>,
    #[arg(long)]
    pub no_auth: bool,
    /// Also write logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl ServeArgs {
    /// Flags win over the file; the environment token only fills a gap.
    pub fn apply(&self, config: &mut BicameralConfig, env_token: Option<String>) {
        let gateway = &mut config.gateway;
        if let Some(port) = self.port {
            gateway.port = port;
        }
        if let Some(bind) = &self.bind {
            gateway.bind = BindMode::parse(bind);
        }
        if let Some(token) = &self.token {
            gateway.auth.token = Some(token.clone());
        }
        if gateway.auth.token.is_none() {
            gateway.auth.token = env_token.filter(|t| !t.is_empty());
        }
        if self.no_auth {
            gateway.auth.mode = AuthMode::None;
        }
    }
}

pub fn load_config(path: &Path) -> BicameralConfig {
    BicameralConfig::load(path)
}

/// Console logging, plus a non-blocking file layer when `log_file` is set.
/// Keep the returned guard alive for the life of the process.
pub fn init_tracing(log_file: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into())
    };

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path.parent().filter(|d| !d.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("invalid log file path: {}", path.display()))?;
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(filter()))
        .with(file_layer)
        .try_init()?;
    Ok(guard)
}

/// Consent decision for `text` under the configured policy.
pub fn evaluate_consent(
    config: &BicameralConfig,
    text: &str,
    output: Option<&str>,
    system: bool,
) -> ConsentDecision {
    let gate = ConsentGate::new(
        PolicyTable::from_config(&config.consent),
        Arc::new(TemporalSpine::new(config.spine.drift_tolerance())),
    );
    let mut request = ConnectionRequest::new("cli", "cli", text);
    if system {
        request = request.with_context("source", "SYSTEM");
    }
    match output {
        Some(output) => gate.authorize_text(&request, output),
        None => gate.screen(&request),
    }
}
