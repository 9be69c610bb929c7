use anyhow::{bail, Context};
use axum::{
    routing::{get, post},
    Router,
};
use pramaan_core::{logging, PramaanConfig};
use pramaan_crypto::{setup, VerifyingParameters, PROVING_KEY_FILE, VERIFYING_KEY_FILE};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;

mod error;
mod handlers;
mod state;

use state::AppState;

const NODE_PROTOCOL_VERSION: u32 = 1;
const NODE_RUNTIME_VERSION: u32 = 1;

#[derive(Debug, Serialize)]
struct NodeVersionHandshake {
    version: &'static str,
    runtime_version: u32,
    protocol_version: u32,
}

#[derive(Debug, PartialEq)]
enum Command {
    VersionJson,
    Setup { out: PathBuf },
    Serve { config: Option<PathBuf> },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match parse_command(&args)? {
        Command::VersionJson => {
            let handshake = NodeVersionHandshake {
                version: env!("CARGO_PKG_VERSION"),
                runtime_version: NODE_RUNTIME_VERSION,
                protocol_version: NODE_PROTOCOL_VERSION,
            };
            println!("{}", serde_json::to_string(&handshake)?);
            Ok(())
        }
        Command::Setup { out } => {
            logging::init();
            run_setup(out).await
        }
        Command::Serve { config } => serve(config).await,
    }
}

pub(crate) fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/v1/enrollments", post(handlers::enroll))
        .route("/v1/enrollments/revoke", post(handlers::revoke))
        .route("/v1/challenges", post(handlers::issue_challenge))
        .route("/v1/attendance", post(handlers::submit_attendance))
        .route("/v1/attendance/:proof_id", get(handlers::get_attendance))
        .route(
            "/v1/attendance/:proof_id/override",
            post(handlers::override_attendance),
        )
        .route(
            "/v1/scholars/:scholar_id/attendance",
            get(handlers::scholar_attendance),
        )
        .route(
            "/v1/organizations/:organization_id/attendance",
            get(handlers::organization_attendance),
        )
        .with_state(state)
}

async fn serve(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = match &config_path {
        Some(path) => PramaanConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => PramaanConfig::default(),
    };
    logging::init_with(config.logging.json);

    let secrets = PramaanConfig::secrets_from_env()?;
    let params = VerifyingParameters::load(&config.keys.verifying_key_path).with_context(|| {
        format!(
            "loading verifying key from {} (run `pramaan-node setup --out <dir>` first)",
            config.keys.verifying_key_path.display()
        )
    })?;

    let bind_addr = config.server.bind_addr.clone();
    let sweep_every = Duration::from_secs(config.attendance.sweep_interval_secs);
    let state = Arc::new(AppState::open(config, &secrets, params)?);
    let sweeper = state.attendance.spawn_sweeper(sweep_every);

    let app = router(state);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {}", bind_addr))?;
    info!(bind_addr = %bind_addr, "pramaan-node listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    sweeper.abort();
    info!("pramaan-node stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Circuit-specific setup. Writes the proving key for clients and the
/// verifying key for servers.
async fn run_setup(out: PathBuf) -> anyhow::Result<()> {
    std::fs::create_dir_all(&out).with_context(|| format!("creating {}", out.display()))?;
    let (proving, verifying) =
        tokio::task::spawn_blocking(|| setup(&mut rand::rngs::OsRng)).await??;

    let pk_path = out.join(PROVING_KEY_FILE);
    let vk_path = out.join(VERIFYING_KEY_FILE);
    proving.save(&pk_path)?;
    verifying.save(&vk_path)?;
    info!(
        key_id = %verifying.key_id(),
        proving_key = %pk_path.display(),
        verifying_key = %vk_path.display(),
        "Wrote attendance circuit keys"
    );
    Ok(())
}

fn parse_command(args: &[String]) -> anyhow::Result<Command> {
    if args.iter().any(|arg| arg == "--version-json") {
        return Ok(Command::VersionJson);
    }

    let mut args_iter = args.iter();
    if args.first().map(String::as_str) == Some("setup") {
        args_iter.next();
        while let Some(arg) = args_iter.next() {
            if arg == "--out" {
                if let Some(path) = args_iter.next() {
                    return Ok(Command::Setup {
                        out: PathBuf::from(path),
                    });
                }
                bail!("--out was provided without a path");
            }
        }
        bail!("missing required --out <dir> argument");
    }

    while let Some(arg) = args_iter.next() {
        match arg.as_str() {
            "--config" => match args_iter.next() {
                Some(path) => {
                    return Ok(Command::Serve {
                        config: Some(PathBuf::from(path)),
                    })
                }
                None => bail!("--config was provided without a path"),
            },
            other => bail!("unrecognized argument: {}", other),
        }
    }
    Ok(Command::Serve { config: None })
}
