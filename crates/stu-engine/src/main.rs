//! TheStuu engine daemon
//!
//! Wires the realtime audio core, the plugin host, the session
//! orchestrator, and the wire gateway together, then serves until
//! interrupted. The UI process connects to the printed port.

use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use stu_audio::{AudioEngine, EngineConfig, OutputConfig};
use stu_config::{DataPaths, EngineSettings};
use stu_plugins::PluginHost;

#[derive(Debug, Parser)]
#[command(name = "thestuu-engine", about = "TheStuu core audio/session engine")]
struct Cli {
    /// User data root (defaults to the platform data directory)
    #[arg(long)]
    data_dir: Option<std::path::PathBuf>,

    /// Project to open (defaults to the configured default project)
    #[arg(long)]
    project: Option<String>,

    /// Gateway port override
    #[arg(long)]
    port: Option<u16>,

    /// Run without an audio device (null driver)
    #[arg(long)]
    headless: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,stu_audio=info,stu_session=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let paths = match &cli.data_dir {
        Some(dir) => DataPaths::under(dir),
        None => DataPaths::discover(),
    };
    paths.ensure().context("failed to create user data root")?;

    let mut settings = EngineSettings::load(&paths.config_path).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "config unreadable, using defaults");
        EngineSettings::default()
    });
    if let Some(port) = cli.port {
        settings.gateway.port = port;
    }
    let project_name = cli
        .project
        .clone()
        .unwrap_or_else(|| settings.default_project.clone());

    tracing::info!(
        data_root = %paths.root.display(),
        project = %project_name,
        "starting engine"
    );

    // Realtime core
    let engine_config = EngineConfig {
        output: OutputConfig {
            device_name: if cli.headless {
                None
            } else {
                settings.audio.device.clone()
            },
            sample_rate: settings.audio.sample_rate,
            block_size: settings.audio.block_size,
        },
        initial_bpm: 120,
        spill_dir: paths.root.join("spill"),
        allow_null_device: true,
    };
    let (engine, renderer) = AudioEngine::build(engine_config);
    // The device stream stays on this thread for its whole lifetime
    let output = if cli.headless {
        stu_audio::device::start_null_output(engine.output_config(), renderer)
    } else {
        stu_audio::device::start_output(engine.output_config(), renderer, true)
            .context("failed to start audio output")?
    };
    tracing::info!(backend = output.backend, "audio output running");

    // Plugin host thread, session worker, gateway
    let plugin_host = PluginHost::spawn();
    let (session, worker) = stu_session::spawn(engine.clone(), plugin_host, &paths, &project_name);

    let addr: SocketAddr = format!("{}:{}", settings.gateway.host, settings.gateway.port)
        .parse()
        .context("invalid gateway bind address")?;

    tokio::select! {
        result = stu_gateway::serve(session.clone(), addr) => {
            result.context("gateway server failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
        }
    }

    // Flush state and stop the workers in dependency order
    let _ = session
        .request(stu_proto::ClientRequest::ProjectSave {})
        .await;
    session.shutdown().await;
    let _ = worker.await;
    output.stop();

    Ok(())
}
