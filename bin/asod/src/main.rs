//! ---
//! aso_section: "05-daemon"
//! aso_subsection: "binary"
//! aso_type: "source"
//! aso_scope: "code"
//! aso_description: "Binary entrypoint for the observatory daemon."
//! aso_version: "v0.0.0-prealpha"
//! aso_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use aso_common::{init_tracing, AppConfig};
use aso_logging::{aso_info, LogContext};
use aso_metrics::{new_registry, spawn_http_server, DaemonMetrics, MetricsServer};
use aso_telemetry::{
    BridgePolicy, BridgeReplay, GeneratorTask, Observatory, OperatorRole, Sample,
    TelemetryMetrics, TelemetryView,
};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{info, warn};

mod operator;
mod simulate;

use operator::{render_sample, OperatorConsole, Reply};
use simulate::SimulateArgs;

#[derive(Debug, Parser)]
#[command(
    author,
    version = concat!("asod ", env!("CARGO_PKG_VERSION")),
    about = "Alignment safety observatory daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", global = true, help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the generator, operator console, and exporters")]
    Run(RunArgs),
    #[command(about = "Run a seeded offline simulation and export the samples")]
    Simulate(SimulateArgs),
}

#[derive(Debug, Clone, Default, Args)]
struct RunArgs {
    /// Ignore configuration files and use built-in defaults
    #[arg(long)]
    defaults: bool,

    /// Read operator commands from stdin
    #[arg(long)]
    operator_stdin: bool,

    /// Replay hardware bridge events from a newline-delimited JSON file
    #[arg(long, value_name = "FILE")]
    bridge_events: Option<PathBuf>,

    /// Role recorded for console commands
    #[arg(long, default_value_t = OperatorRole::Operator)]
    role: OperatorRole,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Run(RunArgs::default())) {
        Commands::Run(args) => run_daemon(cli.config, args).await,
        Commands::Simulate(args) => simulate::run(&args),
    }
}

fn load_config(explicit: Option<PathBuf>, defaults: bool) -> Result<AppConfig> {
    if defaults {
        return Ok(AppConfig::default());
    }
    let mut candidates = Vec::new();
    if let Some(path) = explicit {
        candidates.push(path);
    }
    candidates.push(PathBuf::from("configs/asod.toml"));
    candidates.push(PathBuf::from("/etc/aso/asod.toml"));
    let loaded = AppConfig::load_with_source(&candidates)?;
    info!(source = %loaded.source.display(), "configuration file selected");
    Ok(loaded.config)
}

async fn run_daemon(config_path: Option<PathBuf>, args: RunArgs) -> Result<()> {
    let load_started = Instant::now();
    let config = load_config(config_path, args.defaults)?;
    let load_duration = load_started.elapsed();
    init_tracing("asod", &config.logging)?;

    let mut builder = Observatory::builder().config(&config);
    let mut metrics_server: Option<MetricsServer> = None;
    if config.metrics.enabled {
        let registry = new_registry();
        let daemon_metrics = DaemonMetrics::new(Arc::clone(&registry))?;
        daemon_metrics.inc_start();
        daemon_metrics.observe_config_load(load_duration.as_secs_f64());
        daemon_metrics.set_build_info(
            env!("CARGO_PKG_VERSION"),
            if cfg!(debug_assertions) { "debug" } else { "release" },
        );
        let telemetry_metrics = TelemetryMetrics::register(&registry)
            .context("failed to register telemetry metrics")?;
        builder = builder.metrics(telemetry_metrics);
        metrics_server = Some(spawn_http_server(registry, config.metrics.listen)?);
    } else {
        info!("metrics exporter disabled by configuration");
    }
    let observatory = builder.build();

    let view = TelemetryView::attach_with(
        &observatory,
        config.view.window,
        Some(Arc::new(|sample: &Arc<Sample>| {
            aso_info!(
                context = LogContext::new()
                    .with_status(sample.status().as_str())
                    .with_origin(sample.origin().as_str()),
                "{}",
                render_sample(sample)
            );
        })),
    );

    let generator = if config.generator.enabled {
        Some(GeneratorTask::spawn(
            Arc::clone(&observatory),
            config.generator.interval,
        ))
    } else {
        warn!("generator disabled by configuration; only overrides will publish");
        None
    };

    let bridge_file = match (&args.bridge_events, config.bridge.enabled) {
        (Some(path), true) => Some(path.clone()),
        (Some(path), false) => {
            warn!(file = %path.display(), "bridge disabled by configuration; ignoring event file");
            None
        }
        (None, _) => None,
    };
    let bridge = bridge_file.map(|path| {
        BridgeReplay::spawn(
            path,
            BridgePolicy::from_config(&config.bridge),
            Arc::clone(&observatory),
        )
    });

    info!(status = %observatory.status(), role = %args.role, "observatory running; waiting for termination signal");
    if args.operator_stdin {
        let console = OperatorConsole::new(&observatory, &view, args.role);
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        println!("{}", operator::HELP);
        loop {
            tokio::select! {
                result = signal::ctrl_c() => {
                    result?;
                    info!("ctrl-c received; shutting down");
                    break;
                }
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        info!("operator input closed; shutting down");
                        break;
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    match console.handle_line(&line) {
                        Reply::Text(text) => println!("{}", text),
                        Reply::Quit => break,
                    }
                }
            }
        }
    } else {
        signal::ctrl_c().await?;
        info!("ctrl-c received; shutting down");
    }

    if let Some(generator) = generator {
        let ticks = generator.shutdown().await?;
        info!(ticks, "generator stopped");
    }
    if let Some(bridge) = bridge {
        match bridge.shutdown().await {
            Ok(actions) => info!(applied = actions.len(), "bridge replay stopped"),
            Err(err) => warn!(error = %err, "bridge replay aborted"),
        }
    }
    view.detach();
    if let Some(server) = metrics_server {
        server.shutdown().await?;
    }
    info!(published = observatory.bus().published(), "observatory stopped");
    Ok(())
}
