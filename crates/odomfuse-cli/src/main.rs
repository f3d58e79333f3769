//! `odomfuse` – command line entry point for the pose fusion node.
//!
//! ```text
//! odomfuse run [--port 9090]     serve rosbridge clients and fuse live samples
//! odomfuse replay samples.jsonl  fuse a recorded sample file, fused poses on stdout
//! odomfuse schema                JSON schemas of the sample types
//! odomfuse config show|init      inspect or create ~/.odomfuse/config.toml
//! ```
//!
//! Logs go to stderr (`RUST_LOG`, `ODOMFUSE_LOG_FORMAT=json`).

mod config;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use odomfuse_middleware::{
    BusSampleSource, EventBus, OdometryAdapter, RosbridgeCodec, TransformBroadcaster, WsBridge,
};
use odomfuse_perception::FusionEngine;
use odomfuse_runtime::{
    JsonLinesSink, JsonLinesSource, MaintenanceStats, SharedFrameTree, TransformFanout,
    TransformMaintenance,
};
use odomfuse_types::{FuseError, FusedPoseSample, InboundSample};
use schemars::schema_for;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::warn;

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "odomfuse", version)]
#[command(about = "Drift-corrected odometry: fuses raw odometry with map corrections")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the rosbridge WebSocket endpoint and fuse live samples.
    Run {
        /// Overrides `ws_port` from the configuration.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Fuse a JSON-lines file of tagged samples; fused poses go to stdout.
    Replay {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Print the JSON schemas of inbound and fused samples.
    Schema,
    /// Inspect or create the configuration file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, PartialEq)]
enum ConfigAction {
    /// Print the effective configuration.
    Show,
    /// Write the default configuration file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = odomfuse_runtime::init_tracing("odomfuse");

    let result = match cli.command {
        Command::Run { port } => config::load_effective().and_then(|cfg| run(cfg, port)),
        Command::Replay { file } => config::load_effective().and_then(|cfg| replay(&cfg, &file)),
        Command::Schema => print_schemas(),
        Command::Config { action } => config_command(action),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn tokio_runtime() -> Result<tokio::runtime::Runtime, FuseError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| FuseError::Transport(format!("failed to start async runtime: {e}")))
}

// ─────────────────────────────────────────────────────────────────────────────
// run
// ─────────────────────────────────────────────────────────────────────────────

fn run(cfg: Config, port: Option<u16>) -> Result<(), FuseError> {
    let shutdown = Arc::new(Notify::new());
    let on_ctrlc = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        on_ctrlc.notify_one();
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler; Ctrl-C will exit without a summary");
    }

    let port = port.unwrap_or(cfg.ws_port);
    tokio_runtime()?.block_on(serve(cfg, port, shutdown))
}

async fn serve(cfg: Config, port: u16, shutdown: Arc<Notify>) -> Result<(), FuseError> {
    let bus = Arc::new(EventBus::new(cfg.bus_capacity));
    let adapter = Arc::new(OdometryAdapter::new(Arc::clone(&bus)));
    let tree = SharedFrameTree::new();
    let targets: Vec<Arc<dyn TransformBroadcaster>> =
        vec![adapter.clone(), Arc::new(tree.clone())];

    let mut node = TransformMaintenance::new(
        FusionEngine::new(cfg.singularity_epsilon),
        cfg.frames(),
        adapter,
        Arc::new(TransformFanout::new(targets)),
    );
    // Subscribe before the bridge can publish anything.
    let mut source = BusSampleSource::new(&bus);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| FuseError::Transport(format!("ws bind error on {addr}: {e}")))?;
    let codec = RosbridgeCodec::new(&cfg.raw_topic, &cfg.correction_topic, &cfg.output_topic);
    let server = tokio::spawn(WsBridge::new(Arc::clone(&bus), codec).serve(listener));

    println!(
        "  {} rosbridge endpoint on {}  ({} + {} → {})",
        "●".green().bold(),
        format!("ws://{addr}").bold(),
        cfg.raw_topic.cyan(),
        cfg.correction_topic.cyan(),
        cfg.output_topic.cyan(),
    );

    tokio::select! {
        _ = node.run(&mut source) => {}
        _ = shutdown.notified() => {}
    }
    server.abort();

    print_summary(&node.stats());
    let frames = node.frames();
    if let Ok(Some(t)) = tree.lookup(&frames.parent_frame, &frames.child_frame) {
        let v = t.translation.vector;
        println!(
            "  last {} → {}: [{:.3}, {:.3}, {:.3}]",
            frames.parent_frame, frames.child_frame, v.x, v.y, v.z
        );
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// replay
// ─────────────────────────────────────────────────────────────────────────────

fn replay(cfg: &Config, file: &Path) -> Result<(), FuseError> {
    tokio_runtime()?.block_on(async {
        let input = tokio::fs::File::open(file)
            .await
            .map_err(|e| FuseError::Transport(format!("cannot open {}: {e}", file.display())))?;
        let mut source = JsonLinesSource::new(tokio::io::BufReader::new(input));

        let mut node = TransformMaintenance::new(
            FusionEngine::new(cfg.singularity_epsilon),
            cfg.frames(),
            Arc::new(JsonLinesSink::new(std::io::stdout())),
            Arc::new(SharedFrameTree::new()),
        );
        let stats = node.run(&mut source).await;

        eprintln!("  replayed {}", file.display().to_string().bold());
        if source.skipped() > 0 {
            eprintln!(
                "  {} {} malformed line(s) skipped",
                "!".yellow().bold(),
                source.skipped()
            );
        }
        print_summary_to_stderr(&stats);
        Ok::<(), FuseError>(())
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// schema / config
// ─────────────────────────────────────────────────────────────────────────────

fn schema_document() -> Result<String, FuseError> {
    let inbound = schema_for!(InboundSample);
    let fused = schema_for!(FusedPoseSample);
    let document = serde_json::json!({
        "inbound_sample": inbound,
        "fused_pose_sample": fused,
    });
    serde_json::to_string_pretty(&document).map_err(|e| FuseError::Serialization(e.to_string()))
}

fn print_schemas() -> Result<(), FuseError> {
    println!("{}", schema_document()?);
    Ok(())
}

fn config_command(action: ConfigAction) -> Result<(), FuseError> {
    match action {
        ConfigAction::Show => {
            let path = config::config_path();
            let cfg = config::load_effective()?;
            let origin = if path.exists() {
                path.display().to_string().bold()
            } else {
                "defaults (no config file)".dimmed()
            };
            println!("  # {origin}");
            let rendered = toml::to_string_pretty(&cfg)
                .map_err(|e| FuseError::Serialization(e.to_string()))?;
            println!("{rendered}");
            Ok(())
        }
        ConfigAction::Init { force } => {
            let path = config::config_path();
            if path.exists() && !force {
                return Err(FuseError::Config(format!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                )));
            }
            let written = config::save(&Config::default())?;
            println!(
                "  {} Config saved to {}",
                "✓".green().bold(),
                written.display().to_string().bold()
            );
            Ok(())
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn summary_line(stats: &MaintenanceStats) -> String {
    format!(
        "raw {}  corrections {}  fused {}  singular {}  rejected {}",
        stats.raw, stats.corrections, stats.fused, stats.singular, stats.rejected
    )
}

fn print_summary(stats: &MaintenanceStats) {
    println!("  {} {}", "✓".green().bold(), summary_line(stats));
}

fn print_summary_to_stderr(stats: &MaintenanceStats) {
    eprintln!("  {} {}", "✓".green().bold(), summary_line(stats));
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_with_port() {
        let cli = Cli::try_parse_from(["odomfuse", "run", "--port", "9191"]).unwrap();
        assert!(matches!(cli.command, Command::Run { port: Some(9191) }));

        let cli = Cli::try_parse_from(["odomfuse", "run"]).unwrap();
        assert!(matches!(cli.command, Command::Run { port: None }));
    }

    #[test]
    fn parses_replay_and_config_actions() {
        let cli = Cli::try_parse_from(["odomfuse", "replay", "drive.jsonl"]).unwrap();
        let Command::Replay { file } = cli.command else {
            panic!("expected replay");
        };
        assert_eq!(file, PathBuf::from("drive.jsonl"));

        let cli = Cli::try_parse_from(["odomfuse", "config", "init", "--force"]).unwrap();
        let Command::Config { action } = cli.command else {
            panic!("expected config");
        };
        assert_eq!(action, ConfigAction::Init { force: true });
    }

    #[test]
    fn replay_requires_a_file() {
        assert!(Cli::try_parse_from(["odomfuse", "replay"]).is_err());
    }

    #[test]
    fn schema_document_covers_both_sample_kinds() {
        let document: serde_json::Value = serde_json::from_str(&schema_document().unwrap()).unwrap();
        let inbound = document["inbound_sample"].to_string();
        assert!(inbound.contains("\"raw\""));
        assert!(inbound.contains("\"correction\""));
        assert!(inbound.contains("pre_correction"));
        assert!(document["fused_pose_sample"].to_string().contains("child_frame_id"));
    }

    #[test]
    fn summary_line_lists_counters() {
        let stats = MaintenanceStats {
            raw: 3,
            corrections: 1,
            fused: 3,
            singular: 0,
            rejected: 2,
        };
        assert_eq!(
            summary_line(&stats),
            "raw 3  corrections 1  fused 3  singular 0  rejected 2"
        );
    }
}
