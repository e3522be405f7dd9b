use crate::{
    agent::Agent,
    collab::command::backends_from_config,
    config::Config,
    radio::{self, Technology},
    report::format_live,
    util::ensure_dir,
};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use crossbeam_channel::RecvTimeoutError;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "radiodiag")]
#[command(about = "Periodic radio/network diagnostics sampler with delivery round-trip tracking")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./radiodiag.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the effective configuration and which collaborators are wired up.
    Doctor {},
    /// Decode a channel number into band and downlink frequency.
    Decode {
        #[arg(long, value_enum)]
        tech: Technology,
        #[arg(long)]
        channel: u32,
        /// Authoritative band numbers reported by the modem (LTE/NR).
        #[arg(long = "band")]
        bands: Vec<u32>,
    },
    /// Run a sampling session and write its report.
    Run {
        #[arg(long)]
        cycles: Option<u64>,
        #[arg(long)]
        interval_ms: Option<u64>,
        #[arg(long)]
        duration_seconds: Option<u64>,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg_path = resolve_config_path(args.config.as_deref());
    let mut cfg = match &cfg_path {
        Some(p) => Config::load(p)?,
        None => Config::default(),
    };

    match &args.cmd {
        Command::Doctor {} => {
            let _guard = init_logging(&args, &cfg, None)?;
            doctor(&cfg, cfg_path.as_deref())
        }
        Command::Decode {
            tech,
            channel,
            bands,
        } => {
            let _guard = init_logging(&args, &cfg, None)?;
            let decoded = radio::decode(*tech, *channel, bands);
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "technology": tech,
                    "channel": channel,
                    "band": decoded.band,
                    "frequency_hz": decoded.frequency_hz,
                    "frequency": decoded.frequency_hz.map(radio::format_mhz),
                }))?
            );
            Ok(())
        }
        Command::Run {
            cycles,
            interval_ms,
            duration_seconds,
            out_dir,
        } => {
            if let Some(n) = cycles {
                cfg.session.max_cycles = *n;
                // An explicit cycle count runs to completion unless a duration
                // is also given.
                if duration_seconds.is_none() {
                    cfg.session.duration_seconds = 0;
                }
            }
            if let Some(ms) = interval_ms {
                cfg.session.interval_ms = *ms;
            }
            if let Some(secs) = duration_seconds {
                cfg.session.duration_seconds = *secs;
            }
            if let Some(dir) = out_dir {
                cfg.output.out_dir = dir.display().to_string();
            }
            run(&args, cfg)
        }
    }
}

fn resolve_config_path(user: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = user {
        return Some(p.to_path_buf());
    }
    ["radiodiag.toml", "radiodiag.example.toml"]
        .into_iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Stdout carries the live digest; logs go to stderr.
    let console_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn doctor(cfg: &Config, cfg_path: Option<&Path>) -> Result<()> {
    let c = &cfg.collaborators;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "config": cfg_path.map(|p| p.display().to_string()),
            "interval_ms": cfg.session.interval_ms,
            "max_cycles": cfg.session.max_cycles,
            "duration_seconds": cfg.session.duration_seconds,
            "probes": cfg.probes,
            "enabled_probes": cfg.probes.enabled_count(),
            "message_every_n_cycles": cfg.message.every_n_cycles,
            "collaborators_configured": {
                "location": !c.location.is_empty(),
                "cell": !c.cell.is_empty(),
                "download": !c.download.is_empty(),
                "upload": !c.upload.is_empty(),
                "ping": !c.ping.is_empty(),
                "dns": !c.dns.is_empty(),
                "message_send": !c.message_send.is_empty(),
                "message_watch": !c.message_watch.is_empty(),
            },
        }))?
    );
    Ok(())
}

fn run(args: &Args, cfg: Config) -> Result<()> {
    if cfg.session.max_cycles == 0 && cfg.session.duration_seconds == 0 {
        warn!("no cycle limit and no duration configured; session runs until killed");
    }

    let out_root = PathBuf::from(&cfg.output.out_dir);
    let log_path = resolve_log_path(&cfg);
    let _guard = init_logging(args, &cfg, log_path.as_deref())?;

    let (backends, completions, _watch) = backends_from_config(&cfg)?;
    let (live_tx, live_rx) = crossbeam_channel::unbounded();
    let grace = Duration::from_secs(cfg.session.report_grace_seconds);
    let deadline = match cfg.session.duration_seconds {
        0 => None,
        secs => Some(Instant::now() + Duration::from_secs(secs)),
    };
    let print_live = cfg.output.print_live;
    let dump_config = cfg.debug.dump_effective_config;
    let output = cfg.output.clone();
    let effective = toml::to_string(&cfg).unwrap_or_default();

    let agent = Agent::start(cfg, backends, completions, Some(live_tx));
    let poll = Duration::from_millis(200);

    loop {
        let wait = match deadline {
            Some(d) => {
                let left = d.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    info!("session duration elapsed");
                    break;
                }
                left.min(poll)
            }
            None => poll,
        };
        match live_rx.recv_timeout(wait) {
            Ok(sample) => {
                if print_live {
                    println!("{}", format_live(&sample));
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if !agent.is_sampling() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let report = agent.stop(grace);
    // Samples finished between the last poll and stop.
    if print_live {
        for sample in live_rx.try_iter() {
            println!("{}", format_live(&sample));
        }
    }

    let text = report.to_text();
    println!("{text}");

    let session_dir = out_root.join(&report.session_id);
    if output.write_report_text || output.write_report_json || dump_config {
        ensure_dir(&session_dir)?;
    }
    if output.write_report_text {
        std::fs::write(session_dir.join(&output.report_text_filename), &text)?;
    }
    if output.write_report_json {
        std::fs::write(
            session_dir.join(&output.report_json_filename),
            serde_json::to_string_pretty(&report)?,
        )?;
    }
    if dump_config {
        std::fs::write(session_dir.join("effective-config.toml"), effective)?;
    }
    info!("report written to {}", session_dir.display());
    Ok(())
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }

    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }

    Some(PathBuf::from(&cfg.output.out_dir).join("radiodiag.log"))
}
