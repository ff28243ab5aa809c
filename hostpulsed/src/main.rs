use clap::{Arg, Command};
use hostpulse_core::{CliOverrides, EngineConfig, Monitor};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let matches = Command::new("hostpulsed")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Host metrics daemon - samples system state and emits JSON snapshots")
        .arg(
            Arg::new("refresh")
                .long("refresh")
                .value_name("MS")
                .help("Sampling tick interval in milliseconds")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("history")
                .long("history")
                .value_name("N")
                .help("Rolling history capacity in samples")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_name("MS")
                .help("Per-provider sampling deadline in milliseconds")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("json-config")
                .long("json-config")
                .value_name("PATH")
                .help("Path to JSON configuration file")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("once")
                .long("once")
                .help("Emit a single snapshot document and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("watch")
                .long("watch")
                .value_name("SECS")
                .help("Emit one document every SECS seconds instead of every tick")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("pretty")
                .long("pretty")
                .help("Pretty-print JSON output")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable debug logging")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Log errors only")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    init_logging(matches.get_flag("verbose"), matches.get_flag("quiet"));

    let overrides = CliOverrides {
        tick_ms: matches.get_one::<u64>("refresh").copied(),
        history_capacity: matches.get_one::<usize>("history").copied(),
        provider_timeout_ms: matches.get_one::<u64>("timeout").copied(),
    };
    let json_config_path = matches.get_one::<PathBuf>("json-config");
    let config = EngineConfig::load(Some(&overrides), json_config_path)?;

    let once = matches.get_flag("once");
    let pretty = matches.get_flag("pretty");
    let watch = matches.get_one::<u64>("watch").copied();

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
        })?;
    }

    let tick = config.tick_interval();
    let mut monitor = Monitor::start(config)?;
    tracing::info!(
        tick_ms = tick.as_millis() as u64,
        "sampler started, permissions: {}",
        monitor.permissions().level.as_str()
    );

    let mut last_version = 0;
    let mut last_emit: Option<Instant> = None;
    while running.load(Ordering::SeqCst) {
        let version = monitor.version();
        if version > last_version {
            let due = match (watch, last_emit) {
                (Some(secs), Some(at)) => at.elapsed() >= Duration::from_secs(secs),
                _ => true,
            };
            if due {
                last_emit = Some(Instant::now());
                emit(&monitor, pretty)?;
                if once {
                    break;
                }
            }
            last_version = version;
        }
        std::thread::sleep(Duration::from_millis(25));
    }

    monitor.stop();
    tracing::debug!("shutdown complete");
    Ok(())
}

fn emit(monitor: &Monitor, pretty: bool) -> anyhow::Result<()> {
    let document = monitor.wire_document();
    let rendered = if pretty {
        serde_json::to_string_pretty(&document)?
    } else {
        serde_json::to_string(&document)?
    };
    println!("{}", rendered);
    Ok(())
}

fn init_logging(verbose: bool, quiet: bool) {
    let default_directive = if quiet {
        "hostpulse=error"
    } else if verbose {
        "hostpulse=debug,hostpulse_core=debug"
    } else {
        "hostpulse=info,hostpulse_core=info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    // Logs go to stderr so stdout stays pure JSON.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
