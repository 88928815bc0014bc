// src/main.rs

//! The main entry point for the pgwarden daemon.

use pgwarden::WardenError;
use pgwarden::config::Config;
use pgwarden::core::daemon::{self, PidFile};
use pgwarden::core::supervisor;
use std::env;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::filter::EnvFilter;

const DEFAULT_CONFIG_FILE: &str = "./pgwarden.conf";

const USAGE: &str = "\
pgwarden: replication manager daemon for PostgreSQL clusters

Usage: pgwarden [OPTIONS]

Options:
  -f, --config-file PATH    configuration file (default: ./pgwarden.conf)
  -v, --verbose             log at debug level regardless of loglevel
  -m, --monitoring-history  write a monitoring history row on every tick
  -d, --daemonize           detach from the terminal and run in the background
  -p, --pid-file PATH       write a PID file and refuse to start twice
      --help                print this help and exit
      --version             print the version and exit";

#[derive(Debug, Default)]
struct CliOptions {
    config_file: Option<PathBuf>,
    verbose: bool,
    monitoring_history: bool,
    daemonize: bool,
    pid_file: Option<PathBuf>,
}

fn parse_args(args: &[String]) -> Result<CliOptions, String> {
    let mut opts = CliOptions::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-f" | "--config-file" => {
                let value = iter
                    .next()
                    .ok_or_else(|| format!("{arg} requires a value"))?;
                opts.config_file = Some(PathBuf::from(value));
            }
            "-v" | "--verbose" => opts.verbose = true,
            "-m" | "--monitoring-history" => opts.monitoring_history = true,
            "-d" | "--daemonize" => opts.daemonize = true,
            "-p" | "--pid-file" => {
                let value = iter
                    .next()
                    .ok_or_else(|| format!("{arg} requires a value"))?;
                opts.pid_file = Some(PathBuf::from(value));
            }
            other => return Err(format!("unknown option '{other}'")),
        }
    }
    Ok(opts)
}

fn init_logging(config: &Config, verbose: bool) {
    let directive = if verbose {
        "debug".to_string()
    } else {
        config.loglevel.as_directive().to_string()
    };
    let level = env::var("RUST_LOG").unwrap_or(directive);

    if let Some(path) = &config.logfile {
        match std::fs::OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                let file = Arc::new(file);
                tracing_subscriber::fmt()
                    .with_env_filter(EnvFilter::new(level))
                    .compact()
                    .with_ansi(false)
                    .with_writer(move || Arc::clone(&file))
                    .init();
                return;
            }
            Err(e) => {
                eprintln!(
                    "cannot open logfile {}: {e}; logging to stderr",
                    path.display()
                );
            }
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level))
        .compact()
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    let args: Vec<String> = env::args().skip(1).collect();

    if args.iter().any(|arg| arg == "--help") {
        println!("{USAGE}");
        return;
    }
    if args.iter().any(|arg| arg == "--version") {
        println!("pgwarden version {VERSION}");
        return;
    }

    let opts = match parse_args(&args) {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("{e}\n\n{USAGE}");
            process::exit(1);
        }
    };

    let config_path = opts
        .config_file
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let config = match Config::from_file(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Failed to load configuration from \"{}\": {e:#}",
                config_path.display()
            );
            process::exit(1);
        }
    };

    init_logging(&config, opts.verbose);

    if opts.daemonize {
        if let Err(e) = daemon::daemonize(config.logfacility.keeps_stderr()) {
            error!("{e}");
            process::exit(e.exit_code());
        }
    }

    let pid_file = match opts.pid_file.as_deref().map(PidFile::create).transpose() {
        Ok(pid_file) => pid_file,
        Err(e) => {
            error!("{e}");
            process::exit(e.exit_code());
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("cannot start the async runtime: {e}");
            process::exit(13);
        }
    };

    let result = runtime.block_on(supervisor::run(
        config,
        config_path,
        opts.monitoring_history,
    ));
    drop(pid_file);

    match result {
        Ok(()) => info!("pgwarden shut down cleanly"),
        Err(e) => {
            let code = e.exit_code();
            if matches!(e, WardenError::Promoted) {
                info!("{e}");
            } else {
                error!("{e}");
            }
            process::exit(code);
        }
    }
}
