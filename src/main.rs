use clap::Parser;
use std::fs::OpenOptions;
use std::io;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use instant::config::{Cli, ServerConfig};

#[rocket::main]
async fn main() -> ExitCode {
    // clap's own `Error::exit()` would exit with code 2 on a usage error,
    // which §6 reserves for "startup-script failure" — parse manually so bad
    // arguments get exit code 1 instead.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if err.exit_code() == 0 => {
            // `--help` / `--version`: print and exit cleanly, not an error.
            let _ = err.print();
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            let _ = err.print();
            return ExitCode::from(1);
        }
    };
    let config = ServerConfig::from_cli(cli);

    init_logging(&config.log_level, &config.http_log, &config.debug_log);

    if let Some(cmd) = &config.startup_cmd {
        match run_startup_cmd(cmd).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::error!(%cmd, "startup command exited non-zero");
                return ExitCode::from(2);
            }
            Err(err) => {
                tracing::error!(%cmd, %err, "failed to run startup command");
                return ExitCode::from(2);
            }
        }
    }

    let figment = rocket::Config::figment()
        .merge(("port", config.port))
        .merge(("address", config.bind_address().to_string()))
        // §5: the WS close-broadcast fairing waits up to 5s on its own; give
        // Rocket's own shutdown sequence enough slack to not cut that short.
        .merge(("shutdown.grace", 5))
        .merge(("shutdown.mercy", 2));

    let rocket = match instant::build_rocket(config) {
        Ok(rocket) => rocket.configure(figment),
        Err(err) => {
            tracing::error!(%err, "fatal error during startup");
            return ExitCode::FAILURE;
        }
    };

    match rocket.launch().await {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(%err, "server exited with a fatal error");
            ExitCode::FAILURE
        }
    }
}

/// A log target named on the CLI: either stderr (`"-"`) or an append-mode file.
#[derive(Clone)]
enum LogSink {
    Stderr,
    File(Arc<Mutex<std::fs::File>>),
}

impl LogSink {
    fn open(target: &str) -> Self {
        if target == "-" {
            return LogSink::Stderr;
        }
        match OpenOptions::new().create(true).append(true).open(target) {
            Ok(file) => LogSink::File(Arc::new(Mutex::new(file))),
            Err(err) => {
                eprintln!("failed to open log target {target}: {err}, falling back to stderr");
                LogSink::Stderr
            }
        }
    }
}

impl io::Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            LogSink::Stderr => io::stderr().write(buf),
            LogSink::File(file) => file.lock().expect("log file mutex poisoned").write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            LogSink::Stderr => io::stderr().flush(),
            LogSink::File(file) => file.lock().expect("log file mutex poisoned").flush(),
        }
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogSink {
    type Writer = LogSink;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Splits logging into two streams per §6: `http_access`-targeted events
/// (one line per request, emitted by [`instant::hooks::HookRegistry::evaluate`])
/// go to `--http-log`; everything else — hook/producer/distributor diagnostics —
/// goes to `--debug-log`, leveled by `--log-level`. Both default to stderr.
fn init_logging(level: &str, http_log: &str, debug_log: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    let access_layer = tracing_subscriber::fmt::layer()
        .with_writer(LogSink::open(http_log))
        .with_target(false)
        .with_filter(filter_fn(|meta| meta.target() == "http_access"));

    let debug_layer = tracing_subscriber::fmt::layer()
        .with_writer(LogSink::open(debug_log))
        .with_filter(filter_fn(|meta| meta.target() != "http_access"))
        .with_filter(filter);

    tracing_subscriber::registry()
        .with(access_layer)
        .with(debug_layer)
        .init();
}

async fn run_startup_cmd(cmd: &str) -> std::io::Result<bool> {
    let status = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .status()
        .await?;
    Ok(status.success())
}
