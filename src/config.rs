//! CLI surface (§6) and environment variables, parsed once into an immutable
//! [`ServerConfig`]. This is the ambient config layer SPEC_FULL.md §2 adds —
//! the CLI itself is parsed with `clap` rather than a hand-rolled parser.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "instant", about = "Multi-room WebSocket chat server")]
pub struct Cli {
    /// Port to listen on.
    #[arg(default_value_t = 8080)]
    pub port: u16,

    /// Interface to bind; "*" means all interfaces.
    #[arg(short = 'h', long, default_value = "*")]
    pub host: String,

    /// Root directory the filesystem producer serves from.
    #[arg(short = 'r', long, default_value = ".")]
    pub webroot: PathBuf,

    /// HTTP access log target ("-" = stderr).
    #[arg(long, default_value = "-")]
    pub http_log: String,

    /// Debug log target ("-" = stderr).
    #[arg(long, default_value = "-")]
    pub debug_log: String,

    /// Log level (tracing directive, e.g. INFO, DEBUG).
    #[arg(short = 'L', long, default_value = "INFO")]
    pub log_level: String,

    /// Shell command run once before the accept loop starts.
    #[arg(short = 'c', long)]
    pub startup_cmd: Option<String>,
}

pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub webroot: PathBuf,
    pub http_log: String,
    pub debug_log: String,
    pub log_level: String,
    pub startup_cmd: Option<String>,
    pub cookies_keyfile: Option<PathBuf>,
    pub cookies_insecure: bool,
    pub cache_max_age: Duration,
}

impl ServerConfig {
    pub fn from_cli(cli: Cli) -> Self {
        let cookies_keyfile = std::env::var_os("INSTANT_COOKIES_KEYFILE").map(PathBuf::from);
        let cookies_insecure = std::env::var("INSTANT_COOKIES_INSECURE")
            .map(|v| v == "yes")
            .unwrap_or(false);
        let cache_max_age = std::env::var("INSTANT_HTTP_MAXCACHEAGE")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(300));

        Self {
            port: cli.port,
            host: cli.host,
            webroot: cli.webroot,
            http_log: cli.http_log,
            debug_log: cli.debug_log,
            log_level: cli.log_level,
            startup_cmd: cli.startup_cmd,
            cookies_keyfile,
            cookies_insecure,
            cache_max_age,
        }
    }

    /// Rocket's own address syntax expects `0.0.0.0` for "all interfaces".
    pub fn bind_address(&self) -> &str {
        if self.host == "*" {
            "0.0.0.0"
        } else {
            &self.host
        }
    }
}
