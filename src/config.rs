use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

// CLI argument structure; every flag can also come from the environment
#[derive(Parser, Debug, Clone)]
#[command(name = "payments-gateway")]
#[command(about = "HTTP gateway with per-caller admission control")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    // HS256 secret for bearer tokens
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    // JSON array of accounts to seed the store with
    #[arg(short, long, env = "ACCOUNTS_FILE")]
    pub accounts: Option<PathBuf>,

    // Deadline for a route handler, in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value_t = 15000)]
    pub request_timeout_ms: u64,

    // Lifetime of issued tokens, in seconds
    #[arg(long, env = "TOKEN_TTL_SECS", default_value_t = 86400)]
    pub token_ttl_secs: u64,

    // Emit JSON log lines
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,
}

impl Args {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }
}
