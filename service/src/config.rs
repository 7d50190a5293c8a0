use clap::builder::TypedValueParser as _;
use clap::{Parser, ValueEnum};
use dotenvy::dotenv;
use log::LevelFilter;
use realtime::{ClientConfig, Credentials, ReconnectPolicy};
use std::fmt;
use std::time::Duration;
use url::Url;

/// Hub endpoint used when `ENDPOINT` is not set.
pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:4000/ws";

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BackoffKind {
    /// The same delay before every attempt.
    Fixed,
    /// Doubling delay, capped at `--max-reconnect-delay-ms`.
    Exponential,
}

impl fmt::Display for BackoffKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BackoffKind::Fixed => write!(f, "fixed"),
            BackoffKind::Exponential => write!(f, "exponential"),
        }
    }
}

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// WebSocket URL of the event hub (ws:// or wss://)
    #[arg(short, long, env, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: Url,

    /// Access token sent with the connection handshake
    #[arg(short, long, env)]
    token: Option<String>,

    /// Id of the user the token belongs to
    #[arg(short, long, env)]
    user_id: Option<String>,

    /// Organization to scope the connection to
    #[arg(long, env)]
    organization_id: Option<String>,

    /// Workspace to scope the connection to
    #[arg(long, env)]
    workspace_id: Option<String>,

    /// A list of channels to subscribe to once connected.
    #[arg(short, long, env, value_delimiter = ',', use_value_delimiter = true)]
    pub channels: Vec<String>,

    /// Reconnect attempts after a failure before giving up
    #[arg(long, env, default_value_t = 5)]
    pub max_reconnect_attempts: u32,

    /// Base delay in milliseconds between reconnect attempts
    #[arg(long, env, default_value_t = 3000)]
    pub reconnect_interval_ms: u64,

    /// How the reconnect delay grows between attempts
    #[arg(long, env, value_enum, default_value_t = BackoffKind::Fixed)]
    pub reconnect_backoff: BackoffKind,

    /// Upper bound in milliseconds for exponential backoff
    #[arg(long, env, default_value_t = 30000)]
    pub max_reconnect_delay_ms: u64,

    /// Randomize each reconnect delay between half and all of its value
    #[arg(long, env)]
    pub reconnect_jitter: bool,

    /// Seconds without any frame before the connection is considered dead (0 disables)
    #[arg(long, env, default_value_t = 0)]
    pub idle_timeout_secs: u64,

    /// Timeout in seconds for the WebSocket handshake
    #[arg(long, env, default_value_t = 10)]
    pub connect_timeout_secs: u64,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .try_map(|s| s.parse::<LevelFilter>()),
        )]
    pub log_level_filter: LevelFilter,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    pub fn set_credentials(mut self, token: String, user_id: String) -> Self {
        self.token = Some(token);
        self.user_id = Some(user_id);
        self
    }

    /// Handshake credentials, if both a token and a user id were given.
    pub fn credentials(&self) -> Option<Credentials> {
        let token = self.token.as_ref()?;
        let user_id = self.user_id.as_ref()?;

        let mut credentials = Credentials::new(token.clone(), user_id.clone());
        if let Some(organization_id) = &self.organization_id {
            credentials = credentials.with_organization_id(organization_id.clone());
        }
        if let Some(workspace_id) = &self.workspace_id {
            credentials = credentials.with_workspace_id(workspace_id.clone());
        }
        Some(credentials)
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        let interval = Duration::from_millis(self.reconnect_interval_ms);
        let policy = match self.reconnect_backoff {
            BackoffKind::Fixed => ReconnectPolicy::fixed(self.max_reconnect_attempts, interval),
            BackoffKind::Exponential => ReconnectPolicy::exponential(
                self.max_reconnect_attempts,
                interval,
                Duration::from_millis(self.max_reconnect_delay_ms),
            ),
        };
        policy.with_jitter(self.reconnect_jitter)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(self.endpoint.clone())
            .with_reconnect(self.reconnect_policy())
            .with_idle_timeout(self.idle_timeout())
            .with_connect_timeout(Duration::from_secs(self.connect_timeout_secs))
    }
}
