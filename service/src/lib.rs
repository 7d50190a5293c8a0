use config::Config;
use log::info;
use realtime::connection::validate_endpoint;
use realtime::{Cache, RealtimeClient, StaticCredentials};
use std::sync::Arc;

pub mod config;
pub mod logging;

/// Build a client from the command line / environment configuration.
///
/// The client is returned unconnected. `cache`, if given, is invalidated as
/// events arrive.
pub fn init_client(
    config: &Config,
    cache: Option<Arc<dyn Cache>>,
) -> realtime::Result<RealtimeClient> {
    validate_endpoint(&config.endpoint)?;

    let policy = config.reconnect_policy();
    info!(
        "Realtime client config: endpoint={}, max_reconnect_attempts={}, \
         reconnect_interval={:?}, backoff={}, jitter={}, idle_timeout={:?}",
        config.endpoint,
        policy.max_attempts,
        policy.interval,
        config.reconnect_backoff,
        policy.jitter,
        config.idle_timeout(),
    );

    let credentials = Arc::new(StaticCredentials::new(config.credentials()));
    let mut builder = RealtimeClient::builder(config.client_config(), credentials);
    if let Some(cache) = cache {
        builder = builder.cache(cache);
    }

    Ok(builder.build())
}
