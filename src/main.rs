use anyhow::Result;
use colored::*;
use events::{HandlerKey, RealtimeEvent};
use log::*;
use realtime::{Cache, ConnectionState, RealtimeClient, Status};
use service::config::Config;
use service::logging::Logger;
use std::process::ExitCode;
use std::sync::Arc;

/// Stand-in for an application cache: reports what would be evicted.
struct LoggingCache;

impl Cache for LoggingCache {
    fn invalidate(&self, key: &str) {
        info!("Cache invalidate: {}", key);
    }

    fn keys_with_prefix(&self, _prefix: &str) -> Vec<String> {
        Vec::new()
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let config = Config::new();
    Logger::init_logger(&config)?;

    info!("Starting up eventhub watcher for {}", config.endpoint);

    let client = service::init_client(&config, Some(Arc::new(LoggingCache)))?;
    let _printer = client.on_fn(HandlerKey::Wildcard, |event| {
        print_event(event);
        Ok(())
    });

    for channel in &config.channels {
        client.subscribe(channel.clone());
    }

    println!("{} Connecting to {}...", "→".blue(), config.endpoint);
    client.connect()?;

    let exit = watch(&client).await;
    client.shutdown();

    Ok(exit)
}

/// Report status changes until Ctrl-C or until the client stops retrying.
async fn watch(client: &RealtimeClient) -> ExitCode {
    let mut status = client.watch_status();
    let mut last_state = status.borrow().state;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                println!("\n{} Interrupted, disconnecting", "→".blue());
                return ExitCode::SUCCESS;
            }
            changed = status.changed() => {
                if changed.is_err() {
                    return ExitCode::FAILURE;
                }
                let current = status.borrow_and_update().clone();
                if current.state != last_state {
                    print_state(&current, &client.channels());
                    last_state = current.state;
                }
                if current.retries_exhausted {
                    println!(
                        "{} Not retrying: {}",
                        "✗".red(),
                        current.last_error.as_deref().unwrap_or("reconnect attempts exhausted")
                    );
                    return ExitCode::FAILURE;
                }
            }
        }
    }
}

fn print_state(status: &Status, channels: &[String]) {
    match status.state {
        ConnectionState::Connected => {
            println!("{} Connected", "✓".green());
            if !channels.is_empty() {
                println!("  subscribing to: {}", channels.join(", "));
            }
        }
        ConnectionState::Connecting => {
            println!(
                "{} Connecting (reconnect attempt {})",
                "→".blue(),
                status.reconnect_attempt
            );
        }
        ConnectionState::Disconnected => match &status.last_error {
            Some(error) => println!("{} Disconnected: {}", "✗".yellow(), error),
            None => println!("{} Disconnected", "✗".yellow()),
        },
    }
}

fn print_event(event: &RealtimeEvent) {
    let entity = event
        .entity_id
        .as_deref()
        .map(|id| format!(" {}", id.bright_white()))
        .unwrap_or_default();

    println!(
        "{} {} {}{}",
        event.timestamp.dimmed(),
        event.event_type.as_str().cyan().bold(),
        event.id.dimmed(),
        entity
    );
    if !event.data.is_null() {
        println!("  {}", event.data);
    }
}
