//! Binary entry point: reads configuration from the environment, installs
//! the logger, and runs the dispatcher until a shutdown signal arrives.
//!
//! This glue is deliberately thin — argument parsing, name resolution, and
//! signal plumbing are all outside the core's responsibilities; they exist
//! here only so the crate is runnable.

use proxy_c_rs::{ConfigError, Dispatcher, ProxyConfig};
use std::env;
use std::process::ExitCode;

fn env_config() -> Result<ProxyConfig, ConfigError> {
    let mut builder = ProxyConfig::builder();

    if let Ok(port) = env::var("PROXY_PORT") {
        match port.parse() {
            Ok(port) => builder = builder.port(port),
            Err(_) => return Err(ConfigError::MissingPort),
        }
    }
    if let Ok(host) = env::var("PROXY_CANONICAL_HOST") {
        builder = builder.canonical_host(host);
    }
    if let Ok(upstream) = env::var("PROXY_UPSTREAM") {
        builder = builder.upstream(upstream);
    }
    if let Ok(flag) = env::var("PROXY_ACCEPT_ALL") {
        builder = builder.accept_all(truthy(&flag));
    }
    if let Ok(flag) = env::var("PROXY_LOG_WARNINGS") {
        builder = builder.log_warnings(truthy(&flag));
    }

    builder.build()
}

fn truthy(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "yes" | "on")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::warn!("failed to install ctrl-c handler: {e}");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let config = match env_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("proxyd: {e}");
            return ExitCode::FAILURE;
        }
    };

    let dispatcher = Dispatcher::new(config);
    match dispatcher.run(shutdown_signal()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("proxyd: {e}");
            ExitCode::FAILURE
        }
    }
}
