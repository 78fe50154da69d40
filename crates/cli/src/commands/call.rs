use std::sync::Arc;
use std::time::Duration;

use opsgate_backend::JsonRpcBackend;
use opsgate_core::audit::TracingAuditSink;
use opsgate_core::config::{AppConfig, LoadOptions};
use opsgate_core::{Gateway, PolicyTable, RetryPolicy};
use opsgate_tools::builtin_registry;
use serde_json::Value;

use crate::commands::CommandResult;

pub fn run(tool: &str, raw_args: &str) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("call", "config_validation", error.to_string(), 2)
        }
    };
    init_logging(&config);

    let args: Value = match serde_json::from_str(raw_args) {
        Ok(args) => args,
        Err(error) => {
            return CommandResult::failure(
                "call",
                "invalid_args",
                format!("--args must be a JSON object: {error}"),
                2,
            )
        }
    };

    let backend = match JsonRpcBackend::from_config(&config.backend) {
        Ok(backend) => backend,
        Err(error) => {
            return CommandResult::failure("call", "backend_init", error.to_string(), 2)
        }
    };

    let retry = RetryPolicy { max_retries: config.backend.max_retries, ..RetryPolicy::default() };
    let gateway = Arc::new(
        Gateway::new(Arc::new(backend), PolicyTable::builtin(), Arc::new(TracingAuditSink))
            .with_retry(retry)
            .with_call_timeout(Duration::from_secs(config.backend.timeout_secs)),
    );
    let registry = builtin_registry(gateway);

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "call",
                "runtime",
                format!("failed to initialize async runtime: {error}"),
                2,
            )
        }
    };

    match runtime.block_on(registry.call(tool, args)) {
        Ok(value) => CommandResult {
            exit_code: 0,
            output: serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()),
        },
        Err(error) => CommandResult::failure("call", error.kind(), error.user_message(), 1),
    }
}

fn init_logging(config: &AppConfig) {
    use opsgate_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    // A second init in the same process is fine; keep the first subscriber.
    let result = match config.logging.format {
        Compact => tracing_subscriber::fmt()
            .with_max_level(log_level)
            .compact()
            .try_init(),
        Pretty => tracing_subscriber::fmt()
            .with_max_level(log_level)
            .pretty()
            .try_init(),
        Json => tracing_subscriber::fmt().with_max_level(log_level).json().try_init(),
    };
    let _ = result;
}
