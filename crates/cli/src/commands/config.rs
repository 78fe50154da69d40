use std::env;
use std::fs;
use std::path::Path;

use opsgate_core::config::{AppConfig, LoadOptions};
use toml::Value;

const CONFIG_FILE: &str = "opsgate.toml";

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let file_doc = load_config_file_doc(Path::new(CONFIG_FILE));

    let mut lines =
        vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.push(render_line(
        "backend.url",
        &config.backend.url,
        field_source("backend", "url", Some("OPSGATE_BACKEND_URL"), file_doc.as_ref()),
    ));
    lines.push(render_line(
        "backend.database",
        &config.backend.database,
        field_source("backend", "database", Some("OPSGATE_BACKEND_DATABASE"), file_doc.as_ref()),
    ));
    lines.push(render_line(
        "backend.username",
        &config.backend.username,
        field_source("backend", "username", Some("OPSGATE_BACKEND_USERNAME"), file_doc.as_ref()),
    ));
    lines.push(render_line(
        "backend.password",
        "<redacted>",
        field_source("backend", "password", Some("OPSGATE_BACKEND_PASSWORD"), file_doc.as_ref()),
    ));
    lines.push(render_line(
        "backend.timeout_secs",
        &config.backend.timeout_secs.to_string(),
        field_source(
            "backend",
            "timeout_secs",
            Some("OPSGATE_BACKEND_TIMEOUT_SECS"),
            file_doc.as_ref(),
        ),
    ));
    lines.push(render_line(
        "backend.max_retries",
        &config.backend.max_retries.to_string(),
        field_source(
            "backend",
            "max_retries",
            Some("OPSGATE_BACKEND_MAX_RETRIES"),
            file_doc.as_ref(),
        ),
    ));
    lines.push(render_line(
        "backend.max_in_flight",
        &config.backend.max_in_flight.to_string(),
        field_source("backend", "max_in_flight", None, file_doc.as_ref()),
    ));
    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        field_source("logging", "level", Some("OPSGATE_LOG_LEVEL"), file_doc.as_ref()),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format).to_lowercase(),
        field_source("logging", "format", Some("OPSGATE_LOG_FORMAT"), file_doc.as_ref()),
    ));

    lines.join("\n")
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("  {key} = {value}  (source: {source})")
}

fn load_config_file_doc(path: &Path) -> Option<Value> {
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    section: &str,
    key: &str,
    env_key: Option<&str>,
    file_doc: Option<&Value>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var(env_key).is_ok() {
            return format!("env {env_key}");
        }
    }
    let in_file = file_doc
        .and_then(|doc| doc.get(section))
        .map(|table| table.get(key).is_some())
        .unwrap_or(false);
    if in_file {
        return format!("file {CONFIG_FILE}");
    }
    "default".to_string()
}
