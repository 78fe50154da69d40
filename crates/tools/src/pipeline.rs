//! Shared input shaping for the tool layer.
//!
//! Validation collects every violation before failing, so a caller fixing
//! its request fixes it once.

use opsgate_core::chrono::NaiveDate;
use opsgate_core::{IdName, Record, ToolError};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::info;

/// Accumulates violations; `check` fails with all of them at once.
#[derive(Debug, Default)]
pub(crate) struct Violations {
    items: Vec<String>,
}

impl Violations {
    pub(crate) fn flag(&mut self, message: impl Into<String>) {
        self.items.push(message.into());
    }

    pub(crate) fn check(self) -> Result<(), ToolError> {
        if self.items.is_empty() {
            Ok(())
        } else {
            Err(ToolError::validation(self.items))
        }
    }
}

/// Deserialize tool input; `null` stands for "no arguments". Unknown keys
/// and wrong types surface as validation errors.
pub(crate) fn parse_input<T: DeserializeOwned>(input: Value) -> Result<T, ToolError> {
    let input = if input.is_null() { json!({}) } else { input };
    serde_json::from_value(input).map_err(|err| ToolError::validation(vec![err.to_string()]))
}

/// Parse a `YYYY-MM-DD` date, flagging a violation on failure.
pub(crate) fn parse_date(
    violations: &mut Violations,
    field: &str,
    raw: &str,
) -> Option<NaiveDate> {
    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(_) => {
            violations.flag(format!("{field} must be a YYYY-MM-DD date, got `{raw}`"));
            None
        }
    }
}

/// Trimmed text, `None` when empty or missing.
pub(crate) fn normalized(text: Option<String>) -> Option<String> {
    text.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

pub(crate) fn effective_limit(requested: Option<u32>, default: u32) -> u32 {
    requested.unwrap_or(default)
}

/// Loose shape check for an email address. Deliverability is the backend's
/// problem; this only catches obvious typos before a create.
pub(crate) fn plausible_email(candidate: &str) -> bool {
    let Some((local, domain)) = candidate.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !candidate.contains(char::is_whitespace)
}

/// One structured line per tool invocation, carrying the normalized
/// argument set. Emitted before any gateway work, including calls the
/// validation step then rejects.
pub(crate) fn intent(tool: &str, args: &Value) {
    info!(target: "opsgate::intent", tool, args = %args, "tool invoked");
}

/// Display name of a many2one `[id, name]` pair field, if set.
pub(crate) fn pair_name(record: &Record, field: &str) -> Option<String> {
    record.get(field).and_then(IdName::from_value).map(|pair| pair.name)
}

/// Id of a many2one `[id, name]` pair field, if set.
pub(crate) fn pair_id(record: &Record, field: &str) -> Option<i64> {
    record.get(field).and_then(IdName::from_value).map(|pair| pair.id)
}

/// The `YYYY-MM-DD` prefix of a backend datetime string.
pub(crate) fn date_part(raw: &str) -> &str {
    raw.get(..10).unwrap_or(raw)
}

/// Reshape many2one `[id, name]` pairs into `{id, name}` objects so callers
/// never see the backend's positional encoding.
pub(crate) fn reshape_pairs(record: &mut Record) {
    for value in record.values_mut() {
        if let Some(pair) = IdName::from_value(value) {
            *value = json!({ "id": pair.id, "name": pair.name });
        }
    }
}

pub(crate) fn records_payload(mut records: Vec<Record>) -> Value {
    for record in &mut records {
        reshape_pairs(record);
    }
    json!({ "count": records.len(), "records": records })
}
