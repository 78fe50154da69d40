use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tokio::sync::{OnceCell, Semaphore};
use tracing::debug;

use opsgate_core::backend::BackendClient;
use opsgate_core::config::BackendConfig;
use opsgate_core::domain::Record;
use opsgate_core::errors::{BackendError, IdentityError};

/// The entity behind the one sanctioned unscoped bootstrap read.
const USER_ENTITY: &str = "res.users";

/// `BackendClient` over the backend's JSON-RPC 2.0 endpoint.
///
/// Authentication is lazy and idempotent: the uid is resolved on first use
/// and cached for the life of the client. Every call holds an in-flight
/// permit for its full duration, so the cap covers the response body too.
pub struct JsonRpcBackend {
    client: Client,
    endpoint: String,
    database: String,
    username: String,
    password: SecretString,
    timeout: Duration,
    uid: OnceCell<i64>,
    in_flight: Semaphore,
    next_call_id: AtomicU64,
}

impl JsonRpcBackend {
    pub fn from_config(config: &BackendConfig) -> Result<Self, BackendError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| BackendError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/jsonrpc", config.url.trim_end_matches('/')),
            database: config.database.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            timeout,
            uid: OnceCell::new(),
            in_flight: Semaphore::new(config.max_in_flight as usize),
            next_call_id: AtomicU64::new(1),
        })
    }

    fn map_transport(&self, err: reqwest::Error) -> BackendError {
        if err.is_timeout() {
            BackendError::Timeout(self.timeout)
        } else {
            BackendError::Transport(err.to_string())
        }
    }

    /// One JSON-RPC round trip. `service` is `"common"` or `"object"`.
    async fn call(&self, service: &str, method: &str, args: Value) -> Result<Value, BackendError> {
        let _permit = self
            .in_flight
            .acquire()
            .await
            .map_err(|_| BackendError::Transport("in-flight limiter closed".to_string()))?;

        let call_id = self.next_call_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "method": "call",
            "params": { "service": service, "method": method, "args": args },
            "id": call_id,
        });
        debug!(service, method, call_id, "dispatching backend call");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|err| self.map_transport(err))?
            .error_for_status()
            .map_err(|err| self.map_transport(err))?;
        let envelope: Value =
            response.json().await.map_err(|err| self.map_transport(err))?;

        if let Some(error) = envelope.get("error") {
            let message = error
                .get("data")
                .and_then(|data| data.get("message"))
                .or_else(|| error.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("unspecified backend fault");
            return Err(BackendError::Protocol(message.to_string()));
        }
        envelope
            .get("result")
            .cloned()
            .ok_or_else(|| BackendError::Protocol("response carried no result".to_string()))
    }

    /// `object.execute_kw` with the session credentials spliced in.
    async fn execute_kw(
        &self,
        uid: i64,
        entity: &str,
        method: &str,
        args: Value,
        kwargs: Value,
    ) -> Result<Value, BackendError> {
        self.call(
            "object",
            "execute_kw",
            json!([
                self.database,
                uid,
                self.password.expose_secret(),
                entity,
                method,
                args,
                kwargs,
            ]),
        )
        .await
    }

    async fn resolved_uid(&self) -> Result<i64, IdentityError> {
        self.authenticate().await
    }
}

#[async_trait]
impl BackendClient for JsonRpcBackend {
    async fn authenticate(&self) -> Result<i64, IdentityError> {
        self.uid
            .get_or_try_init(|| async {
                let result = self
                    .call(
                        "common",
                        "authenticate",
                        json!([self.database, self.username, self.password.expose_secret(), {}]),
                    )
                    .await?;
                // The backend answers `false` for bad credentials.
                match result.as_i64() {
                    Some(uid) => {
                        debug!(uid, "authenticated against backend");
                        Ok(uid)
                    }
                    None => Err(IdentityError::AuthenticationFailed {
                        login: self.username.clone(),
                    }),
                }
            })
            .await
            .copied()
    }

    async fn read_own_user(&self, uid: i64, fields: &[&str]) -> Result<Record, BackendError> {
        let result = self
            .execute_kw(uid, USER_ENTITY, "read", json!([[uid]]), json!({ "fields": fields }))
            .await?;
        let record = result
            .as_array()
            .and_then(|rows| rows.first())
            .and_then(Value::as_object)
            .cloned()
            .ok_or_else(|| {
                BackendError::Protocol("own-user read returned no record".to_string())
            })?;
        Ok(record)
    }

    async fn search_read(
        &self,
        entity: &str,
        domain: &Value,
        fields: &[String],
        limit: u32,
    ) -> Result<Vec<Record>, BackendError> {
        let uid = self.resolved_uid().await.map_err(|err| match err {
            IdentityError::Backend(backend) => backend,
            other => BackendError::Protocol(other.to_string()),
        })?;
        let result = self
            .execute_kw(
                uid,
                entity,
                "search_read",
                json!([domain]),
                json!({ "fields": fields, "limit": limit }),
            )
            .await?;
        let rows = result.as_array().ok_or_else(|| {
            BackendError::Protocol("search_read returned a non-list result".to_string())
        })?;
        rows.iter()
            .map(|row| {
                row.as_object().cloned().ok_or_else(|| {
                    BackendError::Protocol("search_read row is not an object".to_string())
                })
            })
            .collect()
    }

    async fn create(&self, entity: &str, values: &Record) -> Result<i64, BackendError> {
        let uid = self.resolved_uid().await.map_err(|err| match err {
            IdentityError::Backend(backend) => backend,
            other => BackendError::Protocol(other.to_string()),
        })?;
        let result = self
            .execute_kw(uid, entity, "create", json!([values]), json!({}))
            .await?;
        result.as_i64().ok_or_else(|| {
            BackendError::Protocol("create returned a non-integer id".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsgate_core::config::AppConfig;

    fn backend() -> JsonRpcBackend {
        let config = AppConfig::default();
        JsonRpcBackend::from_config(&config.backend).expect("client")
    }

    #[test]
    fn endpoint_is_normalized_without_trailing_slash() {
        let mut config = AppConfig::default().backend;
        config.url = "http://erp.internal:8069/".to_string();
        let client = JsonRpcBackend::from_config(&config).expect("client");
        assert_eq!(client.endpoint, "http://erp.internal:8069/jsonrpc");
    }

    #[test]
    fn call_ids_are_monotonic() {
        let client = backend();
        let first = client.next_call_id.fetch_add(1, Ordering::Relaxed);
        let second = client.next_call_id.fetch_add(1, Ordering::Relaxed);
        assert!(second > first);
    }
}
