//! The transport seam to the ERP record store.
//!
//! The gateway is the only caller of this trait. Implementations expose
//! exactly the `authenticate` / `search_read` / `create` primitives plus one
//! bootstrap-only self read; there is no dynamic field discovery and no raw
//! query channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::Record;
use crate::errors::{BackendError, IdentityError};

#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Authenticate the configured credentials and return the backend uid.
    /// Idempotent: repeated calls return the same uid for the same session.
    async fn authenticate(&self) -> Result<i64, IdentityError>;

    /// Bootstrap-only read of the authenticated user's own record, issued
    /// exactly once per session before any tenant scope exists. The entity
    /// is fixed inside the implementation so this unscoped path cannot be
    /// reused for anything else.
    async fn read_own_user(&self, uid: i64, fields: &[&str]) -> Result<Record, BackendError>;

    /// `search_read` over one entity with an already-validated, already
    /// scope-injected domain in wire form.
    async fn search_read(
        &self,
        entity: &str,
        domain: &Value,
        fields: &[String],
        limit: u32,
    ) -> Result<Vec<Record>, BackendError>;

    /// Create one record from already-validated, tenant-injected values.
    async fn create(&self, entity: &str, values: &Record) -> Result<i64, BackendError>;
}

/// One dispatched backend call, kept by [`FakeBackend`] so tests can assert
/// what actually crossed the transport boundary.
#[derive(Clone, Debug, PartialEq)]
pub struct DispatchedCall {
    pub entity: String,
    pub domain: Value,
    pub fields: Vec<String>,
    pub limit: u32,
}

/// In-memory stand-in for the record store, used by tests and by readiness
/// checks that must not touch a live backend.
pub struct FakeBackend {
    uid: i64,
    login: String,
    tenant: (i64, String),
    records: Mutex<HashMap<String, Vec<Record>>>,
    created: Mutex<Vec<(String, Record)>>,
    dispatched: Mutex<Vec<DispatchedCall>>,
    read_failures: AtomicU32,
    create_failures: AtomicU32,
    next_id: AtomicI64,
}

impl FakeBackend {
    pub fn new(uid: i64, login: impl Into<String>, tenant_id: i64, tenant_name: &str) -> Self {
        Self {
            uid,
            login: login.into(),
            tenant: (tenant_id, tenant_name.to_string()),
            records: Mutex::new(HashMap::new()),
            created: Mutex::new(Vec::new()),
            dispatched: Mutex::new(Vec::new()),
            read_failures: AtomicU32::new(0),
            create_failures: AtomicU32::new(0),
            next_id: AtomicI64::new(1000),
        }
    }

    pub fn insert(&self, entity: &str, record: Record) {
        let mut records = self.records.lock().unwrap_or_else(|p| p.into_inner());
        records.entry(entity.to_string()).or_default().push(record);
    }

    /// Make the next `count` reads fail with a transport error.
    pub fn fail_reads(&self, count: u32) {
        self.read_failures.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` creates fail with a transport error.
    pub fn fail_creates(&self, count: u32) {
        self.create_failures.store(count, Ordering::SeqCst);
    }

    pub fn dispatched(&self) -> Vec<DispatchedCall> {
        self.dispatched.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn created(&self) -> Vec<(String, Record)> {
        self.created.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl BackendClient for FakeBackend {
    async fn authenticate(&self) -> Result<i64, IdentityError> {
        if self.login.is_empty() {
            return Err(IdentityError::AuthenticationFailed { login: self.login.clone() });
        }
        Ok(self.uid)
    }

    async fn read_own_user(&self, uid: i64, fields: &[&str]) -> Result<Record, BackendError> {
        let mut record = Record::new();
        if fields.contains(&"id") {
            record.insert("id".to_string(), Value::from(uid));
        }
        if fields.contains(&"login") {
            record.insert("login".to_string(), Value::from(self.login.clone()));
        }
        if fields.contains(&"company_id") {
            record.insert(
                "company_id".to_string(),
                serde_json::json!([self.tenant.0, self.tenant.1]),
            );
        }
        Ok(record)
    }

    async fn search_read(
        &self,
        entity: &str,
        domain: &Value,
        fields: &[String],
        limit: u32,
    ) -> Result<Vec<Record>, BackendError> {
        self.dispatched.lock().unwrap_or_else(|p| p.into_inner()).push(DispatchedCall {
            entity: entity.to_string(),
            domain: domain.clone(),
            fields: fields.to_vec(),
            limit,
        });
        if Self::take_failure(&self.read_failures) {
            return Err(BackendError::Transport("injected read failure".to_string()));
        }
        let records = self.records.lock().unwrap_or_else(|p| p.into_inner());
        Ok(records.get(entity).cloned().unwrap_or_default())
    }

    async fn create(&self, entity: &str, values: &Record) -> Result<i64, BackendError> {
        self.dispatched.lock().unwrap_or_else(|p| p.into_inner()).push(DispatchedCall {
            entity: entity.to_string(),
            domain: Value::Null,
            fields: values.keys().cloned().collect(),
            limit: 0,
        });
        if Self::take_failure(&self.create_failures) {
            return Err(BackendError::Transport("injected create failure".to_string()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.created
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((entity.to_string(), values.clone()));
        Ok(id)
    }
}
