//! The mediating gateway. Every entity access flows through here and
//! nowhere else: scope injection, domain and field validation, limit
//! enforcement, bounded retries, and audit emission around each call.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::audit::{AuditOperation, AuditOutcome, AuditRecord, AuditSink};
use crate::backend::BackendClient;
use crate::domain::{Domain, DomainExpr, Record};
use crate::errors::{GatewayError, IdentityError, PolicyError};
use crate::policy::{EntityPolicy, Operation, PolicyTable};
use crate::session::SessionContext;

/// Bounded exponential backoff for transient read failures. Creates are
/// never retried: a dispatched create cannot be cancelled, and re-sending
/// it could duplicate the record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 2, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Append the tenant scope to a caller domain:
/// `... OR(tenant = current, tenant = unset)`.
///
/// Records with no tenant set are shared reference data, deliberately
/// visible to every tenant; this exact shape is a contract, not an
/// implementation detail. For entities without a tenant column the domain
/// passes through untouched.
pub fn inject_tenant_scope(mut domain: Domain, tenant_id: i64, policy: &EntityPolicy) -> Domain {
    let Some(tenant_field) = policy.tenant_field else {
        return domain;
    };
    domain.push(DomainExpr::Or);
    domain.push_clause(tenant_field, crate::domain::CompareOp::Eq, tenant_id);
    domain.push_clause(tenant_field, crate::domain::CompareOp::Eq, false);
    domain
}

pub struct Gateway {
    backend: Arc<dyn BackendClient>,
    policies: PolicyTable,
    audit: Arc<dyn AuditSink>,
    retry: RetryPolicy,
    call_timeout: Duration,
    session: OnceCell<SessionContext>,
}

impl Gateway {
    pub fn new(
        backend: Arc<dyn BackendClient>,
        policies: PolicyTable,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            backend,
            policies,
            audit,
            retry: RetryPolicy::default(),
            call_timeout: Duration::from_secs(30),
            session: OnceCell::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    /// Resolve the session context, bootstrapping it on first use.
    ///
    /// Bootstrap issues the one sanctioned unscoped read: the identity's own
    /// user record, because the tenant cannot be known before it is read.
    /// Concurrent first calls race safely and converge on one context.
    pub async fn session(&self) -> Result<&SessionContext, IdentityError> {
        self.session
            .get_or_try_init(|| async {
                let uid = self.backend.authenticate().await?;
                let record =
                    self.backend.read_own_user(uid, &["id", "login", "company_id"]).await?;
                let tenant_id = record
                    .get("company_id")
                    .and_then(|value| value.as_array())
                    .and_then(|pair| pair.first())
                    .and_then(|id| id.as_i64())
                    .ok_or(IdentityError::UnresolvedTenant { uid })?;
                let login = record
                    .get("login")
                    .and_then(|value| value.as_str())
                    .unwrap_or_default()
                    .to_string();
                debug!(uid, tenant_id, "session bootstrap complete");
                Ok(SessionContext::new(uid, login, tenant_id))
            })
            .await
    }

    /// Policy-checked, tenant-scoped, audited read.
    pub async fn read(
        &self,
        entity: &str,
        domain: Domain,
        fields: &[&str],
        limit: Option<u32>,
    ) -> Result<Vec<Record>, GatewayError> {
        let session = self.session().await?.clone();
        let policy = match self.policies.get(entity) {
            Some(policy) => policy,
            None => {
                let err = PolicyError::UnknownEntity(entity.to_string());
                self.audit_read_rejection(&session, entity, &domain, fields, &err);
                return Err(err.into());
            }
        };

        if let Err(err) = check_read(policy, &domain, fields, limit) {
            self.audit_read_rejection(&session, entity, &domain, fields, &err);
            return Err(err.into());
        }
        let limit = limit.unwrap_or_default();

        let scoped = inject_tenant_scope(domain, session.tenant_id, policy);
        let wire = scoped.to_wire();
        let field_list: Vec<String> = fields.iter().map(|field| field.to_string()).collect();

        let mut last_failure = None;
        for attempt in 0..=self.retry.max_retries {
            let dispatch = self.backend.search_read(entity, &wire, &field_list, limit);
            let outcome = match tokio::time::timeout(self.call_timeout, dispatch).await {
                Ok(result) => result,
                Err(_) => Err(crate::errors::BackendError::Timeout(self.call_timeout)),
            };
            match outcome {
                Ok(mut records) => {
                    records.truncate(limit as usize);
                    for record in &mut records {
                        record.retain(|key, _| field_list.iter().any(|field| field == key));
                    }
                    self.audit.emit(AuditRecord::new(
                        session.uid,
                        session.tenant_id,
                        entity,
                        AuditOperation::Read,
                        scoped.render(),
                        field_list.clone(),
                        AuditOutcome::Completed { records: records.len() },
                    ));
                    return Ok(records);
                }
                Err(err) => {
                    warn!(
                        entity,
                        attempt,
                        max_retries = self.retry.max_retries,
                        error = %err,
                        "backend read failed"
                    );
                    last_failure = Some(err);
                    if attempt < self.retry.max_retries {
                        tokio::time::sleep(self.retry.backoff(attempt)).await;
                    }
                }
            }
        }

        let last = last_failure
            .map(|err| err.to_string())
            .unwrap_or_else(|| "no attempt recorded".to_string());
        let err = crate::errors::BackendError::RetriesExhausted {
            attempts: self.retry.max_retries + 1,
            last: last.clone(),
        };
        self.audit.emit(AuditRecord::new(
            session.uid,
            session.tenant_id,
            entity,
            AuditOperation::Read,
            scoped.render(),
            field_list,
            AuditOutcome::Failed { reason: last },
        ));
        Err(err.into())
    }

    /// Policy-checked, tenant-injecting, audited create. Dispatched at most
    /// once.
    pub async fn create(&self, entity: &str, values: Record) -> Result<i64, GatewayError> {
        let session = self.session().await?.clone();
        let policy = match self.policies.get(entity) {
            Some(policy) => policy,
            None => {
                let err = PolicyError::UnknownEntity(entity.to_string());
                self.audit_create_rejection(&session, entity, &values, &err);
                return Err(err.into());
            }
        };

        if let Err(err) = check_create(policy, &values) {
            self.audit_create_rejection(&session, entity, &values, &err);
            return Err(err.into());
        }

        let mut values = values;
        if let Some(tenant_field) = policy.tenant_field {
            values.insert(tenant_field.to_string(), serde_json::Value::from(session.tenant_id));
        }
        let value_keys: Vec<String> = values.keys().cloned().collect();

        let dispatch = self.backend.create(entity, &values);
        let outcome = match tokio::time::timeout(self.call_timeout, dispatch).await {
            Ok(result) => result,
            Err(_) => Err(crate::errors::BackendError::Timeout(self.call_timeout)),
        };
        match outcome {
            Ok(id) => {
                self.audit.emit(AuditRecord::new(
                    session.uid,
                    session.tenant_id,
                    entity,
                    AuditOperation::Create,
                    "",
                    value_keys,
                    AuditOutcome::Created { id },
                ));
                Ok(id)
            }
            Err(err) => {
                warn!(entity, error = %err, "backend create failed; not retrying");
                self.audit.emit(AuditRecord::new(
                    session.uid,
                    session.tenant_id,
                    entity,
                    AuditOperation::Create,
                    "",
                    value_keys,
                    AuditOutcome::Failed { reason: err.to_string() },
                ));
                Err(err.into())
            }
        }
    }

    fn audit_read_rejection(
        &self,
        session: &SessionContext,
        entity: &str,
        domain: &Domain,
        fields: &[&str],
        err: &PolicyError,
    ) {
        self.audit.emit(AuditRecord::new(
            session.uid,
            session.tenant_id,
            entity,
            AuditOperation::Read,
            domain.render(),
            fields.iter().map(|field| field.to_string()).collect(),
            AuditOutcome::Rejected { reason: err.class().to_string() },
        ));
    }

    fn audit_create_rejection(
        &self,
        session: &SessionContext,
        entity: &str,
        values: &Record,
        err: &PolicyError,
    ) {
        self.audit.emit(AuditRecord::new(
            session.uid,
            session.tenant_id,
            entity,
            AuditOperation::Create,
            "",
            values.keys().cloned().collect(),
            AuditOutcome::Rejected { reason: err.class().to_string() },
        ));
    }
}

fn check_read(
    policy: &EntityPolicy,
    domain: &Domain,
    fields: &[&str],
    limit: Option<u32>,
) -> Result<(), PolicyError> {
    let entity = policy.entity.to_string();

    if !policy.allows(Operation::Read) {
        return Err(PolicyError::OperationNotAllowed { entity, operation: Operation::Read });
    }

    if fields.is_empty() {
        return Err(PolicyError::EmptyFieldList { entity });
    }
    for field in fields {
        if !policy.is_readable(field) {
            return Err(PolicyError::FieldNotReadable {
                entity,
                field: field.to_string(),
            });
        }
    }

    match limit {
        None | Some(0) => return Err(PolicyError::LimitUnset { entity }),
        Some(requested) if requested > policy.max_limit => {
            return Err(PolicyError::LimitExceeded {
                entity,
                requested,
                max: policy.max_limit,
            })
        }
        Some(_) => {}
    }

    for clause in domain.clauses() {
        // A caller-supplied tenant clause is a scope-override attempt, not a
        // filter; it is rejected rather than silently replaced.
        if policy.tenant_field == Some(clause.field.as_str()) {
            return Err(PolicyError::TenantOverride { entity, field: clause.field.clone() });
        }
        if policy.is_forbidden(&clause.field) {
            return Err(PolicyError::ForbiddenField { entity, field: clause.field.clone() });
        }
        if !policy.is_readable(&clause.field) {
            return Err(PolicyError::FieldNotReadable { entity, field: clause.field.clone() });
        }
    }

    if let Some(fragment) = policy.missing_fragment(domain) {
        return Err(PolicyError::MissingMandatoryFragment {
            entity,
            field: fragment.field.to_string(),
        });
    }

    Ok(())
}

fn check_create(policy: &EntityPolicy, values: &Record) -> Result<(), PolicyError> {
    let entity = policy.entity.to_string();

    if !policy.allows(Operation::Create) {
        return Err(PolicyError::OperationNotAllowed { entity, operation: Operation::Create });
    }
    if values.is_empty() {
        return Err(PolicyError::EmptyCreateValues { entity });
    }
    for key in values.keys() {
        if policy.tenant_field == Some(key.as_str()) {
            return Err(PolicyError::TenantOverride { entity, field: key.clone() });
        }
        if !policy.is_creatable(key) {
            return Err(PolicyError::FieldNotCreatable { entity, field: key.clone() });
        }
    }
    Ok(())
}
