//! Gateway contract tests against the in-memory backend: scope injection,
//! policy rejection before dispatch, limit/field enforcement, audit
//! emission, and retry behavior.

use std::sync::Arc;

use opsgate_core::audit::{AuditOutcome, InMemoryAuditSink};
use opsgate_core::backend::FakeBackend;
use opsgate_core::domain::{CompareOp, Domain, Record};
use opsgate_core::errors::{BackendError, GatewayError, PolicyError};
use opsgate_core::gateway::{Gateway, RetryPolicy};
use opsgate_core::policy::PolicyTable;
use serde_json::json;

const TENANT: i64 = 7;

fn record(value: serde_json::Value) -> Record {
    serde_json::from_value(value).expect("object literal")
}

fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy { max_retries, base_delay_ms: 1, max_delay_ms: 2 }
}

fn harness() -> (Arc<FakeBackend>, Gateway, InMemoryAuditSink) {
    let backend = Arc::new(FakeBackend::new(2, "agent@example.com", TENANT, "Acme Corp"));
    let audit = InMemoryAuditSink::default();
    let gateway = Gateway::new(backend.clone(), PolicyTable::builtin(), Arc::new(audit.clone()))
        .with_retry(fast_retry(2));
    (backend, gateway, audit)
}

fn partner_domain() -> Domain {
    Domain::new().filter("active", CompareOp::Eq, true)
}

#[tokio::test]
async fn session_bootstrap_is_idempotent_under_races() {
    let (_, gateway, _) = harness();
    let gateway = Arc::new(gateway);

    let (first, second) =
        tokio::join!(gateway.session(), gateway.session());
    let first = first.expect("bootstrap").clone();
    let second = second.expect("bootstrap").clone();

    assert_eq!(first, second);
    assert_eq!(first.tenant_id, TENANT);
}

#[tokio::test]
async fn read_injects_tenant_scope_before_dispatch() {
    let (backend, gateway, _) = harness();

    gateway
        .read("res.partner", partner_domain(), &["id", "name"], Some(10))
        .await
        .expect("read");

    let dispatched = backend.dispatched();
    assert_eq!(dispatched.len(), 1);
    assert_eq!(
        dispatched[0].domain,
        json!([
            ["active", "=", true],
            "|",
            ["company_id", "=", TENANT],
            ["company_id", "=", false],
        ])
    );
}

#[tokio::test]
async fn caller_supplied_tenant_filter_is_rejected_not_overridden() {
    let (backend, gateway, audit) = harness();
    let domain = partner_domain().filter("company_id", CompareOp::Eq, 99i64);

    let result = gateway.read("res.partner", domain, &["id", "name"], Some(10)).await;

    assert!(matches!(
        result,
        Err(GatewayError::Policy(PolicyError::TenantOverride { .. }))
    ));
    assert!(backend.dispatched().is_empty(), "rejection must never reach the transport");
    let records = audit.records();
    assert_eq!(records.len(), 1);
    assert_eq!(
        records[0].outcome,
        AuditOutcome::Rejected { reason: "tenant_override".to_string() }
    );
}

#[tokio::test]
async fn returned_records_carry_exactly_the_requested_fields() {
    let (backend, gateway, _) = harness();
    backend.insert(
        "res.partner",
        record(json!({
            "id": 11,
            "name": "Acme GmbH",
            "email": "info@acme.example",
            "credit_limit": 5000.0,
        })),
    );

    let rows = gateway
        .read("res.partner", partner_domain(), &["id", "name"], Some(10))
        .await
        .expect("read");

    assert_eq!(rows.len(), 1);
    let mut keys: Vec<&str> = rows[0].keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(keys, vec!["id", "name"]);
}

#[tokio::test]
async fn limit_bounds_the_returned_count() {
    let (backend, gateway, _) = harness();
    for id in 0..5 {
        backend.insert("res.partner", record(json!({ "id": id, "name": format!("P{id}") })));
    }

    let rows = gateway
        .read("res.partner", partner_domain(), &["id", "name"], Some(2))
        .await
        .expect("read");
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn unset_or_zero_limit_is_rejected_before_dispatch() {
    let (backend, gateway, _) = harness();

    for limit in [None, Some(0)] {
        let result = gateway.read("res.partner", partner_domain(), &["id"], limit).await;
        assert!(matches!(
            result,
            Err(GatewayError::Policy(PolicyError::LimitUnset { .. }))
        ));
    }
    assert!(backend.dispatched().is_empty());
}

#[tokio::test]
async fn identical_reads_return_identical_results() {
    let (backend, gateway, _) = harness();
    backend.insert("res.partner", record(json!({ "id": 11, "name": "Acme GmbH" })));

    let first = gateway
        .read("res.partner", partner_domain(), &["id", "name"], Some(10))
        .await
        .expect("first read");
    let second = gateway
        .read("res.partner", partner_domain(), &["id", "name"], Some(10))
        .await
        .expect("second read");
    assert_eq!(first, second);
}

#[tokio::test]
async fn unknown_entity_is_rejected_and_audited() {
    let (backend, gateway, audit) = harness();

    let result = gateway.read("account.move", Domain::new(), &["id"], Some(10)).await;

    assert!(matches!(
        result,
        Err(GatewayError::Policy(PolicyError::UnknownEntity(_)))
    ));
    assert!(backend.dispatched().is_empty());
    assert_eq!(audit.records().len(), 1);
}

#[tokio::test]
async fn forbidden_field_in_domain_is_rejected() {
    let (backend, gateway, _) = harness();
    let domain = Domain::new()
        .filter("active", CompareOp::Eq, true)
        .filter("private_email", CompareOp::ILike, "@gmail.com");

    let result = gateway.read("hr.employee", domain, &["id", "name"], Some(10)).await;

    assert!(matches!(
        result,
        Err(GatewayError::Policy(PolicyError::ForbiddenField { ref field, .. })) if field == "private_email"
    ));
    assert!(backend.dispatched().is_empty());
}

#[tokio::test]
async fn tenantless_read_without_mandatory_fragment_is_rejected() {
    let (backend, gateway, _) = harness();

    let result = gateway
        .read("crm.stage", Domain::new().filter("name", CompareOp::ILike, "won"), &["id", "name"], Some(10))
        .await;

    assert!(matches!(
        result,
        Err(GatewayError::Policy(PolicyError::MissingMandatoryFragment { .. }))
    ));
    assert!(backend.dispatched().is_empty(), "must fail before any transport dispatch");
}

#[tokio::test]
async fn read_retries_transient_failures_then_succeeds() {
    let (backend, gateway, _) = harness();
    backend.insert("res.partner", record(json!({ "id": 11, "name": "Acme GmbH" })));
    backend.fail_reads(2);

    let rows = gateway
        .read("res.partner", partner_domain(), &["id", "name"], Some(10))
        .await
        .expect("read should succeed on the third attempt");

    assert_eq!(rows.len(), 1);
    assert_eq!(backend.dispatched().len(), 3);
}

#[tokio::test]
async fn read_surfaces_backend_error_after_exhausting_retries() {
    let (backend, gateway, audit) = harness();
    backend.fail_reads(10);

    let result = gateway
        .read("res.partner", partner_domain(), &["id", "name"], Some(10))
        .await;

    assert!(matches!(
        result,
        Err(GatewayError::Backend(BackendError::RetriesExhausted { attempts: 3, .. }))
    ));
    assert_eq!(backend.dispatched().len(), 3);
    let records = audit.records();
    assert!(matches!(records.last().map(|r| &r.outcome), Some(AuditOutcome::Failed { .. })));
}

#[tokio::test]
async fn create_injects_tenant_and_returns_new_id() {
    let (backend, gateway, audit) = harness();
    let values = record(json!({ "name": "New Partner", "email": "np@example.com" }));

    let id = gateway.create("res.partner", values).await.expect("create");

    let created = backend.created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].1.get("company_id"), Some(&json!(TENANT)));
    assert_eq!(
        audit.records().last().map(|r| r.outcome.clone()),
        Some(AuditOutcome::Created { id })
    );
}

#[tokio::test]
async fn create_with_caller_tenant_value_is_rejected_and_audited() {
    let (backend, gateway, audit) = harness();
    let values = record(json!({ "name": "Sneaky", "company_id": 99 }));

    let result = gateway.create("res.partner", values).await;

    assert!(matches!(
        result,
        Err(GatewayError::Policy(PolicyError::TenantOverride { .. }))
    ));
    assert!(backend.created().is_empty(), "no record may be created");
    let records = audit.records();
    assert_eq!(records.len(), 1);
    assert_eq!(
        records[0].outcome,
        AuditOutcome::Rejected { reason: "tenant_override".to_string() }
    );
}

#[tokio::test]
async fn create_for_read_only_entity_is_rejected() {
    let (_, gateway, _) = harness();
    let values = record(json!({ "name": "HQ" }));

    let result = gateway.create("hr.employee", values).await;
    assert!(matches!(
        result,
        Err(GatewayError::Policy(PolicyError::OperationNotAllowed { .. }))
    ));
}

#[tokio::test]
async fn create_is_never_retried() {
    let (backend, gateway, _) = harness();
    backend.fail_creates(1);
    let values = record(json!({ "name": "Once Only" }));

    let result = gateway.create("res.partner", values).await;

    assert!(matches!(result, Err(GatewayError::Backend(_))));
    assert_eq!(backend.dispatched().len(), 1, "a failed create must not be re-dispatched");
    assert!(backend.created().is_empty());
}
