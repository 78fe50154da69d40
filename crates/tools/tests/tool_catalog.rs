//! Tool behavior against the in-memory backend: input validation, the
//! availability composition, the duplicate guard, and the exact domains
//! dispatched on behalf of each tool.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use opsgate_core::{FakeBackend, Gateway, InMemoryAuditSink, PolicyTable, Record, ToolError};
use opsgate_tools::{builtin_registry, ToolRegistry};
use serde_json::{json, Value};
use tracing::instrument::WithSubscriber;

const TENANT: i64 = 7;

fn record(value: Value) -> Record {
    serde_json::from_value(value).expect("object literal")
}

/// Collects formatted log output so tests can assert on emitted events.
#[derive(Clone, Default)]
struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().expect("log buffer")).into_owned()
    }

    fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync + 'static {
        tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish()
    }
}

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("log buffer").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn harness() -> (Arc<FakeBackend>, ToolRegistry) {
    let backend = Arc::new(FakeBackend::new(2, "agent@example.com", TENANT, "Acme Corp"));
    let gateway = Arc::new(Gateway::new(
        backend.clone(),
        PolicyTable::builtin(),
        Arc::new(InMemoryAuditSink::default()),
    ));
    (backend, builtin_registry(gateway))
}

#[tokio::test]
async fn availability_counts_overlap_days_once_and_clips_to_window() {
    let (backend, registry) = harness();
    backend.insert("hr.employee", record(json!({ "id": 5, "name": "Dana Ellis", "active": true })));
    backend.insert(
        "hr.leave",
        record(json!({
            "id": 31,
            "employee_id": [5, "Dana Ellis"],
            "date_from": "2024-12-21 08:00:00",
            "date_to": "2024-12-23 17:00:00",
            "holiday_status_id": [3, "Paid Time Off"],
            "state": "validate",
        })),
    );

    let report = registry
        .call(
            "check_employee_availability",
            json!({ "employee_id": 5, "date_from": "2024-12-20", "date_to": "2024-12-22" }),
        )
        .await
        .expect("availability report");

    assert_eq!(report["subject_name"], "Dana Ellis");
    assert_eq!(report["total_days"], 3);
    assert_eq!(report["unavailable_days"], 2);
    assert_eq!(report["available_days"], 1);
    assert_eq!(report["is_available"], false);
    assert_eq!(report["conflicting_intervals"][0]["interval_id"], 31);
    assert_eq!(report["conflicting_intervals"][0]["days_in_window"], 2);
    assert_eq!(report["conflicting_intervals"][0]["kind"], "Paid Time Off");
    assert_eq!(
        report["conflicting_intervals"][0]["affected_dates"],
        json!(["2024-12-21", "2024-12-22"])
    );
}

#[tokio::test]
async fn availability_with_no_leaves_reports_fully_available() {
    let (backend, registry) = harness();
    backend.insert("hr.employee", record(json!({ "id": 5, "name": "Dana Ellis", "active": true })));

    let report = registry
        .call(
            "check_employee_availability",
            json!({ "employee_id": 5, "date_from": "2024-12-20", "date_to": "2024-12-22" }),
        )
        .await
        .expect("availability report");

    assert_eq!(report["unavailable_days"], 0);
    assert_eq!(report["available_days"], 3);
    assert_eq!(report["is_available"], true);
}

#[tokio::test]
async fn availability_for_unknown_employee_is_not_found() {
    let (_, registry) = harness();

    let result = registry
        .call(
            "check_employee_availability",
            json!({ "employee_id": 404, "date_from": "2024-12-20", "date_to": "2024-12-22" }),
        )
        .await;

    assert!(matches!(result, Err(ToolError::NotFound(_))));
}

#[tokio::test]
async fn availability_input_violations_are_all_reported_at_once() {
    let (backend, registry) = harness();

    let err = registry
        .call(
            "check_employee_availability",
            json!({ "employee_id": 5, "date_from": "yesterday", "date_to": "2024/12/22" }),
        )
        .await
        .expect_err("two bad dates");

    assert_eq!(err.kind(), "validation");
    let rendered = err.to_string();
    assert!(rendered.contains("date_from"));
    assert!(rendered.contains("date_to"));
    assert!(backend.dispatched().is_empty(), "validation must fail before any read");
}

#[tokio::test]
async fn inverted_window_is_a_validation_error() {
    let (_, registry) = harness();

    let err = registry
        .call(
            "check_employee_availability",
            json!({ "employee_id": 5, "date_from": "2024-12-22", "date_to": "2024-12-20" }),
        )
        .await
        .expect_err("inverted window");
    assert_eq!(err.kind(), "validation");
}

#[tokio::test]
async fn leave_reads_always_pin_the_approved_state() {
    let (backend, registry) = harness();

    registry
        .call("get_employee_leaves", json!({ "employee_id": 5 }))
        .await
        .expect("leave read");

    let dispatched = backend.dispatched();
    assert_eq!(dispatched.len(), 1);
    let domain = dispatched[0].domain.as_array().expect("wire domain");
    assert!(
        domain.contains(&json!(["state", "=", "validate"])),
        "dispatched domain was {domain:?}"
    );
}

#[tokio::test]
async fn leaves_carry_derived_employee_and_type_names() {
    let (backend, registry) = harness();
    backend.insert(
        "hr.leave",
        record(json!({
            "id": 31,
            "employee_id": [5, "Dana Ellis"],
            "date_from": "2025-01-06 00:00:00",
            "date_to": "2025-01-07 23:59:59",
            "number_of_days": 2.0,
            "holiday_status_id": [3, "Paid Time Off"],
            "state": "validate",
        })),
    );

    let payload = registry
        .call("get_employee_leaves", json!({ "employee_id": 5 }))
        .await
        .expect("leaves");

    assert_eq!(payload["count"], 1);
    assert_eq!(payload["records"][0]["employee_name"], "Dana Ellis");
    assert_eq!(payload["records"][0]["leave_type"], "Paid Time Off");
}

#[tokio::test]
async fn create_partner_rejects_duplicates_by_name() {
    let (backend, registry) = harness();
    backend.insert(
        "res.partner",
        record(json!({ "id": 11, "name": "Acme GmbH", "active": true })),
    );

    let err = registry
        .call("create_partner", json!({ "name": "Acme GmbH" }))
        .await
        .expect_err("duplicate");

    assert_eq!(err.kind(), "validation");
    assert!(err.to_string().contains("already exists"));
    assert!(backend.created().is_empty());
}

#[tokio::test]
async fn create_partner_validates_name_and_email_together() {
    let (backend, registry) = harness();

    let err = registry
        .call("create_partner", json!({ "name": "   ", "email": "not-an-address" }))
        .await
        .expect_err("two violations");

    let rendered = err.to_string();
    assert!(rendered.contains("name"));
    assert!(rendered.contains("not-an-address"));
    assert!(backend.dispatched().is_empty());
}

#[tokio::test]
async fn create_partner_returns_the_new_id() {
    let (backend, registry) = harness();

    let result = registry
        .call(
            "create_partner",
            json!({ "name": "Borealis AG", "email": "sales@borealis.example", "city": "Oslo" }),
        )
        .await
        .expect("create");

    assert!(result["id"].as_i64().is_some());
    assert_eq!(result["name"], "Borealis AG");
    let created = backend.created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].1.get("company_id"), Some(&json!(TENANT)));
    assert_eq!(created[0].1.get("city"), Some(&json!("Oslo")));
}

#[tokio::test]
async fn get_company_rejects_other_tenants() {
    let (backend, registry) = harness();

    let err = registry
        .call("get_company", json!({ "company_id": 99 }))
        .await
        .expect_err("cross tenant");

    assert_eq!(err.kind(), "policy");
    assert!(backend.dispatched().is_empty());
}

#[tokio::test]
async fn get_company_defaults_to_the_session_tenant() {
    let (backend, registry) = harness();
    backend.insert(
        "res.company",
        record(json!({ "id": TENANT, "name": "Acme Corp", "currency_id": [1, "EUR"] })),
    );

    let company = registry.call("get_company", Value::Null).await.expect("company");
    assert_eq!(company["id"], TENANT);
    assert_eq!(company["name"], "Acme Corp");
}

#[tokio::test]
async fn get_lead_rejects_unknown_type() {
    let (_, registry) = harness();

    let err = registry
        .call("get_lead", json!({ "type": "prospect" }))
        .await
        .expect_err("bad type");

    assert_eq!(err.kind(), "validation");
    assert!(err.to_string().contains("prospect"));
}

#[tokio::test]
async fn get_lead_derives_partner_and_stage_names() {
    let (backend, registry) = harness();
    backend.insert(
        "crm.lead",
        record(json!({
            "id": 21,
            "name": "Renewal Q3",
            "partner_id": [11, "Acme GmbH"],
            "stage_id": [4, "Proposition"],
            "type": "opportunity",
            "active": true,
        })),
    );

    let payload = registry
        .call("get_lead", json!({ "type": "opportunity" }))
        .await
        .expect("leads");

    assert_eq!(payload["count"], 1);
    assert_eq!(payload["records"][0]["partner_name"], "Acme GmbH");
    assert_eq!(payload["records"][0]["stage_name"], "Proposition");
}

#[tokio::test]
async fn attendance_day_filter_becomes_a_check_in_window() {
    let (backend, registry) = harness();

    registry
        .call(
            "get_employee_attendance",
            json!({ "employee_id": 5, "date": "2024-12-21" }),
        )
        .await
        .expect("attendance read");

    let dispatched = backend.dispatched();
    let domain = dispatched[0].domain.as_array().expect("wire domain");
    assert!(domain.contains(&json!(["check_in", ">=", "2024-12-21 00:00:00"])));
    assert!(domain.contains(&json!(["check_in", "<=", "2024-12-21 23:59:59"])));
    assert!(domain.contains(&json!(["employee_id", "!=", false])));
}

#[tokio::test]
async fn attendance_sums_worked_hours() {
    let (backend, registry) = harness();
    backend.insert(
        "hr.attendance",
        record(json!({
            "id": 1,
            "employee_id": [5, "Dana Ellis"],
            "check_in": "2024-12-21 08:00:00",
            "check_out": "2024-12-21 12:00:00",
            "worked_hours": 4.0,
        })),
    );
    backend.insert(
        "hr.attendance",
        record(json!({
            "id": 2,
            "employee_id": [5, "Dana Ellis"],
            "check_in": "2024-12-21 13:00:00",
            "check_out": "2024-12-21 17:30:00",
            "worked_hours": 4.5,
        })),
    );

    let payload = registry
        .call("get_employee_attendance", json!({ "employee_id": 5 }))
        .await
        .expect("attendance");

    assert_eq!(payload["count"], 2);
    assert_eq!(payload["total_worked_hours"], 8.5);
}

#[tokio::test]
async fn unknown_input_keys_are_validation_errors() {
    let (backend, registry) = harness();

    let err = registry
        .call("get_partner", json!({ "name": "Acme", "order_by": "id" }))
        .await
        .expect_err("unknown key");

    assert_eq!(err.kind(), "validation");
    assert!(backend.dispatched().is_empty());
}

#[tokio::test]
async fn get_partner_requires_a_filter() {
    let (backend, registry) = harness();

    let err = registry.call("get_partner", Value::Null).await.expect_err("no filter");
    assert_eq!(err.kind(), "validation");
    assert!(backend.dispatched().is_empty());
}

#[tokio::test]
async fn get_partner_derives_role_flags_and_reshapes_pairs() {
    let (backend, registry) = harness();
    backend.insert(
        "res.partner",
        record(json!({
            "id": 11,
            "name": "Acme GmbH",
            "email": "info@acme.example",
            "country_id": [57, "Germany"],
            "customer_rank": 2,
            "supplier_rank": 0,
        })),
    );

    let payload = registry
        .call("get_partner", json!({ "name": "acme" }))
        .await
        .expect("partners");

    assert_eq!(payload["count"], 1);
    let partner = &payload["records"][0];
    assert_eq!(partner["name"], "Acme GmbH");
    assert_eq!(partner["is_customer"], true);
    assert_eq!(partner["is_supplier"], false);
    assert_eq!(partner["country_id"], json!({ "id": 57, "name": "Germany" }));
    assert!(partner.get("customer_rank").is_none(), "raw ranks must not leak");
}

#[tokio::test]
async fn get_employee_requires_a_filter() {
    let (_, registry) = harness();

    let err = registry.call("get_employee", Value::Null).await.expect_err("no filter");
    assert_eq!(err.kind(), "validation");
}

#[tokio::test]
async fn get_lead_requires_a_filter() {
    let (_, registry) = harness();

    let err = registry.call("get_lead", Value::Null).await.expect_err("no filter");
    assert_eq!(err.kind(), "validation");
}

#[tokio::test]
async fn corrupt_leave_dates_are_a_backend_fault_not_a_caller_error() {
    let (backend, registry) = harness();
    backend.insert("hr.employee", record(json!({ "id": 5, "name": "Dana Ellis", "active": true })));
    backend.insert(
        "hr.leave",
        record(json!({
            "id": 31,
            "employee_id": [5, "Dana Ellis"],
            "date_from": "corrupted-value",
            "date_to": "2024-12-23 17:00:00",
            "state": "validate",
        })),
    );

    let err = registry
        .call(
            "check_employee_availability",
            json!({ "employee_id": 5, "date_from": "2024-12-20", "date_to": "2024-12-22" }),
        )
        .await
        .expect_err("unparseable backend date");

    assert_eq!(err.kind(), "backend");
    assert!(
        !err.user_message().contains("corrupted"),
        "backend field values must not reach the caller: {}",
        err.user_message()
    );
}

#[tokio::test]
async fn intent_log_carries_the_normalized_arguments() {
    let (_, registry) = harness();
    let capture = LogCapture::default();

    registry
        .call("get_partner", json!({ "name": "  acme  " }))
        .with_subscriber(capture.subscriber())
        .await
        .expect("partners");

    let logged = capture.contents();
    assert!(logged.contains("get_partner"), "missing intent entry: {logged}");
    assert!(logged.contains("\"name\":\"acme\""), "arguments were not normalized: {logged}");
    assert!(!logged.contains("  acme  "));
}

#[tokio::test]
async fn intent_is_logged_even_when_validation_rejects_the_call() {
    let (backend, registry) = harness();
    let capture = LogCapture::default();

    let err = registry
        .call("get_partner", Value::Null)
        .with_subscriber(capture.subscriber())
        .await
        .expect_err("no filter");

    assert_eq!(err.kind(), "validation");
    assert!(backend.dispatched().is_empty());
    assert!(capture.contents().contains("get_partner"));
}
