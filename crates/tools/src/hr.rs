//! Employee, leave, and attendance tools.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use opsgate_core::availability::{self, AvailabilityWindow, IntervalRecord};
use opsgate_core::chrono::NaiveDate;
use opsgate_core::{BackendError, CompareOp, Domain, Gateway, Record, ToolError};

use crate::pipeline::{
    date_part, effective_limit, intent, normalized, pair_id, pair_name, parse_date, parse_input,
    records_payload, reshape_pairs, Violations,
};
use crate::Tool;

const EMPLOYEE_FIELDS: &[&str] =
    &["id", "name", "job_title", "department_id", "work_email", "work_phone"];
const DEPARTMENT_FIELDS: &[&str] = &["id", "name", "manager_id", "parent_id"];
const JOB_FIELDS: &[&str] = &["id", "name", "department_id", "description"];
const LEAVE_FIELDS: &[&str] = &[
    "id",
    "employee_id",
    "date_from",
    "date_to",
    "number_of_days",
    "holiday_status_id",
    "state",
];
const ATTENDANCE_FIELDS: &[&str] = &["id", "employee_id", "check_in", "check_out", "worked_hours"];

/// Approved leaves overlapping an optional date range, for one employee.
fn leave_domain(employee_id: i64, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Domain {
    let mut domain = Domain::new()
        .filter("state", CompareOp::Eq, "validate")
        .filter("employee_id", CompareOp::Eq, employee_id);
    // Overlap, not containment: a leave straddling the range edge counts.
    if let Some(to) = to {
        domain.push_clause("date_from", CompareOp::LtEq, to.format("%Y-%m-%d").to_string());
    }
    if let Some(from) = from {
        domain.push_clause("date_to", CompareOp::GtEq, from.format("%Y-%m-%d").to_string());
    }
    domain
}

/// Dates on fetched leave records are backend data, not caller input.
/// An unparseable one is a protocol fault and its raw value stays out of
/// the caller-visible message.
fn interval_date(record: &Record, field: &str) -> Result<NaiveDate, ToolError> {
    let raw = record.get(field).and_then(Value::as_str).unwrap_or_default();
    NaiveDate::parse_from_str(date_part(raw), "%Y-%m-%d").map_err(|_| {
        let id = record.get("id").and_then(Value::as_i64).unwrap_or_default();
        ToolError::Backend(BackendError::Protocol(format!(
            "leave record {id} carries an unparseable {field}"
        )))
    })
}

pub struct GetEmployee {
    gateway: Arc<Gateway>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GetEmployeeInput {
    id: Option<i64>,
    name: Option<String>,
    department_id: Option<i64>,
    limit: Option<u32>,
}

impl GetEmployee {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Tool for GetEmployee {
    fn name(&self) -> &'static str {
        "get_employee"
    }

    fn description(&self) -> &'static str {
        "Search employees by name or department"
    }

    async fn call(&self, input: Value) -> Result<Value, ToolError> {
        let input: GetEmployeeInput = parse_input(input)?;

        let name = normalized(input.name);
        let limit = effective_limit(input.limit, 10);
        intent(
            self.name(),
            &json!({
                "id": input.id,
                "name": &name,
                "department_id": input.department_id,
                "limit": limit,
            }),
        );
        let mut violations = Violations::default();
        if input.id.is_none() && name.is_none() && input.department_id.is_none() {
            violations.flag("at least one of id, name, department_id is required");
        }
        violations.check()?;

        let mut domain = Domain::new().filter("active", CompareOp::Eq, true);
        if let Some(id) = input.id {
            domain.push_clause("id", CompareOp::Eq, id);
        }
        if let Some(name) = name {
            domain.push_clause("name", CompareOp::ILike, name);
        }
        if let Some(department_id) = input.department_id {
            domain.push_clause("department_id", CompareOp::Eq, department_id);
        }

        let records = self
            .gateway
            .read("hr.employee", domain, EMPLOYEE_FIELDS, Some(limit))
            .await?;
        Ok(records_payload(records))
    }
}

pub struct GetDepartment {
    gateway: Arc<Gateway>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GetDepartmentInput {
    name: Option<String>,
    limit: Option<u32>,
}

impl GetDepartment {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Tool for GetDepartment {
    fn name(&self) -> &'static str {
        "get_department"
    }

    fn description(&self) -> &'static str {
        "List departments, optionally filtered by name"
    }

    async fn call(&self, input: Value) -> Result<Value, ToolError> {
        let input: GetDepartmentInput = parse_input(input)?;

        let name = normalized(input.name);
        let limit = effective_limit(input.limit, 100);
        intent(self.name(), &json!({ "name": &name, "limit": limit }));

        let mut domain = Domain::new();
        if let Some(name) = name {
            domain.push_clause("name", CompareOp::ILike, name);
        }

        let records = self
            .gateway
            .read("hr.department", domain, DEPARTMENT_FIELDS, Some(limit))
            .await?;
        Ok(records_payload(records))
    }
}

pub struct GetJob {
    gateway: Arc<Gateway>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GetJobInput {
    name: Option<String>,
    department_id: Option<i64>,
    limit: Option<u32>,
}

impl GetJob {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Tool for GetJob {
    fn name(&self) -> &'static str {
        "get_job"
    }

    fn description(&self) -> &'static str {
        "List job positions, optionally filtered by name or department"
    }

    async fn call(&self, input: Value) -> Result<Value, ToolError> {
        let input: GetJobInput = parse_input(input)?;

        let name = normalized(input.name);
        let limit = effective_limit(input.limit, 100);
        intent(
            self.name(),
            &json!({ "name": &name, "department_id": input.department_id, "limit": limit }),
        );

        let mut domain = Domain::new();
        if let Some(name) = name {
            domain.push_clause("name", CompareOp::ILike, name);
        }
        if let Some(department_id) = input.department_id {
            domain.push_clause("department_id", CompareOp::Eq, department_id);
        }

        let records = self.gateway.read("hr.job", domain, JOB_FIELDS, Some(limit)).await?;
        Ok(records_payload(records))
    }
}

/// Approved leaves for one employee, optionally clipped to a date range.
pub struct GetEmployeeLeaves {
    gateway: Arc<Gateway>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GetEmployeeLeavesInput {
    employee_id: i64,
    date_from: Option<String>,
    date_to: Option<String>,
    limit: Option<u32>,
}

impl GetEmployeeLeaves {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Tool for GetEmployeeLeaves {
    fn name(&self) -> &'static str {
        "get_employee_leaves"
    }

    fn description(&self) -> &'static str {
        "List an employee's approved leaves, optionally within a date range"
    }

    async fn call(&self, input: Value) -> Result<Value, ToolError> {
        let input: GetEmployeeLeavesInput = parse_input(input)?;

        let mut violations = Violations::default();
        let from = input
            .date_from
            .as_deref()
            .and_then(|raw| parse_date(&mut violations, "date_from", raw));
        let to = input
            .date_to
            .as_deref()
            .and_then(|raw| parse_date(&mut violations, "date_to", raw));
        let limit = effective_limit(input.limit, 100);
        intent(
            self.name(),
            &json!({
                "employee_id": input.employee_id,
                "date_from": from,
                "date_to": to,
                "limit": limit,
            }),
        );
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                violations.flag("date_from must not be after date_to");
            }
        }
        violations.check()?;
        let records = self
            .gateway
            .read(
                "hr.leave",
                leave_domain(input.employee_id, from, to),
                LEAVE_FIELDS,
                Some(limit),
            )
            .await?;

        let leaves: Vec<Value> = records
            .into_iter()
            .map(|mut record| {
                let employee_name = pair_name(&record, "employee_id");
                let leave_type = pair_name(&record, "holiday_status_id");
                reshape_pairs(&mut record);
                if let Some(name) = employee_name {
                    record.insert("employee_name".to_string(), json!(name));
                }
                if let Some(kind) = leave_type {
                    record.insert("leave_type".to_string(), json!(kind));
                }
                Value::Object(record)
            })
            .collect();
        Ok(json!({ "count": leaves.len(), "records": leaves }))
    }
}

/// The one composite tool: subject read, interval read, pure reduction.
pub struct CheckEmployeeAvailability {
    gateway: Arc<Gateway>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CheckAvailabilityInput {
    employee_id: i64,
    date_from: String,
    date_to: String,
}

impl CheckEmployeeAvailability {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Tool for CheckEmployeeAvailability {
    fn name(&self) -> &'static str {
        "check_employee_availability"
    }

    fn description(&self) -> &'static str {
        "Report whether an employee is free over a date window, with conflicts"
    }

    async fn call(&self, input: Value) -> Result<Value, ToolError> {
        let input: CheckAvailabilityInput = parse_input(input)?;

        let mut violations = Violations::default();
        let from = parse_date(&mut violations, "date_from", &input.date_from);
        let to = parse_date(&mut violations, "date_to", &input.date_to);
        intent(
            self.name(),
            &json!({ "employee_id": input.employee_id, "date_from": from, "date_to": to }),
        );
        let window = match (from, to) {
            (Some(from), Some(to)) => {
                let window = AvailabilityWindow::new(from, to);
                if window.is_none() {
                    violations.flag("date_from must not be after date_to");
                }
                window
            }
            _ => None,
        };
        violations.check()?;
        let Some(window) = window else {
            // check() returned above whenever the window is absent.
            return Err(ToolError::validation(vec!["invalid date window".to_string()]));
        };

        let employees = self
            .gateway
            .read(
                "hr.employee",
                Domain::new()
                    .filter("active", CompareOp::Eq, true)
                    .filter("id", CompareOp::Eq, input.employee_id),
                &["id", "name"],
                Some(1),
            )
            .await?;
        let Some(employee) = employees.into_iter().next() else {
            return Err(ToolError::NotFound(format!(
                "employee {} not found",
                input.employee_id
            )));
        };
        let subject_name = employee
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let leaves = self
            .gateway
            .read(
                "hr.leave",
                leave_domain(input.employee_id, Some(window.from), Some(window.to)),
                LEAVE_FIELDS,
                Some(100),
            )
            .await?;

        let mut intervals = Vec::new();
        for record in &leaves {
            intervals.push(IntervalRecord {
                id: record.get("id").and_then(Value::as_i64).unwrap_or_default(),
                date_from: interval_date(record, "date_from")?,
                date_to: interval_date(record, "date_to")?,
                kind: pair_name(record, "holiday_status_id"),
            });
        }

        let report =
            availability::assess(input.employee_id, subject_name, window, &intervals);
        Ok(json!(report))
    }
}

/// Attendance records for one employee, optionally for a single day.
pub struct GetEmployeeAttendance {
    gateway: Arc<Gateway>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GetAttendanceInput {
    employee_id: i64,
    date: Option<String>,
    limit: Option<u32>,
}

impl GetEmployeeAttendance {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Tool for GetEmployeeAttendance {
    fn name(&self) -> &'static str {
        "get_employee_attendance"
    }

    fn description(&self) -> &'static str {
        "List an employee's attendance records, optionally for one day"
    }

    async fn call(&self, input: Value) -> Result<Value, ToolError> {
        let input: GetAttendanceInput = parse_input(input)?;

        let mut violations = Violations::default();
        let day = input
            .date
            .as_deref()
            .and_then(|raw| parse_date(&mut violations, "date", raw));
        let limit = effective_limit(input.limit, 100);
        intent(
            self.name(),
            &json!({ "employee_id": input.employee_id, "date": day, "limit": limit }),
        );
        violations.check()?;

        let mut domain = Domain::new()
            .filter("employee_id", CompareOp::NotEq, false)
            .filter("employee_id", CompareOp::Eq, input.employee_id);
        if let Some(day) = day {
            let day = day.format("%Y-%m-%d");
            domain.push_clause("check_in", CompareOp::GtEq, format!("{day} 00:00:00"));
            domain.push_clause("check_in", CompareOp::LtEq, format!("{day} 23:59:59"));
        }

        let mut records = self
            .gateway
            .read("hr.attendance", domain, ATTENDANCE_FIELDS, Some(limit))
            .await?;

        let total_hours: f64 = records
            .iter()
            .filter_map(|record| record.get("worked_hours").and_then(Value::as_f64))
            .sum();
        let employee_id = records
            .first()
            .and_then(|record| pair_id(record, "employee_id"))
            .unwrap_or(input.employee_id);
        for record in &mut records {
            reshape_pairs(record);
        }
        Ok(json!({
            "employee_id": employee_id,
            "count": records.len(),
            "total_worked_hours": total_hours,
            "records": records,
        }))
    }
}
