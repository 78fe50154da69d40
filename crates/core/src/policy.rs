//! Static per-entity access policy.
//!
//! One table, keyed by entity name, consulted by the gateway and the tool
//! pipeline alike. The table is reviewed in code and validated at startup;
//! nothing mutates it at runtime, and any entity absent from it is
//! unreachable through the gateway.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::domain::{Clause, CompareOp, Domain, FilterValue};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Read,
    Create,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Create => write!(f, "create"),
        }
    }
}

/// A domain clause the gateway requires to be present before dispatch.
/// `value: None` accepts any value as long as field and operator match.
#[derive(Clone, Debug, PartialEq)]
pub struct MandatoryFragment {
    pub field: &'static str,
    pub op: CompareOp,
    pub value: Option<FilterValue>,
}

impl MandatoryFragment {
    pub fn exact(field: &'static str, op: CompareOp, value: impl Into<FilterValue>) -> Self {
        Self { field, op, value: Some(value.into()) }
    }

    pub fn any_value(field: &'static str, op: CompareOp) -> Self {
        Self { field, op, value: None }
    }

    pub fn satisfied_by(&self, clause: &Clause) -> bool {
        clause.field == self.field
            && clause.op == self.op
            && self.value.as_ref().map_or(true, |value| *value == clause.value)
    }
}

#[derive(Clone, Debug)]
pub struct EntityPolicy {
    pub entity: &'static str,
    pub allowed_operations: &'static [Operation],
    pub readable_fields: &'static [&'static str],
    pub creatable_fields: &'static [&'static str],
    pub forbidden_fields: &'static [&'static str],
    pub mandatory_fragments: Vec<MandatoryFragment>,
    /// `None` means the entity carries no tenant column. That absence is a
    /// reviewed property: such policies must compensate with mandatory
    /// fragments so a read can never become an unconstrained scan.
    pub tenant_field: Option<&'static str>,
    pub max_limit: u32,
}

impl EntityPolicy {
    pub fn allows(&self, operation: Operation) -> bool {
        self.allowed_operations.contains(&operation)
    }

    pub fn is_readable(&self, field: &str) -> bool {
        self.readable_fields.contains(&field)
    }

    pub fn is_creatable(&self, field: &str) -> bool {
        self.creatable_fields.contains(&field)
    }

    pub fn is_forbidden(&self, field: &str) -> bool {
        self.forbidden_fields.contains(&field)
    }

    pub fn missing_fragment(&self, domain: &Domain) -> Option<&MandatoryFragment> {
        self.mandatory_fragments
            .iter()
            .find(|fragment| !domain.clauses().any(|clause| fragment.satisfied_by(clause)))
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum PolicyTableError {
    #[error("`{entity}`: field `{field}` is both readable and forbidden")]
    ReadableForbiddenOverlap { entity: String, field: String },
    #[error("`{entity}`: mandatory fragment references non-readable field `{field}`")]
    FragmentNotReadable { entity: String, field: String },
    #[error("`{entity}` has no tenant field and no mandatory fragment; unconstrained scans would be possible")]
    UnscopedWithoutFragment { entity: String },
    #[error("`{entity}`: creatable field `{field}` is forbidden")]
    CreatableForbidden { entity: String, field: String },
}

pub struct PolicyTable {
    policies: BTreeMap<&'static str, EntityPolicy>,
}

impl PolicyTable {
    pub fn new(policies: Vec<EntityPolicy>) -> Result<Self, PolicyTableError> {
        let table = Self {
            policies: policies.into_iter().map(|policy| (policy.entity, policy)).collect(),
        };
        table.validate()?;
        Ok(table)
    }

    pub fn get(&self, entity: &str) -> Option<&EntityPolicy> {
        self.policies.get(entity)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityPolicy> {
        self.policies.values()
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    fn validate(&self) -> Result<(), PolicyTableError> {
        for policy in self.policies.values() {
            for field in policy.readable_fields {
                if policy.is_forbidden(field) {
                    return Err(PolicyTableError::ReadableForbiddenOverlap {
                        entity: policy.entity.to_string(),
                        field: field.to_string(),
                    });
                }
            }
            for field in policy.creatable_fields {
                if policy.is_forbidden(field) {
                    return Err(PolicyTableError::CreatableForbidden {
                        entity: policy.entity.to_string(),
                        field: field.to_string(),
                    });
                }
            }
            for fragment in &policy.mandatory_fragments {
                if !policy.is_readable(fragment.field) {
                    return Err(PolicyTableError::FragmentNotReadable {
                        entity: policy.entity.to_string(),
                        field: fragment.field.to_string(),
                    });
                }
            }
            if policy.tenant_field.is_none() && policy.mandatory_fragments.is_empty() {
                return Err(PolicyTableError::UnscopedWithoutFragment {
                    entity: policy.entity.to_string(),
                });
            }
        }
        Ok(())
    }

    /// The reviewed production table.
    ///
    /// Field sets mirror the backend object catalog the tools are built
    /// against; forbidden sets name the private/credential fields that must
    /// never cross the gateway, even in a domain clause.
    pub fn builtin() -> Self {
        let policies = vec![
            EntityPolicy {
                entity: "res.partner",
                allowed_operations: &[Operation::Read, Operation::Create],
                readable_fields: &[
                    "id",
                    "name",
                    "email",
                    "phone",
                    "street",
                    "city",
                    "country_id",
                    "customer_rank",
                    "supplier_rank",
                    "credit_limit",
                    "parent_id",
                    "active",
                ],
                creatable_fields: &[
                    "name",
                    "email",
                    "phone",
                    "street",
                    "city",
                    "zip",
                    "country_id",
                    "customer_rank",
                    "supplier_rank",
                ],
                forbidden_fields: &["vat", "bank_ids"],
                mandatory_fragments: vec![MandatoryFragment::exact("active", CompareOp::Eq, true)],
                tenant_field: Some("company_id"),
                max_limit: 100,
            },
            EntityPolicy {
                entity: "res.users",
                allowed_operations: &[Operation::Read],
                readable_fields: &[
                    "id",
                    "name",
                    "login",
                    "partner_id",
                    "company_id",
                    "company_ids",
                    "active",
                    "share",
                ],
                creatable_fields: &[],
                forbidden_fields: &["password", "api_key_ids", "totp_secret", "groups_id"],
                mandatory_fragments: vec![
                    MandatoryFragment::exact("active", CompareOp::Eq, true),
                    MandatoryFragment::exact("share", CompareOp::Eq, false),
                ],
                tenant_field: Some("company_id"),
                max_limit: 100,
            },
            EntityPolicy {
                entity: "res.company",
                allowed_operations: &[Operation::Read],
                readable_fields: &[
                    "id",
                    "name",
                    "currency_id",
                    "email",
                    "phone",
                    "street",
                    "city",
                    "country_id",
                ],
                creatable_fields: &[],
                forbidden_fields: &[],
                // res.company has no tenant column of its own; every read
                // must pin an id, and the tool pins it to the session tenant.
                mandatory_fragments: vec![MandatoryFragment::any_value("id", CompareOp::Eq)],
                tenant_field: None,
                max_limit: 10,
            },
            EntityPolicy {
                entity: "hr.employee",
                allowed_operations: &[Operation::Read],
                readable_fields: &[
                    "id",
                    "name",
                    "job_id",
                    "job_title",
                    "department_id",
                    "parent_id",
                    "work_email",
                    "work_phone",
                    "active",
                ],
                creatable_fields: &[],
                forbidden_fields: &[
                    "private_email",
                    "private_phone",
                    "private_street",
                    "identification_id",
                    "bank_account_id",
                    "wage",
                ],
                mandatory_fragments: vec![MandatoryFragment::exact("active", CompareOp::Eq, true)],
                tenant_field: Some("company_id"),
                max_limit: 100,
            },
            EntityPolicy {
                entity: "hr.department",
                allowed_operations: &[Operation::Read],
                readable_fields: &["id", "name", "manager_id", "parent_id", "company_id"],
                creatable_fields: &[],
                forbidden_fields: &[],
                mandatory_fragments: vec![],
                tenant_field: Some("company_id"),
                max_limit: 100,
            },
            EntityPolicy {
                entity: "hr.job",
                allowed_operations: &[Operation::Read],
                readable_fields: &["id", "name", "department_id", "description"],
                creatable_fields: &[],
                forbidden_fields: &[],
                mandatory_fragments: vec![],
                tenant_field: Some("company_id"),
                max_limit: 100,
            },
            EntityPolicy {
                entity: "hr.leave",
                allowed_operations: &[Operation::Read],
                readable_fields: &[
                    "id",
                    "employee_id",
                    "date_from",
                    "date_to",
                    "number_of_days",
                    "holiday_status_id",
                    "state",
                ],
                creatable_fields: &[],
                forbidden_fields: &["private_name", "report_note"],
                // Only approved leaves are ever visible through the gateway.
                mandatory_fragments: vec![MandatoryFragment::exact(
                    "state",
                    CompareOp::Eq,
                    "validate",
                )],
                tenant_field: Some("company_id"),
                max_limit: 100,
            },
            EntityPolicy {
                entity: "hr.attendance",
                allowed_operations: &[Operation::Read],
                readable_fields: &["id", "employee_id", "check_in", "check_out", "worked_hours"],
                creatable_fields: &[],
                forbidden_fields: &[],
                // No tenant column on attendance rows; the employee filter is
                // the compensating constraint.
                mandatory_fragments: vec![MandatoryFragment::exact(
                    "employee_id",
                    CompareOp::NotEq,
                    false,
                )],
                tenant_field: None,
                max_limit: 100,
            },
            EntityPolicy {
                entity: "crm.lead",
                allowed_operations: &[Operation::Read],
                readable_fields: &[
                    "id",
                    "name",
                    "partner_id",
                    "expected_revenue",
                    "probability",
                    "stage_id",
                    "user_id",
                    "date_deadline",
                    "create_date",
                    "type",
                    "active",
                ],
                creatable_fields: &[],
                forbidden_fields: &["phone_sanitized", "email_normalized"],
                mandatory_fragments: vec![MandatoryFragment::exact("active", CompareOp::Eq, true)],
                tenant_field: Some("company_id"),
                max_limit: 100,
            },
            EntityPolicy {
                entity: "crm.stage",
                allowed_operations: &[Operation::Read],
                readable_fields: &["id", "name", "sequence", "is_won", "fold"],
                creatable_fields: &[],
                forbidden_fields: &[],
                // Shared reference data without a tenant column. The dummy id
                // constraint keeps the no-empty-domain rule satisfiable.
                mandatory_fragments: vec![MandatoryFragment::exact("id", CompareOp::NotEq, 0i64)],
                tenant_field: None,
                max_limit: 100,
            },
            EntityPolicy {
                entity: "crm.team",
                allowed_operations: &[Operation::Read],
                readable_fields: &["id", "name", "user_id", "member_ids"],
                creatable_fields: &[],
                forbidden_fields: &[],
                mandatory_fragments: vec![],
                tenant_field: Some("company_id"),
                max_limit: 100,
            },
        ];

        match Self::new(policies) {
            Ok(table) => table,
            // The builtin table is covered by tests; a violation here is a
            // programming error caught before release.
            Err(err) => panic!("builtin policy table is invalid: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_passes_validation() {
        let table = PolicyTable::builtin();
        assert!(table.get("res.partner").is_some());
        assert!(table.get("hr.leave").is_some());
        assert!(table.get("account.move").is_none());
    }

    #[test]
    fn readable_and_forbidden_never_overlap() {
        for policy in PolicyTable::builtin().iter() {
            for field in policy.readable_fields {
                assert!(
                    !policy.is_forbidden(field),
                    "{}: `{}` is both readable and forbidden",
                    policy.entity,
                    field
                );
            }
        }
    }

    #[test]
    fn mandatory_fragments_reference_readable_fields_only() {
        for policy in PolicyTable::builtin().iter() {
            for fragment in &policy.mandatory_fragments {
                assert!(
                    policy.is_readable(fragment.field),
                    "{}: fragment field `{}` is not readable",
                    policy.entity,
                    fragment.field
                );
            }
        }
    }

    #[test]
    fn tenantless_entities_carry_a_compensating_fragment() {
        for policy in PolicyTable::builtin().iter() {
            if policy.tenant_field.is_none() {
                assert!(
                    !policy.mandatory_fragments.is_empty(),
                    "{}: tenant-less policy without mandatory fragment",
                    policy.entity
                );
            }
        }
    }

    #[test]
    fn overlap_between_readable_and_forbidden_is_rejected() {
        let result = PolicyTable::new(vec![EntityPolicy {
            entity: "x.bad",
            allowed_operations: &[Operation::Read],
            readable_fields: &["id", "secret"],
            creatable_fields: &[],
            forbidden_fields: &["secret"],
            mandatory_fragments: vec![MandatoryFragment::any_value("id", CompareOp::Eq)],
            tenant_field: None,
            max_limit: 10,
        }]);
        assert!(matches!(result, Err(PolicyTableError::ReadableForbiddenOverlap { .. })));
    }

    #[test]
    fn tenantless_policy_without_fragment_is_rejected() {
        let result = PolicyTable::new(vec![EntityPolicy {
            entity: "x.scan",
            allowed_operations: &[Operation::Read],
            readable_fields: &["id"],
            creatable_fields: &[],
            forbidden_fields: &[],
            mandatory_fragments: vec![],
            tenant_field: None,
            max_limit: 10,
        }]);
        assert!(matches!(result, Err(PolicyTableError::UnscopedWithoutFragment { .. })));
    }

    #[test]
    fn fragment_matching_honours_exact_values() {
        let fragment = MandatoryFragment::exact("state", CompareOp::Eq, "validate");
        let good = Clause {
            field: "state".to_string(),
            op: CompareOp::Eq,
            value: FilterValue::Text("validate".to_string()),
        };
        let wrong_value = Clause {
            field: "state".to_string(),
            op: CompareOp::Eq,
            value: FilterValue::Text("draft".to_string()),
        };
        assert!(fragment.satisfied_by(&good));
        assert!(!fragment.satisfied_by(&wrong_value));
    }
}
