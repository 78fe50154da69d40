//! Lead, stage, and team tools.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use opsgate_core::{CompareOp, Domain, Gateway, ToolError};

use crate::pipeline::{
    effective_limit, intent, normalized, pair_name, parse_input, records_payload, reshape_pairs,
    Violations,
};
use crate::Tool;

const LEAD_FIELDS: &[&str] = &[
    "id",
    "name",
    "partner_id",
    "expected_revenue",
    "probability",
    "stage_id",
    "user_id",
    "date_deadline",
    "type",
];
const STAGE_FIELDS: &[&str] = &["id", "name", "sequence", "is_won", "fold"];
const TEAM_FIELDS: &[&str] = &["id", "name", "user_id", "member_ids"];

const LEAD_KINDS: &[&str] = &["lead", "opportunity"];

/// Search leads and opportunities within the session tenant.
pub struct GetLead {
    gateway: Arc<Gateway>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GetLeadInput {
    name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    stage_id: Option<i64>,
    limit: Option<u32>,
}

impl GetLead {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Tool for GetLead {
    fn name(&self) -> &'static str {
        "get_lead"
    }

    fn description(&self) -> &'static str {
        "Search leads and opportunities by name, type, or stage"
    }

    async fn call(&self, input: Value) -> Result<Value, ToolError> {
        let input: GetLeadInput = parse_input(input)?;

        let name = normalized(input.name);
        let kind = normalized(input.kind);
        let limit = effective_limit(input.limit, 10);
        intent(
            self.name(),
            &json!({
                "name": &name,
                "type": &kind,
                "stage_id": input.stage_id,
                "limit": limit,
            }),
        );
        let mut violations = Violations::default();
        if let Some(kind) = &kind {
            if !LEAD_KINDS.contains(&kind.as_str()) {
                violations.flag(format!(
                    "type must be one of `lead`, `opportunity`; got `{kind}`"
                ));
            }
        }
        if name.is_none() && kind.is_none() && input.stage_id.is_none() {
            violations.flag("at least one of name, type, stage_id is required");
        }
        violations.check()?;

        let mut domain = Domain::new().filter("active", CompareOp::Eq, true);
        if let Some(name) = name {
            domain.push_clause("name", CompareOp::ILike, name);
        }
        if let Some(kind) = kind {
            domain.push_clause("type", CompareOp::Eq, kind);
        }
        if let Some(stage_id) = input.stage_id {
            domain.push_clause("stage_id", CompareOp::Eq, stage_id);
        }

        let records = self.gateway.read("crm.lead", domain, LEAD_FIELDS, Some(limit)).await?;
        let leads: Vec<Value> = records
            .into_iter()
            .map(|mut record| {
                let partner_name = pair_name(&record, "partner_id");
                let stage_name = pair_name(&record, "stage_id");
                reshape_pairs(&mut record);
                if let Some(partner) = partner_name {
                    record.insert("partner_name".to_string(), json!(partner));
                }
                if let Some(stage) = stage_name {
                    record.insert("stage_name".to_string(), json!(stage));
                }
                Value::Object(record)
            })
            .collect();
        Ok(json!({ "count": leads.len(), "records": leads }))
    }
}

/// List the pipeline stages. Shared reference data, identical across
/// tenants.
pub struct GetStage {
    gateway: Arc<Gateway>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GetStageInput {
    limit: Option<u32>,
}

impl GetStage {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Tool for GetStage {
    fn name(&self) -> &'static str {
        "get_stage"
    }

    fn description(&self) -> &'static str {
        "List the sales pipeline stages"
    }

    async fn call(&self, input: Value) -> Result<Value, ToolError> {
        let input: GetStageInput = parse_input(input)?;
        let limit = effective_limit(input.limit, 100);
        intent(self.name(), &json!({ "limit": limit }));

        let records = self
            .gateway
            .read(
                "crm.stage",
                Domain::new().filter("id", CompareOp::NotEq, 0i64),
                STAGE_FIELDS,
                Some(limit),
            )
            .await?;
        Ok(records_payload(records))
    }
}

/// List sales teams, optionally filtered by name.
pub struct GetTeam {
    gateway: Arc<Gateway>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GetTeamInput {
    name: Option<String>,
    limit: Option<u32>,
}

impl GetTeam {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Tool for GetTeam {
    fn name(&self) -> &'static str {
        "get_team"
    }

    fn description(&self) -> &'static str {
        "List sales teams, optionally filtered by name"
    }

    async fn call(&self, input: Value) -> Result<Value, ToolError> {
        let input: GetTeamInput = parse_input(input)?;

        let name = normalized(input.name);
        let limit = effective_limit(input.limit, 100);
        intent(self.name(), &json!({ "name": &name, "limit": limit }));

        let mut domain = Domain::new();
        if let Some(name) = name {
            domain.push_clause("name", CompareOp::ILike, name);
        }

        let records = self.gateway.read("crm.team", domain, TEAM_FIELDS, Some(limit)).await?;
        Ok(records_payload(records))
    }
}
