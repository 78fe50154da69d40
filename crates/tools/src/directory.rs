//! Partner, user, and company tools.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use opsgate_core::{CompareOp, Domain, Gateway, PolicyError, Record, ToolError};

use crate::pipeline::{
    effective_limit, intent, normalized, parse_input, plausible_email, records_payload,
    reshape_pairs, Violations,
};
use crate::Tool;

const PARTNER_FIELDS: &[&str] = &[
    "id",
    "name",
    "email",
    "phone",
    "city",
    "country_id",
    "customer_rank",
    "supplier_rank",
];
const USER_FIELDS: &[&str] = &["id", "name", "login", "partner_id"];
const COMPANY_FIELDS: &[&str] = &["id", "name", "currency_id", "email", "phone", "city", "country_id"];

/// Search partners by name or email within the session tenant.
pub struct GetPartner {
    gateway: Arc<Gateway>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GetPartnerInput {
    id: Option<i64>,
    name: Option<String>,
    email: Option<String>,
    limit: Option<u32>,
}

impl GetPartner {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Tool for GetPartner {
    fn name(&self) -> &'static str {
        "get_partner"
    }

    fn description(&self) -> &'static str {
        "Search partners (customers and vendors) by name or email"
    }

    async fn call(&self, input: Value) -> Result<Value, ToolError> {
        let input: GetPartnerInput = parse_input(input)?;

        let name = normalized(input.name);
        let email = normalized(input.email);
        let limit = effective_limit(input.limit, 10);
        intent(
            self.name(),
            &json!({ "id": input.id, "name": &name, "email": &email, "limit": limit }),
        );
        let mut violations = Violations::default();
        if input.id.is_none() && name.is_none() && email.is_none() {
            violations.flag("at least one of id, name, email is required");
        }
        violations.check()?;

        let mut domain = Domain::new().filter("active", CompareOp::Eq, true);
        if let Some(id) = input.id {
            domain.push_clause("id", CompareOp::Eq, id);
        }
        if let Some(name) = name {
            domain.push_clause("name", CompareOp::ILike, name);
        }
        if let Some(email) = email {
            domain.push_clause("email", CompareOp::ILike, email);
        }

        let mut records = self
            .gateway
            .read("res.partner", domain, PARTNER_FIELDS, Some(limit))
            .await?;
        // Ranks are internal counters; callers get them as role flags.
        for record in &mut records {
            let customer = record.get("customer_rank").and_then(Value::as_i64).unwrap_or(0) > 0;
            let supplier = record.get("supplier_rank").and_then(Value::as_i64).unwrap_or(0) > 0;
            record.insert("is_customer".to_string(), json!(customer));
            record.insert("is_supplier".to_string(), json!(supplier));
            record.remove("customer_rank");
            record.remove("supplier_rank");
        }
        Ok(records_payload(records))
    }
}

/// Create one partner record. The only write the catalog offers.
pub struct CreatePartner {
    gateway: Arc<Gateway>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CreatePartnerInput {
    name: String,
    email: Option<String>,
    phone: Option<String>,
    street: Option<String>,
    city: Option<String>,
}

impl CreatePartner {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Tool for CreatePartner {
    fn name(&self) -> &'static str {
        "create_partner"
    }

    fn description(&self) -> &'static str {
        "Create a new partner in the current tenant"
    }

    async fn call(&self, input: Value) -> Result<Value, ToolError> {
        let input: CreatePartnerInput = parse_input(input)?;

        let name = input.name.trim().to_string();
        let email = normalized(input.email);
        let phone = normalized(input.phone);
        let street = normalized(input.street);
        let city = normalized(input.city);
        intent(
            self.name(),
            &json!({
                "name": &name,
                "email": &email,
                "phone": &phone,
                "street": &street,
                "city": &city,
            }),
        );

        let mut violations = Violations::default();
        if name.is_empty() {
            violations.flag("name must not be empty");
        }
        if let Some(email) = &email {
            if !plausible_email(email) {
                violations.flag(format!("email `{email}` does not look like an address"));
            }
        }
        violations.check()?;

        // Same-name guard: an agent retrying a confirmation loop must not
        // mint duplicates.
        let duplicates = self
            .gateway
            .read(
                "res.partner",
                Domain::new()
                    .filter("active", CompareOp::Eq, true)
                    .filter("name", CompareOp::ILike, name.clone()),
                &["id", "name"],
                Some(1),
            )
            .await?;
        if let Some(existing) = duplicates.first() {
            let id = existing.get("id").and_then(Value::as_i64).unwrap_or_default();
            return Err(ToolError::validation(vec![format!(
                "a partner named `{name}` already exists (id {id})"
            )]));
        }

        let mut values = Record::new();
        values.insert("name".to_string(), json!(name));
        if let Some(email) = email {
            values.insert("email".to_string(), json!(email));
        }
        if let Some(phone) = phone {
            values.insert("phone".to_string(), json!(phone));
        }
        if let Some(street) = street {
            values.insert("street".to_string(), json!(street));
        }
        if let Some(city) = city {
            values.insert("city".to_string(), json!(city));
        }

        let id = self.gateway.create("res.partner", values).await?;
        Ok(json!({ "id": id, "name": name }))
    }
}

/// Search internal user accounts by login or name.
pub struct GetUser {
    gateway: Arc<Gateway>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GetUserInput {
    login: Option<String>,
    name: Option<String>,
    limit: Option<u32>,
}

impl GetUser {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Tool for GetUser {
    fn name(&self) -> &'static str {
        "get_user"
    }

    fn description(&self) -> &'static str {
        "Search internal user accounts by login or name"
    }

    async fn call(&self, input: Value) -> Result<Value, ToolError> {
        let input: GetUserInput = parse_input(input)?;

        let login = normalized(input.login);
        let name = normalized(input.name);
        let limit = effective_limit(input.limit, 10);
        intent(self.name(), &json!({ "login": &login, "name": &name, "limit": limit }));

        // Portal/share accounts are never surfaced.
        let mut domain = Domain::new()
            .filter("active", CompareOp::Eq, true)
            .filter("share", CompareOp::Eq, false);
        if let Some(login) = login {
            domain.push_clause("login", CompareOp::ILike, login);
        }
        if let Some(name) = name {
            domain.push_clause("name", CompareOp::ILike, name);
        }

        let records = self.gateway.read("res.users", domain, USER_FIELDS, Some(limit)).await?;
        Ok(records_payload(records))
    }
}

/// Read the session tenant's own company record.
pub struct GetCompany {
    gateway: Arc<Gateway>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GetCompanyInput {
    company_id: Option<i64>,
}

impl GetCompany {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Tool for GetCompany {
    fn name(&self) -> &'static str {
        "get_company"
    }

    fn description(&self) -> &'static str {
        "Read the current tenant's company record"
    }

    async fn call(&self, input: Value) -> Result<Value, ToolError> {
        let input: GetCompanyInput = parse_input(input)?;
        intent(self.name(), &json!({ "company_id": input.company_id }));

        let session = self.gateway.session().await?;
        let requested = input.company_id.unwrap_or(session.tenant_id);
        // The company entity has no tenant column, so the pin to the
        // session's own company is enforced here, before the read.
        if requested != session.tenant_id {
            return Err(ToolError::Policy(PolicyError::CrossTenant {
                entity: "res.company".to_string(),
                requested,
            }));
        }

        let records = self
            .gateway
            .read(
                "res.company",
                Domain::new().filter("id", CompareOp::Eq, requested),
                COMPANY_FIELDS,
                Some(1),
            )
            .await?;
        match records.into_iter().next() {
            Some(mut record) => {
                reshape_pairs(&mut record);
                Ok(Value::Object(record))
            }
            None => Err(ToolError::NotFound(format!("company {requested} not found"))),
        }
    }
}
