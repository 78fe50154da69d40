//! The agent-facing tool catalog.
//!
//! Each tool is a thin, named affordance over one gateway operation (or,
//! for the availability check, a fixed composition of two reads and a pure
//! calculation). Tools shape input and output; they never talk to the
//! backend directly and never widen what the gateway would allow.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use opsgate_core::{Gateway, ToolError};

mod crm;
mod directory;
mod hr;
mod pipeline;

pub use crm::{GetLead, GetStage, GetTeam};
pub use directory::{CreatePartner, GetCompany, GetPartner, GetUser};
pub use hr::{
    CheckEmployeeAvailability, GetDepartment, GetEmployee, GetEmployeeAttendance,
    GetEmployeeLeaves, GetJob,
};

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    async fn call(&self, input: Value) -> Result<Value, ToolError>;
}

/// Name-keyed tool catalog. Iteration order is the listing order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<&'static str, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name(), Box::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(Box::as_ref)
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Tool> {
        self.tools.values().map(Box::as_ref)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Dispatch by name. An unknown name is a caller error, not a policy
    /// event, so it is reported without touching the gateway.
    pub async fn call(&self, name: &str, input: Value) -> Result<Value, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::NotFound(format!("no tool named `{name}`")))?;
        tool.call(input).await
    }
}

/// The full built-in catalog wired to one gateway.
pub fn builtin_registry(gateway: Arc<Gateway>) -> ToolRegistry {
    let mut registry = ToolRegistry::default();
    registry.register(GetPartner::new(gateway.clone()));
    registry.register(CreatePartner::new(gateway.clone()));
    registry.register(GetUser::new(gateway.clone()));
    registry.register(GetCompany::new(gateway.clone()));
    registry.register(GetEmployee::new(gateway.clone()));
    registry.register(GetDepartment::new(gateway.clone()));
    registry.register(GetJob::new(gateway.clone()));
    registry.register(GetEmployeeLeaves::new(gateway.clone()));
    registry.register(CheckEmployeeAvailability::new(gateway.clone()));
    registry.register(GetEmployeeAttendance::new(gateway.clone()));
    registry.register(GetLead::new(gateway.clone()));
    registry.register(GetStage::new(gateway.clone()));
    registry.register(GetTeam::new(gateway));
    registry
}
