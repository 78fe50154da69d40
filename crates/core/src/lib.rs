//! opsgate-core: the mediating gateway for agent access to a multi-tenant
//! ERP record store.
//!
//! Everything an exposed tool can do flows through [`gateway::Gateway`],
//! which owns tenant-scope injection, domain/field/limit validation against
//! the static [`policy::PolicyTable`], bounded retries toward the backend
//! transport, and one [`audit::AuditRecord`] per call, rejected calls
//! included. The [`availability`] module is the pure calculator behind the
//! one composite operation.

pub mod audit;
pub mod availability;
pub mod backend;
pub mod config;
pub mod domain;
pub mod errors;
pub mod gateway;
pub mod policy;
pub mod session;

pub use audit::{
    AuditOperation, AuditOutcome, AuditRecord, AuditSink, CompositeAuditSink, InMemoryAuditSink,
    TracingAuditSink,
};
pub use availability::{AvailabilityReport, AvailabilityWindow, ConflictingInterval, IntervalRecord};
pub use backend::{BackendClient, FakeBackend};
pub use config::{AppConfig, BackendConfig, ConfigError, LoadOptions, LogFormat};
pub use domain::{CompareOp, Domain, DomainExpr, FilterValue, IdName, Record};
pub use errors::{BackendError, GatewayError, IdentityError, PolicyError, ToolError};
pub use gateway::{inject_tenant_scope, Gateway, RetryPolicy};
pub use policy::{EntityPolicy, MandatoryFragment, Operation, PolicyTable};
pub use session::SessionContext;

// Re-exported so downstream crates share one chrono/serde_json surface.
pub use chrono;
pub use serde_json;
