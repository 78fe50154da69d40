use std::sync::Arc;

use opsgate_core::{FakeBackend, Gateway, InMemoryAuditSink, PolicyTable};
use opsgate_tools::builtin_registry;

pub fn run() -> String {
    // Listing needs no live backend; the catalog is wired to an in-memory
    // stand-in and never called.
    let backend = Arc::new(FakeBackend::new(0, "catalog", 0, ""));
    let gateway = Arc::new(Gateway::new(
        backend,
        PolicyTable::builtin(),
        Arc::new(InMemoryAuditSink::default()),
    ));
    let registry = builtin_registry(gateway);

    let mut lines = vec![format!("{} tools:", registry.len())];
    for tool in registry.iter() {
        lines.push(format!("  {} - {}", tool.name(), tool.description()));
    }
    lines.join("\n")
}
