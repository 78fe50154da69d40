use opsgate_core::policy::{EntityPolicy, PolicyTable};

pub fn run() -> String {
    let table = PolicyTable::builtin();
    let mut lines = vec![format!("{} entity policies:", table.len())];
    for policy in table.iter() {
        lines.push(render_policy(policy));
    }
    lines.join("\n")
}

fn render_policy(policy: &EntityPolicy) -> String {
    let operations: Vec<String> =
        policy.allowed_operations.iter().map(|op| op.to_string()).collect();
    let tenant = policy.tenant_field.unwrap_or("(none)");

    let mut lines = vec![format!(
        "  {} operations={} tenant_field={} max_limit={}",
        policy.entity,
        operations.join(","),
        tenant,
        policy.max_limit
    )];
    lines.push(format!("    readable: {}", policy.readable_fields.join(", ")));
    if !policy.creatable_fields.is_empty() {
        lines.push(format!("    creatable: {}", policy.creatable_fields.join(", ")));
    }
    if !policy.forbidden_fields.is_empty() {
        lines.push(format!("    forbidden: {}", policy.forbidden_fields.join(", ")));
    }
    for fragment in &policy.mandatory_fragments {
        let value = fragment
            .value
            .as_ref()
            .map(|value| value.wire().to_string())
            .unwrap_or_else(|| "<any>".to_string());
        lines.push(format!(
            "    required: {} {} {}",
            fragment.field,
            fragment.op.wire(),
            value
        ));
    }
    lines.join("\n")
}
