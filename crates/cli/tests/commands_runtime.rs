use std::env;
use std::sync::{Mutex, OnceLock};

use opsgate_cli::commands::{call, config, doctor, policies, tools};
use serde_json::Value;

#[test]
fn doctor_json_reports_config_and_policy_checks() {
    // Port 9 (discard) is not listening; connectivity must fail cleanly.
    with_env(&[("OPSGATE_BACKEND_URL", "http://127.0.0.1:9")], || {
        let output = doctor::run(true);
        let payload = parse_payload(&output);

        assert_eq!(payload["checks"][0]["name"], "config_validation");
        assert_eq!(payload["checks"][0]["status"], "pass");
        assert_eq!(payload["checks"][1]["name"], "policy_table");
        assert_eq!(payload["checks"][1]["status"], "pass");
        assert_eq!(payload["checks"][2]["name"], "backend_connectivity");
        assert_eq!(payload["checks"][2]["status"], "fail");
        assert_eq!(payload["checks"][3]["name"], "scope_resolution");
        assert_eq!(payload["checks"][3]["status"], "skipped");
        assert_eq!(payload["overall_status"], "fail");
    });
}

#[test]
fn doctor_skips_downstream_checks_when_config_is_invalid() {
    with_env(&[("OPSGATE_BACKEND_URL", "ftp://wrong.example")], || {
        let output = doctor::run(true);
        let payload = parse_payload(&output);

        assert_eq!(payload["checks"][0]["status"], "fail");
        assert_eq!(payload["checks"][1]["status"], "skipped");
        assert_eq!(payload["checks"][2]["status"], "skipped");
        assert_eq!(payload["checks"][3]["status"], "skipped");
    });
}

#[test]
fn config_attributes_sources_and_redacts_the_password() {
    with_env(
        &[
            ("OPSGATE_BACKEND_URL", "http://erp.internal:8069"),
            ("OPSGATE_BACKEND_PASSWORD", "super-secret-value"),
        ],
        || {
            let output = config::run();

            assert!(output.contains("backend.url = http://erp.internal:8069"));
            assert!(output.contains("env OPSGATE_BACKEND_URL"));
            assert!(!output.contains("super-secret-value"));
            assert!(output.contains("backend.password = <redacted>"));
            assert!(output.contains("backend.database = erp  (source: default)"));
        },
    );
}

#[test]
fn policies_render_every_entity_with_its_constraints() {
    with_env(&[], || {
        let output = policies::run();

        assert!(output.contains("11 entity policies:"));
        assert!(output.contains("res.partner operations=read,create tenant_field=company_id"));
        assert!(output.contains("hr.attendance operations=read tenant_field=(none)"));
        assert!(output.contains("required: state = \"validate\""));
        assert!(output.contains("forbidden: private_email"));
    });
}

#[test]
fn tools_lists_the_full_catalog() {
    with_env(&[], || {
        let output = tools::run();

        assert!(output.contains("13 tools:"));
        assert!(output.contains("get_partner"));
        assert!(output.contains("create_partner"));
        assert!(output.contains("check_employee_availability"));
        assert!(!output.contains("update_lead_stage"));
    });
}

#[test]
fn call_rejects_malformed_args_before_touching_the_backend() {
    with_env(&[], || {
        let result = call::run("get_partner", "{not json");
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "call");
        assert_eq!(payload["error_class"], "invalid_args");
    });
}

#[test]
fn call_with_unknown_tool_is_not_found() {
    with_env(&[("OPSGATE_BACKEND_URL", "http://127.0.0.1:9")], || {
        let result = call::run("drop_table", "{}");
        assert_eq!(result.exit_code, 1);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "not_found");
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "OPSGATE_BACKEND_URL",
        "OPSGATE_BACKEND_DATABASE",
        "OPSGATE_BACKEND_USERNAME",
        "OPSGATE_BACKEND_PASSWORD",
        "OPSGATE_BACKEND_TIMEOUT_SECS",
        "OPSGATE_BACKEND_MAX_RETRIES",
        "OPSGATE_LOG_LEVEL",
        "OPSGATE_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, previous) in previous_values {
        match previous {
            Some(value) => env::set_var(key, value),
            None => env::remove_var(key),
        }
    }
}
