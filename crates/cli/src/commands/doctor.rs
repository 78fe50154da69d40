use opsgate_backend::JsonRpcBackend;
use opsgate_core::config::{AppConfig, LoadOptions};
use opsgate_core::{BackendClient, IdName, PolicyTable};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                error.to_string().replace('"', "\\\"")
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_policy_table());
            let (connectivity, scope) = check_backend(&config);
            checks.push(connectivity);
            checks.push(scope);
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["policy_table", "backend_connectivity", "scope_resolution"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_policy_table() -> DoctorCheck {
    let table = PolicyTable::builtin();
    DoctorCheck {
        name: "policy_table",
        status: CheckStatus::Pass,
        details: format!("{} entity policies validated", table.len()),
    }
}

/// Runs the connectivity and scope-resolution checks in order. Scope
/// resolution needs an authenticated uid, so it is skipped whenever the
/// connectivity check does not pass.
fn check_backend(config: &AppConfig) -> (DoctorCheck, DoctorCheck) {
    let skip_scope = |reason: &str| DoctorCheck {
        name: "scope_resolution",
        status: CheckStatus::Skipped,
        details: reason.to_string(),
    };

    let fail_connectivity = |details: String| DoctorCheck {
        name: "backend_connectivity",
        status: CheckStatus::Fail,
        details,
    };

    let backend = match JsonRpcBackend::from_config(&config.backend) {
        Ok(backend) => backend,
        Err(error) => {
            return (
                fail_connectivity(format!("failed to build backend client: {error}")),
                skip_scope("skipped because the backend client did not initialize"),
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return (
                fail_connectivity(format!("failed to initialize async runtime: {error}")),
                skip_scope("skipped because the async runtime did not initialize"),
            );
        }
    };

    let uid = match runtime.block_on(backend.authenticate()) {
        Ok(uid) => uid,
        Err(error) => {
            return (
                fail_connectivity(format!(
                    "could not authenticate against `{}`: {error}",
                    config.backend.url
                )),
                skip_scope("skipped because authentication failed"),
            );
        }
    };

    let connectivity = DoctorCheck {
        name: "backend_connectivity",
        status: CheckStatus::Pass,
        details: format!("authenticated against `{}` as uid {uid}", config.backend.url),
    };

    let scope = match runtime.block_on(backend.read_own_user(uid, &["id", "company_id"])) {
        Ok(record) => match record.get("company_id").and_then(IdName::from_value) {
            Some(company) => DoctorCheck {
                name: "scope_resolution",
                status: CheckStatus::Pass,
                details: format!(
                    "session scope resolves to tenant {} (`{}`)",
                    company.id, company.name
                ),
            },
            None => DoctorCheck {
                name: "scope_resolution",
                status: CheckStatus::Fail,
                details: "own-user record carries no usable company reference".to_string(),
            },
        },
        Err(error) => DoctorCheck {
            name: "scope_resolution",
            status: CheckStatus::Fail,
            details: format!("could not read the own-user record: {error}"),
        },
    };

    (connectivity, scope)
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("  [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
