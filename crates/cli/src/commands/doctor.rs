use architect_agent::AgentDirectory;
use architect_core::config::{AppConfig, ConnectionBackend, LoadOptions, UnknownAgentPolicy};
use architect_core::AgentType;
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

const DEPENDENT_CHECKS: [&str; 3] = ["agent_targets", "invocation_endpoint", "relay_delivery"];

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
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
            checks.push(check_agent_targets(&config));
            checks.push(check_invocation_endpoint(&config));
            checks.push(check_relay_delivery(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.extend(DEPENDENT_CHECKS.iter().map(|&name| DoctorCheck {
                name,
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            }));
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

fn check_agent_targets(config: &AppConfig) -> DoctorCheck {
    let directory = AgentDirectory::from_config(&config.agents);
    let mut routes = Vec::new();

    for agent_type in [AgentType::Onboarding, AgentType::Provisioning] {
        match directory.resolve(&agent_type) {
            Ok(target) => routes.push(format!(
                "{agent_type} -> {}/{}",
                target.agent_id, target.alias_id
            )),
            Err(error) => {
                return DoctorCheck {
                    name: "agent_targets",
                    status: CheckStatus::Fail,
                    details: error.to_string(),
                };
            }
        }
    }

    let fallback = match directory.unknown_agent_policy() {
        UnknownAgentPolicy::Reject => "unknown types rejected",
        UnknownAgentPolicy::Onboarding => "unknown types -> onboarding",
        UnknownAgentPolicy::Provisioning => "unknown types -> provisioning",
    };
    routes.push(fallback.to_string());

    DoctorCheck { name: "agent_targets", status: CheckStatus::Pass, details: routes.join("; ") }
}

fn check_invocation_endpoint(config: &AppConfig) -> DoctorCheck {
    let endpoint = config.invocation.resolved_endpoint();
    let auth = if config.invocation.api_key.is_some() { "bearer token" } else { "no token" };

    DoctorCheck {
        name: "invocation_endpoint",
        status: CheckStatus::Pass,
        details: format!(
            "{endpoint} ({auth}, timeout {}s)",
            config.invocation.timeout_secs
        ),
    }
}

fn check_relay_delivery(config: &AppConfig) -> DoctorCheck {
    let details = match (config.relay.connection_backend, &config.relay.management_endpoint) {
        (ConnectionBackend::Local, _) => "local websocket connections".to_string(),
        (ConnectionBackend::Http, Some(endpoint)) => format!("management api at {endpoint}"),
        (ConnectionBackend::Http, None) => {
            "management api derived from each event's domain and stage".to_string()
        }
    };

    DoctorCheck { name: "relay_delivery", status: CheckStatus::Pass, details }
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
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
