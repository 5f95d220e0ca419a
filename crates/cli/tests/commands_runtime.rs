use std::env;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use architect_agent::{
    AgentDirectory, AgentInvocationResult, AgentInvoker, AgentRuntime, AgentTarget,
    InvocationError,
};
use architect_cli::commands::{config, doctor, invoke};
use architect_core::config::UnknownAgentPolicy;
use architect_core::SessionId;
use async_trait::async_trait;
use serde_json::Value;

const VALID_ENV: [(&str, &str); 2] = [
    ("ONBOARDING_AGENT_ARN", "arn:aws:bedrock:us-east-1:123456789012:agent/ONBOARD01"),
    ("PROVISIONING_AGENT_ARN", "arn:aws:bedrock:us-east-1:123456789012:agent/PROVIS01"),
];

#[test]
fn config_reports_sources_and_redacts_api_key() {
    let mut vars = VALID_ENV.to_vec();
    vars.push(("ARCHITECT_INVOCATION_API_KEY", "sk-live-secret-value"));

    with_env(&vars, || {
        let output = config::run();

        assert!(output.starts_with("effective config"));
        assert!(output.contains(
            "- agents.onboarding_target = arn:aws:bedrock:us-east-1:123456789012:agent/ONBOARD01 (source: env (ONBOARDING_AGENT_ARN))"
        ));
        assert!(output.contains("- invocation.api_key = sk-*** (source: env (ARCHITECT_INVOCATION_API_KEY))"));
        assert!(output.contains("- invocation.timeout_secs = 600 (source: default)"));
        assert!(!output.contains("secret-value"));
    });
}

#[test]
fn config_reports_validation_failure_without_targets() {
    with_env(&[], || {
        let output = config::run();
        assert!(output.starts_with("config validation failed"), "unexpected output: {output}");
    });
}

#[test]
fn doctor_json_passes_with_valid_env() {
    with_env(&VALID_ENV, || {
        let payload = parse_payload(&doctor::run(true));

        assert_eq!(payload["overall_status"], "pass");
        let checks = payload["checks"].as_array().expect("checks array");
        assert_eq!(checks.len(), 4);
        let targets = checks
            .iter()
            .find(|check| check["name"] == "agent_targets")
            .expect("agent target check");
        assert_eq!(
            targets["details"],
            "onboarding -> ONBOARD01/DEFAULT; provisioning -> PROVIS01/DEFAULT; unknown types -> onboarding"
        );
    });
}

#[test]
fn doctor_skips_dependent_checks_when_config_fails() {
    with_env(&[], || {
        let payload = parse_payload(&doctor::run(true));

        assert_eq!(payload["overall_status"], "fail");
        let statuses: Vec<&str> = payload["checks"]
            .as_array()
            .expect("checks array")
            .iter()
            .map(|check| check["status"].as_str().unwrap_or_default())
            .collect();
        assert_eq!(statuses, vec!["fail", "skipped", "skipped", "skipped"]);
    });
}

#[test]
fn doctor_human_output_marks_each_check() {
    with_env(&VALID_ENV, || {
        let output = doctor::run(false);

        assert!(output.starts_with("doctor: all readiness checks passed"));
        assert!(output.contains("- [ok] relay_delivery: local websocket connections"));
    });
}

#[test]
fn invoke_returns_config_failure_without_targets() {
    with_env(&[], || {
        let result = invoke::run("onboarding", None, "hello");
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "invoke");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
        assert_eq!(payload["agent_type"], "onboarding");
        assert!(payload.get("session_id").is_none());
    });
}

#[test]
fn execute_prints_agent_response_with_session() {
    let runtime = runtime(Reply::Text("Your account is ready"), UnknownAgentPolicy::Onboarding);

    let result = invoke::execute(&runtime, "provisioning", Some("s-77"), "set me up");

    assert_eq!(result.exit_code, 0);
    let payload = parse_payload(&result.output);
    assert_eq!(payload["status"], "ok");
    assert_eq!(payload["agent_type"], "provisioning");
    assert_eq!(payload["session_id"], "s-77");
    assert!(payload.get("error_class").is_none());
    assert_eq!(payload["message"], "[provisioning | s-77] PRV: Your account is ready");
}

#[test]
fn execute_generates_session_when_absent() {
    let runtime = runtime(Reply::Text("hi"), UnknownAgentPolicy::Onboarding);

    let result = invoke::execute(&runtime, "onboarding", None, "hello");

    let payload = parse_payload(&result.output);
    let message = payload["message"].as_str().expect("message");
    let session_id = payload["session_id"].as_str().expect("session id");
    assert!(session_id.starts_with("session-"), "unexpected session: {session_id}");
    assert!(
        message.starts_with(&format!("[onboarding | {session_id}]")),
        "unexpected message: {message}"
    );
}

#[test]
fn execute_reports_rejected_agent_type() {
    let runtime = runtime(Reply::Text("unused"), UnknownAgentPolicy::Reject);

    let result = invoke::execute(&runtime, "billing", None, "hello");

    assert_eq!(result.exit_code, 2);
    let payload = parse_payload(&result.output);
    assert_eq!(payload["error_class"], "RoutingError");
    assert_eq!(payload["agent_type"], "billing");
}

#[test]
fn execute_reports_invocation_timeout() {
    let runtime = runtime(Reply::Timeout, UnknownAgentPolicy::Onboarding);

    let result = invoke::execute(&runtime, "onboarding", None, "hello");

    assert_eq!(result.exit_code, 1);
    let payload = parse_payload(&result.output);
    assert_eq!(payload["error_class"], "TimeoutError");
    assert_eq!(payload["message"], "TimeoutError: agent invocation timed out after 600s");
}

enum Reply {
    Text(&'static str),
    Timeout,
}

struct FixedInvoker(Reply);

#[async_trait]
impl AgentInvoker for FixedInvoker {
    async fn invoke(
        &self,
        target: &AgentTarget,
        _prompt: &str,
        session_id: &SessionId,
    ) -> Result<AgentInvocationResult, InvocationError> {
        match self.0 {
            Reply::Text(text) => Ok(AgentInvocationResult {
                response_text: format!("{}: {text}", target.agent_id),
                session_id: session_id.clone(),
            }),
            Reply::Timeout => Err(InvocationError::Timeout(Duration::from_secs(600))),
        }
    }
}

fn runtime(reply: Reply, policy: UnknownAgentPolicy) -> AgentRuntime {
    AgentRuntime::new(
        AgentDirectory::new(
            AgentTarget::from_identifier("ONB", "DEFAULT"),
            AgentTarget::from_identifier("PRV", "DEFAULT"),
            policy,
        ),
        Arc::new(FixedInvoker(reply)),
    )
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "ARCHITECT_AGENTS_ONBOARDING_TARGET",
        "ARCHITECT_AGENTS_PROVISIONING_TARGET",
        "ARCHITECT_AGENTS_ALIAS_ID",
        "ARCHITECT_AGENTS_UNKNOWN_AGENT",
        "ONBOARDING_AGENT_ARN",
        "PROVISIONING_AGENT_ARN",
        "ARCHITECT_INVOCATION_ENDPOINT_URL",
        "ARCHITECT_INVOCATION_API_KEY",
        "ARCHITECT_INVOCATION_REGION",
        "ARCHITECT_INVOCATION_TIMEOUT_SECS",
        "REGION",
        "ARCHITECT_RELAY_CONNECTION_BACKEND",
        "ARCHITECT_RELAY_MANAGEMENT_ENDPOINT",
        "ARCHITECT_RELAY_STAGE",
        "ARCHITECT_RELAY_EXECUTOR",
        "ARCHITECT_RELAY_WORKER_COUNT",
        "ARCHITECT_RELAY_QUEUE_CAPACITY",
        "ARCHITECT_SERVER_BIND_ADDRESS",
        "ARCHITECT_SERVER_PORT",
        "ARCHITECT_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "ARCHITECT_LOGGING_LEVEL",
        "ARCHITECT_LOGGING_FORMAT",
        "ARCHITECT_LOG_LEVEL",
        "ARCHITECT_LOG_FORMAT",
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

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
