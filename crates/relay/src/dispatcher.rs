use std::sync::Arc;

use architect_agent::AgentRuntime;
use architect_core::{
    ApplicationError, ConnectionId, Notification, RelayRequest, RelayStatus, RequestId,
};
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::events::{AddressingContext, GatewayEvent, ProcessingJob, RelayEvent, RouteKey};
use crate::notifier::Notifier;
use crate::tasks::TaskSubmitter;

/// Entry point for every event the relay receives.
///
/// Cloning is cheap; clones share the notifier, the agent runtime and the
/// task submitter.
#[derive(Clone)]
pub struct RelayDispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    notifier: Notifier,
    runtime: AgentRuntime,
    submitter: Arc<dyn TaskSubmitter>,
}

impl RelayDispatcher {
    pub fn new(
        notifier: Notifier,
        runtime: AgentRuntime,
        submitter: Arc<dyn TaskSubmitter>,
    ) -> Self {
        Self { inner: Arc::new(DispatcherInner { notifier, runtime, submitter }) }
    }

    pub fn runtime(&self) -> &AgentRuntime {
        &self.inner.runtime
    }

    /// Boxed because queued processing tasks come back in through here.
    pub fn handle(&self, event: RelayEvent) -> BoxFuture<'_, RelayStatus> {
        async move {
            match event {
                RelayEvent::Gateway(event) => self.handle_gateway(event).await,
                RelayEvent::AsyncProcessing(job) => {
                    self.process(job).await;
                    RelayStatus::Ok
                }
            }
        }
        .boxed()
    }

    async fn handle_gateway(&self, event: GatewayEvent) -> RelayStatus {
        let route = event.route_key();
        let connection = event.connection_id().map(|id| id.0.as_str()).unwrap_or("unknown");
        info!(
            event_name = "relay.event.received",
            route_key = route.as_str(),
            connection_id = connection,
            correlation_id = connection,
            "gateway event received"
        );

        match route {
            RouteKey::Connect => {
                if let Some(connection_id) = event.connection_id() {
                    self.notify(connection_id, &Notification::connected(), &event.addressing())
                        .await;
                }
                RelayStatus::Ok
            }
            RouteKey::Disconnect => {
                info!(
                    event_name = "relay.connection.closed",
                    connection_id = connection,
                    "client disconnected"
                );
                RelayStatus::Ok
            }
            RouteKey::Default => match self.accept_message(&event).await {
                Ok(request_id) => {
                    debug!(
                        event_name = "relay.message.accepted",
                        request_id = %request_id,
                        connection_id = connection,
                        "message acknowledged and queued"
                    );
                    RelayStatus::Ok
                }
                Err(failure) => self.reject_message(&event, failure).await,
            },
            RouteKey::Other(route_key) => {
                let failure = ApplicationError::UnsupportedRoute(route_key);
                warn!(
                    event_name = "relay.event.rejected",
                    connection_id = connection,
                    error_class = failure.error_class(),
                    error = %failure,
                    "unsupported route"
                );
                failure.status()
            }
        }
    }

    /// Parses the body, acknowledges it and queues the agent call.
    async fn accept_message(&self, event: &GatewayEvent) -> Result<RequestId, ApplicationError> {
        let connection_id =
            event.connection_id().cloned().ok_or(ApplicationError::MissingConnection)?;
        let request = RelayRequest::parse(event.body.as_deref().unwrap_or_default())?;

        self.notify(
            &connection_id,
            &Notification::Acknowledged {
                request_id: request.id.clone(),
                agent_type: request.agent_type.clone(),
            },
            &event.addressing(),
        )
        .await;

        let request_id = request.id.clone();
        let job = ProcessingJob {
            agent_type: request.agent_type,
            message: request.message,
            request_id: request.id,
            session_id: request.session_id,
            connection_id,
            event: event.clone(),
        };

        let dispatcher = self.clone();
        self.inner
            .submitter
            .submit(
                async move {
                    dispatcher.handle(RelayEvent::AsyncProcessing(job)).await;
                }
                .boxed(),
            )
            .map_err(|error| ApplicationError::Submission(error.to_string()))?;

        Ok(request_id)
    }

    async fn reject_message(&self, event: &GatewayEvent, failure: ApplicationError) -> RelayStatus {
        let request_id = event.body.as_deref().and_then(RequestId::recover);
        error!(
            event_name = "relay.message.failed",
            request_id = request_id.as_ref().map(|id| id.0.as_str()).unwrap_or("unknown"),
            connection_id = event.connection_id().map(|id| id.0.as_str()).unwrap_or("unknown"),
            error_class = failure.error_class(),
            error = %failure,
            "message could not be accepted"
        );

        if let (Some(request_id), Some(connection_id)) = (request_id, event.connection_id()) {
            let notification =
                Notification::Error { request_id: Some(request_id), error: failure.to_string() };
            self.notify(connection_id, &notification, &event.addressing()).await;
        }

        failure.status()
    }

    /// Out-of-band step: progress, agent call, then exactly one terminal notification.
    pub async fn process(&self, job: ProcessingJob) {
        let addressing = job.event.addressing();
        info!(
            event_name = "relay.processing.started",
            request_id = %job.request_id,
            connection_id = %job.connection_id,
            correlation_id = %job.request_id,
            agent_type = job.agent_type.as_str(),
            session_id = %job.session_id,
            "processing message"
        );

        self.notify(&job.connection_id, &Notification::thinking(job.request_id.clone()), &addressing)
            .await;

        let terminal = match self
            .inner
            .runtime
            .ask(&job.agent_type, &job.message, &job.session_id)
            .await
        {
            Ok(result) => {
                info!(
                    event_name = "relay.processing.completed",
                    request_id = %job.request_id,
                    correlation_id = %job.request_id,
                    response_chars = result.response_text.chars().count(),
                    "agent responded"
                );
                Notification::Response {
                    request_id: job.request_id,
                    agent_type: job.agent_type,
                    response: result.response_text,
                    session_id: result.session_id,
                }
            }
            Err(failure) => {
                error!(
                    event_name = "relay.processing.failed",
                    request_id = %job.request_id,
                    correlation_id = %job.request_id,
                    error_class = failure.kind(),
                    error = %failure,
                    "agent invocation failed"
                );
                Notification::Error { request_id: Some(job.request_id), error: failure.describe() }
            }
        };

        self.notify(&job.connection_id, &terminal, &addressing).await;
    }

    /// Delivery failures are already logged by the notifier and go no further.
    async fn notify(
        &self,
        connection_id: &ConnectionId,
        notification: &Notification,
        addressing: &AddressingContext,
    ) {
        let _ = self.inner.notifier.send(connection_id, notification, addressing).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex as StdMutex};
    use std::time::Duration;

    use architect_agent::{
        AgentDirectory, AgentInvocationResult, AgentInvoker, AgentRuntime, AgentTarget,
        InvocationError,
    };
    use architect_core::config::UnknownAgentPolicy;
    use architect_core::{ConnectionId, RelayStatus, SessionId};
    use async_trait::async_trait;
    use serde_json::Value;
    use tokio::sync::Mutex;

    use super::RelayDispatcher;
    use crate::events::{AddressingContext, GatewayEvent, RelayEvent};
    use crate::notifier::{ConnectionManager, DeliveryError, Notifier};
    use crate::tasks::{SubmitError, Task, TaskSubmitter, WorkerPool};

    #[derive(Default)]
    struct RecordingConnections {
        posts: Mutex<Vec<(String, Value)>>,
        fail: bool,
    }

    impl RecordingConnections {
        async fn sent(&self) -> Vec<(String, Value)> {
            self.posts.lock().await.clone()
        }

        async fn types(&self) -> Vec<String> {
            self.sent()
                .await
                .into_iter()
                .map(|(_, payload)| payload["type"].as_str().unwrap_or_default().to_owned())
                .collect()
        }
    }

    #[async_trait]
    impl ConnectionManager for RecordingConnections {
        async fn post_to_connection(
            &self,
            connection_id: &ConnectionId,
            data: &str,
        ) -> Result<(), DeliveryError> {
            if self.fail {
                return Err(DeliveryError::Gone(connection_id.clone()));
            }
            let payload = serde_json::from_str(data).expect("notifications are JSON");
            self.posts.lock().await.push((connection_id.0.clone(), payload));
            Ok(())
        }
    }

    enum Script {
        Reply(&'static str),
        Timeout,
    }

    struct ScriptedInvoker {
        script: Script,
        calls: Mutex<Vec<(String, String, String)>>,
    }

    impl ScriptedInvoker {
        fn new(script: Script) -> Arc<Self> {
            Arc::new(Self { script, calls: Mutex::new(Vec::new()) })
        }
    }

    #[async_trait]
    impl AgentInvoker for ScriptedInvoker {
        async fn invoke(
            &self,
            target: &AgentTarget,
            prompt: &str,
            session_id: &SessionId,
        ) -> Result<AgentInvocationResult, InvocationError> {
            self.calls.lock().await.push((
                target.agent_id.clone(),
                prompt.to_owned(),
                session_id.0.clone(),
            ));
            match self.script {
                Script::Reply(text) => Ok(AgentInvocationResult {
                    response_text: text.to_owned(),
                    session_id: session_id.clone(),
                }),
                Script::Timeout => Err(InvocationError::Timeout(Duration::from_secs(600))),
            }
        }
    }

    /// Holds submitted tasks until the test decides to run them.
    #[derive(Default)]
    struct DeferredSubmitter {
        tasks: StdMutex<Vec<Task>>,
    }

    impl DeferredSubmitter {
        fn pending(&self) -> usize {
            self.tasks.lock().expect("lock").len()
        }

        async fn run_all(&self) {
            let tasks: Vec<Task> = std::mem::take(&mut *self.tasks.lock().expect("lock"));
            for task in tasks {
                task.await;
            }
        }
    }

    impl TaskSubmitter for DeferredSubmitter {
        fn submit(&self, task: Task) -> Result<(), SubmitError> {
            self.tasks.lock().expect("lock").push(task);
            Ok(())
        }
    }

    struct RejectingSubmitter;

    impl TaskSubmitter for RejectingSubmitter {
        fn submit(&self, _task: Task) -> Result<(), SubmitError> {
            Err(SubmitError::QueueFull)
        }
    }

    fn dispatcher(
        connections: Arc<RecordingConnections>,
        invoker: Arc<ScriptedInvoker>,
        submitter: Arc<dyn TaskSubmitter>,
        policy: UnknownAgentPolicy,
    ) -> RelayDispatcher {
        let directory = AgentDirectory::new(
            AgentTarget::from_identifier("arn:aws:bedrock:us-east-1:1:agent/ONB", "DEFAULT"),
            AgentTarget::from_identifier("arn:aws:bedrock:us-east-1:1:agent/PRV", "DEFAULT"),
            policy,
        );
        RelayDispatcher::new(
            Notifier::with_manager(connections),
            AgentRuntime::new(directory, invoker),
            submitter,
        )
    }

    fn addressing() -> AddressingContext {
        AddressingContext {
            domain_name: Some("ws.example.com".to_owned()),
            stage: Some("prod".to_owned()),
        }
    }

    fn message(connection: &str, body: &str) -> RelayEvent {
        RelayEvent::Gateway(GatewayEvent::new(
            "$default",
            ConnectionId(connection.to_owned()),
            &addressing(),
            Some(body.to_owned()),
        ))
    }

    #[tokio::test]
    async fn message_is_acknowledged_before_processing_then_answered() {
        let connections = Arc::new(RecordingConnections::default());
        let invoker = ScriptedInvoker::new(Script::Reply("Welcome aboard"));
        let submitter = Arc::new(DeferredSubmitter::default());
        let dispatcher = dispatcher(
            connections.clone(),
            invoker.clone(),
            submitter.clone(),
            UnknownAgentPolicy::Onboarding,
        );

        let status =
            dispatcher.handle(message("c1", r#"{"id":"r1","message":"hello"}"#)).await;

        assert_eq!(status, RelayStatus::Ok);
        assert_eq!(connections.types().await, vec!["acknowledged"]);
        assert_eq!(submitter.pending(), 1);

        submitter.run_all().await;

        let sent = connections.sent().await;
        assert_eq!(connections.types().await, vec!["acknowledged", "progress", "response"]);
        assert!(sent.iter().all(|(connection, _)| connection == "c1"));
        assert_eq!(sent[0].1["requestId"], "r1");
        assert_eq!(sent[0].1["agentType"], "onboarding");
        assert_eq!(sent[1].1["message"], "Agent is thinking...");
        assert_eq!(sent[2].1["response"], "Welcome aboard");
        assert_eq!(sent[2].1["sessionId"], "session-r1");
        assert_eq!(
            invoker.calls.lock().await.as_slice(),
            &[("ONB".to_owned(), "hello".to_owned(), "session-r1".to_owned())]
        );
    }

    #[tokio::test]
    async fn explicit_session_and_agent_type_are_used() {
        let connections = Arc::new(RecordingConnections::default());
        let invoker = ScriptedInvoker::new(Script::Reply("deploying"));
        let submitter = Arc::new(DeferredSubmitter::default());
        let dispatcher = dispatcher(
            connections.clone(),
            invoker.clone(),
            submitter.clone(),
            UnknownAgentPolicy::Reject,
        );

        dispatcher
            .handle(message(
                "c2",
                r#"{"id":7,"agentType":"provisioning","message":"deploy","sessionId":"s-42"}"#,
            ))
            .await;
        submitter.run_all().await;

        let sent = connections.sent().await;
        assert_eq!(sent[2].1["requestId"], "7");
        assert_eq!(sent[2].1["agentType"], "provisioning");
        assert_eq!(sent[2].1["sessionId"], "s-42");
        assert_eq!(invoker.calls.lock().await[0].0, "PRV");
    }

    #[tokio::test]
    async fn connect_greets_and_disconnect_is_silent() {
        let connections = Arc::new(RecordingConnections::default());
        let dispatcher = dispatcher(
            connections.clone(),
            ScriptedInvoker::new(Script::Reply("unused")),
            Arc::new(DeferredSubmitter::default()),
            UnknownAgentPolicy::Onboarding,
        );

        let connect = RelayEvent::Gateway(GatewayEvent::new(
            "$connect",
            ConnectionId("c1".to_owned()),
            &addressing(),
            None,
        ));
        let disconnect = RelayEvent::Gateway(GatewayEvent::new(
            "$disconnect",
            ConnectionId("c1".to_owned()),
            &addressing(),
            None,
        ));

        assert_eq!(dispatcher.handle(connect).await, RelayStatus::Ok);
        assert_eq!(dispatcher.handle(disconnect).await, RelayStatus::Ok);

        let sent = connections.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1["type"], "connected");
        assert_eq!(sent[0].1["message"], "Connected to Agentic-Architect");
    }

    #[tokio::test]
    async fn unknown_route_is_rejected_without_notifications() {
        let connections = Arc::new(RecordingConnections::default());
        let submitter = Arc::new(DeferredSubmitter::default());
        let dispatcher = dispatcher(
            connections.clone(),
            ScriptedInvoker::new(Script::Reply("unused")),
            submitter.clone(),
            UnknownAgentPolicy::Onboarding,
        );

        let event = RelayEvent::Gateway(GatewayEvent::new(
            "sendmessage",
            ConnectionId("c1".to_owned()),
            &addressing(),
            Some(r#"{"id":"r1","message":"hello"}"#.to_owned()),
        ));

        assert_eq!(dispatcher.handle(event).await, RelayStatus::BadRequest);
        assert!(connections.sent().await.is_empty());
        assert_eq!(submitter.pending(), 0);
    }

    #[tokio::test]
    async fn invocation_timeout_ends_in_error_without_response() {
        let connections = Arc::new(RecordingConnections::default());
        let submitter = Arc::new(DeferredSubmitter::default());
        let dispatcher = dispatcher(
            connections.clone(),
            ScriptedInvoker::new(Script::Timeout),
            submitter.clone(),
            UnknownAgentPolicy::Onboarding,
        );

        dispatcher.handle(message("c1", r#"{"id":"r2","message":"hello"}"#)).await;
        submitter.run_all().await;

        let sent = connections.sent().await;
        assert_eq!(connections.types().await, vec!["acknowledged", "progress", "error"]);
        assert_eq!(sent[2].1["requestId"], "r2");
        let error = sent[2].1["error"].as_str().expect("error text");
        assert!(error.starts_with("TimeoutError"), "unexpected error text: {error}");
    }

    #[tokio::test]
    async fn malformed_body_with_recoverable_id_reports_error() {
        let connections = Arc::new(RecordingConnections::default());
        let submitter = Arc::new(DeferredSubmitter::default());
        let dispatcher = dispatcher(
            connections.clone(),
            ScriptedInvoker::new(Script::Reply("unused")),
            submitter.clone(),
            UnknownAgentPolicy::Onboarding,
        );

        let status = dispatcher.handle(message("c1", r#"{"id":"r3"}"#)).await;

        assert_eq!(status, RelayStatus::InternalError);
        assert_eq!(submitter.pending(), 0);
        let sent = connections.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1["type"], "error");
        assert_eq!(sent[0].1["requestId"], "r3");
    }

    #[tokio::test]
    async fn unparseable_body_fails_silently() {
        let connections = Arc::new(RecordingConnections::default());
        let dispatcher = dispatcher(
            connections.clone(),
            ScriptedInvoker::new(Script::Reply("unused")),
            Arc::new(DeferredSubmitter::default()),
            UnknownAgentPolicy::Onboarding,
        );

        let status = dispatcher.handle(message("c1", "not json")).await;

        assert_eq!(status, RelayStatus::InternalError);
        assert!(connections.sent().await.is_empty());
    }

    #[tokio::test]
    async fn rejected_submission_reports_error_after_ack() {
        let connections = Arc::new(RecordingConnections::default());
        let dispatcher = dispatcher(
            connections.clone(),
            ScriptedInvoker::new(Script::Reply("unused")),
            Arc::new(RejectingSubmitter),
            UnknownAgentPolicy::Onboarding,
        );

        let status = dispatcher.handle(message("c1", r#"{"id":"r4","message":"hi"}"#)).await;

        assert_eq!(status, RelayStatus::InternalError);
        assert_eq!(connections.types().await, vec!["acknowledged", "error"]);
    }

    #[tokio::test]
    async fn unknown_agent_type_follows_policy() {
        let connections = Arc::new(RecordingConnections::default());
        let invoker = ScriptedInvoker::new(Script::Reply("fallback"));
        let submitter = Arc::new(DeferredSubmitter::default());
        let fallback = dispatcher(
            connections.clone(),
            invoker.clone(),
            submitter.clone(),
            UnknownAgentPolicy::Onboarding,
        );

        fallback
            .handle(message("c1", r#"{"id":"r5","agentType":"billing","message":"hi"}"#))
            .await;
        submitter.run_all().await;
        assert_eq!(connections.types().await, vec!["acknowledged", "progress", "response"]);
        assert_eq!(invoker.calls.lock().await[0].0, "ONB");

        let rejecting_connections = Arc::new(RecordingConnections::default());
        let rejecting_invoker = ScriptedInvoker::new(Script::Reply("unused"));
        let rejecting = dispatcher(
            rejecting_connections.clone(),
            rejecting_invoker.clone(),
            submitter.clone(),
            UnknownAgentPolicy::Reject,
        );

        rejecting
            .handle(message("c1", r#"{"id":"r6","agentType":"billing","message":"hi"}"#))
            .await;
        submitter.run_all().await;

        let sent = rejecting_connections.sent().await;
        assert_eq!(rejecting_connections.types().await, vec!["acknowledged", "progress", "error"]);
        assert!(sent[2].1["error"].as_str().unwrap_or_default().starts_with("RoutingError"));
        assert!(rejecting_invoker.calls.lock().await.is_empty());
    }

    #[tokio::test]
    async fn delivery_failures_never_change_the_outcome() {
        let connections = Arc::new(RecordingConnections { fail: true, ..Default::default() });
        let invoker = ScriptedInvoker::new(Script::Reply("ok"));
        let submitter = Arc::new(DeferredSubmitter::default());
        let dispatcher = dispatcher(
            connections,
            invoker.clone(),
            submitter.clone(),
            UnknownAgentPolicy::Onboarding,
        );

        let status = dispatcher.handle(message("gone", r#"{"id":"r7","message":"hi"}"#)).await;
        submitter.run_all().await;

        assert_eq!(status, RelayStatus::Ok);
        assert_eq!(invoker.calls.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn async_processing_event_runs_inline() {
        let connections = Arc::new(RecordingConnections::default());
        let submitter = Arc::new(DeferredSubmitter::default());
        let dispatcher = dispatcher(
            connections.clone(),
            ScriptedInvoker::new(Script::Reply("done")),
            submitter.clone(),
            UnknownAgentPolicy::Onboarding,
        );
        let event = serde_json::json!({
            "async_processing": {
                "agentType": "onboarding",
                "message": "hello",
                "requestId": "r8",
                "sessionId": "session-r8",
                "connectionId": "c8",
                "event": { "requestContext": { "routeKey": "$default", "connectionId": "c8" } }
            }
        });

        let status =
            dispatcher.handle(RelayEvent::from_json(event).expect("job should parse")).await;

        assert_eq!(status, RelayStatus::Ok);
        assert_eq!(connections.types().await, vec!["progress", "response"]);
        assert_eq!(submitter.pending(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn every_request_gets_one_ack_and_one_terminal_notification() {
        let connections = Arc::new(RecordingConnections::default());
        let dispatcher = dispatcher(
            connections.clone(),
            ScriptedInvoker::new(Script::Reply("ok")),
            Arc::new(WorkerPool::new(4, 64)),
            UnknownAgentPolicy::Onboarding,
        );

        for index in 0..20 {
            let body = format!(r#"{{"id":"r{index}","message":"m{index}"}}"#);
            assert_eq!(
                dispatcher.handle(message(&format!("c{index}"), &body)).await,
                RelayStatus::Ok
            );
        }

        tokio::time::timeout(Duration::from_secs(5), async {
            while connections.sent().await.len() < 60 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("all requests should finish");

        let sent = connections.sent().await;
        for index in 0..20 {
            let connection = format!("c{index}");
            let kinds: Vec<&str> = sent
                .iter()
                .filter(|(id, _)| *id == connection)
                .map(|(_, payload)| payload["type"].as_str().unwrap_or_default())
                .collect();
            assert_eq!(kinds, vec!["acknowledged", "progress", "response"], "for {connection}");
        }
    }
}
