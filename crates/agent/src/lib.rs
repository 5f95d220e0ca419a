//! Agent access for the relay.
//!
//! - `invoker` - one request/response cycle against the hosted agent endpoint,
//!   collecting its chunked completion into a single string
//! - `directory` - `agentType` to agent identity routing, including the policy
//!   for types that are neither onboarding nor provisioning
//! - `runtime` - the two combined; what the relay and the CLI call
//!
//! The agents themselves (their prompts, tools and peer handoff) live behind
//! the endpoint and are not modelled here.

pub mod directory;
pub mod invoker;
pub mod runtime;

pub use directory::{AgentDirectory, RoutingError};
pub use invoker::{
    collect_completion, AgentInvocationResult, AgentInvoker, AgentTarget, CompletionFragment,
    HttpAgentInvoker, InvocationError,
};
pub use runtime::{AgentError, AgentRuntime};
