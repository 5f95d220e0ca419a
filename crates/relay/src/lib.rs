//! Relay between long-lived client connections and the hosted agents.
//!
//! - **Events** (`events`) - gateway events (`$connect`, `$disconnect`,
//!   `$default`) and the out-of-band processing job
//! - **Dispatcher** (`dispatcher`) - acknowledges a message immediately and
//!   runs the agent call out-of-band
//! - **Notifier** (`notifier`) - pushes JSON notifications back to a client
//!   connection, locally or through a managed gateway's management API
//! - **Tasks** (`tasks`) - fire-and-forget executors for the out-of-band step
//!
//! # Architecture
//!
//! ```text
//! client ──$default──▶ RelayDispatcher ──ack──▶ Notifier ──▶ client
//!                            │
//!                      TaskSubmitter
//!                            │
//!                   process(job) ──▶ AgentRuntime ──▶ agent endpoint
//!                            │
//!               progress / response / error ──▶ Notifier ──▶ client
//! ```
//!
//! Per request the client sees `acknowledged`, then `progress`, then exactly
//! one of `response` or `error`. Nothing is ordered across requests.

pub mod dispatcher;
pub mod events;
pub mod notifier;
pub mod tasks;

pub use dispatcher::RelayDispatcher;
pub use events::{AddressingContext, GatewayEvent, ProcessingJob, RelayEvent, RouteKey};
pub use notifier::{
    http_manager_factory, ConnectionManager, ConnectionManagerFactory, DeliveryError,
    HttpConnectionManager, LocalConnectionRegistry, Notifier,
};
pub use tasks::{SpawnSubmitter, SubmitError, Task, TaskSubmitter, WorkerPool};
