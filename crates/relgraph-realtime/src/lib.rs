//! Realtime WebSocket push server for performance-observation data and
//! alerts.

pub mod background_tasks;
pub mod error;
pub mod origin;
pub mod server;
pub mod session;

pub use background_tasks::{spawn_background_tasks, BackgroundTaskConfig, BackgroundTaskHandles};
pub use origin::{AllowListOriginChecker, OriginChecker, PermissiveOriginChecker};
pub use server::{build_router, AppState, RealtimeServerConfig};
pub use session::{
    default_topics, ClientControl, Envelope, EnvelopeType, SessionId, SessionRegistry,
    SessionState, SubscriberHandle, SubscriberSession, TOPIC_ALERTS, TOPIC_METRICS, TOPIC_PERFORMANCE,
};

pub use relgraph_common::{RelGraphError, Result};
