pub mod backend;
pub mod cache;
pub mod config;
pub mod cpf;
pub mod error;
pub mod feed;
pub mod notifier;
pub mod realtime;
pub mod resources;
pub mod session;
pub mod store;
pub mod tenant;

pub use backend::{Backend, BackendError, ChangeEvent, ChangeKind, Row, Select, SqliteBackend};
pub use cache::{CacheKey, QueryClient};
pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use feed::{ChangeFeedSubscriber, FeedHandler, FeedSpec};
pub use realtime::{RealtimeCollection, SyncPhase};
pub use session::{Session, SessionBuilder, SyncContext, UserProfile};
pub use store::{EntityStore, QueryState, Resource};
pub use tenant::{Tenant, TenantId, TenantStore};
