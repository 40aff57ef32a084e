//! The logged-in session: the one context object every hook is built from.
//!
//! It is created at login and owns the backend handle, the tenant selection
//! and the query cache. Nothing in the crate reaches for process-wide state.

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    backend::{Backend, SqliteBackend},
    cache::QueryClient,
    config::{DatabaseConfig, SyncConfig},
    realtime::RealtimeCollection,
    resources::{
        AttendanceFilters, Attendances, Categories, CategoryFilters, CategoryTypeFilters, CategoryTypes, Indicated,
        IndicatedFilters, VoterFilters, Voters,
    },
    store::{EntityStore, Resource},
    tenant::{Tenant, TenantStore},
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub uid: String,
    pub nome: String,
    pub email: String,
    /// The office the user works for; selected at login.
    #[serde(default)]
    pub empresa: Option<Tenant>,
}

/// What hooks share. Cheap to clone.
#[derive(Clone)]
pub struct SyncContext {
    pub backend: Arc<dyn Backend>,
    pub tenants: TenantStore,
    pub queries: QueryClient,
    pub user_uid: String,
    pub config: SyncConfig,
}

#[derive(Default)]
pub struct SessionBuilder {
    backend: Option<Arc<dyn Backend>>,
    config: SyncConfig,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_memory(mut self) -> Self {
        self.config.database = DatabaseConfig::Memory;
        self
    }

    pub fn sqlite<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.database = DatabaseConfig::File {
            path: path.as_ref().to_path_buf(),
        };
        self
    }

    /// Uses an already opened backend; the database settings are ignored.
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    pub fn login(self, user: UserProfile) -> Result<Session> {
        let backend: Arc<dyn Backend> = match self.backend {
            Some(backend) => backend,
            None => match &self.config.database {
                DatabaseConfig::Memory => Arc::new(SqliteBackend::open_memory()?),
                DatabaseConfig::File { path } => Arc::new(
                    SqliteBackend::open(path)
                        .with_context(|| format!("failed to open database {}", path.display()))?,
                ),
            },
        };

        let tenants = TenantStore::new();
        if let Some(empresa) = &user.empresa {
            tenants.select(empresa.clone());
        }
        log::info!("session: {} logged in", user.email);

        Ok(Session {
            ctx: SyncContext {
                backend,
                tenants,
                queries: QueryClient::new(),
                user_uid: user.uid.clone(),
                config: self.config,
            },
            user,
        })
    }
}

pub struct Session {
    ctx: SyncContext,
    user: UserProfile,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    pub fn user(&self) -> &UserProfile {
        &self.user
    }

    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }

    pub fn tenants(&self) -> &TenantStore {
        &self.ctx.tenants
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.ctx.backend
    }

    pub fn queries(&self) -> &QueryClient {
        &self.ctx.queries
    }

    pub fn config(&self) -> &SyncConfig {
        &self.ctx.config
    }

    /// Every live collection follows the change: its channel is replaced and
    /// its rows reloaded for the new tenant.
    pub fn switch_tenant(&self, tenant: Tenant) {
        self.ctx.tenants.select(tenant);
    }

    /// Clears the tenant, which closes every subscription, and drops all
    /// cached collections.
    pub fn logout(&self) {
        self.ctx.tenants.clear();
        self.ctx.queries.clear();
        log::info!("session: {} logged out", self.user.email);
    }

    pub fn store<R: Resource>(&self, filters: R::Filters) -> EntityStore<R> {
        EntityStore::new(&self.ctx, filters)
    }

    pub fn collection<R: Resource>(&self, filters: R::Filters) -> RealtimeCollection<R> {
        RealtimeCollection::mount(&self.ctx, filters)
    }

    pub fn voters(&self, filters: VoterFilters) -> RealtimeCollection<Voters> {
        self.collection(filters)
    }

    pub fn categories(&self, filters: CategoryFilters) -> RealtimeCollection<Categories> {
        self.collection(filters)
    }

    pub fn category_types(&self, filters: CategoryTypeFilters) -> RealtimeCollection<CategoryTypes> {
        self.collection(filters)
    }

    pub fn attendances(&self, filters: AttendanceFilters) -> RealtimeCollection<Attendances> {
        self.collection(filters)
    }

    pub fn indicated(&self, filters: IndicatedFilters) -> RealtimeCollection<Indicated> {
        self.collection(filters)
    }
}
