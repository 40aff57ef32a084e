use std::{
    fmt,
    sync::{mpsc::Receiver, Arc, PoisonError, RwLock},
};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, SyncError},
    notifier::Notifier,
};

/// Identifier of a tenant (the political office account, "empresa").
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new(uid: impl Into<String>) -> Self {
        TenantId(uid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(uid: &str) -> Self {
        TenantId(uid.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub uid: TenantId,
    pub nome: String,
    #[serde(default)]
    pub status: Option<String>,
}

impl Tenant {
    pub fn new(uid: impl Into<String>, nome: impl Into<String>) -> Self {
        Self {
            uid: TenantId::new(uid),
            nome: nome.into(),
            status: None,
        }
    }
}

/// Holds the currently selected tenant. Every hook reads it; only the
/// session writes it. Observers get the new id on every change.
#[derive(Clone, Default)]
pub struct TenantStore {
    current: Arc<RwLock<Option<Tenant>>>,
    changes: Notifier<Option<TenantId>>,
}

impl TenantStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects `tenant`. Re-selecting the current tenant only refreshes its
    /// metadata and is not reported as a change.
    pub fn select(&self, tenant: Tenant) {
        let changed = {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            let changed = current.as_ref().map(|t| &t.uid) != Some(&tenant.uid);
            *current = Some(tenant.clone());
            changed
        };
        if changed {
            log::info!("tenant selected: {} ({})", tenant.uid, tenant.nome);
            self.changes.notify(Some(tenant.uid));
        }
    }

    pub fn clear(&self) {
        let previous = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(previous) = previous {
            log::info!("tenant cleared: {}", previous.uid);
            self.changes.notify(None);
        }
    }

    pub fn current(&self) -> Option<Tenant> {
        self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn current_id(&self) -> Option<TenantId> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|t| t.uid.clone())
    }

    /// The selected tenant id, or `TenantMissing`.
    pub fn require(&self) -> Result<TenantId> {
        self.current_id().ok_or(SyncError::TenantMissing)
    }

    pub fn observer(&self) -> Receiver<Option<TenantId>> {
        self.changes.observer()
    }
}
