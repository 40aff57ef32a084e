use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{filter_value, upper, RowBuilder};
use crate::{
    backend::{Filter, Row, Select},
    error::{Result, SyncError},
    store::{Resource, WriteContext, TENANT_COLUMN},
    tenant::TenantId,
};

/// A person who refers voters to the office (`gbp_indicado`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatedRecord {
    pub uid: String,
    pub empresa_uid: String,
    pub nome: String,
    #[serde(default)]
    pub cidade: Option<String>,
    #[serde(default)]
    pub bairro: Option<String>,
    pub created_at: i64,
}

#[derive(Clone, Debug, Default)]
pub struct IndicatedDraft {
    pub nome: String,
    pub cidade: Option<String>,
    pub bairro: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct IndicatedPatch {
    pub nome: Option<String>,
    pub cidade: Option<String>,
    pub bairro: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IndicatedFilters {
    pub search: Option<String>,
}

pub struct Indicated;

fn nome(value: &str) -> Result<String> {
    upper(value).ok_or_else(|| SyncError::validation("nome", "Nome é obrigatório"))
}

impl Resource for Indicated {
    const ENTITY: &'static str = "indicated";
    const TABLE: &'static str = "gbp_indicado";
    const STALE_TIME: Duration = Duration::from_secs(5 * 60);

    type Row = IndicatedRecord;
    type Draft = IndicatedDraft;
    type Patch = IndicatedPatch;
    type Filters = IndicatedFilters;

    fn select(tenant: &TenantId, filters: &IndicatedFilters) -> Select {
        let query = Select::from(Self::TABLE)
            .eq(TENANT_COLUMN, tenant.as_str())
            .order_asc("nome");
        match filter_value(&filters.search) {
            Some(search) => query.filter(Filter::contains("nome", &search.to_uppercase())),
            None => query,
        }
    }

    fn prepare_create(_ctx: &WriteContext<'_>, draft: IndicatedDraft) -> Result<Row> {
        Ok(RowBuilder::new()
            .set("nome", nome(&draft.nome)?)
            .put("cidade", draft.cidade.as_deref(), upper)
            .put("bairro", draft.bairro.as_deref(), upper)
            .build())
    }

    fn prepare_update(_ctx: &WriteContext<'_>, _id: &str, patch: IndicatedPatch) -> Result<Row> {
        let mut row = RowBuilder::new();
        if let Some(value) = patch.nome.as_deref() {
            row = row.set("nome", nome(value)?);
        }
        Ok(row
            .patch("cidade", patch.cidade.as_deref(), upper)
            .patch("bairro", patch.bairro.as_deref(), upper)
            .build())
    }
}
