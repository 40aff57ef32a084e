use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{upper, RowBuilder};
use crate::{
    backend::{Row, Select},
    error::{Result, SyncError},
    store::{Resource, WriteContext, TENANT_COLUMN},
    tenant::TenantId,
};

/// Groups categories, e.g. "SAÚDE" or "EDUCAÇÃO".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryType {
    pub uid: String,
    pub empresa_uid: String,
    pub nome: String,
    pub created_at: i64,
}

#[derive(Clone, Debug, Default)]
pub struct CategoryTypeDraft {
    pub nome: String,
}

#[derive(Clone, Debug, Default)]
pub struct CategoryTypePatch {
    pub nome: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CategoryTypeFilters {}

pub struct CategoryTypes;

fn nome(value: &str) -> Result<String> {
    upper(value).ok_or_else(|| SyncError::validation("nome", "Nome é obrigatório"))
}

impl Resource for CategoryTypes {
    const ENTITY: &'static str = "category_types";
    const TABLE: &'static str = "gbp_categoria_tipos";
    const STALE_TIME: Duration = Duration::ZERO;

    type Row = CategoryType;
    type Draft = CategoryTypeDraft;
    type Patch = CategoryTypePatch;
    type Filters = CategoryTypeFilters;

    fn select(tenant: &TenantId, _filters: &CategoryTypeFilters) -> Select {
        Select::from(Self::TABLE)
            .eq(TENANT_COLUMN, tenant.as_str())
            .order_asc("nome")
    }

    fn prepare_create(_ctx: &WriteContext<'_>, draft: CategoryTypeDraft) -> Result<Row> {
        Ok(RowBuilder::new().set("nome", nome(&draft.nome)?).build())
    }

    fn prepare_update(_ctx: &WriteContext<'_>, _id: &str, patch: CategoryTypePatch) -> Result<Row> {
        let mut row = RowBuilder::new();
        if let Some(value) = patch.nome.as_deref() {
            row = row.set("nome", nome(value)?);
        }
        Ok(row.build())
    }
}
