use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{category_types::CategoryTypes, trimmed, RowBuilder};
use crate::{
    backend::{Row, Select},
    error::{Result, SyncError},
    store::{Resource, WriteContext, TENANT_COLUMN},
    tenant::TenantId,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub uid: String,
    pub empresa_uid: String,
    pub nome: String,
    pub tipo_uid: String,
    pub created_at: i64,
}

#[derive(Clone, Debug, Default)]
pub struct CategoryDraft {
    pub nome: String,
    pub tipo_uid: String,
}

#[derive(Clone, Debug, Default)]
pub struct CategoryPatch {
    pub nome: Option<String>,
    pub tipo_uid: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CategoryFilters {
    pub tipo_uid: Option<String>,
}

pub struct Categories;

fn required(field: &str, value: &str, message: &str) -> Result<String> {
    trimmed(value).ok_or_else(|| SyncError::validation(field, message))
}

/// The type must exist in the acting tenant.
fn category_type(ctx: &WriteContext<'_>, value: &str) -> Result<String> {
    let tipo = required("tipo_uid", value, "Tipo é obrigatório")?;
    if !ctx.exists(CategoryTypes::TABLE, &tipo)? {
        return Err(SyncError::validation("tipo_uid", "Tipo de categoria inválido"));
    }
    Ok(tipo)
}

impl Resource for Categories {
    const ENTITY: &'static str = "categories";
    const TABLE: &'static str = "gbp_categorias";
    const STALE_TIME: Duration = Duration::ZERO;

    type Row = Category;
    type Draft = CategoryDraft;
    type Patch = CategoryPatch;
    type Filters = CategoryFilters;

    fn select(tenant: &TenantId, filters: &CategoryFilters) -> Select {
        let query = Select::from(Self::TABLE)
            .eq(TENANT_COLUMN, tenant.as_str())
            .order_asc("nome");
        match super::filter_value(&filters.tipo_uid) {
            Some(tipo) => query.eq("tipo_uid", tipo),
            None => query,
        }
    }

    fn prepare_create(ctx: &WriteContext<'_>, draft: CategoryDraft) -> Result<Row> {
        let nome = required("nome", &draft.nome, "Nome é obrigatório")?;
        let tipo = category_type(ctx, &draft.tipo_uid)?;
        Ok(RowBuilder::new().set("nome", nome).set("tipo_uid", tipo).build())
    }

    fn prepare_update(ctx: &WriteContext<'_>, _id: &str, patch: CategoryPatch) -> Result<Row> {
        let mut row = RowBuilder::new();
        if let Some(nome) = patch.nome.as_deref() {
            row = row.set("nome", required("nome", nome, "Nome é obrigatório")?);
        }
        if let Some(tipo) = patch.tipo_uid.as_deref() {
            row = row.set("tipo_uid", category_type(ctx, tipo)?);
        }
        Ok(row.build())
    }
}
