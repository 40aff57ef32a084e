use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{filter_value, now_millis, trimmed, RowBuilder};
use crate::{
    backend::{Row, Select},
    error::{Result, SyncError},
    resources::{Categories, Voters},
    store::{Resource, WriteContext, PRIMARY_KEY, TENANT_COLUMN},
    tenant::TenantId,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    #[default]
    Pendente,
    EmAndamento,
    Concluido,
    Cancelado,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Pendente => "pendente",
            AttendanceStatus::EmAndamento => "em_andamento",
            AttendanceStatus::Concluido => "concluido",
            AttendanceStatus::Cancelado => "cancelado",
        }
    }
}

/// One service request logged for a voter (`gbp_atendimentos`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendance {
    pub uid: String,
    pub empresa_uid: String,
    pub eleitor_uid: String,
    pub usuario_uid: String,
    #[serde(default)]
    pub categoria_uid: Option<String>,
    pub descricao: String,
    pub status: AttendanceStatus,
    /// Epoch milliseconds.
    pub data_atendimento: i64,
    pub created_at: i64,
}

#[derive(Clone, Debug, Default)]
pub struct AttendanceDraft {
    pub eleitor_uid: String,
    pub categoria_uid: Option<String>,
    pub descricao: String,
    pub status: Option<AttendanceStatus>,
    pub data_atendimento: Option<i64>,
}

#[derive(Clone, Debug, Default)]
pub struct AttendancePatch {
    /// An empty string removes the category.
    pub categoria_uid: Option<String>,
    pub descricao: Option<String>,
    pub status: Option<AttendanceStatus>,
    pub data_atendimento: Option<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AttendanceFilters {
    /// Narrows the list, and the change feed, to one voter.
    pub eleitor_uid: Option<String>,
}

impl AttendanceFilters {
    pub fn for_voter(eleitor_uid: &str) -> Self {
        Self {
            eleitor_uid: Some(eleitor_uid.to_string()),
        }
    }
}

pub struct Attendances;

impl Attendances {
    fn check_category(ctx: &WriteContext<'_>, categoria_uid: &str) -> Result<()> {
        if !ctx.exists(Categories::TABLE, categoria_uid)? {
            return Err(SyncError::validation("categoria_uid", "Categoria de atendimento inválida"));
        }
        Ok(())
    }
}

impl Resource for Attendances {
    const ENTITY: &'static str = "attendances";
    const TABLE: &'static str = "gbp_atendimentos";
    const STALE_TIME: Duration = Duration::from_secs(60);

    type Row = Attendance;
    type Draft = AttendanceDraft;
    type Patch = AttendancePatch;
    type Filters = AttendanceFilters;

    fn select(tenant: &TenantId, filters: &AttendanceFilters) -> Select {
        let query = Select::from(Self::TABLE)
            .eq(TENANT_COLUMN, tenant.as_str())
            .order_desc("data_atendimento")
            .order_desc(PRIMARY_KEY);
        match filter_value(&filters.eleitor_uid) {
            Some(voter) => query.eq("eleitor_uid", voter),
            None => query,
        }
    }

    fn feed_filter(filters: &AttendanceFilters) -> Option<String> {
        filter_value(&filters.eleitor_uid).map(|voter| format!("eleitor_uid=eq.{}", voter))
    }

    fn prepare_create(ctx: &WriteContext<'_>, draft: AttendanceDraft) -> Result<Row> {
        let descricao =
            trimmed(&draft.descricao).ok_or_else(|| SyncError::validation("descricao", "Descrição é obrigatória"))?;
        let categoria = draft.categoria_uid.as_deref().and_then(trimmed);
        if let Some(categoria) = &categoria {
            Self::check_category(ctx, categoria)?;
        }
        let eleitor = draft.eleitor_uid.trim();
        if eleitor.is_empty() || !ctx.exists(Voters::TABLE, eleitor)? {
            return Err(SyncError::validation("eleitor_uid", "Eleitor não encontrado"));
        }

        Ok(RowBuilder::new()
            .set("eleitor_uid", eleitor)
            .set("usuario_uid", ctx.user_uid)
            .put("categoria_uid", categoria.as_deref(), trimmed)
            .set("descricao", descricao)
            .set("status", draft.status.unwrap_or_default().as_str())
            .set("data_atendimento", draft.data_atendimento.unwrap_or_else(now_millis))
            .build())
    }

    fn prepare_update(ctx: &WriteContext<'_>, _id: &str, patch: AttendancePatch) -> Result<Row> {
        let mut row = RowBuilder::new();
        if let Some(categoria) = patch.categoria_uid.as_deref() {
            if let Some(categoria) = trimmed(categoria) {
                Self::check_category(ctx, &categoria)?;
            }
            row = row.patch("categoria_uid", Some(categoria), trimmed);
        }
        if let Some(descricao) = patch.descricao.as_deref() {
            let descricao =
                trimmed(descricao).ok_or_else(|| SyncError::validation("descricao", "Descrição é obrigatória"))?;
            row = row.set("descricao", descricao);
        }
        if let Some(status) = patch.status {
            row = row.set("status", status.as_str());
        }
        if let Some(at) = patch.data_atendimento {
            row = row.set("data_atendimento", at);
        }
        Ok(row.build())
    }
}
