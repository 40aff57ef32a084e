use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{digits, filter_value, trimmed, upper, RowBuilder};
use crate::{
    backend::{Filter, Row, Select},
    cpf,
    error::{Result, SyncError},
    store::{Resource, WriteContext, PRIMARY_KEY, TENANT_COLUMN},
    tenant::TenantId,
};

const DUPLICATE_CPF: &str = "CPF já cadastrado";

/// A registered voter (`gbp_eleitores`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voter {
    pub uid: String,
    pub empresa_uid: String,
    pub nome: String,
    #[serde(default)]
    pub cpf: Option<String>,
    #[serde(default)]
    pub genero: Option<String>,
    #[serde(default)]
    pub whatsapp: Option<String>,
    #[serde(default)]
    pub telefone: Option<String>,
    #[serde(default)]
    pub nascimento: Option<String>,
    #[serde(default)]
    pub titulo: Option<String>,
    #[serde(default)]
    pub zona: Option<String>,
    #[serde(default)]
    pub secao: Option<String>,
    #[serde(default)]
    pub cep: Option<String>,
    #[serde(default)]
    pub logradouro: Option<String>,
    #[serde(default)]
    pub numero: Option<String>,
    #[serde(default)]
    pub complemento: Option<String>,
    #[serde(default)]
    pub bairro: Option<String>,
    #[serde(default)]
    pub cidade: Option<String>,
    #[serde(default)]
    pub categoria_uid: Option<String>,
    #[serde(default)]
    pub indicado: Option<String>,
    pub usuario_uid: String,
    #[serde(default)]
    pub responsavel: Option<String>,
    pub created_at: i64,
}

#[derive(Clone, Debug, Default)]
pub struct VoterDraft {
    pub nome: String,
    pub cpf: Option<String>,
    pub genero: Option<String>,
    pub whatsapp: Option<String>,
    pub telefone: Option<String>,
    pub nascimento: Option<String>,
    pub titulo: Option<String>,
    pub zona: Option<String>,
    pub secao: Option<String>,
    pub cep: Option<String>,
    pub logradouro: Option<String>,
    pub numero: Option<String>,
    pub complemento: Option<String>,
    pub bairro: Option<String>,
    pub cidade: Option<String>,
    pub categoria_uid: Option<String>,
    pub indicado: Option<String>,
}

impl VoterDraft {
    pub fn new(nome: &str) -> Self {
        Self {
            nome: nome.to_string(),
            ..Self::default()
        }
    }

    pub fn cpf(mut self, cpf: &str) -> Self {
        self.cpf = Some(cpf.to_string());
        self
    }

    pub fn cidade(mut self, cidade: &str) -> Self {
        self.cidade = Some(cidade.to_string());
        self
    }

    pub fn bairro(mut self, bairro: &str) -> Self {
        self.bairro = Some(bairro.to_string());
        self
    }
}

/// Fields to change. `None` keeps the stored value; an empty string clears it.
#[derive(Clone, Debug, Default)]
pub struct VoterPatch {
    pub nome: Option<String>,
    pub cpf: Option<String>,
    pub genero: Option<String>,
    pub whatsapp: Option<String>,
    pub telefone: Option<String>,
    pub nascimento: Option<String>,
    pub titulo: Option<String>,
    pub zona: Option<String>,
    pub secao: Option<String>,
    pub cep: Option<String>,
    pub logradouro: Option<String>,
    pub numero: Option<String>,
    pub complemento: Option<String>,
    pub bairro: Option<String>,
    pub cidade: Option<String>,
    pub categoria_uid: Option<String>,
    pub indicado: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct VoterFilters {
    /// Name or CPF fragment.
    pub search: Option<String>,
    pub city: Option<String>,
    pub neighborhood: Option<String>,
    pub category: Option<String>,
    pub indication: Option<String>,
    pub street: Option<String>,
    pub cpf: Option<String>,
}

pub struct Voters;

impl Voters {
    fn checked_cpf(raw: &str) -> Result<Option<String>> {
        let Some(cpf) = digits(raw) else {
            return Ok(None);
        };
        if !cpf::is_complete(&cpf) {
            return Err(SyncError::validation("cpf", "CPF deve conter 11 dígitos"));
        }
        Ok(Some(cpf))
    }
}

impl Resource for Voters {
    const ENTITY: &'static str = "voters";
    const TABLE: &'static str = "gbp_eleitores";
    const STALE_TIME: Duration = Duration::ZERO;

    type Row = Voter;
    type Draft = VoterDraft;
    type Patch = VoterPatch;
    type Filters = VoterFilters;

    fn select(tenant: &TenantId, filters: &VoterFilters) -> Select {
        let mut query = Select::from(Self::TABLE)
            .eq(TENANT_COLUMN, tenant.as_str())
            .order_desc("created_at")
            .order_desc(PRIMARY_KEY);

        if let Some(search) = filter_value(&filters.search) {
            query = query.or(vec![
                Filter::contains("nome", &search.to_uppercase()),
                Filter::contains("cpf", search),
            ]);
        }
        if let Some(city) = filter_value(&filters.city) {
            query = query.filter(Filter::contains("cidade", &city.to_uppercase()));
        }
        if let Some(neighborhood) = filter_value(&filters.neighborhood) {
            query = query.filter(Filter::contains("bairro", &neighborhood.to_uppercase()));
        }
        if let Some(category) = filter_value(&filters.category) {
            query = query.eq("categoria_uid", category);
        }
        if let Some(indication) = filter_value(&filters.indication) {
            query = query.filter(Filter::contains("indicado", &indication.to_uppercase()));
        }
        if let Some(street) = filter_value(&filters.street) {
            query = query.filter(Filter::contains("logradouro", &street.to_uppercase()));
        }
        if let Some(cpf) = filter_value(&filters.cpf) {
            query = query.eq("cpf", cpf::normalize(cpf));
        }
        query
    }

    fn prepare_create(ctx: &WriteContext<'_>, draft: VoterDraft) -> Result<Row> {
        let nome = upper(&draft.nome).ok_or_else(|| SyncError::validation("nome", "Nome é obrigatório"))?;
        let cpf = match draft.cpf.as_deref() {
            Some(raw) => Self::checked_cpf(raw)?,
            None => None,
        };
        if let Some(cpf) = &cpf {
            if ctx.any(ctx.scoped(Self::TABLE).eq("cpf", cpf.as_str()))? {
                return Err(SyncError::validation("cpf", DUPLICATE_CPF));
            }
        }

        let row = RowBuilder::new()
            .set("nome", nome)
            .put("cpf", cpf.as_deref(), trimmed)
            .put("genero", draft.genero.as_deref(), upper)
            .put("whatsapp", draft.whatsapp.as_deref(), digits)
            .put("telefone", draft.telefone.as_deref(), digits)
            .put("nascimento", draft.nascimento.as_deref(), trimmed)
            .put("titulo", draft.titulo.as_deref(), digits)
            .put("zona", draft.zona.as_deref(), digits)
            .put("secao", draft.secao.as_deref(), digits)
            .put("categoria_uid", draft.categoria_uid.as_deref(), trimmed)
            .put("cep", draft.cep.as_deref(), digits)
            .put("logradouro", draft.logradouro.as_deref(), upper)
            .put("numero", draft.numero.as_deref(), trimmed)
            .put("complemento", draft.complemento.as_deref(), upper)
            .put("bairro", draft.bairro.as_deref(), upper)
            .put("cidade", draft.cidade.as_deref(), upper)
            .put("indicado", draft.indicado.as_deref(), upper)
            .set("usuario_uid", ctx.user_uid)
            .set("responsavel", ctx.user_uid);
        Ok(row.build())
    }

    fn prepare_update(ctx: &WriteContext<'_>, id: &str, patch: VoterPatch) -> Result<Row> {
        let mut row = RowBuilder::new();
        if let Some(nome) = patch.nome.as_deref() {
            let nome = upper(nome).ok_or_else(|| SyncError::validation("nome", "Nome é obrigatório"))?;
            row = row.set("nome", nome);
        }
        if let Some(raw) = patch.cpf.as_deref() {
            match Self::checked_cpf(raw)? {
                Some(cpf) => {
                    // Only another voter holding the CPF is a duplicate.
                    let taken = ctx.any(
                        ctx.scoped(Self::TABLE)
                            .eq("cpf", cpf.as_str())
                            .neq(PRIMARY_KEY, id),
                    )?;
                    if taken {
                        return Err(SyncError::validation("cpf", DUPLICATE_CPF));
                    }
                    row = row.set("cpf", cpf);
                }
                None => row = row.set("cpf", serde_json::Value::Null),
            }
        }

        let row = row
            .patch("genero", patch.genero.as_deref(), upper)
            .patch("whatsapp", patch.whatsapp.as_deref(), digits)
            .patch("telefone", patch.telefone.as_deref(), digits)
            .patch("nascimento", patch.nascimento.as_deref(), trimmed)
            .patch("titulo", patch.titulo.as_deref(), digits)
            .patch("zona", patch.zona.as_deref(), digits)
            .patch("secao", patch.secao.as_deref(), digits)
            .patch("categoria_uid", patch.categoria_uid.as_deref(), trimmed)
            .patch("cep", patch.cep.as_deref(), digits)
            .patch("logradouro", patch.logradouro.as_deref(), upper)
            .patch("numero", patch.numero.as_deref(), trimmed)
            .patch("complemento", patch.complemento.as_deref(), upper)
            .patch("bairro", patch.bairro.as_deref(), upper)
            .patch("cidade", patch.cidade.as_deref(), upper)
            .patch("indicado", patch.indicado.as_deref(), upper);
        Ok(row.build())
    }
}
