use std::{path::Path, time::Duration};

use anyhow::Result;
use include_dir::{include_dir, Dir};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{ffi, params_from_iter, types::ValueRef, Connection, ErrorCode, Transaction};
use rusqlite_migration::Migrations;
use serde_json::Value;
use uuid::Uuid;

use super::{
    channel::{ChangeHub, ChangeKind, Channel, ChannelSpec},
    Backend, BackendError, Filter, Order, Row, Select, LIKE_ESCAPE, UNIQUE_VIOLATION,
};

static MIGRATIONS_DIR: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/migrations");

const PRIMARY_KEY: &str = "uid";
const CREATED_AT: &str = "created_at";

/// Embedded relational backend. Every committed write is published on the
/// change hub after the connection is returned to the pool.
#[derive(Clone)]
pub struct SqliteBackend {
    pool: Pool<SqliteConnectionManager>,
    hub: ChangeHub,
}

impl SqliteBackend {
    /// A private in-memory database. The pool holds a single connection since
    /// every in-memory connection would otherwise see its own database.
    pub fn open_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory().with_init(init_connection);
        let pool = Pool::builder().max_size(1).build(manager)?;
        Self::from_pool(pool)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path).with_init(init_connection);
        let pool = Pool::builder().max_size(4).build(manager)?;
        Self::from_pool(pool)
    }

    fn from_pool(pool: Pool<SqliteConnectionManager>) -> Result<Self> {
        let mut conn = pool.get()?;
        let migrations = Migrations::from_directory(&MIGRATIONS_DIR)?;
        migrations.to_latest(&mut conn)?;
        drop(conn);
        Ok(Self {
            pool,
            hub: ChangeHub::new(),
        })
    }

    fn write<F, R>(&self, f: F) -> Result<R, BackendError>
    where
        F: FnOnce(&Transaction) -> Result<R, BackendError>,
    {
        let mut conn = self.pool.get()?;
        let txn = conn.transaction()?;
        let result = f(&txn)?;
        txn.commit()?;
        Ok(result)
    }
}

fn init_connection(conn: &mut Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(())
}

impl Backend for SqliteBackend {
    fn select(&self, query: &Select) -> Result<Vec<Row>, BackendError> {
        let conn = self.pool.get()?;
        let mut params = Vec::new();
        let mut sql = format!("SELECT * FROM {}", ident(&query.table)?);
        sql.push_str(&where_clause(&query.filters, &mut params)?);
        if !query.order.is_empty() {
            let order = query
                .order
                .iter()
                .map(|o| match o {
                    Order::Asc(col) => ident(col).map(|c| format!("{} ASC", c)),
                    Order::Desc(col) => ident(col).map(|c| format!("{} DESC", c)),
                })
                .collect::<Result<Vec<_>, _>>()?;
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        let rows = query_rows(&conn, &sql, &params)?;
        log::debug!("SQL QUERY RESULT: {} rows", rows.len());
        Ok(rows)
    }

    fn insert(&self, table: &str, mut row: Row) -> Result<Row, BackendError> {
        let table = ident(table)?;
        let needs_key = match row.get(PRIMARY_KEY) {
            Some(Value::String(uid)) => uid.is_empty(),
            Some(Value::Null) | None => true,
            Some(_) => false,
        };
        if needs_key {
            row.insert(PRIMARY_KEY.to_string(), Value::String(Uuid::now_v7().to_string()));
        }
        let uid = row.get(PRIMARY_KEY).cloned().unwrap_or(Value::Null);

        let inserted = self.write(|txn| {
            let columns = table_column_names(txn, table)?;
            if columns.iter().any(|c| c == CREATED_AT) && !row.contains_key(CREATED_AT) {
                row.insert(CREATED_AT.to_string(), Value::from(now_millis()));
            }
            let fields: Vec<&str> = columns
                .iter()
                .map(String::as_str)
                .filter(|c| row.contains_key(*c))
                .collect();
            let placeholders = fields.iter().map(|c| format!(":{}", c)).collect::<Vec<_>>();
            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table,
                fields.join(", "),
                placeholders.join(", ")
            );
            execute_with_named_params(txn, &sql, &row, &fields)?;
            fetch_by_key(txn, table, &uid)?
                .ok_or_else(|| BackendError::rejected("XX000", "inserted row vanished"))
        })?;

        self.hub
            .publish(table, ChangeKind::Insert, Some(inserted.clone()), None);
        Ok(inserted)
    }

    fn update(&self, table: &str, filters: &[Filter], mut patch: Row) -> Result<Vec<Row>, BackendError> {
        let table = ident(table)?;
        require_filters(filters, "UPDATE")?;
        patch.remove(PRIMARY_KEY);

        let changes = self.write(|txn| {
            let mut params = Vec::new();
            let filter_sql = where_clause(filters, &mut params)?;
            let old_rows = query_rows(txn, &format!("SELECT * FROM {}{}", table, filter_sql), &params)?;

            let columns = table_column_names(txn, table)?;
            let fields: Vec<&str> = columns
                .iter()
                .map(String::as_str)
                .filter(|c| *c != PRIMARY_KEY && patch.contains_key(*c))
                .collect();
            if fields.is_empty() || old_rows.is_empty() {
                return Ok(Vec::new());
            }

            let set_clause = fields
                .iter()
                .map(|c| format!("{} = :{}", c, c))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!("UPDATE {} SET {} WHERE {} = :{}", table, set_clause, PRIMARY_KEY, PRIMARY_KEY);

            let mut changes = Vec::with_capacity(old_rows.len());
            for old in old_rows {
                let key = old.get(PRIMARY_KEY).cloned().unwrap_or(Value::Null);
                let mut bound = patch.clone();
                bound.insert(PRIMARY_KEY.to_string(), key.clone());
                let mut bound_fields = fields.clone();
                bound_fields.push(PRIMARY_KEY);
                execute_with_named_params(txn, &sql, &bound, &bound_fields)?;
                if let Some(new) = fetch_by_key(txn, table, &key)? {
                    changes.push((old, new));
                }
            }
            Ok(changes)
        })?;

        let mut updated = Vec::with_capacity(changes.len());
        for (old, new) in changes {
            self.hub
                .publish(table, ChangeKind::Update, Some(new.clone()), Some(old));
            updated.push(new);
        }
        Ok(updated)
    }

    fn delete(&self, table: &str, filters: &[Filter]) -> Result<Vec<Row>, BackendError> {
        let table = ident(table)?;
        require_filters(filters, "DELETE")?;

        let deleted = self.write(|txn| {
            let mut params = Vec::new();
            let filter_sql = where_clause(filters, &mut params)?;
            let old_rows = query_rows(txn, &format!("SELECT * FROM {}{}", table, filter_sql), &params)?;
            let sql = format!("DELETE FROM {}{}", table, filter_sql);
            log::debug!("SQL EXECUTE: {}", sql);
            let affected = txn.execute(&sql, params_from_iter(params.iter()))?;
            log::debug!("SQL EXECUTE RESULT: {} rows affected", affected);
            Ok(old_rows)
        })?;

        for old in &deleted {
            self.hub.publish(table, ChangeKind::Delete, None, Some(old.clone()));
        }
        Ok(deleted)
    }

    fn channel(&self, spec: ChannelSpec) -> Result<Channel, BackendError> {
        ident(&spec.table)?;
        Ok(self.hub.open(spec))
    }

    fn open_channel_count(&self) -> usize {
        self.hub.open_count()
    }

    fn last_seq(&self) -> u64 {
        self.hub.last_seq()
    }
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Table and column names are interpolated into SQL, so only plain
/// identifiers are accepted.
fn ident(name: &str) -> Result<&str, BackendError> {
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(name)
    } else {
        Err(BackendError::rejected("42602", format!("invalid identifier '{}'", name)))
    }
}

fn require_filters(filters: &[Filter], statement: &str) -> Result<(), BackendError> {
    if filters.is_empty() {
        return Err(BackendError::rejected(
            "21000",
            format!("{} requires a WHERE clause", statement),
        ));
    }
    Ok(())
}

fn where_clause(filters: &[Filter], params: &mut Vec<rusqlite::types::Value>) -> Result<String, BackendError> {
    if filters.is_empty() {
        return Ok(String::new());
    }
    let clauses = filters
        .iter()
        .map(|f| filter_sql(f, params))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(format!(" WHERE {}", clauses.join(" AND ")))
}

fn filter_sql(filter: &Filter, params: &mut Vec<rusqlite::types::Value>) -> Result<String, BackendError> {
    match filter {
        Filter::Eq(col, Value::Null) => Ok(format!("{} IS NULL", ident(col)?)),
        Filter::Eq(col, value) => {
            params.push(to_sql_value(value));
            Ok(format!("{} = ?", ident(col)?))
        }
        Filter::Neq(col, Value::Null) => Ok(format!("{} IS NOT NULL", ident(col)?)),
        Filter::Neq(col, value) => {
            params.push(to_sql_value(value));
            Ok(format!("{} <> ?", ident(col)?))
        }
        Filter::ILike(col, pattern) => {
            params.push(rusqlite::types::Value::Text(pattern.clone()));
            Ok(format!("{} LIKE ? ESCAPE '{}'", ident(col)?, LIKE_ESCAPE))
        }
        Filter::Or(inner) if inner.is_empty() => Ok("0".to_string()),
        Filter::Or(inner) => {
            let parts = inner
                .iter()
                .map(|f| filter_sql(f, params))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(format!("({})", parts.join(" OR ")))
        }
    }
}

fn to_sql_value(value: &Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;
    match value {
        Value::Null => Sql::Null,
        Value::Bool(b) => Sql::Integer(*b as i64),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Sql::Integer(i),
            None => Sql::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => Sql::Text(s.clone()),
        other => Sql::Text(other.to_string()),
    }
}

fn from_sql_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::from(bytes.to_vec()),
    }
}

fn query_rows(conn: &Connection, sql: &str, params: &[rusqlite::types::Value]) -> Result<Vec<Row>, BackendError> {
    log::debug!("SQL QUERY: {}", sql);
    let mut stmt = conn.prepare(sql)?;
    let names: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    let mut results = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Row::new();
        for (i, name) in names.iter().enumerate() {
            record.insert(name.clone(), from_sql_value(row.get_ref(i)?));
        }
        results.push(record);
    }
    Ok(results)
}

fn fetch_by_key(conn: &Connection, table: &str, key: &Value) -> Result<Option<Row>, BackendError> {
    let sql = format!("SELECT * FROM {} WHERE {} = ? LIMIT 1", table, PRIMARY_KEY);
    Ok(query_rows(conn, &sql, &[to_sql_value(key)])?.into_iter().next())
}

fn table_column_names(conn: &Connection, table: &str) -> Result<Vec<String>, BackendError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    if columns.is_empty() {
        return Err(BackendError::rejected(
            "42P01",
            format!("relation \"{}\" does not exist", table),
        ));
    }
    Ok(columns)
}

fn execute_with_named_params(txn: &Transaction, sql: &str, row: &Row, fields: &[&str]) -> Result<(), BackendError> {
    log::debug!("SQL EXECUTE: {}", sql);
    let mut stmt = txn.prepare(sql)?;
    let params = serde_rusqlite::to_params_named_with_fields(row, fields)?;
    let affected = stmt.execute(params.to_slice().as_slice())?;
    log::debug!("SQL EXECUTE RESULT: {} rows affected", affected);
    Ok(())
}

impl From<rusqlite::Error> for BackendError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, message) => {
                let message = message.clone().unwrap_or_else(|| err.to_string());
                match failure.code {
                    ErrorCode::ConstraintViolation => match failure.extended_code {
                        ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                            // "UNIQUE constraint failed: gbp_eleitores.empresa_uid, gbp_eleitores.cpf"
                            let column = message
                                .rsplit(['.', ' '])
                                .next()
                                .unwrap_or_default()
                                .to_string();
                            BackendError::Conflict {
                                constraint: message,
                                column,
                            }
                        }
                        ffi::SQLITE_CONSTRAINT_NOTNULL => BackendError::rejected("23502", message),
                        ffi::SQLITE_CONSTRAINT_FOREIGNKEY => BackendError::rejected("23503", message),
                        ffi::SQLITE_CONSTRAINT_CHECK => BackendError::rejected("23514", message),
                        _ => BackendError::rejected("23000", message),
                    },
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::CannotOpen => {
                        BackendError::Unavailable(message)
                    }
                    _ if message.contains("no such table") => BackendError::rejected("42P01", message),
                    _ if message.contains("no such column") => BackendError::rejected("42703", message),
                    _ => BackendError::rejected("XX000", message),
                }
            }
            _ => BackendError::rejected("XX000", err.to_string()),
        }
    }
}

impl From<r2d2::Error> for BackendError {
    fn from(err: r2d2::Error) -> Self {
        BackendError::Unavailable(err.to_string())
    }
}

impl From<serde_rusqlite::Error> for BackendError {
    fn from(err: serde_rusqlite::Error) -> Self {
        BackendError::rejected("22023", err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn voter(tenant: &str, nome: &str, cpf: Option<&str>) -> Row {
        row(json!({
            "empresa_uid": tenant,
            "nome": nome,
            "cpf": cpf,
            "usuario_uid": "u1",
        }))
    }

    #[test]
    fn open_memory_applies_migrations() -> Result<()> {
        let backend = SqliteBackend::open_memory()?;
        let rows = backend.select(&Select::from("gbp_eleitores"))?;
        assert!(rows.is_empty());
        Ok(())
    }

    #[test]
    fn insert_generates_uid_and_created_at() -> Result<()> {
        let backend = SqliteBackend::open_memory()?;
        let inserted = backend.insert("gbp_eleitores", voter("t1", "ANA", Some("12345678901")))?;

        let uid = inserted["uid"].as_str().unwrap();
        assert!(Uuid::parse_str(uid).is_ok());
        assert!(inserted["created_at"].as_i64().unwrap() > 0);
        assert_eq!(inserted["nome"], json!("ANA"));
        Ok(())
    }

    #[test]
    fn unknown_fields_are_ignored() -> Result<()> {
        let backend = SqliteBackend::open_memory()?;
        let mut draft = voter("t1", "ANA", None);
        draft.insert("latitude".to_string(), json!("-23.5"));
        let inserted = backend.insert("gbp_eleitores", draft)?;
        assert!(inserted.get("latitude").is_none());
        Ok(())
    }

    #[test]
    fn select_filters_and_orders() -> Result<()> {
        let backend = SqliteBackend::open_memory()?;
        backend.insert("gbp_indicado", row(json!({"empresa_uid": "t1", "nome": "CARLOS"})))?;
        backend.insert("gbp_indicado", row(json!({"empresa_uid": "t1", "nome": "ANA", "cidade": "SANTOS"})))?;
        backend.insert("gbp_indicado", row(json!({"empresa_uid": "t2", "nome": "BRUNO"})))?;

        let names = |rows: Vec<Row>| rows.iter().map(|r| r["nome"].as_str().unwrap().to_string()).collect::<Vec<_>>();

        let t1 = backend.select(&Select::from("gbp_indicado").eq("empresa_uid", "t1").order_asc("nome"))?;
        assert_eq!(names(t1), vec!["ANA", "CARLOS"]);

        let like = backend.select(&Select::from("gbp_indicado").ilike("nome", "%an%"))?;
        assert_eq!(names(like), vec!["ANA"]);

        let either = backend.select(
            &Select::from("gbp_indicado")
                .or(vec![Filter::contains("nome", "bru"), Filter::contains("cidade", "santos")])
                .order_asc("nome"),
        )?;
        assert_eq!(names(either), vec!["ANA", "BRUNO"]);

        let no_city = backend.select(&Select::from("gbp_indicado").eq("cidade", Value::Null).order_asc("nome"))?;
        assert_eq!(names(no_city), vec!["BRUNO", "CARLOS"]);

        let limited = backend.select(&Select::from("gbp_indicado").order_asc("nome").limit(1))?;
        assert_eq!(names(limited), vec!["ANA"]);
        Ok(())
    }

    #[test]
    fn contains_treats_wildcards_literally() -> Result<()> {
        let backend = SqliteBackend::open_memory()?;
        backend.insert("gbp_indicado", row(json!({"empresa_uid": "t1", "nome": "ANA"})))?;
        backend.insert("gbp_indicado", row(json!({"empresa_uid": "t1", "nome": "LOJA 100%"})))?;
        backend.insert("gbp_indicado", row(json!({"empresa_uid": "t1", "nome": "JOSE_MARIA"})))?;
        assert_eq!(backend.last_seq(), 3);

        let names = |rows: Vec<Row>| rows.iter().map(|r| r["nome"].as_str().unwrap().to_string()).collect::<Vec<_>>();
        let percent = backend.select(&Select::from("gbp_indicado").filter(Filter::contains("nome", "%")))?;
        assert_eq!(names(percent), vec!["LOJA 100%"]);
        let underscore = backend.select(&Select::from("gbp_indicado").filter(Filter::contains("nome", "_")))?;
        assert_eq!(names(underscore), vec!["JOSE_MARIA"]);
        let plain = backend.select(&Select::from("gbp_indicado").filter(Filter::contains("nome", "ana")))?;
        assert_eq!(names(plain), vec!["ANA"]);
        Ok(())
    }

    #[test]
    fn duplicate_cpf_in_tenant_is_a_conflict() -> Result<()> {
        let backend = SqliteBackend::open_memory()?;
        backend.insert("gbp_eleitores", voter("t1", "ANA", Some("12345678901")))?;

        let err = backend
            .insert("gbp_eleitores", voter("t1", "ANA B", Some("12345678901")))
            .unwrap_err();
        assert!(matches!(&err, BackendError::Conflict { column, .. } if column == "cpf"));
        assert_eq!(err.code(), UNIQUE_VIOLATION);

        // same CPF under another tenant and missing CPFs are fine
        backend.insert("gbp_eleitores", voter("t2", "ANA", Some("12345678901")))?;
        backend.insert("gbp_eleitores", voter("t1", "SEM CPF", None))?;
        backend.insert("gbp_eleitores", voter("t1", "SEM CPF 2", None))?;
        Ok(())
    }

    #[test]
    fn not_null_violation_is_rejected() -> Result<()> {
        let backend = SqliteBackend::open_memory()?;
        let err = backend
            .insert("gbp_eleitores", row(json!({"empresa_uid": "t1", "usuario_uid": "u1"})))
            .unwrap_err();
        assert_eq!(err.code(), "23502");
        Ok(())
    }

    #[test]
    fn unknown_table_and_bad_identifiers_are_rejected() -> Result<()> {
        let backend = SqliteBackend::open_memory()?;
        assert_eq!(backend.select(&Select::from("gbp_nada")).unwrap_err().code(), "42P01");
        assert_eq!(
            backend.select(&Select::from("gbp_eleitores; DROP TABLE x")).unwrap_err().code(),
            "42602"
        );
        assert_eq!(
            backend.select(&Select::from("gbp_eleitores").eq("sem_coluna", 1)).unwrap_err().code(),
            "42703"
        );
        Ok(())
    }

    #[test]
    fn update_patches_only_given_columns() -> Result<()> {
        let backend = SqliteBackend::open_memory()?;
        let inserted = backend.insert(
            "gbp_indicado",
            row(json!({"empresa_uid": "t1", "nome": "ANA", "cidade": "SANTOS"})),
        )?;
        let uid = inserted["uid"].clone();

        let updated = backend.update(
            "gbp_indicado",
            &[Filter::Eq("uid".to_string(), uid.clone()), Filter::eq("empresa_uid", "t1")],
            row(json!({"bairro": "CENTRO", "uid": "ignored"})),
        )?;
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0]["uid"], uid);
        assert_eq!(updated[0]["cidade"], json!("SANTOS"));
        assert_eq!(updated[0]["bairro"], json!("CENTRO"));

        let wrong_tenant = backend.update(
            "gbp_indicado",
            &[Filter::Eq("uid".to_string(), uid), Filter::eq("empresa_uid", "t2")],
            row(json!({"bairro": "X"})),
        )?;
        assert!(wrong_tenant.is_empty());
        Ok(())
    }

    #[test]
    fn update_and_delete_require_filters() -> Result<()> {
        let backend = SqliteBackend::open_memory()?;
        assert_eq!(backend.update("gbp_indicado", &[], Row::new()).unwrap_err().code(), "21000");
        assert_eq!(backend.delete("gbp_indicado", &[]).unwrap_err().code(), "21000");
        Ok(())
    }

    #[test]
    fn writes_publish_change_events() -> Result<()> {
        let backend = SqliteBackend::open_memory()?;
        let channel = backend.channel(ChannelSpec::parse("gbp_indicado", "empresa_uid=eq.t1")?)?;
        assert_eq!(backend.open_channel_count(), 1);

        let inserted = backend.insert("gbp_indicado", row(json!({"empresa_uid": "t1", "nome": "ANA"})))?;
        backend.insert("gbp_indicado", row(json!({"empresa_uid": "t2", "nome": "OUTRA"})))?;
        let key = [Filter::Eq("uid".to_string(), inserted["uid"].clone())];
        backend.update("gbp_indicado", &key, row(json!({"nome": "ANA MARIA"})))?;
        let deleted = backend.delete("gbp_indicado", &key)?;
        assert_eq!(deleted.len(), 1);

        let kinds: Vec<ChangeKind> = std::iter::from_fn(|| channel.try_recv().ok()).map(|e| e.kind).collect();
        assert_eq!(kinds, vec![ChangeKind::Insert, ChangeKind::Update, ChangeKind::Delete]);

        drop(channel);
        assert_eq!(backend.open_channel_count(), 0);
        Ok(())
    }

    #[test]
    fn file_database_survives_reopen() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("gbp.db");
        {
            let backend = SqliteBackend::open(&path)?;
            backend.insert("gbp_categorias", row(json!({"empresa_uid": "t1", "nome": "SAÚDE", "tipo_uid": "k1"})))?;
        }
        let backend = SqliteBackend::open(&path)?;
        assert_eq!(backend.select(&Select::from("gbp_categorias"))?.len(), 1);
        Ok(())
    }
}
