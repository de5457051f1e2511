//! SQLite property store.
//!
//! Reads the `current_imoveis` table: one row per `(uf, numero_imovel)`
//! with the record's attributes as a JSON document in `payload_json`, and
//! the `changes` table holding the daily ENTER/EXIT/UPDATE log.
//!
//! Predicate sets are rendered to SQL with `?N` placeholders; clause values
//! are always bound, never spliced into the statement. Payload keys are
//! compile-time constants and are the only text embedded in paths.
//!
//! Two custom scalars keep both backends in agreement:
//! `leiloes_field(text)` trims a payload value and maps blanks to NULL, and
//! `leiloes_currency(text)` applies the pt-BR amount parser.
//!
//! ## Threading
//!
//! rusqlite is synchronous. Every trait method moves its statement onto the
//! blocking pool with `spawn_blocking`; the single connection is guarded by
//! a mutex, so queries from one store still run one at a time.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, ToSql};

use crate::model::{fields, parse_currency, ChangeEvent, ChangeKind, Payload, Property};
use crate::planner::{Clause, Field, Param, PredicateSet, RowQuery, SortKey};
use crate::{Error, Result};
use super::{parse_payload_column, select_changes, PropertyStore, StoreRow};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS current_imoveis (
    uf            TEXT NOT NULL,
    numero_imovel TEXT NOT NULL,
    payload_json  TEXT,
    PRIMARY KEY (uf, numero_imovel)
);
CREATE TABLE IF NOT EXISTS changes (
    dt             TEXT NOT NULL,
    uf             TEXT NOT NULL,
    tipo_evento    TEXT NOT NULL,
    numero_imovel  TEXT NOT NULL,
    changed_fields TEXT,
    before_json    TEXT,
    after_json     TEXT
);
CREATE INDEX IF NOT EXISTS changes_dt ON changes (dt);
";

const CURRENCY_FN: &str = "leiloes_currency";
const FIELD_FN: &str = "leiloes_field";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// `payload_json` when it holds a JSON object, otherwise NULL.
const DOCUMENT: &str = "CASE WHEN json_valid(payload_json) \
     THEN CASE json_type(payload_json) WHEN 'object' THEN payload_json END END";

impl ToSql for Param {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Param::Text(s) => ToSqlOutput::from(s.as_str()),
            Param::Number(n) => ToSqlOutput::from(*n),
        })
    }
}

fn text_arg(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Text(bytes) => std::str::from_utf8(bytes).ok().map(str::to_string),
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Null | ValueRef::Blob(_) => None,
    }
}

// ============================================================================
// SqliteStore
// ============================================================================

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "opening sqlite property store");
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    /// Wrap an existing connection: registers the custom scalars and
    /// creates the tables if missing.
    pub fn with_connection(conn: Connection) -> Result<Self> {
        let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;
        conn.create_scalar_function(CURRENCY_FN, 1, flags, |ctx| {
            Ok(text_arg(ctx.get_raw(0)).as_deref().and_then(parse_currency))
        })?;
        conn.create_scalar_function(FIELD_FN, 1, flags, |ctx| {
            Ok(text_arg(ctx.get_raw(0))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()))
        })?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// Insert or replace a record.
    pub fn insert(&self, prop: &Property) -> Result<()> {
        let payload = serde_json::to_string(&prop.payload).map_err(|e| Error::StorageError(e.to_string()))?;
        self.insert_raw(&prop.uf, &prop.numero_imovel, Some(&payload))
    }

    /// Insert or replace a row with a raw `payload_json` column.
    pub fn insert_raw(&self, uf: &str, numero_imovel: &str, payload_json: Option<&str>) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO current_imoveis (uf, numero_imovel, payload_json) VALUES (?1, ?2, ?3)
             ON CONFLICT (uf, numero_imovel) DO UPDATE SET payload_json = excluded.payload_json",
            params![uf, numero_imovel, payload_json],
        )?;
        Ok(())
    }

    /// Append an event to the `changes` table.
    pub fn record_change(&self, event: &ChangeEvent) -> Result<()> {
        let encode = |payload: Option<&Payload>| {
            payload
                .map(serde_json::to_string)
                .transpose()
                .map_err(|e| Error::StorageError(e.to_string()))
        };
        let before = encode(event.before.as_ref())?;
        let after = encode(event.after.as_ref())?;
        let changed = (!event.changed_fields.is_empty()).then(|| event.changed_fields.join(","));
        self.record_change_raw(
            &event.dt.format(DATE_FORMAT).to_string(),
            &event.uf,
            event.kind.as_str(),
            &event.numero_imovel,
            changed.as_deref(),
            before.as_deref(),
            after.as_deref(),
        )
    }

    /// Append a `changes` row with raw columns, as the ingestion job writes them.
    #[allow(clippy::too_many_arguments)]
    pub fn record_change_raw(
        &self,
        dt: &str,
        uf: &str,
        tipo_evento: &str,
        numero_imovel: &str,
        changed_fields: Option<&str>,
        before_json: Option<&str>,
        after_json: Option<&str>,
    ) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO changes (dt, uf, tipo_evento, numero_imovel, changed_fields, before_json, after_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![dt, uf, tipo_evento, numero_imovel, changed_fields, before_json, after_json],
        )?;
        Ok(())
    }

    pub fn len(&self) -> Result<u64> {
        let n: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM current_imoveis", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Run `op` against the connection on the blocking pool.
    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || op(&*conn.lock()))
            .await
            .map_err(|e| Error::StorageError(format!("sqlite task failed: {e}")))?
    }
}

// ============================================================================
// SQL rendering
// ============================================================================

fn field_sql(field: Field) -> String {
    match field {
        Field::Uf => "uf".to_string(),
        Field::Payload(key) => payload_sql(key),
    }
}

/// Trimmed payload value, NULL when missing or blank.
fn payload_sql(key: &str) -> String {
    format!("{FIELD_FN}(CAST(json_extract({DOCUMENT}, '$.\"{key}\"') AS TEXT))")
}

/// `WHERE` body for a predicate set; `?N` is 1-based over `params()`.
fn where_sql(predicates: &PredicateSet) -> String {
    if predicates.is_empty() {
        return "1=1".to_string();
    }
    predicates
        .clauses()
        .iter()
        .map(|clause| match clause {
            Clause::Eq { field, param } => format!("{} = ?{}", field_sql(*field), param + 1),
            Clause::In { field, params } => {
                let slots: Vec<String> = params.clone().map(|p| format!("?{}", p + 1)).collect();
                format!("{} IN ({})", field_sql(*field), slots.join(", "))
            }
            Clause::CurrencyAtLeast { key, param } => {
                format!("{CURRENCY_FN}({}) >= ?{}", payload_sql(key), param + 1)
            }
            Clause::CurrencyAtMost { key, param } => {
                format!("{CURRENCY_FN}({}) <= ?{}", payload_sql(key), param + 1)
            }
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn order_sql(sort: SortKey) -> String {
    let price = format!("{CURRENCY_FN}({})", payload_sql(fields::PRECO));
    let dir = match sort {
        SortKey::PriceAsc => "ASC",
        SortKey::PriceDesc => "DESC",
    };
    format!("{price} IS NULL {dir}, {price} {dir}, uf {dir}, numero_imovel {dir}")
}

fn binds(params: &[Param]) -> Vec<&dyn ToSql> {
    params.iter().map(|p| p as &dyn ToSql).collect()
}

fn read_rows(conn: &Connection, sql: &str, bound: &[&dyn ToSql]) -> Result<Vec<StoreRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(bound, |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
        ))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (uf, numero_imovel, raw) = row?;
        let payload = parse_payload_column(&uf, &numero_imovel, raw.as_deref());
        out.push(StoreRow { uf, numero_imovel, payload });
    }
    Ok(out)
}

// ============================================================================
// PropertyStore impl
// ============================================================================

#[async_trait]
impl PropertyStore for SqliteStore {
    async fn scan(&self, predicates: &PredicateSet) -> Result<Vec<StoreRow>> {
        let sql = format!(
            "SELECT uf, numero_imovel, payload_json FROM current_imoveis WHERE {}",
            where_sql(predicates)
        );
        let params = predicates.params().to_vec();
        self.blocking(move |conn| read_rows(conn, &sql, &binds(&params))).await
    }

    async fn count(&self, predicates: &PredicateSet) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM current_imoveis WHERE {}", where_sql(predicates));
        let params = predicates.params().to_vec();
        self.blocking(move |conn| {
            let n: i64 = conn.query_row(&sql, binds(&params).as_slice(), |row| row.get(0))?;
            Ok(n as u64)
        })
        .await
    }

    async fn group_count(&self, predicates: &PredicateSet, field: Field) -> Result<Vec<(String, u64)>> {
        let sql = format!(
            "SELECT v, COUNT(*) FROM (SELECT {} AS v FROM current_imoveis WHERE {}) \
             WHERE v IS NOT NULL GROUP BY v",
            field_sql(field),
            where_sql(predicates)
        );
        tracing::trace!(%sql, "group count");
        let params = predicates.params().to_vec();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(binds(&params).as_slice(), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;

            let mut out = Vec::new();
            for row in rows {
                let (value, n) = row?;
                out.push((value, n as u64));
            }
            Ok(out)
        })
        .await
    }

    async fn currency_values(&self, predicates: &PredicateSet, key: &'static str) -> Result<Vec<f64>> {
        let sql = format!(
            "SELECT {CURRENCY_FN}({}) FROM current_imoveis WHERE {}",
            payload_sql(key),
            where_sql(predicates)
        );
        let params = predicates.params().to_vec();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(binds(&params).as_slice(), |row| row.get::<_, Option<f64>>(0))?;

            let mut out = Vec::new();
            for value in rows {
                if let Some(v) = value? {
                    out.push(v);
                }
            }
            Ok(out)
        })
        .await
    }

    async fn fetch(&self, query: &RowQuery<'_>) -> Result<Vec<Property>> {
        let mut sql = format!(
            "SELECT uf, numero_imovel, payload_json FROM current_imoveis \
             WHERE ({}) AND ({DOCUMENT}) IS NOT NULL",
            where_sql(query.predicates)
        );
        if let Some(sort) = query.sort {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order_sql(sort));
        }
        sql.push_str(&format!(" LIMIT ?{}", query.predicates.params().len() + 1));

        let params = query.predicates.params().to_vec();
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
        let rows = self
            .blocking(move |conn| {
                let mut bound = binds(&params);
                bound.push(&limit);
                read_rows(conn, &sql, &bound)
            })
            .await?;
        Ok(rows.into_iter().filter_map(StoreRow::into_property).collect())
    }

    async fn changes_for_day(
        &self,
        day: NaiveDate,
        kinds: &[ChangeKind],
        predicates: &PredicateSet,
    ) -> Result<Vec<ChangeEvent>> {
        let dt = day.format(DATE_FORMAT).to_string();
        let events = self
            .blocking(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT uf, tipo_evento, numero_imovel, changed_fields, before_json, after_json
                     FROM changes WHERE dt = ?1 ORDER BY rowid",
                )?;
                let rows = stmt.query_map(params![dt], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                    ))
                })?;

                let mut out = Vec::new();
                for row in rows {
                    let (uf, tipo, numero_imovel, changed, before, after) = row?;
                    let Some(kind) = ChangeKind::parse(&tipo) else {
                        tracing::debug!(%uf, %numero_imovel, tipo_evento = %tipo, "skipping unknown change kind");
                        continue;
                    };
                    let mut event = ChangeEvent::new(day, kind, uf, numero_imovel);
                    if let Some(changed) = changed {
                        event = event.with_changed_fields(&changed);
                    }
                    event.before = parse_payload_column(&event.uf, &event.numero_imovel, before.as_deref());
                    event.after = parse_payload_column(&event.uf, &event.numero_imovel, after.as_deref());
                    out.push(event);
                }
                Ok(out)
            })
            .await?;
        Ok(select_changes(events, kinds, predicates))
    }

    async fn shutdown(&self) -> Result<()> {
        self.blocking(|conn| {
            conn.execute_batch("PRAGMA optimize;")?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FilterSelection;
    use crate::planner::plan;
    use pretty_assertions::assert_eq;

    fn store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        for (uf, n, city, price) in [
            ("SP", "1", "Campinas", "300.000,00"),
            ("SP", "2", "Santos", "100.000,00"),
            ("SP", "3", "Campinas", "sob consulta"),
            ("MG", "4", "Uberaba", "200.000,00"),
        ] {
            store
                .insert(
                    &Property::new(uf, n)
                        .with_field(fields::CIDADE, city)
                        .with_field(fields::PRECO, price),
                )
                .unwrap();
        }
        store
    }

    #[test]
    fn test_where_sql_uses_placeholders() {
        let set = plan(&FilterSelection::new().with_uf("SP").with_cities("Campinas,Santos"));
        let sql = where_sql(&set);
        assert!(sql.starts_with("uf = ?1 AND "));
        assert!(sql.ends_with("IN (?2, ?3)"));
        assert!(!sql.contains("Campinas"));
    }

    #[test]
    fn test_empty_where() {
        assert_eq!(where_sql(&PredicateSet::all()), "1=1");
    }

    #[tokio::test]
    async fn test_group_count_by_city() {
        let store = store();
        let set = plan(&FilterSelection::new().with_uf("SP"));
        let mut counts = store.group_count(&set, Field::Payload(fields::CIDADE)).await.unwrap();
        counts.sort();
        assert_eq!(counts, vec![("Campinas".to_string(), 2), ("Santos".to_string(), 1)]);
    }

    #[tokio::test]
    async fn test_currency_values_skip_unparseable() {
        let store = store();
        let mut values = store.currency_values(&PredicateSet::all(), fields::PRECO).await.unwrap();
        values.sort_by(f64::total_cmp);
        assert_eq!(values, vec![100_000.0, 200_000.0, 300_000.0]);
    }

    #[tokio::test]
    async fn test_fetch_sorted_nulls_last() {
        let store = store();
        let set = PredicateSet::all();
        let rows = store
            .fetch(&RowQuery { predicates: &set, sort: Some(SortKey::PriceAsc), limit: 10 })
            .await
            .unwrap();
        let keys: Vec<String> = rows.iter().map(|p| p.numero_imovel.clone()).collect();
        assert_eq!(keys, vec!["2", "4", "1", "3"]);
    }

    #[tokio::test]
    async fn test_malformed_payload_counts_but_not_listed() {
        let store = store();
        store.insert_raw("RJ", "9", Some("{not json")).unwrap();
        store.insert_raw("RJ", "10", None).unwrap();

        let rj = plan(&FilterSelection::new().with_uf("RJ"));
        assert_eq!(store.count(&rj).await.unwrap(), 2);
        let listed = store
            .fetch(&RowQuery { predicates: &rj, sort: None, limit: 10 })
            .await
            .unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn test_upsert_replaces_payload() {
        let store = store();
        store.insert(&Property::new("SP", "1").with_field(fields::CIDADE, "Sorocaba")).unwrap();
        assert_eq!(store.len().unwrap(), 4);
        let set = plan(&FilterSelection::new().with_cities("Sorocaba"));
        assert_eq!(store.count(&set).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_blank_values_are_missing() {
        let store = store();
        store.insert(&Property::new("SP", "5").with_field(fields::CIDADE, "   ")).unwrap();
        store.insert(&Property::new("SP", "6").with_field(fields::CIDADE, "")).unwrap();
        store.insert(&Property::new("SP", "7").with_field(fields::CIDADE, "\tCampinas ")).unwrap();

        let sp = plan(&FilterSelection::new().with_uf("SP"));
        let mut counts = store.group_count(&sp, Field::Payload(fields::CIDADE)).await.unwrap();
        counts.sort();
        assert_eq!(counts, vec![("Campinas".to_string(), 3), ("Santos".to_string(), 1)]);

        let campinas = plan(&FilterSelection::new().with_cities("Campinas"));
        assert_eq!(store.count(&campinas).await.unwrap(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_queries_run_off_the_runtime() {
        let store = std::sync::Arc::new(store());
        let set = plan(&FilterSelection::new().with_uf("SP"));
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let store = std::sync::Arc::clone(&store);
                let set = set.clone();
                tokio::spawn(async move { store.count(&set).await })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), 3);
        }
    }

    #[tokio::test]
    async fn test_changes_for_day() {
        let store = store();
        store
            .record_change_raw("2025-03-14", "SP", "EXIT", "1", None, Some(r#"{"Cidade": "Campinas"}"#), None)
            .unwrap();
        store
            .record_change_raw(
                "2025-03-14",
                "SP",
                "UPDATE",
                "2",
                Some("Preço"),
                Some(r#"{"Cidade": "Campinas"}"#),
                Some(r#"{"Cidade": "Santos"}"#),
            )
            .unwrap();
        store.record_change_raw("2025-03-14", "SP", "MERGE", "3", None, None, None).unwrap();
        store
            .record_change_raw("2025-03-13", "SP", "ENTER", "4", None, None, Some(r#"{"Cidade": "Campinas"}"#))
            .unwrap();

        let day = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        let campinas = plan(&FilterSelection::new().with_uf("SP").with_cities("Campinas"));
        let events = store.changes_for_day(day, &ChangeKind::ALL, &campinas).await.unwrap();
        let keys: Vec<(&str, ChangeKind)> = events.iter().map(|e| (e.numero_imovel.as_str(), e.kind)).collect();
        assert_eq!(keys, vec![("1", ChangeKind::Exit)]);

        let all = store.changes_for_day(day, &ChangeKind::ALL, &PredicateSet::all()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].changed_fields, vec!["Preço".to_string()]);
    }
}
