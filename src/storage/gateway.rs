use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rusqlite::types::Type;

use crate::date_util::parse_sql_ts;
use crate::error::{Error, Result};
use crate::gateway::{
    status, AggregateOp, DataGateway, Dimension, EntityType, Field, FindQuery, GroupRow, Record,
};
use crate::query::builder::Filter;
use crate::storage::Database;

/// Columns selected by `find_many`, in row order.
const RECORD_FIELDS: [Field; 10] = [
    Field::Id,
    Field::Name,
    Field::Status,
    Field::Source,
    Field::Priority,
    Field::Assignee,
    Field::Value,
    Field::CreatedAt,
    Field::CompletedAt,
    Field::TargetAt,
];

/// SQLite VM instructions between deadline checks.
const PROGRESS_OPS: i32 = 1000;

/// Bound on a whole call, including time spent queued behind other reads on
/// the reader connection, as a multiple of the statement timeout.
const CALL_TIMEOUT_FACTOR: u32 = 4;

/// [`DataGateway`] over the warehouse's reader connection.
///
/// Each statement gets `query_timeout` of execution time, counted from when
/// it starts on the reader thread. A statement past its deadline is
/// interrupted, so reads queued behind it are not starved.
#[derive(Clone)]
pub struct SqliteGateway {
    db: Database,
    query_timeout: Duration,
}

impl SqliteGateway {
    pub fn new(db: Database, query_timeout: Duration) -> Self {
        Self { db, query_timeout }
    }

    async fn read<T, F>(&self, entity: EntityType, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut rusqlite::Connection) -> std::result::Result<T, rusqlite::Error>
            + Send
            + 'static,
    {
        let budget = self.query_timeout;
        let interrupted = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&interrupted);
        let call = self.db.reader().call(move |conn| {
            let deadline = Instant::now() + budget;
            conn.progress_handler(
                PROGRESS_OPS,
                Some(move || {
                    let expired = Instant::now() >= deadline;
                    if expired {
                        flag.store(true, Ordering::Relaxed);
                    }
                    expired
                }),
            );
            let result = f(conn);
            conn.progress_handler(PROGRESS_OPS, None::<fn() -> bool>);
            result
        });

        let timed_out = || Error::Timeout {
            entity: entity.to_string(),
            elapsed: budget,
        };
        match tokio::time::timeout(budget * CALL_TIMEOUT_FACTOR, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) if interrupted.load(Ordering::Relaxed) => {
                log::warn!("Interrupted {entity} query after {budget:?}");
                Err(timed_out())
            }
            Ok(Err(e)) => Err(Error::DataAccess {
                entity: entity.to_string(),
                message: e.to_string(),
            }),
            Err(_) => Err(timed_out()),
        }
    }
}

fn param_refs(
    params: &[Box<dyn rusqlite::types::ToSql + Send>],
) -> Vec<&dyn rusqlite::types::ToSql> {
    params
        .iter()
        .map(|p| p.as_ref() as &dyn rusqlite::types::ToSql)
        .collect()
}

#[async_trait]
impl DataGateway for SqliteGateway {
    async fn count(&self, entity: EntityType, filter: &Filter) -> Result<u64> {
        let filter = filter.clone();
        self.read(entity, move |conn| {
            let (where_clause, params) = filter.build_where(entity, 1);
            let sql = format!("SELECT COUNT(*) FROM {}{where_clause}", entity.table());
            let n: i64 = conn.query_row(&sql, param_refs(&params).as_slice(), |row| row.get(0))?;
            Ok(n as u64)
        })
        .await
    }

    async fn aggregate(
        &self,
        entity: EntityType,
        filter: &Filter,
        op: AggregateOp,
        field: Field,
    ) -> Result<f64> {
        let Some(column) = entity.column(field) else {
            return Ok(0.0);
        };
        let filter = filter.clone();
        self.read(entity, move |conn| {
            let (where_clause, params) = filter.build_where(entity, 1);
            let sql = format!(
                "SELECT COALESCE({}({column}), 0.0) FROM {}{where_clause}",
                op.sql(),
                entity.table()
            );
            conn.query_row(&sql, param_refs(&params).as_slice(), |row| row.get(0))
        })
        .await
    }

    async fn group_by(
        &self,
        entity: EntityType,
        filter: &Filter,
        dimension: Dimension,
    ) -> Result<Vec<GroupRow>> {
        let key_col = entity.column(dimension.field()).unwrap_or("NULL");
        let value_col = entity.column(Field::Value).unwrap_or("0.0");
        let filter = filter.clone();
        self.read(entity, move |conn| {
            let (where_clause, params) = filter.build_where(entity, 1);
            let sql = format!(
                "SELECT COALESCE({key_col}, '{}') AS group_key, COUNT(*), COALESCE(SUM({value_col}), 0.0)
                 FROM {}{where_clause}
                 GROUP BY group_key
                 ORDER BY COUNT(*) DESC, group_key ASC",
                status::UNSPECIFIED,
                entity.table()
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(param_refs(&params).as_slice(), |row| {
                Ok(GroupRow {
                    key: row.get(0)?,
                    count: row.get::<_, i64>(1)? as u64,
                    sum: row.get(2)?,
                })
            })?;
            rows.collect()
        })
        .await
    }

    async fn find_many(&self, entity: EntityType, query: &FindQuery) -> Result<Vec<Record>> {
        let query = query.clone();
        self.read(entity, move |conn| {
            let columns: Vec<&str> = RECORD_FIELDS
                .iter()
                .map(|&f| match entity.column(f) {
                    Some(col) if query.projection.includes(f) => col,
                    _ => "NULL",
                })
                .collect();

            let (where_clause, mut params) = query.filter.build_where(entity, 1);
            let mut sql = format!(
                "SELECT {} FROM {}{where_clause}",
                columns.join(", "),
                entity.table()
            );

            match query.order_by.and_then(|o| entity.column(o.field).map(|c| (c, o.descending))) {
                Some((col, desc)) => {
                    let dir = if desc { "DESC" } else { "ASC" };
                    sql.push_str(&format!(" ORDER BY {col} {dir}, id ASC"));
                }
                None => sql.push_str(" ORDER BY id ASC"),
            }

            if let Some(limit) = query.limit {
                sql.push_str(&format!(" LIMIT ?{}", params.len() + 1));
                params.push(Box::new(limit as i64));
            }

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(param_refs(&params).as_slice(), |row| {
                Ok(Record {
                    id: row.get(0)?,
                    entity,
                    name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    status: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    source: row.get(3)?,
                    priority: row.get(4)?,
                    assignee_id: row.get(5)?,
                    value: row.get(6)?,
                    created_at: ts_column(row, 7)?.ok_or_else(|| {
                        rusqlite::Error::FromSqlConversionFailure(
                            7,
                            Type::Null,
                            Box::new(Error::TimestampParse("created_at is NULL".into())),
                        )
                    })?,
                    completed_at: ts_column(row, 8)?,
                    target_at: ts_column(row, 9)?,
                })
            })?;
            rows.collect()
        })
        .await
    }
}

fn ts_column(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> std::result::Result<Option<chrono::DateTime<chrono::Utc>>, rusqlite::Error> {
    row.get::<_, Option<String>>(idx)?
        .map(|s| parse_sql_ts(&s))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::repository;
    use chrono::{TimeZone, Utc};

    async fn seeded() -> SqliteGateway {
        let db = Database::open_memory().await.unwrap();
        let ts = |d: u32| Utc.with_ymd_and_hms(2025, 3, d, 12, 0, 0).unwrap();
        let records = vec![
            Record::new(EntityType::Deal, "d1", ts(1)).name("Alpha").status("WON").value(1000.0).completed_at(ts(10)),
            Record::new(EntityType::Deal, "d2", ts(2)).name("Beta").status("LOST").value(2000.0),
            Record::new(EntityType::Deal, "d3", ts(3)).name("Gamma").status("OPEN").value(3000.0).target_at(ts(20)),
            Record::new(EntityType::Deal, "d4", ts(4)).name("Delta").status("OPEN").value(4000.0),
            Record::new(EntityType::Lead, "l1", ts(5)).status("NEW"),
            Record::new(EntityType::Lead, "l2", ts(6)).status("NEW").source("REFERRAL"),
        ];
        db.writer()
            .call(move |conn| repository::upsert_records(conn, &records))
            .await
            .unwrap();
        SqliteGateway::new(db, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_count_and_aggregate() {
        let gw = seeded().await;
        assert_eq!(gw.count(EntityType::Deal, &Filter::new()).await.unwrap(), 4);
        assert_eq!(
            gw.count(EntityType::Deal, &Filter::new().status("OPEN")).await.unwrap(),
            2
        );

        let total = gw
            .aggregate(EntityType::Deal, &Filter::new(), AggregateOp::Sum, Field::Value)
            .await
            .unwrap();
        assert_eq!(total, 10000.0);

        let avg = gw
            .aggregate(EntityType::Deal, &Filter::new(), AggregateOp::Avg, Field::Value)
            .await
            .unwrap();
        assert_eq!(avg, 2500.0);

        // Empty match and missing column both yield zero
        let none = gw
            .aggregate(EntityType::Deal, &Filter::new().status("NOPE"), AggregateOp::Sum, Field::Value)
            .await
            .unwrap();
        assert_eq!(none, 0.0);
        let missing = gw
            .aggregate(EntityType::Task, &Filter::new(), AggregateOp::Sum, Field::Value)
            .await
            .unwrap();
        assert_eq!(missing, 0.0);
    }

    #[tokio::test]
    async fn test_group_by() {
        let gw = seeded().await;
        let rows = gw
            .group_by(EntityType::Deal, &Filter::new(), Dimension::Status)
            .await
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].key, "OPEN");
        assert_eq!(rows[0].count, 2);
        assert_eq!(rows[0].sum, 7000.0);

        let sources = gw
            .group_by(EntityType::Lead, &Filter::new(), Dimension::Source)
            .await
            .unwrap();
        let keys: Vec<&str> = sources.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["REFERRAL", status::UNSPECIFIED]);
    }

    #[tokio::test]
    async fn test_find_many_order_limit_projection() {
        let gw = seeded().await;
        let query = FindQuery::new(Filter::new())
            .select(&[Field::Value])
            .order_by_desc(Field::Value)
            .limit(2);
        let deals = gw.find_many(EntityType::Deal, &query).await.unwrap();
        assert_eq!(deals.len(), 2);
        assert_eq!(deals[0].id, "d4");
        assert_eq!(deals[0].value, Some(4000.0));
        // Not projected
        assert_eq!(deals[0].name, "");
        assert_eq!(deals[0].status, "");

        let full = gw
            .find_many(EntityType::Deal, &FindQuery::new(Filter::new().status("WON")))
            .await
            .unwrap();
        assert_eq!(full.len(), 1);
        assert_eq!(full[0].name, "Alpha");
        assert_eq!(
            full[0].completed_at,
            Some(Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn test_slow_statement_is_interrupted_without_starving_others() {
        let gw = seeded().await;
        let gw = SqliteGateway::new(gw.db.clone(), Duration::from_millis(100));

        // Unbounded recursion only ends when the deadline interrupts it.
        let runaway = gw.read(EntityType::Lead, |conn| {
            conn.query_row(
                "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c)
                 SELECT COUNT(*) FROM c",
                [],
                |row| row.get::<_, i64>(0),
            )
        });
        let (deal_filter, lead_filter) = (Filter::new(), Filter::new());
        let (runaway, deals, leads) = tokio::join!(
            runaway,
            gw.count(EntityType::Deal, &deal_filter),
            gw.count(EntityType::Lead, &lead_filter),
        );

        match runaway {
            Err(Error::Timeout { entity, .. }) => assert_eq!(entity, "leads"),
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(deals.unwrap(), 4);
        assert_eq!(leads.unwrap(), 2);

        // The connection is usable again once the handler is cleared.
        assert_eq!(gw.count(EntityType::Deal, &Filter::new()).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_zero_timeout_reports_timeout() {
        let gw = seeded().await;
        let gw = SqliteGateway::new(gw.db.clone(), Duration::ZERO);
        let err = gw.count(EntityType::Deal, &Filter::new()).await.unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        assert!(err.is_data_access());
    }

    #[tokio::test]
    async fn test_null_created_at_is_rejected() {
        let gw = seeded().await;
        gw.db
            .writer()
            .call(|conn| {
                conn.execute_batch(
                    "CREATE TABLE contacts_loose (id TEXT, name TEXT, created_at TEXT);
                     DROP TABLE contacts;
                     ALTER TABLE contacts_loose RENAME TO contacts;
                     INSERT INTO contacts (id, name, created_at) VALUES ('c1', 'Jo', NULL);",
                )
            })
            .await
            .unwrap();
        let err = gw
            .find_many(EntityType::Contact, &FindQuery::new(Filter::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DataAccess { .. }));
    }
}
