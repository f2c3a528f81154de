use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::date_util::to_sql_ts;
use crate::gateway::{EntityType, Record};

// ── Users ──────────────────────────────────────────────────────────

pub fn upsert_user(
    conn: &Connection,
    user_id: &str,
    name: &str,
    email: Option<&str>,
    created_at: &DateTime<Utc>,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO users (id, name, email, created_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           email = COALESCE(excluded.email, users.email)",
        params![user_id, name, email, to_sql_ts(created_at)],
    )?;
    Ok(())
}

// ── Records ────────────────────────────────────────────────────────

/// Insert or replace a record in the table for its entity type.
pub fn upsert_record(conn: &Connection, record: &Record) -> Result<(), rusqlite::Error> {
    let created_at = to_sql_ts(&record.created_at);
    let completed_at = record.completed_at.as_ref().map(to_sql_ts);
    let target_at = record.target_at.as_ref().map(to_sql_ts);

    match record.entity {
        EntityType::Lead => conn.execute(
            "INSERT OR REPLACE INTO leads (
                id, name, status, source, assignee_id, estimated_value, created_at, converted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.id,
                record.name,
                record.status,
                record.source,
                record.assignee_id,
                record.value,
                created_at,
                completed_at,
            ],
        ),
        EntityType::Deal => conn.execute(
            "INSERT OR REPLACE INTO deals (
                id, title, status, assignee_id, value, created_at,
                actual_close_date, expected_close_date
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.id,
                record.name,
                record.status,
                record.assignee_id,
                record.value,
                created_at,
                completed_at,
                target_at,
            ],
        ),
        EntityType::Task => conn.execute(
            "INSERT OR REPLACE INTO tasks (
                id, title, status, priority, assignee_id, created_at, completed_at, due_date
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.id,
                record.name,
                record.status,
                record.priority,
                record.assignee_id,
                created_at,
                completed_at,
                target_at,
            ],
        ),
        EntityType::Contact | EntityType::Company | EntityType::User => {
            let sql = format!(
                "INSERT INTO {} (id, name, created_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name",
                record.entity.table()
            );
            conn.execute(&sql, params![record.id, record.name, created_at])
        }
    }
    .map(|_| ())
}

/// Insert many records inside a single transaction.
pub fn upsert_records(conn: &mut Connection, records: &[Record]) -> Result<usize, rusqlite::Error> {
    let tx = conn.transaction()?;
    for record in records {
        upsert_record(&tx, record)?;
    }
    tx.commit()?;
    Ok(records.len())
}

// ── Config ─────────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))",
        params![key, value],
    )?;
    Ok(())
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

// ── Status ─────────────────────────────────────────────────────────

/// Row counts per entity table, in a fixed display order.
pub fn table_counts(conn: &Connection) -> Result<Vec<(EntityType, i64)>, rusqlite::Error> {
    let mut counts = Vec::new();
    for entity in [
        EntityType::Lead,
        EntityType::Deal,
        EntityType::Task,
        EntityType::Contact,
        EntityType::Company,
        EntityType::User,
    ] {
        let sql = format!("SELECT COUNT(*) FROM {}", entity.table());
        let n: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        counts.push((entity, n));
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_config_round_trip() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                set_config(conn, "top_n", "5")?;
                set_config(conn, "trend_months", "12")?;
                set_config(conn, "top_n", "7")?;
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();

        let (top_n, all) = db
            .reader()
            .call(|conn| {
                Ok::<_, rusqlite::Error>((get_config(conn, "top_n")?, list_config(conn)?))
            })
            .await
            .unwrap();

        assert_eq!(top_n.as_deref(), Some("7"));
        assert_eq!(
            all,
            vec![
                ("top_n".to_string(), "7".to_string()),
                ("trend_months".to_string(), "12".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_upsert_records_and_counts() {
        let db = Database::open_memory().await.unwrap();
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();

        let records = vec![
            Record::new(EntityType::Lead, "l1", ts).status("NEW").source("WEBSITE"),
            Record::new(EntityType::Deal, "d1", ts).status("OPEN").value(500.0),
            Record::new(EntityType::Task, "t1", ts).status("PENDING").priority("HIGH"),
            Record::new(EntityType::Contact, "c1", ts).name("Ada"),
            Record::new(EntityType::Company, "co1", ts).name("Acme"),
        ];

        let counts = db
            .writer()
            .call(move |conn| {
                upsert_user(conn, "u1", "Alice", Some("alice@example.com"), &ts)?;
                upsert_records(conn, &records)?;
                // Replacing keeps one row per id
                upsert_record(conn, &Record::new(EntityType::Deal, "d1", ts).status("WON"))?;
                table_counts(conn)
            })
            .await
            .unwrap();

        assert_eq!(
            counts,
            vec![
                (EntityType::Lead, 1),
                (EntityType::Deal, 1),
                (EntityType::Task, 1),
                (EntityType::Contact, 1),
                (EntityType::Company, 1),
                (EntityType::User, 1),
            ]
        );
    }

    #[tokio::test]
    async fn test_assignee_need_not_be_registered() {
        let db = Database::open_memory().await.unwrap();
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();

        let (email, deals) = db
            .writer()
            .call(move |conn| {
                upsert_user(conn, "u1", "Alice", Some("alice@example.com"), &ts)?;
                let deals = vec![
                    Record::new(EntityType::Deal, "d1", ts).status("WON").assignee("u1"),
                    Record::new(EntityType::Deal, "d2", ts).status("WON").assignee("ghost"),
                ];
                upsert_records(conn, &deals)?;
                // Renaming a referenced user keeps the row and its email
                upsert_record(conn, &Record::new(EntityType::User, "u1", ts).name("Alicia"))?;
                let email: Option<String> =
                    conn.query_row("SELECT email FROM users WHERE id = 'u1'", [], |row| row.get(0))?;
                let deals: i64 = conn.query_row("SELECT COUNT(*) FROM deals", [], |row| row.get(0))?;
                Ok::<_, rusqlite::Error>((email, deals))
            })
            .await
            .unwrap();

        assert_eq!(email.as_deref(), Some("alice@example.com"));
        assert_eq!(deals, 2);
    }
}
