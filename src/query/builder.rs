use chrono::{DateTime, Utc};

use crate::date_util::to_sql_ts;
use crate::gateway::{EntityType, Field};

type SqlParams = Vec<Box<dyn rusqlite::types::ToSql + Send>>;

/// Record filter with optional predicates, combined with AND.
///
/// Date bounds named `*_after` / `*_before` are inclusive;
/// [`Filter::target_earlier_than`] is strict.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    ids: Vec<String>,
    status_in: Vec<String>,
    status_not_in: Vec<String>,
    assignee_id: Option<String>,
    has_assignee: Option<bool>,
    has_value: Option<bool>,
    created_after: Option<DateTime<Utc>>,
    created_before: Option<DateTime<Utc>>,
    completed_after: Option<DateTime<Utc>>,
    completed_before: Option<DateTime<Utc>>,
    has_completed: Option<bool>,
    target_after: Option<DateTime<Utc>>,
    target_before: Option<DateTime<Utc>>,
    target_earlier_than: Option<DateTime<Utc>>,
    has_target: Option<bool>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(mut self, ids: &[String]) -> Self {
        self.ids = ids.to_vec();
        self
    }

    pub fn status(self, status: &str) -> Self {
        self.status_in(&[status])
    }

    pub fn status_in(mut self, statuses: &[&str]) -> Self {
        self.status_in = statuses.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn status_not_in(mut self, statuses: &[&str]) -> Self {
        self.status_not_in = statuses.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn assignee(mut self, user_id: &str) -> Self {
        self.assignee_id = Some(user_id.to_string());
        self
    }

    pub fn has_assignee(mut self, val: bool) -> Self {
        self.has_assignee = Some(val);
        self
    }

    pub fn has_value(mut self, val: bool) -> Self {
        self.has_value = Some(val);
        self
    }

    pub fn created_after(mut self, ts: DateTime<Utc>) -> Self {
        self.created_after = Some(ts);
        self
    }

    pub fn created_before(mut self, ts: DateTime<Utc>) -> Self {
        self.created_before = Some(ts);
        self
    }

    pub fn completed_after(mut self, ts: DateTime<Utc>) -> Self {
        self.completed_after = Some(ts);
        self
    }

    pub fn completed_before(mut self, ts: DateTime<Utc>) -> Self {
        self.completed_before = Some(ts);
        self
    }

    pub fn has_completed(mut self, val: bool) -> Self {
        self.has_completed = Some(val);
        self
    }

    pub fn target_after(mut self, ts: DateTime<Utc>) -> Self {
        self.target_after = Some(ts);
        self
    }

    pub fn target_before(mut self, ts: DateTime<Utc>) -> Self {
        self.target_before = Some(ts);
        self
    }

    pub fn target_earlier_than(mut self, ts: DateTime<Utc>) -> Self {
        self.target_earlier_than = Some(ts);
        self
    }

    pub fn has_target(mut self, val: bool) -> Self {
        self.has_target = Some(val);
        self
    }

    /// Render the filter as a SQL `WHERE` clause (empty when no predicate is
    /// set) for `entity`. Placeholders are numbered from `first_idx`.
    ///
    /// A predicate on a field the entity lacks compares against `NULL` and
    /// therefore matches nothing.
    pub(crate) fn build_where(&self, entity: EntityType, first_idx: usize) -> (String, SqlParams) {
        let mut params: SqlParams = Vec::new();
        let mut wheres = Vec::new();
        let mut idx = first_idx;
        let col = |field: Field| entity.column(field).unwrap_or("NULL");

        if !self.ids.is_empty() {
            push_list(&mut wheres, &mut params, &mut idx, col(Field::Id), "IN", &self.ids);
        }
        if !self.status_in.is_empty() {
            push_list(&mut wheres, &mut params, &mut idx, col(Field::Status), "IN", &self.status_in);
        }
        if !self.status_not_in.is_empty() {
            push_list(
                &mut wheres,
                &mut params,
                &mut idx,
                col(Field::Status),
                "NOT IN",
                &self.status_not_in,
            );
        }

        if let Some(ref user_id) = self.assignee_id {
            wheres.push(format!("{} = ?{idx}", col(Field::Assignee)));
            params.push(Box::new(user_id.clone()));
            idx += 1;
        }

        let mut push_null_check = |field: Field, present: Option<bool>| {
            if let Some(present) = present {
                let op = if present { "IS NOT NULL" } else { "IS NULL" };
                wheres.push(format!("{} {op}", col(field)));
            }
        };
        push_null_check(Field::Assignee, self.has_assignee);
        push_null_check(Field::Value, self.has_value);
        push_null_check(Field::CompletedAt, self.has_completed);
        push_null_check(Field::TargetAt, self.has_target);

        let bounds = [
            (Field::CreatedAt, ">=", self.created_after),
            (Field::CreatedAt, "<=", self.created_before),
            (Field::CompletedAt, ">=", self.completed_after),
            (Field::CompletedAt, "<=", self.completed_before),
            (Field::TargetAt, ">=", self.target_after),
            (Field::TargetAt, "<=", self.target_before),
            (Field::TargetAt, "<", self.target_earlier_than),
        ];
        for (field, op, bound) in bounds {
            if let Some(ts) = bound {
                wheres.push(format!("{} {op} ?{idx}", col(field)));
                params.push(Box::new(to_sql_ts(&ts)));
                idx += 1;
            }
        }

        if wheres.is_empty() {
            (String::new(), params)
        } else {
            (format!(" WHERE {}", wheres.join(" AND ")), params)
        }
    }
}

fn push_list(
    wheres: &mut Vec<String>,
    params: &mut SqlParams,
    idx: &mut usize,
    column: &str,
    op: &str,
    values: &[String],
) {
    let placeholders: Vec<String> = values
        .iter()
        .map(|v| {
            params.push(Box::new(v.clone()));
            let p = format!("?{idx}");
            *idx += 1;
            p
        })
        .collect();
    wheres.push(format!("{column} {op} ({})", placeholders.join(", ")));
}
