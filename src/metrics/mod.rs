pub mod distribution;
pub mod time;
pub mod trend;
pub mod types;

pub use distribution::{Distribution, DistributionBucket};
pub use time::TimeMetrics;
pub use trend::{TrendPoint, TrendUnit, TrendWindow};
pub use types::*;

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Datelike, Utc};

use crate::config::AnalyticsConfig;
use crate::date_util::{first_of_month, round1, start_of_day};
use crate::error::Result;
use crate::gateway::{
    status, AggregateOp, DataGateway, Dimension, EntityType, Field, FindQuery, Record,
};
use crate::query::builder::Filter;

/// `part / total` as a percentage with one decimal; 0 when `total` is 0.
pub fn percent(part: u64, total: u64) -> f64 {
    round1(time::compliance_rate(part, total))
}

/// Created → completed hours for records with both timestamps. Inverted
/// intervals are dropped and reported.
fn lead_times(domain: &str, records: &[Record]) -> Vec<f64> {
    let mut inverted = 0usize;
    let hours: Vec<f64> = records
        .iter()
        .filter_map(|r| r.completed_at.map(|done| time::duration_hours(r.created_at, done)))
        .filter(|&h| {
            let ok = h >= 0.0;
            if !ok {
                inverted += 1;
            }
            ok
        })
        .collect();
    if inverted > 0 {
        log::warn!("{domain}: skipped {inverted} record(s) completed before they were created");
    }
    hours
}

/// A report section together with the fault that emptied it, if any.
struct Section<T> {
    report: T,
    fault: Option<String>,
}

/// Await `build`; on a data access fault substitute `empty()` and record the
/// fault. Any other error propagates.
async fn with_fallback<T, F>(section: &str, build: F, empty: fn() -> T) -> Result<Section<T>>
where
    F: Future<Output = Result<T>>,
{
    let started = Instant::now();
    match build.await {
        Ok(report) => {
            log::debug!("Built {section} in {:?}", started.elapsed());
            Ok(Section {
                report,
                fault: None,
            })
        }
        Err(e) if e.is_data_access() => {
            log::error!("{section} unavailable, using empty default: {e}");
            Ok(Section {
                report: empty(),
                fault: Some(e.to_string()),
            })
        }
        Err(e) => Err(e),
    }
}

/// Per-domain figures feeding the overview summary.
struct DealSnapshot {
    count: u64,
    revenue: RevenueSummary,
    status: Distribution,
    top_deals: Vec<DealSummary>,
    recent: Vec<Record>,
}

impl DealSnapshot {
    fn empty() -> Self {
        Self {
            count: 0,
            revenue: RevenueSummary::default(),
            status: Distribution::empty(Dimension::Status),
            top_deals: Vec::new(),
            recent: Vec::new(),
        }
    }
}

struct TaskSnapshot {
    count: u64,
    completion_rate: f64,
    upcoming: Vec<UpcomingTask>,
    recent: Vec<Record>,
}

impl TaskSnapshot {
    fn empty() -> Self {
        Self {
            count: 0,
            completion_rate: 0.0,
            upcoming: Vec::new(),
            recent: Vec::new(),
        }
    }
}

struct LeadSnapshot {
    count: u64,
    status: Distribution,
    recent: Vec<Record>,
}

impl LeadSnapshot {
    fn empty() -> Self {
        Self {
            count: 0,
            status: Distribution::empty(Dimension::Status),
            recent: Vec::new(),
        }
    }
}

#[derive(Default)]
struct DirectoryCounts {
    contacts: u64,
    companies: u64,
}

/// Builds analytics reports from records read through a [`DataGateway`].
///
/// Reads for one report are issued concurrently; the dashboard overview
/// additionally builds its sections concurrently and degrades per section
/// when the gateway fails.
#[derive(Clone)]
pub struct MetricsOrchestrator {
    gateway: Arc<dyn DataGateway>,
    config: AnalyticsConfig,
}

impl MetricsOrchestrator {
    pub fn new(gateway: Arc<dyn DataGateway>, config: AnalyticsConfig) -> Self {
        Self { gateway, config }
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    pub async fn deal_analytics(&self) -> Result<DealAnalyticsReport> {
        self.deal_analytics_at(Utc::now()).await
    }

    pub async fn task_analytics(&self) -> Result<TaskAnalyticsReport> {
        self.task_analytics_at(Utc::now()).await
    }

    pub async fn lead_analytics(&self) -> Result<LeadAnalyticsReport> {
        self.lead_analytics_at(Utc::now()).await
    }

    pub async fn dashboard_overview(&self) -> Result<DashboardOverview> {
        self.dashboard_overview_at(Utc::now()).await
    }

    pub async fn deal_analytics_at(&self, now: DateTime<Utc>) -> Result<DealAnalyticsReport> {
        with_fallback("deal analytics", self.build_deals(now), DealAnalyticsReport::empty)
            .await
            .map(|s| s.report)
    }

    pub async fn task_analytics_at(&self, now: DateTime<Utc>) -> Result<TaskAnalyticsReport> {
        with_fallback("task analytics", self.build_tasks(now), TaskAnalyticsReport::empty)
            .await
            .map(|s| s.report)
    }

    pub async fn lead_analytics_at(&self, now: DateTime<Utc>) -> Result<LeadAnalyticsReport> {
        with_fallback("lead analytics", self.build_leads(now), LeadAnalyticsReport::empty)
            .await
            .map(|s| s.report)
    }

    pub async fn dashboard_overview_at(&self, now: DateTime<Utc>) -> Result<DashboardOverview> {
        let (deals, tasks, leads, deal_snap, task_snap, lead_snap, directory) = tokio::join!(
            with_fallback("deals", self.build_deals(now), DealAnalyticsReport::empty),
            with_fallback("tasks", self.build_tasks(now), TaskAnalyticsReport::empty),
            with_fallback("leads", self.build_leads(now), LeadAnalyticsReport::empty),
            with_fallback("summary.deals", self.deal_snapshot(now), DealSnapshot::empty),
            with_fallback("summary.tasks", self.task_snapshot(now), TaskSnapshot::empty),
            with_fallback("summary.leads", self.lead_snapshot(), LeadSnapshot::empty),
            with_fallback("summary.directory", self.directory_counts(), DirectoryCounts::default),
        );
        let (deals, tasks, leads) = (deals?, tasks?, leads?);
        let (deal_snap, task_snap, lead_snap, directory) =
            (deal_snap?, task_snap?, lead_snap?, directory?);

        let failed_sections: Vec<SectionFault> = [
            ("deals", &deals.fault),
            ("tasks", &tasks.fault),
            ("leads", &leads.fault),
            ("summary.deals", &deal_snap.fault),
            ("summary.tasks", &task_snap.fault),
            ("summary.leads", &lead_snap.fault),
            ("summary.directory", &directory.fault),
        ]
        .into_iter()
        .filter_map(|(section, fault)| {
            fault.as_ref().map(|error| SectionFault {
                section: section.to_string(),
                error: error.clone(),
            })
        })
        .collect();

        let (deal_snap, task_snap, lead_snap, directory) = (
            deal_snap.report,
            task_snap.report,
            lead_snap.report,
            directory.report,
        );

        let mut recent: Vec<Record> = deal_snap
            .recent
            .into_iter()
            .chain(task_snap.recent)
            .chain(lead_snap.recent)
            .collect();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        recent.truncate(self.config.recent_limit as usize);
        let recent_activity = recent
            .into_iter()
            .map(|r| ActivityItem {
                time_ago: time::time_ago(r.created_at, now),
                entity: r.entity,
                id: r.id,
                name: r.name,
                status: r.status,
                created_at: r.created_at,
            })
            .collect();

        let summary = OverviewSummary {
            counts: EntityCounts {
                leads: lead_snap.count,
                deals: deal_snap.count,
                tasks: task_snap.count,
                contacts: directory.contacts,
                companies: directory.companies,
            },
            revenue: deal_snap.revenue,
            lead_status: lead_snap.status,
            deal_status: deal_snap.status,
            task_completion_rate: task_snap.completion_rate,
            top_deals: deal_snap.top_deals,
            recent_activity,
            upcoming_tasks: task_snap.upcoming,
        };

        Ok(DashboardOverview {
            generated_at: now,
            summary,
            deals: deals.report,
            tasks: tasks.report,
            leads: leads.report,
            failed_sections,
        })
    }

    // ── Domain reports ─────────────────────────────────────────────

    async fn build_deals(&self, now: DateTime<Utc>) -> Result<DealAnalyticsReport> {
        let gw = self.gateway.as_ref();
        let deal = EntityType::Deal;
        let all = Filter::new();
        let won = Filter::new().status(status::DEAL_WON);
        let lost = Filter::new().status(status::DEAL_LOST);
        let active = Filter::new().status_not_in(status::DEAL_TERMINAL);
        let won_query = FindQuery::new(won.clone()).select(&[
            Field::Assignee,
            Field::Value,
            Field::CompletedAt,
        ]);

        let (
            total,
            won_count,
            lost_count,
            active_count,
            total_value,
            won_value,
            pipeline_value,
            stages,
            won_deals,
        ) = tokio::try_join!(
            gw.count(deal, &all),
            gw.count(deal, &won),
            gw.count(deal, &lost),
            gw.count(deal, &active),
            gw.aggregate(deal, &all, AggregateOp::Sum, Field::Value),
            gw.aggregate(deal, &won, AggregateOp::Sum, Field::Value),
            gw.aggregate(deal, &active, AggregateOp::Sum, Field::Value),
            gw.group_by(deal, &all, Dimension::Status),
            gw.find_many(deal, &won_query),
        )?;

        if total == 0 {
            return Ok(DealAnalyticsReport::empty());
        }

        let sales_cycle = time::summarize(&lead_times("deals", &won_deals));
        let monthly_revenue = trend::build_series(
            &won_deals,
            self.config.monthly_window,
            |d| d.completed_at,
            |d| d.value.unwrap_or(0.0),
            now,
        );
        let top_performers = self.top_performers(&won_deals).await?;

        Ok(DealAnalyticsReport {
            total_deals: total,
            won_deals: won_count,
            lost_deals: lost_count,
            active_deals: active_count,
            total_value,
            won_value,
            pipeline_value,
            conversion_rate: percent(won_count, total),
            win_rate: percent(won_count, won_count + lost_count),
            average_deal_size: total_value / total as f64,
            average_sales_cycle_days: round1(sales_cycle.average_days()),
            sales_cycle,
            stage_distribution: distribution::from_groups(Dimension::Status, stages),
            monthly_revenue,
            top_performers,
        })
    }

    /// Rank assignees of `won_deals` by count, then value, and resolve names.
    async fn top_performers(&self, won_deals: &[Record]) -> Result<Vec<TopPerformer>> {
        let assigned: Vec<&Record> = won_deals.iter().filter(|d| d.assignee_id.is_some()).collect();
        let by_assignee = distribution::aggregate(
            &assigned,
            Dimension::Assignee,
            |d| d.assignee_id.clone().unwrap_or_default(),
            |d| d.value.unwrap_or(0.0),
        );

        let mut ranked = by_assignee.buckets;
        ranked.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| b.sum_value.total_cmp(&a.sum_value))
                .then_with(|| a.label.cmp(&b.label))
        });
        ranked.truncate(self.config.top_n as usize);
        if ranked.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = ranked.iter().map(|b| b.label.clone()).collect();
        let users = self
            .gateway
            .find_many(
                EntityType::User,
                &FindQuery::new(Filter::new().ids(&ids)).select(&[Field::Name]),
            )
            .await?;

        Ok(ranked
            .into_iter()
            .map(|b| TopPerformer {
                name: users.iter().find(|u| u.id == b.label).map(|u| u.name.clone()),
                assignee_id: b.label,
                deals_won: b.count,
                won_value: b.sum_value,
            })
            .collect())
    }

    async fn build_tasks(&self, now: DateTime<Utc>) -> Result<TaskAnalyticsReport> {
        let gw = self.gateway.as_ref();
        let task = EntityType::Task;
        let window = self.config.weekly_window;
        let all = Filter::new();
        let completed = Filter::new().status(status::TASK_COMPLETED);
        let open = Filter::new().status_not_in(status::TASK_CLOSED);
        let overdue = open.clone().has_target(true).target_earlier_than(now);
        let completed_query = FindQuery::new(completed.clone().has_completed(true)).select(&[
            Field::CompletedAt,
            Field::TargetAt,
        ]);
        let mut created_filter = Filter::new();
        if let Some(start) = window.start(now) {
            created_filter = created_filter.created_after(start);
        }
        let created_query = FindQuery::new(created_filter).select(&[]);

        let (
            total,
            completed_count,
            pending,
            overdue_count,
            priorities,
            statuses,
            done,
            created,
        ) = tokio::try_join!(
            gw.count(task, &all),
            gw.count(task, &completed),
            gw.count(task, &open),
            gw.count(task, &overdue),
            gw.group_by(task, &all, Dimension::Priority),
            gw.group_by(task, &all, Dimension::Status),
            gw.find_many(task, &completed_query),
            gw.find_many(task, &created_query),
        )?;

        if total == 0 {
            return Ok(TaskAnalyticsReport::empty());
        }

        let completion_time = time::summarize(&lead_times("tasks", &done));

        let (sla_tracked, sla_met) = done
            .iter()
            .filter_map(|t| {
                let finished = t.completed_at?;
                let due = t.target_at?;
                let actual = time::duration_hours(t.created_at, finished);
                let allowed = time::duration_hours(t.created_at, due);
                (actual >= 0.0).then(|| time::is_sla_compliant(actual, allowed))
            })
            .fold((0u64, 0u64), |(tracked, met), ok| (tracked + 1, met + ok as u64));

        let created_series = trend::build_series(&created, window, |t| Some(t.created_at), |_| 0.0, now);
        let completed_series = trend::build_series(&done, window, |t| t.completed_at, |_| 0.0, now);
        let weekly_trend = created_series
            .into_iter()
            .zip(completed_series)
            .map(|(c, d)| TaskTrendPoint {
                period_label: c.period_label,
                created: c.count,
                completed: d.count,
            })
            .collect();

        Ok(TaskAnalyticsReport {
            total_tasks: total,
            completed_tasks: completed_count,
            pending_tasks: pending,
            overdue_tasks: overdue_count,
            completion_rate: percent(completed_count, total),
            average_completion_days: round1(completion_time.average_days()),
            completion_time,
            sla_tracked,
            sla_met,
            sla_compliance_rate: round1(time::compliance_rate(sla_met, sla_tracked)),
            priority_distribution: distribution::from_groups(Dimension::Priority, priorities),
            status_distribution: distribution::from_groups(Dimension::Status, statuses),
            weekly_trend,
        })
    }

    async fn build_leads(&self, now: DateTime<Utc>) -> Result<LeadAnalyticsReport> {
        let gw = self.gateway.as_ref();
        let lead = EntityType::Lead;
        let window = self.config.monthly_window;
        let all = Filter::new();
        let active = Filter::new().status_not_in(status::LEAD_TERMINAL);
        let converted = Filter::new().status(status::LEAD_CONVERTED);
        let converted_query =
            FindQuery::new(converted.clone().has_completed(true)).select(&[Field::CompletedAt]);
        let mut created_filter = Filter::new();
        if let Some(start) = window.start(now) {
            created_filter = created_filter.created_after(start);
        }
        let created_query = FindQuery::new(created_filter).select(&[Field::Value]);

        let (
            total,
            active_count,
            converted_count,
            sources,
            statuses,
            created,
            converted_leads,
        ) = tokio::try_join!(
            gw.count(lead, &all),
            gw.count(lead, &active),
            gw.count(lead, &converted),
            gw.group_by(lead, &all, Dimension::Source),
            gw.group_by(lead, &all, Dimension::Status),
            gw.find_many(lead, &created_query),
            gw.find_many(lead, &converted_query),
        )?;

        if total == 0 {
            return Ok(LeadAnalyticsReport::empty());
        }

        Ok(LeadAnalyticsReport {
            total_leads: total,
            active_leads: active_count,
            converted_leads: converted_count,
            conversion_rate: percent(converted_count, total),
            conversion_time: time::summarize(&lead_times("leads", &converted_leads)),
            source_distribution: distribution::from_groups(Dimension::Source, sources),
            status_distribution: distribution::from_groups(Dimension::Status, statuses),
            monthly_trend: trend::build_series(
                &created,
                window,
                |l| Some(l.created_at),
                |l| l.value.unwrap_or(0.0),
                now,
            ),
        })
    }

    // ── Overview snapshots ─────────────────────────────────────────

    fn recent_query(&self) -> FindQuery {
        FindQuery::new(Filter::new())
            .select(&[Field::Name, Field::Status])
            .order_by_desc(Field::CreatedAt)
            .limit(self.config.recent_limit)
    }

    async fn deal_snapshot(&self, now: DateTime<Utc>) -> Result<DealSnapshot> {
        let gw = self.gateway.as_ref();
        let deal = EntityType::Deal;
        let won = Filter::new().status(status::DEAL_WON);
        let active = Filter::new().status_not_in(status::DEAL_TERMINAL);
        let month_start = start_of_day(first_of_month(now.year(), now.month()));
        let won_this_month = won.clone().completed_after(month_start).completed_before(now);
        let top_query = FindQuery::new(Filter::new().has_value(true))
            .order_by_desc(Field::Value)
            .limit(self.config.top_n);
        let all = Filter::new();
        let recent_query = self.recent_query();

        let (
            count,
            won_revenue,
            pipeline_value,
            revenue_this_month,
            statuses,
            top,
            recent,
        ) = tokio::try_join!(
            gw.count(deal, &all),
            gw.aggregate(deal, &won, AggregateOp::Sum, Field::Value),
            gw.aggregate(deal, &active, AggregateOp::Sum, Field::Value),
            gw.aggregate(deal, &won_this_month, AggregateOp::Sum, Field::Value),
            gw.group_by(deal, &all, Dimension::Status),
            gw.find_many(deal, &top_query),
            gw.find_many(deal, &recent_query),
        )?;

        Ok(DealSnapshot {
            count,
            revenue: RevenueSummary {
                won_revenue,
                pipeline_value,
                revenue_this_month,
            },
            status: distribution::from_groups(Dimension::Status, statuses),
            top_deals: top
                .into_iter()
                .map(|d| DealSummary {
                    id: d.id,
                    title: d.name,
                    status: d.status,
                    value: d.value.unwrap_or(0.0),
                    expected_close_date: d.target_at,
                })
                .collect(),
            recent,
        })
    }

    async fn task_snapshot(&self, now: DateTime<Utc>) -> Result<TaskSnapshot> {
        let gw = self.gateway.as_ref();
        let task = EntityType::Task;
        let upcoming_query = FindQuery::new(
            Filter::new()
                .status_not_in(status::TASK_CLOSED)
                .target_after(now),
        )
        .select(&[Field::Name, Field::Priority, Field::TargetAt])
        .order_by(Field::TargetAt)
        .limit(self.config.upcoming_limit);
        let all = Filter::new();
        let completed = Filter::new().status(status::TASK_COMPLETED);
        let recent_query = self.recent_query();

        let (count, completed, upcoming, recent) = tokio::try_join!(
            gw.count(task, &all),
            gw.count(task, &completed),
            gw.find_many(task, &upcoming_query),
            gw.find_many(task, &recent_query),
        )?;

        Ok(TaskSnapshot {
            count,
            completion_rate: percent(completed, count),
            upcoming: upcoming
                .into_iter()
                .filter_map(|t| {
                    let due = t.target_at?;
                    Some(UpcomingTask {
                        due_in: time::format_duration(time::duration_hours(now, due)),
                        business_hours_left: time::business_hours(now, due),
                        id: t.id,
                        title: t.name,
                        priority: t.priority,
                        due_date: due,
                    })
                })
                .collect(),
            recent,
        })
    }

    async fn lead_snapshot(&self) -> Result<LeadSnapshot> {
        let gw = self.gateway.as_ref();
        let lead = EntityType::Lead;
        let all = Filter::new();
        let recent_query = self.recent_query();
        let (count, statuses, recent) = tokio::try_join!(
            gw.count(lead, &all),
            gw.group_by(lead, &all, Dimension::Status),
            gw.find_many(lead, &recent_query),
        )?;
        Ok(LeadSnapshot {
            count,
            status: distribution::from_groups(Dimension::Status, statuses),
            recent,
        })
    }

    async fn directory_counts(&self) -> Result<DirectoryCounts> {
        let gw = self.gateway.as_ref();
        let all = Filter::new();
        let (contacts, companies) = tokio::try_join!(
            gw.count(EntityType::Contact, &all),
            gw.count(EntityType::Company, &all),
        )?;
        Ok(DirectoryCounts {
            contacts,
            companies,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::gateway::{GroupRow, Record};
    use crate::storage::{repository, Database, SqliteGateway};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::time::Duration;

    fn ts(m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, m, d, 12, 0, 0).unwrap()
    }

    fn now() -> DateTime<Utc> {
        ts(3, 20)
    }

    /// Delegates to an inner gateway but fails every call for one entity.
    struct FaultyGateway {
        inner: SqliteGateway,
        failing: EntityType,
        data_access: bool,
    }

    impl FaultyGateway {
        fn check(&self, entity: EntityType) -> Result<()> {
            if entity != self.failing {
                return Ok(());
            }
            if self.data_access {
                Err(Error::DataAccess {
                    entity: entity.to_string(),
                    message: "connection reset".into(),
                })
            } else {
                Err(Error::Computation("bad bucket arithmetic".into()))
            }
        }
    }

    #[async_trait]
    impl DataGateway for FaultyGateway {
        async fn count(&self, entity: EntityType, filter: &Filter) -> Result<u64> {
            self.check(entity)?;
            self.inner.count(entity, filter).await
        }

        async fn aggregate(
            &self,
            entity: EntityType,
            filter: &Filter,
            op: AggregateOp,
            field: Field,
        ) -> Result<f64> {
            self.check(entity)?;
            self.inner.aggregate(entity, filter, op, field).await
        }

        async fn group_by(
            &self,
            entity: EntityType,
            filter: &Filter,
            dimension: Dimension,
        ) -> Result<Vec<GroupRow>> {
            self.check(entity)?;
            self.inner.group_by(entity, filter, dimension).await
        }

        async fn find_many(&self, entity: EntityType, query: &FindQuery) -> Result<Vec<Record>> {
            self.check(entity)?;
            self.inner.find_many(entity, query).await
        }
    }

    fn sample_records() -> Vec<Record> {
        vec![
            Record::new(EntityType::Deal, "d1", ts(3, 1)).name("Alpha").status("WON").value(1000.0).assignee("u1").completed_at(ts(3, 11)),
            Record::new(EntityType::Deal, "d2", ts(3, 2)).name("Beta").status("LOST").value(2000.0),
            Record::new(EntityType::Deal, "d3", ts(3, 3)).name("Gamma").status("OPEN").value(3000.0),
            Record::new(EntityType::Deal, "d4", ts(3, 4)).name("Delta").status("PROPOSAL").value(4000.0).target_at(ts(4, 30)),
            Record::new(EntityType::Task, "t1", ts(3, 1)).name("Call").status("COMPLETED").priority("HIGH").target_at(ts(3, 3)).completed_at(ts(3, 2)),
            Record::new(EntityType::Task, "t2", ts(3, 1)).name("Email").status("COMPLETED").priority("LOW").target_at(ts(3, 2)).completed_at(ts(3, 4)),
            Record::new(EntityType::Task, "t3", ts(3, 1)).name("Quote").status("TODO").priority("HIGH").target_at(ts(3, 5)),
            Record::new(EntityType::Task, "t4", ts(3, 1)).name("Demo").status("CANCELLED"),
            Record::new(EntityType::Task, "t5", ts(3, 1)).name("Follow up").status("IN_PROGRESS").target_at(ts(3, 25)),
            Record::new(EntityType::Lead, "l1", ts(2, 1)).name("Acme").status("NEW").source("REFERRAL").value(500.0),
            Record::new(EntityType::Lead, "l2", ts(3, 1)).name("Globex").status("CONVERTED").completed_at(ts(3, 3)),
            Record::new(EntityType::Lead, "l3", Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap()).name("Initech").status("LOST"),
            Record::new(EntityType::Contact, "c1", ts(1, 1)).name("Jo"),
            Record::new(EntityType::Company, "co1", ts(1, 1)).name("Acme Inc"),
        ]
    }

    async fn seeded(records: Vec<Record>) -> SqliteGateway {
        SqliteGateway::new(seeded_db(records).await, Duration::from_secs(5))
    }

    async fn seeded_db(records: Vec<Record>) -> Database {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(move |conn| {
                repository::upsert_user(conn, "u1", "Ana", None, &ts(1, 1))?;
                repository::upsert_user(conn, "u2", "Ben", None, &ts(1, 1))?;
                repository::upsert_records(conn, &records)
            })
            .await
            .unwrap();
        db
    }

    fn orchestrator<G: DataGateway + 'static>(gateway: G) -> MetricsOrchestrator {
        MetricsOrchestrator::new(Arc::new(gateway), AnalyticsConfig::default())
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(1, 4), 25.0);
        assert_eq!(percent(1, 3), 33.3);
        assert_eq!(percent(5, 0), 0.0);
    }

    #[tokio::test]
    async fn test_deal_analytics() {
        let m = orchestrator(seeded(sample_records()).await);
        let r = m.deal_analytics_at(now()).await.unwrap();

        assert_eq!(r.total_deals, 4);
        assert_eq!(r.total_value, 10000.0);
        assert_eq!(r.won_deals, 1);
        assert_eq!(r.lost_deals, 1);
        assert_eq!(r.active_deals, 2);
        assert_eq!(r.won_value, 1000.0);
        assert_eq!(r.pipeline_value, 7000.0);
        assert_eq!(r.conversion_rate, 25.0);
        assert_eq!(r.win_rate, 50.0);
        assert_eq!(r.average_deal_size, 2500.0);
        assert_eq!(r.sales_cycle.count, 1);
        assert_eq!(r.average_sales_cycle_days, 10.0);

        assert_eq!(r.stage_distribution.total, 4);
        assert_eq!(r.stage_distribution.get("WON").unwrap().percentage, 25.0);

        assert_eq!(r.monthly_revenue.len(), 6);
        let last = r.monthly_revenue.last().unwrap();
        assert_eq!(last.period_label, "2025-03");
        assert_eq!((last.count, last.sum_value), (1, 1000.0));

        assert_eq!(r.top_performers.len(), 1);
        assert_eq!(r.top_performers[0].assignee_id, "u1");
        assert_eq!(r.top_performers[0].name.as_deref(), Some("Ana"));
    }

    #[tokio::test]
    async fn test_top_performers_ranking() {
        let won = |id: &str, who: Option<&str>, value: f64| {
            let r = Record::new(EntityType::Deal, id, ts(3, 1))
                .status("WON")
                .value(value)
                .completed_at(ts(3, 5));
            match who {
                Some(u) => r.assignee(u),
                None => r,
            }
        };
        let gw = seeded(vec![
            won("a", Some("u1"), 100.0),
            won("b", Some("u1"), 100.0),
            won("c", Some("u2"), 500.0),
            won("d", Some("u2"), 0.0),
            won("e", Some("u3"), 9999.0),
            won("f", None, 50_000.0),
        ])
        .await;
        let r = orchestrator(gw).deal_analytics_at(now()).await.unwrap();

        let ranked: Vec<(&str, u64)> = r
            .top_performers
            .iter()
            .map(|p| (p.assignee_id.as_str(), p.deals_won))
            .collect();
        assert_eq!(ranked, vec![("u2", 2), ("u1", 2), ("u3", 1)]);
        assert_eq!(r.top_performers[0].name.as_deref(), Some("Ben"));
        assert_eq!(r.top_performers[2].name, None);
    }

    #[tokio::test]
    async fn test_task_analytics() {
        let m = orchestrator(seeded(sample_records()).await);
        let r = m.task_analytics_at(now()).await.unwrap();

        assert_eq!(r.total_tasks, 5);
        assert_eq!(r.completed_tasks, 2);
        assert_eq!(r.pending_tasks, 2);
        assert_eq!(r.overdue_tasks, 1);
        assert_eq!(r.completion_rate, 40.0);
        assert_eq!(r.completion_time.average_hours, 48.0);
        assert_eq!(r.average_completion_days, 2.0);
        assert_eq!((r.sla_tracked, r.sla_met), (2, 1));
        assert_eq!(r.sla_compliance_rate, 50.0);
        assert_eq!(r.priority_distribution.get("HIGH").unwrap().count, 2);
        assert_eq!(r.priority_distribution.get("UNSPECIFIED").unwrap().count, 2);

        // 2025-03-20 is a Thursday; the window covers the weeks of
        // Feb 10 through Mar 17.
        assert_eq!(r.weekly_trend.len(), 6);
        assert_eq!(r.weekly_trend[2].period_label, "2025-W09");
        assert_eq!(r.weekly_trend[2].created, 5);
        assert_eq!(r.weekly_trend[2].completed, 1);
        assert_eq!(r.weekly_trend[3].completed, 1);
        let created: u64 = r.weekly_trend.iter().map(|p| p.created).sum();
        assert_eq!(created, 5);
    }

    #[tokio::test]
    async fn test_task_analytics_empty() {
        let m = orchestrator(seeded(Vec::new()).await);
        let r = m.task_analytics_at(now()).await.unwrap();
        assert_eq!(r, TaskAnalyticsReport::empty());
        assert_eq!(r.completion_rate, 0.0);
        assert!(r.weekly_trend.is_empty());
    }

    #[tokio::test]
    async fn test_lead_analytics() {
        let m = orchestrator(seeded(sample_records()).await);
        let r = m.lead_analytics_at(now()).await.unwrap();

        assert_eq!(r.total_leads, 3);
        assert_eq!(r.active_leads, 1);
        assert_eq!(r.converted_leads, 1);
        assert_eq!(r.conversion_rate, 33.3);
        assert_eq!(r.conversion_time.average_hours, 48.0);
        assert_eq!(r.source_distribution.buckets[0].label, "UNSPECIFIED");
        assert_eq!(r.source_distribution.buckets[0].count, 2);

        assert_eq!(r.monthly_trend.len(), 6);
        let in_window: u64 = r.monthly_trend.iter().map(|p| p.count).sum();
        assert_eq!(in_window, 2);
        assert_eq!(r.monthly_trend[4].sum_value, 500.0);
    }

    #[tokio::test]
    async fn test_overview_complete() {
        let m = orchestrator(seeded(sample_records()).await);
        let o = m.dashboard_overview_at(now()).await.unwrap();

        assert!(!o.is_degraded());
        let counts = &o.summary.counts;
        assert_eq!((counts.deals, counts.tasks, counts.leads), (4, 5, 3));
        assert_eq!((counts.contacts, counts.companies), (1, 1));
        assert_eq!(o.summary.revenue.won_revenue, 1000.0);
        assert_eq!(o.summary.revenue.revenue_this_month, 1000.0);
        assert_eq!(o.summary.revenue.pipeline_value, 7000.0);
        assert_eq!(o.summary.task_completion_rate, 40.0);

        assert_eq!(o.summary.top_deals[0].id, "d4");
        assert_eq!(o.summary.top_deals[0].expected_close_date, Some(ts(4, 30)));

        assert_eq!(o.summary.recent_activity.len(), 10);
        assert_eq!(o.summary.recent_activity[0].id, "d4");
        assert_eq!(o.summary.recent_activity[0].time_ago, "2 weeks ago");

        assert_eq!(o.summary.upcoming_tasks.len(), 1);
        let upcoming = &o.summary.upcoming_tasks[0];
        assert_eq!(upcoming.id, "t5");
        assert_eq!(upcoming.due_in, "5 days");
        assert_eq!(o.deals.total_deals, 4);
    }

    #[tokio::test]
    async fn test_overview_degrades_failed_domain() {
        let gw = FaultyGateway {
            inner: seeded(sample_records()).await,
            failing: EntityType::Lead,
            data_access: true,
        };
        let o = orchestrator(gw).dashboard_overview_at(now()).await.unwrap();

        assert_eq!(o.deals.total_deals, 4);
        assert_eq!(o.tasks.total_tasks, 5);
        assert_eq!(o.leads, LeadAnalyticsReport::empty());
        assert!(o.is_degraded());
        let failed: Vec<&str> = o.failed_sections.iter().map(|f| f.section.as_str()).collect();
        assert_eq!(failed, vec!["leads", "summary.leads"]);

        assert_eq!(o.summary.counts.leads, 0);
        assert_eq!(o.summary.counts.deals, 4);
        assert!(o.summary.lead_status.is_empty());
        assert!(o
            .summary
            .recent_activity
            .iter()
            .all(|a| a.entity != EntityType::Lead));
    }

    #[tokio::test]
    async fn test_single_report_falls_back_on_data_access_error() {
        let gw = FaultyGateway {
            inner: seeded(sample_records()).await,
            failing: EntityType::Deal,
            data_access: true,
        };
        let r = orchestrator(gw).deal_analytics_at(now()).await.unwrap();
        assert_eq!(r, DealAnalyticsReport::empty());
    }

    #[tokio::test]
    async fn test_computation_error_propagates() {
        let gw = FaultyGateway {
            inner: seeded(sample_records()).await,
            failing: EntityType::Task,
            data_access: false,
        };
        let m = orchestrator(gw);
        assert!(matches!(
            m.task_analytics_at(now()).await,
            Err(Error::Computation(_))
        ));
        assert!(m.dashboard_overview_at(now()).await.is_err());
    }

    #[tokio::test]
    async fn test_timeouts_degrade_every_section() {
        let db = seeded_db(sample_records()).await;
        let slow = SqliteGateway::new(db, Duration::ZERO);
        let m = orchestrator(slow);

        assert_eq!(m.deal_analytics_at(now()).await.unwrap(), DealAnalyticsReport::empty());

        let o = m.dashboard_overview_at(now()).await.unwrap();
        assert_eq!(o.failed_sections.len(), 7);
        assert!(o.failed_sections.iter().all(|f| f.error.contains("timed out")));
        assert_eq!(o.summary.counts, EntityCounts::default());
        assert_eq!(o.tasks, TaskAnalyticsReport::empty());
    }

    #[tokio::test]
    async fn test_inverted_intervals_are_excluded() {
        let gw = seeded(vec![
            Record::new(EntityType::Deal, "ok", ts(3, 1)).status("WON").value(10.0).completed_at(ts(3, 3)),
            Record::new(EntityType::Deal, "bad", ts(3, 10)).status("WON").value(10.0).completed_at(ts(3, 2)),
            Record::new(EntityType::Task, "t-ok", ts(3, 1)).status("COMPLETED").target_at(ts(3, 5)).completed_at(ts(3, 2)),
            Record::new(EntityType::Task, "t-bad", ts(3, 9)).status("COMPLETED").target_at(ts(3, 12)).completed_at(ts(3, 4)),
        ])
        .await;
        let m = orchestrator(gw);

        let deals = m.deal_analytics_at(now()).await.unwrap();
        assert_eq!(deals.won_deals, 2);
        assert_eq!(deals.sales_cycle.count, 1);
        assert_eq!(deals.sales_cycle.min_hours, 48.0);
        assert_eq!(deals.average_sales_cycle_days, 2.0);

        let tasks = m.task_analytics_at(now()).await.unwrap();
        assert_eq!(tasks.completed_tasks, 2);
        assert_eq!(tasks.completion_time.count, 1);
        assert_eq!((tasks.sla_tracked, tasks.sla_met), (1, 1));
    }

    #[tokio::test]
    async fn test_task_due_exactly_now_is_not_overdue() {
        let gw = seeded(vec![
            Record::new(EntityType::Task, "due-now", ts(3, 1)).status("TODO").target_at(now()),
            Record::new(EntityType::Task, "late", ts(3, 1))
                .status("TODO")
                .target_at(now() - chrono::Duration::seconds(1)),
            Record::new(EntityType::Task, "done", ts(3, 1))
                .status("COMPLETED")
                .target_at(ts(3, 2))
                .completed_at(ts(3, 3)),
        ])
        .await;
        let r = orchestrator(gw).task_analytics_at(now()).await.unwrap();
        assert_eq!(r.pending_tasks, 2);
        assert_eq!(r.overdue_tasks, 1);
    }
}
