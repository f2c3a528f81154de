use chrono::{DateTime, Utc};
use serde::Serialize;

use super::distribution::Distribution;
use super::time::TimeMetrics;
use super::trend::TrendPoint;
use crate::gateway::{Dimension, EntityType};

/// An assignee ranked by won deals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopPerformer {
    pub assignee_id: String,
    pub name: Option<String>,
    pub deals_won: u64,
    pub won_value: f64,
}

/// Deal pipeline analytics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DealAnalyticsReport {
    pub total_deals: u64,
    pub won_deals: u64,
    pub lost_deals: u64,
    pub active_deals: u64,
    pub total_value: f64,
    pub won_value: f64,
    /// Value of deals not yet won or lost.
    pub pipeline_value: f64,
    /// Won deals as a percentage of all deals.
    pub conversion_rate: f64,
    /// Won deals as a percentage of closed (won + lost) deals.
    pub win_rate: f64,
    pub average_deal_size: f64,
    /// Created → closed, over won deals with both timestamps.
    pub sales_cycle: TimeMetrics,
    pub average_sales_cycle_days: f64,
    pub stage_distribution: Distribution,
    pub monthly_revenue: Vec<TrendPoint>,
    pub top_performers: Vec<TopPerformer>,
}

impl DealAnalyticsReport {
    pub fn empty() -> Self {
        Self {
            total_deals: 0,
            won_deals: 0,
            lost_deals: 0,
            active_deals: 0,
            total_value: 0.0,
            won_value: 0.0,
            pipeline_value: 0.0,
            conversion_rate: 0.0,
            win_rate: 0.0,
            average_deal_size: 0.0,
            sales_cycle: TimeMetrics::default(),
            average_sales_cycle_days: 0.0,
            stage_distribution: Distribution::empty(Dimension::Status),
            monthly_revenue: Vec::new(),
            top_performers: Vec::new(),
        }
    }
}

/// Tasks created and completed in one trend period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskTrendPoint {
    pub period_label: String,
    pub created: u64,
    pub completed: u64,
}

/// Task throughput and timeliness analytics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskAnalyticsReport {
    pub total_tasks: u64,
    pub completed_tasks: u64,
    /// Neither completed nor cancelled.
    pub pending_tasks: u64,
    /// Pending with a due date in the past.
    pub overdue_tasks: u64,
    pub completion_rate: f64,
    pub completion_time: TimeMetrics,
    pub average_completion_days: f64,
    /// Completed tasks that had a due date.
    pub sla_tracked: u64,
    /// Of those, completed no later than due.
    pub sla_met: u64,
    pub sla_compliance_rate: f64,
    pub priority_distribution: Distribution,
    pub status_distribution: Distribution,
    pub weekly_trend: Vec<TaskTrendPoint>,
}

impl TaskAnalyticsReport {
    pub fn empty() -> Self {
        Self {
            total_tasks: 0,
            completed_tasks: 0,
            pending_tasks: 0,
            overdue_tasks: 0,
            completion_rate: 0.0,
            completion_time: TimeMetrics::default(),
            average_completion_days: 0.0,
            sla_tracked: 0,
            sla_met: 0,
            sla_compliance_rate: 0.0,
            priority_distribution: Distribution::empty(Dimension::Priority),
            status_distribution: Distribution::empty(Dimension::Status),
            weekly_trend: Vec::new(),
        }
    }
}

/// Lead funnel analytics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeadAnalyticsReport {
    pub total_leads: u64,
    pub active_leads: u64,
    pub converted_leads: u64,
    pub conversion_rate: f64,
    /// Created → converted.
    pub conversion_time: TimeMetrics,
    pub source_distribution: Distribution,
    pub status_distribution: Distribution,
    pub monthly_trend: Vec<TrendPoint>,
}

impl LeadAnalyticsReport {
    pub fn empty() -> Self {
        Self {
            total_leads: 0,
            active_leads: 0,
            converted_leads: 0,
            conversion_rate: 0.0,
            conversion_time: TimeMetrics::default(),
            source_distribution: Distribution::empty(Dimension::Source),
            status_distribution: Distribution::empty(Dimension::Status),
            monthly_trend: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntityCounts {
    pub leads: u64,
    pub deals: u64,
    pub tasks: u64,
    pub contacts: u64,
    pub companies: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RevenueSummary {
    pub won_revenue: f64,
    pub pipeline_value: f64,
    /// Won deals closed since the first of the current month.
    pub revenue_this_month: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DealSummary {
    pub id: String,
    pub title: String,
    pub status: String,
    pub value: f64,
    pub expected_close_date: Option<DateTime<Utc>>,
}

/// A recently created lead, deal or task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityItem {
    pub entity: EntityType,
    pub id: String,
    pub name: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub time_ago: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpcomingTask {
    pub id: String,
    pub title: String,
    pub priority: Option<String>,
    pub due_date: DateTime<Utc>,
    pub due_in: String,
    pub business_hours_left: f64,
}

/// Cross-domain headline figures shown at the top of the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverviewSummary {
    pub counts: EntityCounts,
    pub revenue: RevenueSummary,
    pub lead_status: Distribution,
    pub deal_status: Distribution,
    pub task_completion_rate: f64,
    pub top_deals: Vec<DealSummary>,
    pub recent_activity: Vec<ActivityItem>,
    pub upcoming_tasks: Vec<UpcomingTask>,
}

/// A dashboard section that was replaced by its empty default.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionFault {
    pub section: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardOverview {
    pub generated_at: DateTime<Utc>,
    pub summary: OverviewSummary,
    pub deals: DealAnalyticsReport,
    pub tasks: TaskAnalyticsReport,
    pub leads: LeadAnalyticsReport,
    pub failed_sections: Vec<SectionFault>,
}

impl DashboardOverview {
    pub fn is_degraded(&self) -> bool {
        !self.failed_sections.is_empty()
    }
}
