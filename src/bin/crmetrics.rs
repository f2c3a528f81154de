use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};

use crmetrics::metrics::{Distribution, TimeMetrics, TrendPoint};
use crmetrics::CrmMetrics;

#[derive(Parser)]
#[command(name = "crmetrics", about = "CRM metrics and analytics CLI")]
struct Cli {
    /// Database path (default: ~/.crmetrics/crmetrics.db)
    #[arg(long)]
    db: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Compute reports as of the end of this day (YYYY-MM-DD) instead of now
    #[arg(long, global = true)]
    as_of: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deal pipeline analytics
    Deals {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Task throughput and SLA analytics
    Tasks {
        #[arg(long)]
        json: bool,
    },
    /// Lead funnel analytics
    Leads {
        #[arg(long)]
        json: bool,
    },
    /// Dashboard overview across all domains
    Overview {
        #[arg(long)]
        json: bool,
    },
    /// Format a duration given in hours
    Duration {
        /// Duration in hours (may be negative)
        #[arg(allow_hyphen_values = true)]
        hours: f64,
        /// Also count business hours from this date or RFC 3339 timestamp
        #[arg(long, requires = "business_to")]
        business_from: Option<String>,
        /// End of the business hours range
        #[arg(long, requires = "business_from")]
        business_to: Option<String>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show warehouse status
    Status,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
}

fn parse_as_of(value: Option<&str>) -> anyhow::Result<DateTime<Utc>> {
    match value {
        None => Ok(Utc::now()),
        Some(s) => {
            let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|_| anyhow::anyhow!("Invalid --as-of date '{s}'. Expected YYYY-MM-DD"))?;
            date.and_hms_opt(23, 59, 59)
                .map(|dt| dt.and_utc())
                .ok_or_else(|| anyhow::anyhow!("Invalid --as-of date '{s}'"))
        }
    }
}

async fn open(db_path: Option<&str>) -> anyhow::Result<CrmMetrics> {
    let db = match db_path {
        Some(path) => crmetrics::Database::open_at(path).await?,
        None => crmetrics::Database::open().await?,
    };
    Ok(CrmMetrics::open(db).await?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let now = parse_as_of(cli.as_of.as_deref())?;
    let db_path = cli.db.as_deref();

    match cli.command {
        Commands::Deals { json } => {
            let crm = open(db_path).await?;
            let r = crm.orchestrator().deal_analytics_at(now).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&r)?);
            } else {
                print_deals(&r);
            }
        }
        Commands::Tasks { json } => {
            let crm = open(db_path).await?;
            let r = crm.orchestrator().task_analytics_at(now).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&r)?);
            } else {
                print_tasks(&r);
            }
        }
        Commands::Leads { json } => {
            let crm = open(db_path).await?;
            let r = crm.orchestrator().lead_analytics_at(now).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&r)?);
            } else {
                print_leads(&r);
            }
        }
        Commands::Overview { json } => {
            let crm = open(db_path).await?;
            let o = crm.orchestrator().dashboard_overview_at(now).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&o)?);
            } else {
                print_overview(&o);
            }
        }
        Commands::Duration {
            hours,
            business_from,
            business_to,
        } => {
            print_duration(hours, business_from.as_deref(), business_to.as_deref())?;
        }
        Commands::Config { action } => {
            handle_config(&open(db_path).await?, action).await?;
        }
        Commands::Status => {
            print_status(&open(db_path).await?).await?;
        }
    }

    Ok(())
}

fn print_duration(hours: f64, from: Option<&str>, to: Option<&str>) -> anyhow::Result<()> {
    println!("{}", crmetrics::format_duration(hours));
    if let (Some(from), Some(to)) = (from, to) {
        let start = crmetrics::date_util::parse_sql_ts(from)?;
        let end = crmetrics::date_util::parse_sql_ts(to)?;
        println!("Business hours: {}", crmetrics::business_hours(start, end));
    }
    Ok(())
}

async fn handle_config(crm: &CrmMetrics, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => match crm.config_get(&key).await? {
            Some(v) => println!("{key} = {v}"),
            None => println!("{key} is not set"),
        },
        ConfigAction::Set { key, value } => {
            crm.config_set(&key, &value).await?;
            println!("Config updated.");
        }
        ConfigAction::List => {
            let items = crm.config_list().await?;
            if items.is_empty() {
                println!("No configuration set.");
            } else {
                for (k, v) in items {
                    println!("{k} = {v}");
                }
            }
        }
    }
    Ok(())
}

async fn print_status(crm: &CrmMetrics) -> anyhow::Result<()> {
    let counts = crm.table_counts().await?;
    println!("Warehouse Status");
    for (entity, n) in counts {
        println!("  {:<10} {n}", format!("{entity}:"));
    }
    let config = crm.orchestrator().config();
    println!(
        "  Windows:   {} months, {} weeks",
        config.monthly_window.count(),
        config.weekly_window.count()
    );
    Ok(())
}

fn print_deals(r: &crmetrics::DealAnalyticsReport) {
    println!("Deal Analytics");
    println!("  Total:       {} ({:.2})", r.total_deals, r.total_value);
    println!("  Won:         {} ({:.2})", r.won_deals, r.won_value);
    println!("  Lost:        {}", r.lost_deals);
    println!("  Active:      {} ({:.2} in pipeline)", r.active_deals, r.pipeline_value);
    println!("  Conversion:  {:.1}%", r.conversion_rate);
    println!("  Win rate:    {:.1}%", r.win_rate);
    println!("  Avg size:    {:.2}", r.average_deal_size);
    print_time("Sales Cycle", &r.sales_cycle);
    print_distribution("Stages", &r.stage_distribution);
    print_trend("Monthly Revenue", &r.monthly_revenue);
    if !r.top_performers.is_empty() {
        println!("  Top Performers:");
        for p in &r.top_performers {
            println!(
                "    {:<20} {} won ({:.2})",
                p.name.as_deref().unwrap_or(&p.assignee_id),
                p.deals_won,
                p.won_value
            );
        }
    }
}

fn print_tasks(r: &crmetrics::TaskAnalyticsReport) {
    println!("Task Analytics");
    println!("  Total:       {}", r.total_tasks);
    println!("  Completed:   {} ({:.1}%)", r.completed_tasks, r.completion_rate);
    println!("  Pending:     {}", r.pending_tasks);
    println!("  Overdue:     {}", r.overdue_tasks);
    println!(
        "  SLA:         {}/{} met ({:.1}%)",
        r.sla_met, r.sla_tracked, r.sla_compliance_rate
    );
    print_time("Completion Time", &r.completion_time);
    print_distribution("Priority", &r.priority_distribution);
    print_distribution("Status", &r.status_distribution);
    if !r.weekly_trend.is_empty() {
        println!("  Weekly Trend:");
        for p in &r.weekly_trend {
            println!("    {}  created {:>4}  completed {:>4}", p.period_label, p.created, p.completed);
        }
    }
}

fn print_leads(r: &crmetrics::LeadAnalyticsReport) {
    println!("Lead Analytics");
    println!("  Total:       {}", r.total_leads);
    println!("  Active:      {}", r.active_leads);
    println!("  Converted:   {} ({:.1}%)", r.converted_leads, r.conversion_rate);
    print_time("Time to Convert", &r.conversion_time);
    print_distribution("Sources", &r.source_distribution);
    print_distribution("Status", &r.status_distribution);
    print_trend("Monthly Leads", &r.monthly_trend);
}

fn print_overview(o: &crmetrics::DashboardOverview) {
    let s = &o.summary;
    println!("Dashboard Overview ({})", o.generated_at.format("%Y-%m-%d %H:%M UTC"));
    println!(
        "  Leads: {}  Deals: {}  Tasks: {}  Contacts: {}  Companies: {}",
        s.counts.leads, s.counts.deals, s.counts.tasks, s.counts.contacts, s.counts.companies
    );
    println!("  Revenue:");
    println!("    Won:        {:.2}", s.revenue.won_revenue);
    println!("    This month: {:.2}", s.revenue.revenue_this_month);
    println!("    Pipeline:   {:.2}", s.revenue.pipeline_value);
    println!("  Task completion: {:.1}%", s.task_completion_rate);
    print_distribution("Lead Status", &s.lead_status);
    print_distribution("Deal Status", &s.deal_status);

    if !s.top_deals.is_empty() {
        println!("  Top Deals:");
        for d in &s.top_deals {
            println!("    {:<24} {:>12.2}  {}", d.title, d.value, d.status);
        }
    }
    if !s.upcoming_tasks.is_empty() {
        println!("  Upcoming Tasks:");
        for t in &s.upcoming_tasks {
            println!(
                "    {:<24} due in {} ({} business hours)",
                t.title, t.due_in, t.business_hours_left
            );
        }
    }
    if !s.recent_activity.is_empty() {
        println!("  Recent Activity:");
        for a in &s.recent_activity {
            println!("    [{}] {} ({}) {}", a.entity, a.name, a.status, a.time_ago);
        }
    }

    println!();
    print_deals(&o.deals);
    println!();
    print_tasks(&o.tasks);
    println!();
    print_leads(&o.leads);

    if o.is_degraded() {
        eprintln!();
        eprintln!("Warning: some sections could not be loaded:");
        for f in &o.failed_sections {
            eprintln!("  {}: {}", f.section, f.error);
        }
    }
}

fn print_time(title: &str, t: &TimeMetrics) {
    println!("  {title}:");
    if t.count == 0 {
        println!("    No completed items");
        return;
    }
    println!("    Average: {}", crmetrics::format_duration(t.average_hours));
    println!("    Median:  {}", crmetrics::format_duration(t.median_hours));
    println!(
        "    Range:   {} - {}",
        crmetrics::format_duration(t.min_hours),
        crmetrics::format_duration(t.max_hours)
    );
}

fn print_distribution(title: &str, d: &Distribution) {
    if d.is_empty() {
        return;
    }
    println!("  {title}:");
    for b in &d.buckets {
        println!("    {:<16} {:>5} ({:.1}%)", b.label, b.count, b.percentage);
    }
}

fn print_trend(title: &str, points: &[TrendPoint]) {
    if points.is_empty() {
        return;
    }
    println!("  {title}:");
    for p in points {
        println!("    {}  {:>5}  {:>12.2}", p.period_label, p.count, p.sum_value);
    }
}
