use clap::{Parser, Subcommand};

use perfodw::{
    AggregatedTotals, Goal, HealthTier, IngestOptions, InsightQuery, Level, Metric, PerfoDW,
    Period, Platform, StoreClient,
};

#[derive(Parser)]
#[command(name = "perfodw", about = "Ad performance data warehouse CLI")]
struct Cli {
    /// Database path (default: ~/.perfodw/perfodw.db)
    #[arg(long)]
    db: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Progress reporter that writes to stderr.
struct StderrProgress;

impl perfodw::IngestProgress for StderrProgress {
    fn on_entity_start(&self, entity_key: &str, index: usize, total: usize) {
        eprintln!("[{}/{}] Ingesting {}...", index + 1, total, entity_key);
    }

    fn on_rows_fetched(&self, _entity_key: &str, level: Level, count: usize) {
        eprintln!("  Fetched {} {} rows", count, level.as_str());
    }

    fn on_entity_complete(&self, report: &perfodw::IngestReport) {
        eprintln!("  Done: {} rows ingested", report.rows_ingested);
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest insight rows from the remote store
    Ingest {
        #[command(subcommand)]
        target: IngestTarget,
    },
    /// Manage registered ad accounts
    Accounts {
        #[command(subcommand)]
        action: AccountAction,
    },
    /// Manage clients and their linked accounts
    Clients {
        #[command(subcommand)]
        action: ClientAction,
    },
    /// Aggregated totals for an account
    Totals {
        /// Account ID (Meta `act_` prefix accepted)
        account_id: String,
        /// Restrict to one platform: meta, google
        #[arg(long)]
        platform: Option<String>,
        /// Period (e.g. mtd, ytd, 30d, 2026-08, 2026)
        #[arg(long, default_value = "mtd")]
        period: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Per-entity breakdown for an account, ordered by spend
    Report {
        /// Account ID (Meta `act_` prefix accepted)
        account_id: String,
        /// Breakdown level: campaign, adset, ad
        #[arg(long, default_value = "campaign")]
        level: String,
        /// Restrict to one platform: meta, google
        #[arg(long)]
        platform: Option<String>,
        #[arg(long, default_value = "mtd")]
        period: String,
        #[arg(long)]
        json: bool,
    },
    /// Query raw insight rows with filters
    Query {
        /// Filter by account ID
        #[arg(long)]
        account: Option<String>,
        /// Filter by platform: meta, google
        #[arg(long)]
        platform: Option<String>,
        /// Filter by level: campaign, adset, ad
        #[arg(long)]
        level: Option<String>,
        /// Date on or after (YYYY-MM-DD)
        #[arg(long)]
        date_after: Option<String>,
        /// Date on or before (YYYY-MM-DD)
        #[arg(long)]
        date_before: Option<String>,
        /// Maximum results
        #[arg(long, default_value = "100")]
        limit: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
        /// Output as CSV
        #[arg(long)]
        csv: bool,
        /// Count only (no output rows)
        #[arg(long)]
        count: bool,
    },
    /// Manage performance goals
    Goal {
        #[command(subcommand)]
        action: GoalAction,
    },
    /// Evaluate a client's configured KPIs
    Kpi {
        /// Client ID
        client_id: String,
        #[arg(long, default_value = "mtd")]
        period: String,
        #[arg(long)]
        json: bool,
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
enum IngestTarget {
    /// Ingest a single account
    Account {
        /// Platform: meta, google
        platform: String,
        /// Account ID (Meta `act_` prefix accepted)
        account_id: String,
        /// Number of days to look back
        #[arg(long)]
        days: Option<u32>,
        /// Ingest data since this date (YYYY-MM-DD)
        #[arg(long)]
        since: Option<String>,
        /// Per-request row cap
        #[arg(long)]
        row_limit: Option<u32>,
    },
    /// Ingest all registered accounts
    All {
        #[arg(long)]
        days: Option<u32>,
        #[arg(long)]
        since: Option<String>,
    },
}

#[derive(Subcommand)]
enum AccountAction {
    /// Register an account for ingestion
    Add {
        /// Platform: meta, google
        platform: String,
        /// Account ID (Meta `act_` prefix accepted)
        account_id: String,
        /// Display name
        #[arg(long)]
        name: Option<String>,
    },
    /// Unregister an account
    Remove {
        /// Account key (e.g. meta:123456)
        account_key: String,
    },
    /// List registered accounts
    List,
}

#[derive(Subcommand)]
enum ClientAction {
    /// Add or update a client
    Set {
        /// Client ID
        client_id: String,
        /// Client name
        name: String,
        /// Monthly budget
        #[arg(long)]
        budget: Option<f64>,
        /// Linked Meta account ID
        #[arg(long)]
        meta_account: Option<String>,
        /// Linked Google account ID
        #[arg(long)]
        google_account: Option<String>,
        /// First KPI slot as NAME:METRIC:TARGET (e.g. "CPA objetivo:cpa:12.5")
        #[arg(long)]
        kpi1: Option<String>,
        /// Second KPI slot as NAME:METRIC:TARGET
        #[arg(long)]
        kpi2: Option<String>,
    },
    /// Remove a client
    Remove {
        client_id: String,
    },
    /// List clients
    List,
}

#[derive(Subcommand)]
enum GoalAction {
    /// Set a goal for an entity key
    Set {
        /// Entity key (e.g. meta:123456)
        entity_key: String,
        /// Metric: impressions, clicks, spend, conversions, revenue, ctr, cpc, cpm, roas, cpa
        metric: String,
        /// Target value
        target: f64,
        /// Override direction: higher, lower
        #[arg(long)]
        direction: Option<String>,
        /// Free-form note
        #[arg(long)]
        note: Option<String>,
    },
    /// Remove a goal
    Remove {
        entity_key: String,
    },
    /// List stored goals
    List,
    /// Evaluate goal progress over a period
    Progress {
        /// Entity key; omit to evaluate every goal
        entity_key: Option<String>,
        #[arg(long, default_value = "mtd")]
        period: String,
        #[arg(long)]
        json: bool,
    },
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

fn parse_since(since: Option<&str>) -> Option<chrono::NaiveDate> {
    since.and_then(|s| chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

fn parse_platform_opt(platform: Option<&str>) -> anyhow::Result<Option<Platform>> {
    platform
        .map(|p| Platform::parse(p).map_err(|e| anyhow::anyhow!("{e}")))
        .transpose()
}

/// Parse a KPI slot flag of the form `NAME:METRIC:TARGET`.
///
/// The name may itself contain colons; metric and target are the last two
/// segments.
fn parse_kpi_slot(s: &str) -> anyhow::Result<perfodw::KpiSlot> {
    let parts: Vec<&str> = s.rsplitn(3, ':').collect();
    if parts.len() != 3 {
        anyhow::bail!("KPI slot must be NAME:METRIC:TARGET, got: {s}");
    }
    let target: f64 = parts[0]
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid KPI target: {}", parts[0]))?;
    let metric = Metric::parse(parts[1]).map_err(|e| anyhow::anyhow!("{e}"))?;
    Ok(perfodw::KpiSlot {
        name: parts[2].trim().to_string(),
        metric,
        target,
    })
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

    let db = match &cli.db {
        Some(path) => perfodw::Database::open_at(path).await?,
        None => perfodw::Database::open().await?,
    };

    match cli.command {
        Commands::Status => {
            print_status(&db).await?;
        }
        Commands::Config { action } => {
            let dw = PerfoDW::new(db, None);
            handle_config(&dw, action).await?;
        }
        Commands::Ingest { target } => {
            let store = StoreClient::from_env()?;
            let dw = PerfoDW::new(db, Some(store));
            handle_ingest(&dw, target).await?;
        }
        Commands::Accounts { action } => {
            let dw = PerfoDW::new(db, None);
            handle_accounts(&dw, action).await?;
        }
        Commands::Clients { action } => {
            let dw = PerfoDW::new(db, None);
            handle_clients(&dw, action).await?;
        }
        Commands::Totals {
            account_id,
            platform,
            period,
            json,
        } => {
            let platform = parse_platform_opt(platform.as_deref())?;
            let p = Period::parse(&period)?;
            let account_id = normalize_for(platform, &account_id);
            let totals = perfodw::metrics::account_totals(&db, &account_id, platform, &p).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&totals)?);
            } else {
                println!("Totals: {account_id} ({p})");
                print_totals(&totals);
            }
        }
        Commands::Report {
            account_id,
            level,
            platform,
            period,
            json,
        } => {
            let platform = parse_platform_opt(platform.as_deref())?;
            let level = Level::parse(&level).map_err(|e| anyhow::anyhow!("{e}"))?;
            let p = Period::parse(&period)?;
            let account_id = normalize_for(platform, &account_id);
            let rows =
                perfodw::metrics::breakdown(&db, &account_id, platform, level, &p).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if rows.is_empty() {
                println!("No {} rows for {account_id} in {p}.", level.as_str());
            } else {
                println!("Report: {account_id} by {} ({p})", level.as_str());
                for row in &rows {
                    let name = row.name.as_deref().unwrap_or(&row.entity_id);
                    println!(
                        "  {name} ({}) | spend {:.2} | conv {:.1} | cpa {}",
                        row.entity_id,
                        row.spend,
                        row.conversions,
                        fmt_opt(row.cpa),
                    );
                }
                println!("\n{} entities", rows.len());
            }
        }
        Commands::Query {
            account,
            platform,
            level,
            date_after,
            date_before,
            limit,
            json,
            csv,
            count,
        } => {
            let mut builder = InsightQuery::new().limit(limit);
            if let Some(ref a) = account {
                builder = builder.account(a);
            }
            if let Some(p) = parse_platform_opt(platform.as_deref())? {
                builder = builder.platform(p);
            }
            if let Some(ref l) = level {
                let level = Level::parse(l).map_err(|e| anyhow::anyhow!("{e}"))?;
                builder = builder.level(level);
            }
            if let Some(ref d) = date_after {
                builder = builder.date_after(d);
            }
            if let Some(ref d) = date_before {
                builder = builder.date_before(d);
            }

            if count {
                let n = builder.count(&db).await?;
                println!("{n}");
            } else if json {
                let output = builder.to_json(&db).await?;
                println!("{output}");
            } else if csv {
                let output = builder.to_csv(&db).await?;
                print!("{output}");
            } else {
                let rows = builder.rows(&db).await?;
                if rows.is_empty() {
                    println!("No rows found.");
                } else {
                    for row in &rows {
                        let name = row.entity_name.as_deref().unwrap_or(&row.entity_id);
                        println!(
                            "{} [{}/{}] {name} | spend {:.2} | impr {} | clicks {}",
                            row.date_key, row.platform, row.level, row.spend, row.impressions,
                            row.clicks
                        );
                    }
                    println!("\n{} rows", rows.len());
                }
            }
        }
        Commands::Goal { action } => {
            let dw = PerfoDW::new(db, None);
            handle_goal(&dw, action).await?;
        }
        Commands::Kpi {
            client_id,
            period,
            json,
        } => {
            let dw = PerfoDW::new(db, None);
            let p = Period::parse(&period)?;
            let reports = dw.client_kpis(&client_id, &p).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else if reports.is_empty() {
                println!("No KPIs configured for {client_id}.");
            } else {
                println!("KPIs: {client_id} ({p})");
                for r in &reports {
                    println!(
                        "  [{}] {} — target {} {}, actual {}",
                        health_label(r.health),
                        r.name,
                        r.target,
                        r.metric,
                        fmt_opt(r.actual),
                    );
                }
            }
        }
    }

    Ok(())
}

fn normalize_for(platform: Option<Platform>, account_id: &str) -> String {
    match platform {
        Some(p) => perfodw::ident::normalize_account_id(p, account_id).to_string(),
        // No platform filter: still strip Meta's act_ prefix if present.
        None => perfodw::ident::normalize_account_id(Platform::Meta, account_id).to_string(),
    }
}

async fn print_status(db: &perfodw::Database) -> anyhow::Result<()> {
    let stats = db
        .reader()
        .call(|conn| {
            let insights: i64 =
                conn.query_row("SELECT COUNT(*) FROM fact_insights", [], |row| row.get(0))?;
            let accounts: i64 = conn.query_row(
                "SELECT COUNT(*) FROM dim_accounts WHERE ingest_enabled = 1",
                [],
                |row| row.get(0),
            )?;
            let clients: i64 =
                conn.query_row("SELECT COUNT(*) FROM dim_clients", [], |row| row.get(0))?;
            let goals: i64 = conn.query_row("SELECT COUNT(*) FROM goals", [], |row| row.get(0))?;
            let last_ingest: Option<String> = conn
                .query_row(
                    "SELECT MAX(completed_at) FROM ingest_jobs WHERE status = 'completed'",
                    [],
                    |row| row.get(0),
                )
                .ok();
            Ok::<_, rusqlite::Error>((insights, accounts, clients, goals, last_ingest))
        })
        .await?;

    let (insights, accounts, clients, goals, last_ingest) = stats;
    println!("Warehouse Status");
    println!("  Insight rows: {insights}");
    println!("  Accounts:     {accounts}");
    println!("  Clients:      {clients}");
    println!("  Goals:        {goals}");
    println!(
        "  Last ingest:  {}",
        last_ingest.unwrap_or_else(|| "never".to_string())
    );

    let jobs = db
        .reader()
        .call(|conn| perfodw::storage::repository::recent_ingest_jobs(conn, 5))
        .await?;
    if !jobs.is_empty() {
        println!("  Recent jobs:");
        for job in &jobs {
            println!(
                "    {} {} ({} rows, {} rejected)",
                job.started_at, job.entity_key, job.rows_ingested, job.rows_rejected
            );
        }
    }
    Ok(())
}

async fn handle_ingest(dw: &PerfoDW, target: IngestTarget) -> anyhow::Result<()> {
    let progress = StderrProgress;
    match target {
        IngestTarget::Account {
            platform,
            account_id,
            days,
            since,
            row_limit,
        } => {
            let platform = Platform::parse(&platform).map_err(|e| anyhow::anyhow!("{e}"))?;
            let options = IngestOptions {
                since: parse_since(since.as_deref()),
                days,
                row_limit,
            };
            let report = dw
                .ingest_account(platform, &account_id, &options, &progress)
                .await?;
            print_ingest_report(&report);
        }
        IngestTarget::All { days, since } => {
            let options = IngestOptions {
                since: parse_since(since.as_deref()),
                days,
                row_limit: None,
            };
            let reports = dw.ingest_all(&options, &progress).await?;
            for report in &reports {
                print_ingest_report(report);
                println!();
            }
            if reports.is_empty() {
                println!("No registered accounts to ingest. Use 'accounts add' first.");
            }
        }
    }
    Ok(())
}

async fn handle_config(dw: &PerfoDW, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let val = dw.config_get(&key).await?;
            match val {
                Some(v) => println!("{key} = {v}"),
                None => println!("{key} is not set"),
            }
        }
        ConfigAction::Set { key, value } => {
            dw.config_set(&key, &value).await?;
            println!("Config updated.");
        }
        ConfigAction::List => {
            let items = dw.config_list().await?;
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

async fn handle_accounts(dw: &PerfoDW, action: AccountAction) -> anyhow::Result<()> {
    match action {
        AccountAction::Add {
            platform,
            account_id,
            name,
        } => {
            let platform = Platform::parse(&platform).map_err(|e| anyhow::anyhow!("{e}"))?;
            let key = dw.account_add(platform, &account_id, name.as_deref()).await?;
            println!("Added: {key}");
        }
        AccountAction::Remove { account_key } => {
            let removed = dw.account_remove(&account_key).await?;
            if removed {
                println!("Removed: {account_key}");
            } else {
                println!("Not found: {account_key}");
            }
        }
        AccountAction::List => {
            let accounts = dw.account_list().await?;
            if accounts.is_empty() {
                println!("No registered accounts.");
            } else {
                for a in accounts {
                    let name = a.display_name.as_deref().unwrap_or("");
                    let last = a.last_ingest_at.as_deref().unwrap_or("never");
                    println!("{} {} (last ingest: {})", a.account_key, name, last);
                }
            }
        }
    }
    Ok(())
}

async fn handle_clients(dw: &PerfoDW, action: ClientAction) -> anyhow::Result<()> {
    match action {
        ClientAction::Set {
            client_id,
            name,
            budget,
            meta_account,
            google_account,
            kpi1,
            kpi2,
        } => {
            let client = perfodw::Client {
                client_id: client_id.clone(),
                name,
                monthly_budget: budget,
                meta_account_id: meta_account
                    .map(|a| perfodw::ident::normalize_meta_account_id(&a).to_string()),
                google_account_id: google_account,
                kpi1: kpi1.as_deref().map(parse_kpi_slot).transpose()?,
                kpi2: kpi2.as_deref().map(parse_kpi_slot).transpose()?,
                created_at: String::new(),
            };
            dw.client_set(client).await?;
            println!("Saved: {client_id}");
        }
        ClientAction::Remove { client_id } => {
            let removed = dw.client_remove(&client_id).await?;
            if removed {
                println!("Removed: {client_id}");
            } else {
                println!("Not found: {client_id}");
            }
        }
        ClientAction::List => {
            let clients = dw.client_list().await?;
            if clients.is_empty() {
                println!("No clients.");
            } else {
                for c in clients {
                    let meta = c.meta_account_id.as_deref().unwrap_or("-");
                    let google = c.google_account_id.as_deref().unwrap_or("-");
                    println!("{} {} (meta: {meta}, google: {google})", c.client_id, c.name);
                }
            }
        }
    }
    Ok(())
}

async fn handle_goal(dw: &PerfoDW, action: GoalAction) -> anyhow::Result<()> {
    match action {
        GoalAction::Set {
            entity_key,
            metric,
            target,
            direction,
            note,
        } => {
            let metric = Metric::parse(&metric).map_err(|e| anyhow::anyhow!("{e}"))?;
            let direction = match direction.as_deref() {
                Some(d) => Some(
                    perfodw::Direction::parse_opt(d)
                        .ok_or_else(|| anyhow::anyhow!("direction must be higher or lower: {d}"))?,
                ),
                None => None,
            };
            dw.goal_set(Goal {
                entity_key: entity_key.clone(),
                metric,
                target,
                direction,
                note,
            })
            .await?;
            println!("Goal set: {entity_key} {metric} {target}");
        }
        GoalAction::Remove { entity_key } => {
            let removed = dw.goal_remove(&entity_key).await?;
            if removed {
                println!("Removed: {entity_key}");
            } else {
                println!("Not found: {entity_key}");
            }
        }
        GoalAction::List => {
            let stored = dw.goal_list().await?;
            if stored.is_empty() {
                println!("No goals.");
            } else {
                for g in stored {
                    let direction = g
                        .direction
                        .map(|d| format!(" ({})", d.as_str()))
                        .unwrap_or_default();
                    let note = g.note.as_deref().map(|n| format!(" — {n}")).unwrap_or_default();
                    println!("{} {} {}{direction}{note}", g.entity_key, g.metric, g.target);
                }
            }
        }
        GoalAction::Progress {
            entity_key,
            period,
            json,
        } => {
            let p = Period::parse(&period)?;
            let results = match entity_key {
                Some(key) => vec![dw.goal_progress(&key, &p).await?],
                None => dw.goal_progress_all(&p).await?,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else if results.is_empty() {
                println!("No goals to evaluate.");
            } else {
                println!("Goal progress ({p})");
                for r in &results {
                    println!(
                        "  [{}] {} {} — target {}, actual {}, {:.0}% complete",
                        health_label(r.health),
                        r.entity_key,
                        r.metric,
                        r.target,
                        fmt_opt(r.actual),
                        r.progress_pct,
                    );
                    if let Some(remaining) = r.remaining {
                        println!("    Remaining: {remaining:.1}");
                    }
                }
            }
        }
    }
    Ok(())
}

fn print_totals(totals: &AggregatedTotals) {
    println!("  Impressions: {}", totals.impressions);
    println!("  Clicks:      {}", totals.clicks);
    println!("  Spend:       {:.2}", totals.spend);
    println!("  Conversions: {:.1}", totals.conversions);
    println!("  Revenue:     {:.2}", totals.revenue);
    println!("  CTR:         {}", fmt_opt(totals.ctr()));
    println!("  CPC:         {}", fmt_opt(totals.cpc()));
    println!("  CPM:         {}", fmt_opt(totals.cpm()));
    println!("  CPA:         {}", fmt_opt(totals.cpa()));
    println!("  ROAS:        {}", fmt_opt(totals.roas()));
}

fn print_ingest_report(report: &perfodw::IngestReport) {
    println!("Ingest: {}", report.entity_key);
    println!("  Status:   {:?}", report.status);
    println!("  Ingested: {} rows", report.rows_ingested);
    println!("  Rejected: {} rows", report.rows_rejected);
    if let Some(ref err) = report.error {
        println!("  Error:    {err}");
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.2}"),
        None => "-".to_string(),
    }
}

fn health_label(health: HealthTier) -> &'static str {
    match health {
        HealthTier::Good => "OK",
        HealthTier::Warn => "WARN",
        HealthTier::Bad => "BAD",
        HealthTier::Unavailable => "N/A",
    }
}
