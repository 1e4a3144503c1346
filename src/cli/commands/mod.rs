//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod daemon;
mod db;
mod init;
mod limits;
mod queue;
mod schedule;
mod site;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crawlgate::config::{load_settings_with_options, LoadOptions};

#[derive(Parser)]
#[command(name = "crawlgate")]
#[command(about = "Site leasing, URL queueing and per-domain throttling for crawl workers")]
#[command(version)]
pub struct Cli {
    /// Data directory or database file (overrides config file).
    /// Can be a directory containing crawlgate.db or a .db file directly.
    #[arg(long, short = 't', global = true)]
    data: Option<PathBuf>,

    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Resolve relative paths from current working directory instead of config file location
    #[arg(long, global = true)]
    cwd: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print machine-readable JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (before full parsing).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and database
    Init,

    /// Manage crawl sites and their leases
    Site {
        #[command(subcommand)]
        command: SiteCommands,
    },

    /// Manage crawl schedules
    Schedule {
        #[command(subcommand)]
        command: ScheduleCommands,
    },

    /// Work with the URL scrape queue
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },

    /// Per-domain rate limits
    Limits {
        #[command(subcommand)]
        command: LimitCommands,
    },

    /// Database management commands
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },

    /// Run periodic maintenance until interrupted
    Daemon {
        /// Seconds between cycles (default from config)
        #[arg(short, long)]
        interval: Option<u64>,
        /// Run site dedupe every N cycles (0 disables)
        #[arg(long)]
        dedupe_every: Option<u32>,
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },
}

#[derive(Subcommand)]
enum SiteCommands {
    /// Register a site (URL is normalized)
    Add {
        url: String,
        /// Site type: greenhouse, lever, ashby, generic (detected from URL if omitted)
        #[arg(long = "type")]
        site_type: Option<String>,
        #[arg(long)]
        name: Option<String>,
        /// Crawl backend that handles this site
        #[arg(long)]
        provider: Option<String>,
        /// Schedule to attach
        #[arg(long)]
        schedule: Option<String>,
    },

    /// List sites
    List {
        #[arg(long = "type")]
        site_type: Option<String>,
        /// Only enabled sites
        #[arg(long, conflicts_with = "disabled")]
        enabled: bool,
        /// Only disabled sites
        #[arg(long)]
        disabled: bool,
        #[arg(long)]
        schedule: Option<String>,
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show one site and its lease state
    Show { id: String },

    /// Enable a site
    Enable { id: String },

    /// Disable a site
    Disable { id: String },

    /// Force a crawl within the manual trigger window
    Trigger { id: String },

    /// Clear failure, completion and lock state
    Reset { id: String },

    /// Attach a schedule to a site (omit to detach)
    Schedule {
        id: String,
        schedule_id: Option<String>,
    },

    /// Lease the most overdue eligible site
    Lease {
        /// Worker identifier recorded as the lock owner
        #[arg(long)]
        worker: String,
        /// Lease TTL in seconds (default from config)
        #[arg(long)]
        ttl: Option<u64>,
        #[arg(long = "type")]
        site_type: Option<String>,
        #[arg(long)]
        provider: Option<String>,
    },

    /// Mark a leased site's crawl as completed
    Complete { id: String },

    /// Mark a leased site's crawl as failed
    Fail {
        id: String,
        #[arg(long)]
        error: String,
    },
}

#[derive(Subcommand)]
enum ScheduleCommands {
    /// Create a schedule
    Add {
        name: String,
        /// Comma-separated days (mon,tue,...)
        #[arg(long, value_delimiter = ',')]
        days: Vec<String>,
        /// Local start time (HH:MM)
        #[arg(long)]
        start: String,
        /// Minutes between slots
        #[arg(long, default_value = "1440")]
        interval: i64,
        /// IANA timezone name
        #[arg(long, default_value = "UTC")]
        timezone: String,
    },

    /// Replace a schedule's definition
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, value_delimiter = ',')]
        days: Option<Vec<String>>,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        interval: Option<i64>,
        #[arg(long)]
        timezone: Option<String>,
    },

    /// List schedules
    List,

    /// Show a schedule with its latest and next slots
    Show { id: String },
}

#[derive(Subcommand)]
enum QueueCommands {
    /// Add URLs to the queue
    Enqueue {
        /// URLs to enqueue
        #[arg(required = true)]
        urls: Vec<String>,
        /// Page the URLs were discovered on
        #[arg(long)]
        source: String,
        #[arg(long)]
        provider: String,
        #[arg(long)]
        site: Option<String>,
        #[arg(long)]
        pattern: Option<String>,
        /// Do not lease before this many seconds from now
        #[arg(long)]
        delay: Option<u64>,
    },

    /// Lease a batch of pending URLs
    Lease {
        #[arg(long)]
        provider: Option<String>,
        /// Batch size (default from config)
        #[arg(short, long)]
        limit: Option<usize>,
        /// Per-minute cap for domains without a configured limit
        #[arg(long)]
        max_per_minute: Option<u32>,
    },

    /// Report the outcome for leased URLs
    Complete {
        #[arg(required = true)]
        urls: Vec<String>,
        /// Outcome: completed or failed
        #[arg(long, default_value = "completed")]
        status: String,
        #[arg(long)]
        error: Option<String>,
    },

    /// Return orphaned processing rows to pending
    RequeueStale {
        #[arg(long)]
        provider: Option<String>,
        /// Processing expiry in seconds (default from config)
        #[arg(long)]
        expiry: Option<u64>,
    },

    /// Reset rows with a status back to pending
    Reset {
        /// Status to reset: failed, completed, processing
        #[arg(long, default_value = "failed")]
        status: String,
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        site: Option<String>,
        #[arg(short, long, default_value = "1000")]
        limit: usize,
    },

    /// List queue rows
    List {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        provider: Option<String>,
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Show per-status counts
    Stats {
        #[arg(long)]
        provider: Option<String>,
    },

    /// Show recently ejected or evicted URLs
    Ignored {
        /// Filter by reason: max_attempts, http_404, stale_scrape_queue_entry
        #[arg(long)]
        reason: Option<String>,
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum LimitCommands {
    /// Set the per-minute cap for a domain
    Set { domain: String, max_per_minute: u32 },

    /// List domains and their current windows
    List,
}

#[derive(Subcommand)]
enum DbCommands {
    /// Merge duplicate sites that share a canonical URL
    Dedupe {
        /// Report what would change without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Apply pending schema migrations
    Migrate {
        /// Only report status
        #[arg(long)]
        check: bool,
    },
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        use_cwd: cli.cwd,
        data: cli.data,
    };
    let (settings, _config) = load_settings_with_options(options).await;
    let json = cli.json;

    match cli.command {
        Commands::Init => init::cmd_init(&settings).await,
        Commands::Site { command } => match command {
            SiteCommands::Add {
                url,
                site_type,
                name,
                provider,
                schedule,
            } => {
                site::cmd_site_add(
                    &settings,
                    &url,
                    site_type.as_deref(),
                    name,
                    provider,
                    schedule,
                    json,
                )
                .await
            }
            SiteCommands::List {
                site_type,
                enabled,
                disabled,
                schedule,
                limit,
            } => {
                let enabled = match (enabled, disabled) {
                    (true, _) => Some(true),
                    (_, true) => Some(false),
                    _ => None,
                };
                site::cmd_site_list(&settings, site_type.as_deref(), enabled, schedule, limit, json)
                    .await
            }
            SiteCommands::Show { id } => site::cmd_site_show(&settings, &id, json).await,
            SiteCommands::Enable { id } => {
                site::cmd_site_set_enabled(&settings, &id, true, json).await
            }
            SiteCommands::Disable { id } => {
                site::cmd_site_set_enabled(&settings, &id, false, json).await
            }
            SiteCommands::Trigger { id } => site::cmd_site_trigger(&settings, &id, json).await,
            SiteCommands::Reset { id } => site::cmd_site_reset(&settings, &id, json).await,
            SiteCommands::Schedule { id, schedule_id } => {
                site::cmd_site_schedule(&settings, &id, schedule_id.as_deref(), json).await
            }
            SiteCommands::Lease {
                worker,
                ttl,
                site_type,
                provider,
            } => {
                site::cmd_site_lease(
                    &settings,
                    &worker,
                    ttl,
                    site_type.as_deref(),
                    provider,
                    json,
                )
                .await
            }
            SiteCommands::Complete { id } => site::cmd_site_complete(&settings, &id, json).await,
            SiteCommands::Fail { id, error } => {
                site::cmd_site_fail(&settings, &id, &error, json).await
            }
        },
        Commands::Schedule { command } => match command {
            ScheduleCommands::Add {
                name,
                days,
                start,
                interval,
                timezone,
            } => {
                schedule::cmd_schedule_add(&settings, name, days, start, interval, timezone, json)
                    .await
            }
            ScheduleCommands::Update {
                id,
                name,
                days,
                start,
                interval,
                timezone,
            } => {
                let changes = schedule::ScheduleChanges {
                    name,
                    days,
                    start_time: start,
                    interval_minutes: interval,
                    timezone,
                };
                schedule::cmd_schedule_update(&settings, &id, changes, json).await
            }
            ScheduleCommands::List => schedule::cmd_schedule_list(&settings, json).await,
            ScheduleCommands::Show { id } => schedule::cmd_schedule_show(&settings, &id, json).await,
        },
        Commands::Queue { command } => match command {
            QueueCommands::Enqueue {
                urls,
                source,
                provider,
                site,
                pattern,
                delay,
            } => {
                queue::cmd_queue_enqueue(
                    &settings, urls, source, provider, site, pattern, delay, json,
                )
                .await
            }
            QueueCommands::Lease {
                provider,
                limit,
                max_per_minute,
            } => queue::cmd_queue_lease(&settings, provider, limit, max_per_minute, json).await,
            QueueCommands::Complete {
                urls,
                status,
                error,
            } => {
                queue::cmd_queue_complete(&settings, &urls, &status, error.as_deref(), json).await
            }
            QueueCommands::RequeueStale { provider, expiry } => {
                queue::cmd_queue_requeue_stale(&settings, provider.as_deref(), expiry, json).await
            }
            QueueCommands::Reset {
                status,
                provider,
                site,
                limit,
            } => {
                queue::cmd_queue_reset(
                    &settings,
                    &status,
                    provider.as_deref(),
                    site.as_deref(),
                    limit,
                    json,
                )
                .await
            }
            QueueCommands::List {
                status,
                provider,
                limit,
            } => {
                queue::cmd_queue_list(&settings, status.as_deref(), provider.as_deref(), limit, json)
                    .await
            }
            QueueCommands::Stats { provider } => {
                queue::cmd_queue_stats(&settings, provider.as_deref(), json).await
            }
            QueueCommands::Ignored { reason, limit } => {
                queue::cmd_queue_ignored(&settings, reason.as_deref(), limit, json).await
            }
        },
        Commands::Limits { command } => match command {
            LimitCommands::Set {
                domain,
                max_per_minute,
            } => limits::cmd_limits_set(&settings, &domain, max_per_minute, json).await,
            LimitCommands::List => limits::cmd_limits_list(&settings, json).await,
        },
        Commands::Db { command } => match command {
            DbCommands::Dedupe { dry_run } => db::cmd_db_dedupe(&settings, dry_run, json).await,
            DbCommands::Migrate { check } => db::cmd_migrate(&settings, check, json).await,
        },
        Commands::Daemon {
            interval,
            dedupe_every,
            once,
        } => daemon::cmd_daemon(&settings, interval, dedupe_every, once).await,
    }
}
