use clap::{Parser, Subcommand};
use netwarden_cache::{HttpUpstream, ResponseCache};
use netwarden_core::{ChatId, NetwardenConfig, NetwardenError};
use netwarden_guard::{
    AccessController, Housekeeper, InputKind, RateLimiter, ShellInputValidator,
};
use netwarden_store::Store;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Netwarden -- operator tooling for the access-control store.
#[derive(Parser, Debug)]
#[command(name = "netwarden", version, about)]
struct Cli {
    /// Path to netwarden.toml (overrides NETWARDEN_CONFIG)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show command, failure and ban counters
    Stats {
        /// Size of the trailing window in hours
        #[arg(long, default_value_t = 24)]
        hours: u32,
    },

    /// Clear a principal's failed attempts and lift its ban
    Reset {
        #[arg(allow_negative_numbers = true)]
        chat_id: ChatId,
    },

    /// Show a principal's failure counter and ban state
    BanStatus {
        #[arg(allow_negative_numbers = true)]
        chat_id: ChatId,
    },

    /// Delete stale rate events and expired cache entries now
    Sweep,

    /// Check a command argument the way handlers do
    Validate {
        /// host, domain, port or port_range
        kind: InputKind,
        value: String,
    },

    /// Show the most recent audit records
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Load the configuration and build every component
    CheckConfig,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "netwarden=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = NetwardenConfig::load(cli.config.as_deref()).map_err(coded)?;
    let json = cli.json;

    match cli.command {
        Commands::Stats { hours } => {
            let stats = open_store(&config)?.stats(hours)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("last {hours}h");
                println!("  commands:          {}", stats.commands);
                println!("  failed attempts:   {}", stats.failed_attempts);
                println!("  banned principals: {}", stats.banned_principals);
            }
        }
        Commands::Reset { chat_id } => {
            let controller =
                AccessController::new(&config, open_store(&config)?).map_err(coded)?;
            controller.bans().reset(chat_id)?;
            println!("reset failed attempts for {chat_id}");
        }
        Commands::BanStatus { chat_id } => {
            let controller =
                AccessController::new(&config, open_store(&config)?).map_err(coded)?;
            match (controller.bans().record(chat_id)?, json) {
                (None, _) => println!("no failed attempts recorded for {chat_id}"),
                (Some(record), true) => println!("{}", serde_json::to_string_pretty(&record)?),
                (Some(record), false) => {
                    println!("chat {chat_id}");
                    println!("  attempts:     {}", record.attempts);
                    println!("  last attempt: {}", format_ts(record.last_attempt));
                    println!(
                        "  last reason:  {}",
                        record.last_reason.as_deref().unwrap_or("-")
                    );
                    if record.is_banned_at(chrono::Utc::now().timestamp()) {
                        println!("  banned until: {}", format_ts(record.banned_until));
                    } else {
                        println!("  banned:       no");
                    }
                }
            }
        }
        Commands::Sweep => {
            let store = open_store(&config)?;
            let housekeeper = Housekeeper::new(
                RateLimiter::new(store.clone(), &config.security),
                ResponseCache::new(store, &config.cache),
                config.cache.housekeeping_one_in,
            );
            let report = housekeeper.run_now()?;
            info!(
                rate_events = report.rate_events,
                cache_entries = report.cache_entries,
                "sweep complete"
            );
            println!(
                "removed {} rate events, {} cache entries",
                report.rate_events, report.cache_entries
            );
        }
        Commands::Validate { kind, value } => {
            let validator =
                ShellInputValidator::new(&config.security.ip_whitelist).map_err(coded)?;
            match validator.validate(&value, kind) {
                Ok(normalized) => println!("ok: {normalized}"),
                Err(e) => {
                    println!("rejected: {e}");
                    std::process::exit(1);
                }
            }
        }
        Commands::History { limit } => {
            let records = open_store(&config)?.recent_audit(limit)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                for r in records {
                    println!(
                        "{}  {:>14}  {:<16} /{:<20} {:>8.1}ms  {}",
                        format_ts(r.timestamp),
                        r.chat_id.as_i64(),
                        r.display_name,
                        r.command,
                        r.duration_ms,
                        if r.success { "ok" } else { "FAILED" }
                    );
                }
            }
        }
        Commands::CheckConfig => {
            ShellInputValidator::new(&config.security.ip_whitelist).map_err(coded)?;
            HttpUpstream::new(&config.upstream)?;
            let controller =
                AccessController::new(&config, open_store(&config)?).map_err(coded)?;
            println!("configuration OK");
            println!("  database:      {}", config.database.path);
            println!("  allowed chats: {}", config.access.allowed_chat_ids.len());
            println!("  roles:         {}", config.roles.len());
            if controller.permissions().is_open_mode() {
                println!("  warning: no role assignments, every command is permitted");
            }
        }
    }
    Ok(())
}

fn open_store(config: &NetwardenConfig) -> anyhow::Result<Store> {
    Ok(Store::open(&config.database.path)?)
}

/// Prefix configuration errors with their stable code.
fn coded(e: NetwardenError) -> anyhow::Error {
    anyhow::anyhow!("[{}] {e}", e.code())
}

fn format_ts(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ts.to_string())
}
