use std::collections::HashMap;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{NetwardenError, Result};
use crate::types::ChatId;

pub const DEFAULT_ROLE: &str = "viewer";
pub const DEFAULT_MAX_PER_MINUTE: u32 = 10;
pub const DEFAULT_MAX_PER_HOUR: u32 = 60;
pub const DEFAULT_MAX_FAILED_ATTEMPTS: u32 = 5;
pub const DEFAULT_BAN_DURATION_SECS: i64 = 3600;
pub const DEFAULT_CACHE_TTL_SECS: i64 = 300;
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;

/// Top-level config (netwarden.toml + NETWARDEN_* env overrides).
///
/// Loaded once at startup and handed to each component by value or reference.
/// Nothing reads configuration through a global.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetwardenConfig {
    /// Role of any chat without an `[assignments]` entry.
    #[serde(default = "default_role_name")]
    pub default_role: String,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub access: AccessConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    /// Role name → capability patterns. A pattern ending in `*` grants every
    /// permission that starts with the text before the `*`.
    #[serde(default = "default_role_table")]
    pub roles: HashMap<String, Vec<String>>,
    /// Chat id (as a TOML string key) → role name.
    #[serde(default)]
    pub assignments: HashMap<String, String>,
    /// Command verb → permission name. Verbs without an entry map to themselves.
    #[serde(default = "default_command_permissions")]
    pub commands: HashMap<String, String>,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
}

impl Default for NetwardenConfig {
    fn default() -> Self {
        Self {
            default_role: default_role_name(),
            database: DatabaseConfig::default(),
            access: AccessConfig::default(),
            security: SecurityConfig::default(),
            roles: default_role_table(),
            assignments: HashMap::new(),
            commands: default_command_permissions(),
            cache: CacheConfig::default(),
            upstream: UpstreamConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Chat and thread allow-lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessConfig {
    #[serde(default)]
    pub allowed_chat_ids: Vec<i64>,
    /// Only consulted for group chats that send a thread id.
    #[serde(default)]
    pub allowed_threads: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default = "bool_true")]
    pub rate_limiting: bool,
    #[serde(default = "default_max_per_minute")]
    pub max_commands_per_minute: u32,
    #[serde(default = "default_max_per_hour")]
    pub max_commands_per_hour: u32,
    /// When false, failures are neither counted nor lead to bans.
    #[serde(default = "bool_true")]
    pub log_failed_attempts: bool,
    #[serde(default = "default_max_failed_attempts")]
    pub max_failed_attempts: u32,
    #[serde(default = "default_ban_duration")]
    pub ban_duration_secs: i64,
    /// CIDR blocks a literal IP argument must fall into.
    #[serde(default = "default_ip_whitelist")]
    pub ip_whitelist: Vec<String>,
    /// Upper bound on a single command handler run.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            rate_limiting: true,
            max_commands_per_minute: DEFAULT_MAX_PER_MINUTE,
            max_commands_per_hour: DEFAULT_MAX_PER_HOUR,
            log_failed_attempts: true,
            max_failed_attempts: DEFAULT_MAX_FAILED_ATTEMPTS,
            ban_duration_secs: DEFAULT_BAN_DURATION_SECS,
            ip_whitelist: default_ip_whitelist(),
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: i64,
    /// Housekeeping runs on roughly one loop iteration in this many.
    #[serde(default = "default_housekeeping_one_in")]
    pub housekeeping_one_in: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: DEFAULT_CACHE_TTL_SECS,
            housekeeping_one_in: default_housekeeping_one_in(),
        }
    }
}

/// Monitoring backend (LibreNMS-style REST API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_upstream_url")]
    pub base_url: String,
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_upstream_url(),
            token: String::new(),
            timeout_secs: DEFAULT_UPSTREAM_TIMEOUT_SECS,
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_max_per_minute() -> u32 {
    DEFAULT_MAX_PER_MINUTE
}
fn default_max_per_hour() -> u32 {
    DEFAULT_MAX_PER_HOUR
}
fn default_max_failed_attempts() -> u32 {
    DEFAULT_MAX_FAILED_ATTEMPTS
}
fn default_ban_duration() -> i64 {
    DEFAULT_BAN_DURATION_SECS
}
fn default_command_timeout() -> u64 {
    DEFAULT_COMMAND_TIMEOUT_SECS
}
fn default_cache_ttl() -> i64 {
    DEFAULT_CACHE_TTL_SECS
}
fn default_housekeeping_one_in() -> u32 {
    100
}
fn default_upstream_url() -> String {
    "http://librenms.local".to_string()
}
fn default_upstream_timeout() -> u64 {
    DEFAULT_UPSTREAM_TIMEOUT_SECS
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_role_name() -> String {
    DEFAULT_ROLE.to_string()
}
fn default_ip_whitelist() -> Vec<String> {
    ["192.168.0.0/16", "10.0.0.0/8", "172.16.0.0/12"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.netwarden/netwarden.db", home)
}

fn default_role_table() -> HashMap<String, Vec<String>> {
    let to_vec = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    HashMap::from([
        (
            "admin".to_string(),
            to_vec(&[
                "alert_*",
                "device_*",
                "network_*",
                "maintenance_*",
                "schedule_*",
                "bot_*",
                "report_*",
                "system_*",
            ]),
        ),
        (
            "operator".to_string(),
            to_vec(&[
                "alert_list",
                "alert_ack",
                "alert_stats",
                "device_list",
                "device_status",
                "network_ping",
                "network_trace",
                "network_ns",
                "network_mtr",
                "network_dig",
                "report_daily",
            ]),
        ),
        (
            "viewer".to_string(),
            to_vec(&["alert_list", "device_list", "device_status", "alert_stats"]),
        ),
    ])
}

/// Verb → permission table of the stock command set.
fn default_command_permissions() -> HashMap<String, String> {
    [
        ("list", "alert_list"),
        ("ack", "alert_ack"),
        ("alert_history", "alert_history"),
        ("bulk_ack", "alert_bulk_ack"),
        ("escalate", "alert_escalate"),
        ("top_alerts", "alert_list"),
        ("list_device", "device_list"),
        ("port_status", "device_status"),
        ("bandwidth_top", "device_list"),
        ("maintenance", "device_maintenance"),
        ("performance_report", "device_status"),
        ("dashboard", "device_dashboard"),
        ("ping", "network_ping"),
        ("trace", "network_trace"),
        ("mtr", "network_mtr"),
        ("ns", "network_ns"),
        ("dig", "network_dig"),
        ("whois", "network_whois"),
        ("port_scan", "network_port_scan"),
        ("nmap", "network_port_scan"),
        ("ssl_check", "network_ssl"),
        ("http_check", "network_http"),
        ("network_summary", "network_ping"),
        ("help", "system_help"),
        ("health", "bot_health"),
        ("log", "system_log"),
        ("calc", "system_calc"),
        ("convert", "system_convert"),
        ("time", "system_time"),
    ]
    .iter()
    .map(|(verb, perm)| (verb.to_string(), perm.to_string()))
    .collect()
}

impl NetwardenConfig {
    /// Load config from a TOML file with NETWARDEN_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. NETWARDEN_CONFIG env var
    ///   3. ~/.netwarden/netwarden.toml
    ///
    /// Nested keys are addressed with a double underscore, e.g.
    /// `NETWARDEN_SECURITY__MAX_COMMANDS_PER_MINUTE=20`.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("NETWARDEN_CONFIG").ok())
            .unwrap_or_else(default_config_path);

        let config: NetwardenConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("NETWARDEN_").ignore(&["CONFIG"]).split("__"))
            .extract()
            .map_err(|e| NetwardenError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make a component misbehave at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.security.rate_limiting
            && (self.security.max_commands_per_minute == 0
                || self.security.max_commands_per_hour == 0)
        {
            return Err(NetwardenError::Config(
                "rate ceilings must be positive when rate limiting is enabled".to_string(),
            ));
        }
        if self.security.ban_duration_secs <= 0 {
            return Err(NetwardenError::Config(
                "security.ban_duration_secs must be positive".to_string(),
            ));
        }
        if self.cache.ttl_secs <= 0 {
            return Err(NetwardenError::Config(
                "cache.ttl_secs must be positive".to_string(),
            ));
        }
        for (chat_id, role) in self.role_assignments()? {
            if !self.roles.contains_key(&role) {
                return Err(NetwardenError::UnknownRole {
                    chat_id: chat_id.as_i64(),
                    role,
                });
            }
        }
        Ok(())
    }

    /// Parse the string-keyed `[assignments]` table into chat ids.
    pub fn role_assignments(&self) -> Result<HashMap<ChatId, String>> {
        self.assignments
            .iter()
            .map(|(key, role)| {
                key.parse::<ChatId>()
                    .map(|id| (id, role.clone()))
                    .map_err(|_| {
                        NetwardenError::Config(format!("assignment key is not a chat id: {key}"))
                    })
            })
            .collect()
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.netwarden/netwarden.toml", home)
}
