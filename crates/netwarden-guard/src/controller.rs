use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::FutureExt;
use netwarden_core::{NetwardenConfig, Principal};
use netwarden_store::{unix_now, AuditRecord, Store};
use tracing::{error, info, instrument, warn};

use crate::allow::AuthorizationGate;
use crate::ban::BanTracker;
use crate::error::{GuardError, Result};
use crate::permissions::PermissionEngine;
use crate::ratelimit::RateLimiter;

const INTERNAL_ERROR_REPLY: &str = "❌ Internal error during command execution.";

/// A slash command received from the messaging channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundCommand {
    pub principal: Principal,
    /// Verb without the leading `/`, e.g. `ping`.
    pub command: String,
    pub args: Vec<String>,
}

impl InboundCommand {
    /// Parse `/verb[@bot] arg1 arg2`. Returns `None` for plain chat text.
    pub fn parse(principal: Principal, text: &str) -> Option<Self> {
        let mut parts = text.split_whitespace();
        let head = parts.next()?.strip_prefix('/')?;
        let verb = head.split_once('@').map_or(head, |(verb, _bot)| verb);
        if verb.is_empty() {
            return None;
        }
        Some(Self {
            principal,
            command: verb.to_string(),
            args: parts.map(str::to_string).collect(),
        })
    }
}

/// Stage at which the pipeline turned a command away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    Unauthorized,
    Banned,
    RateLimited,
    PermissionDenied,
}

impl Denial {
    fn reply(&self, command: &str) -> String {
        match self {
            Denial::Unauthorized => "❌ Access denied.".to_string(),
            Denial::Banned => {
                "🚫 User temporarily banned for too many failed attempts.".to_string()
            }
            Denial::RateLimited => "⏳ Rate limit exceeded. Try again later.".to_string(),
            Denial::PermissionDenied => {
                format!("❌ Insufficient permissions for command /{command}")
            }
        }
    }
}

/// Result of one [`AccessController::handle`] call, with the text to send back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Denied { denial: Denial, reply: String },
    Succeeded { reply: String },
    Failed { reply: String },
}

impl Outcome {
    pub fn reply(&self) -> &str {
        match self {
            Outcome::Denied { reply, .. }
            | Outcome::Succeeded { reply }
            | Outcome::Failed { reply } => reply,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded { .. })
    }

    pub fn denial(&self) -> Option<Denial> {
        match self {
            Outcome::Denied { denial, .. } => Some(*denial),
            _ => None,
        }
    }
}

/// What a handler learns about the command it is running.
#[derive(Debug, Clone, Copy)]
pub struct CommandContext<'a> {
    pub command: &'a InboundCommand,
    /// Role the principal resolved to.
    pub role: &'a str,
    /// Permission that admitted the command.
    pub permission: &'a str,
}

/// Executes an admitted command and produces the reply text.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn execute(&self, ctx: CommandContext<'_>) -> anyhow::Result<String>;
}

/// Runs every inbound command through authorization, ban, rate and
/// permission checks, executes it, and writes one audit record.
pub struct AccessController {
    gate: AuthorizationGate,
    bans: BanTracker,
    limiter: RateLimiter,
    permissions: PermissionEngine,
    store: Store,
    command_timeout: Duration,
}

impl AccessController {
    pub fn new(config: &NetwardenConfig, store: Store) -> netwarden_core::Result<Self> {
        let bans = BanTracker::new(store.clone(), &config.security);
        Ok(Self {
            gate: AuthorizationGate::new(&config.access, bans.clone()),
            limiter: RateLimiter::new(store.clone(), &config.security),
            permissions: PermissionEngine::new(config, bans.clone())?,
            bans,
            store,
            command_timeout: Duration::from_secs(config.security.command_timeout_secs),
        })
    }

    pub fn bans(&self) -> &BanTracker {
        &self.bans
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn permissions(&self) -> &PermissionEngine {
        &self.permissions
    }

    /// Process one command end to end. Never returns an error: store failures
    /// and handler failures become [`Outcome::Failed`] with a generic reply.
    #[instrument(
        skip(self, cmd, handler),
        fields(chat_id = %cmd.principal.chat_id, command = %cmd.command)
    )]
    pub async fn handle(&self, cmd: InboundCommand, handler: &dyn CommandHandler) -> Outcome {
        let started = Instant::now();
        let received_at = unix_now();

        let outcome = match self.run(&cmd, handler).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "command failed");
                Outcome::Failed {
                    reply: INTERNAL_ERROR_REPLY.to_string(),
                }
            }
        };

        let record = AuditRecord {
            chat_id: cmd.principal.chat_id,
            display_name: cmd.principal.display_name.clone(),
            command: cmd.command.clone(),
            timestamp: received_at,
            success: outcome.is_success(),
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
        };
        if let Err(e) = self.store.append_audit(&record) {
            error!(error = %e, "failed to write audit record");
        }
        outcome
    }

    async fn run(&self, cmd: &InboundCommand, handler: &dyn CommandHandler) -> Result<Outcome> {
        let chat_id = cmd.principal.chat_id;

        if !self.gate.authorize(chat_id, cmd.principal.thread_id)? {
            return Ok(denied(Denial::Unauthorized, cmd));
        }
        if self.bans.is_banned(chat_id)? {
            info!("command from banned principal ignored");
            return Ok(denied(Denial::Banned, cmd));
        }
        if !self.limiter.allow(chat_id)? {
            return Ok(denied(Denial::RateLimited, cmd));
        }
        let permission = self.permissions.permission_for(&cmd.command);
        if !self.permissions.has_permission(chat_id, permission)? {
            return Ok(denied(Denial::PermissionDenied, cmd));
        }

        let ctx = CommandContext {
            command: cmd,
            role: self.permissions.resolve_role(chat_id).name(),
            permission,
        };
        let reply = self.execute(handler, ctx).await?;
        Ok(Outcome::Succeeded { reply })
    }

    async fn execute(
        &self,
        handler: &dyn CommandHandler,
        ctx: CommandContext<'_>,
    ) -> Result<String> {
        let guarded = AssertUnwindSafe(handler.execute(ctx)).catch_unwind();
        match tokio::time::timeout(self.command_timeout, guarded).await {
            Ok(Ok(Ok(reply))) => Ok(reply),
            Ok(Ok(Err(e))) => Err(GuardError::HandlerFailed(format!("{e:#}"))),
            Ok(Err(_panic)) => Err(GuardError::HandlerPanicked),
            Err(_elapsed) => {
                warn!(timeout_secs = self.command_timeout.as_secs(), "command timed out");
                Err(GuardError::Timeout {
                    secs: self.command_timeout.as_secs(),
                })
            }
        }
    }
}

fn denied(denial: Denial, cmd: &InboundCommand) -> Outcome {
    Outcome::Denied {
        denial,
        reply: denial.reply(&cmd.command),
    }
}
