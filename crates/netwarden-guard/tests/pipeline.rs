use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use netwarden_core::{ChatId, NetwardenConfig, Principal};
use netwarden_guard::{
    AccessController, CommandContext, CommandHandler, Denial, InboundCommand, Outcome,
};
use netwarden_store::Store;

const ADMIN: i64 = 111;
const VIEWER: i64 = 222;
const GROUP: i64 = -1001;

/// Echoes the resolved role and permission back.
#[derive(Default)]
struct Echo {
    calls: AtomicUsize,
}

#[async_trait]
impl CommandHandler for Echo {
    async fn execute(&self, ctx: CommandContext<'_>) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!(
            "{} as {} via {} [{}]",
            ctx.command.command,
            ctx.role,
            ctx.permission,
            ctx.command.args.join(" ")
        ))
    }
}

struct Failing;

#[async_trait]
impl CommandHandler for Failing {
    async fn execute(&self, _ctx: CommandContext<'_>) -> anyhow::Result<String> {
        anyhow::bail!("backend unreachable")
    }
}

struct Panicking;

#[async_trait]
impl CommandHandler for Panicking {
    async fn execute(&self, _ctx: CommandContext<'_>) -> anyhow::Result<String> {
        panic!("handler bug")
    }
}

struct Stalled;

#[async_trait]
impl CommandHandler for Stalled {
    async fn execute(&self, _ctx: CommandContext<'_>) -> anyhow::Result<String> {
        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        Ok("too late".to_string())
    }
}

fn config() -> NetwardenConfig {
    let mut config = NetwardenConfig::default();
    config.access.allowed_chat_ids = vec![ADMIN, VIEWER, GROUP];
    config.access.allowed_threads = vec![7];
    config
        .assignments
        .insert(ADMIN.to_string(), "admin".to_string());
    config
}

fn controller(config: &NetwardenConfig) -> (AccessController, Store) {
    let store = Store::open_in_memory().unwrap();
    (AccessController::new(config, store.clone()).unwrap(), store)
}

fn command(chat: i64, text: &str) -> InboundCommand {
    InboundCommand::parse(Principal::new(chat, None, "ops"), text).unwrap()
}

fn audit_count(store: &Store) -> usize {
    store.recent_audit(1000).unwrap().len()
}

#[tokio::test]
async fn admitted_command_runs_handler_and_is_audited() {
    let (ctl, store) = controller(&config());
    let handler = Echo::default();

    let outcome = ctl.handle(command(ADMIN, "/ping 10.0.0.1"), &handler).await;

    assert_eq!(
        outcome,
        Outcome::Succeeded {
            reply: "ping as admin via network_ping [10.0.0.1]".to_string()
        }
    );
    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    let audit = store.recent_audit(10).unwrap();
    assert_eq!(audit.len(), 1);
    assert!(audit[0].success);
    assert_eq!(audit[0].command, "ping");
    assert_eq!(audit[0].chat_id, ChatId(ADMIN));
    assert!(audit[0].duration_ms >= 0.0);
}

#[tokio::test]
async fn unknown_chat_is_denied_and_counted() {
    let (ctl, store) = controller(&config());
    let handler = Echo::default();

    let outcome = ctl.handle(command(999, "/ping 10.0.0.1"), &handler).await;

    assert_eq!(outcome.denial(), Some(Denial::Unauthorized));
    assert_eq!(outcome.reply(), "❌ Access denied.");
    assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    assert_eq!(ctl.bans().record(ChatId(999)).unwrap().unwrap().attempts, 1);
    let audit = store.recent_audit(10).unwrap();
    assert_eq!(audit.len(), 1);
    assert!(!audit[0].success);
}

#[tokio::test]
async fn group_thread_must_be_allowed() {
    let (ctl, _store) = controller(&config());
    let handler = Echo::default();

    let wrong = InboundCommand::parse(Principal::new(GROUP, Some(8), "ops"), "/list").unwrap();
    let right = InboundCommand::parse(Principal::new(GROUP, Some(7), "ops"), "/list").unwrap();

    assert_eq!(
        ctl.handle(wrong, &handler).await.denial(),
        Some(Denial::Unauthorized)
    );
    assert!(ctl.handle(right, &handler).await.is_success());
    let record = ctl.bans().record(ChatId(GROUP)).unwrap().unwrap();
    assert_eq!(record.last_reason.as_deref(), Some("unauthorized_thread"));
}

#[tokio::test]
async fn repeated_permission_denials_lead_to_ban() {
    let (ctl, store) = controller(&config());
    let handler = Echo::default();

    for _ in 0..5 {
        let outcome = ctl.handle(command(VIEWER, "/nmap 10.0.0.1"), &handler).await;
        assert_eq!(outcome.denial(), Some(Denial::PermissionDenied));
        assert_eq!(
            outcome.reply(),
            "❌ Insufficient permissions for command /nmap"
        );
    }
    assert!(ctl.bans().is_banned(ChatId(VIEWER)).unwrap());

    // Even a permitted command is refused while banned.
    let outcome = ctl.handle(command(VIEWER, "/list"), &handler).await;
    assert_eq!(outcome.denial(), Some(Denial::Banned));
    assert_eq!(
        outcome.reply(),
        "🚫 User temporarily banned for too many failed attempts."
    );
    assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    assert_eq!(audit_count(&store), 6);

    ctl.bans().reset(ChatId(VIEWER)).unwrap();
    assert!(ctl.handle(command(VIEWER, "/list"), &handler).await.is_success());
}

#[tokio::test]
async fn rate_limit_applies_after_ban_check() {
    let mut config = config();
    config.security.max_commands_per_minute = 2;
    let (ctl, store) = controller(&config);
    let handler = Echo::default();

    assert!(ctl.handle(command(ADMIN, "/list"), &handler).await.is_success());
    assert!(ctl.handle(command(ADMIN, "/list"), &handler).await.is_success());
    let outcome = ctl.handle(command(ADMIN, "/list"), &handler).await;

    assert_eq!(outcome.denial(), Some(Denial::RateLimited));
    assert_eq!(outcome.reply(), "⏳ Rate limit exceeded. Try again later.");
    assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
    assert_eq!(audit_count(&store), 3);
    // Throttling is not a security failure.
    assert_eq!(ctl.bans().record(ChatId(ADMIN)).unwrap(), None);
}

#[tokio::test]
async fn handler_error_becomes_generic_failure() {
    let (ctl, store) = controller(&config());

    let outcome = ctl.handle(command(ADMIN, "/list"), &Failing).await;

    assert_eq!(
        outcome,
        Outcome::Failed {
            reply: "❌ Internal error during command execution.".to_string()
        }
    );
    let audit = store.recent_audit(10).unwrap();
    assert_eq!(audit.len(), 1);
    assert!(!audit[0].success);
}

#[tokio::test]
async fn handler_panic_is_contained() {
    let (ctl, store) = controller(&config());

    let outcome = ctl.handle(command(ADMIN, "/list"), &Panicking).await;

    assert!(matches!(outcome, Outcome::Failed { .. }));
    assert_eq!(audit_count(&store), 1);

    // The controller keeps working afterwards.
    assert!(ctl.handle(command(ADMIN, "/list"), &Echo::default()).await.is_success());
}

#[tokio::test]
async fn stalled_handler_times_out() {
    let mut config = config();
    config.security.command_timeout_secs = 1;
    let (ctl, store) = controller(&config);

    let outcome = ctl.handle(command(ADMIN, "/list"), &Stalled).await;

    assert!(matches!(outcome, Outcome::Failed { .. }));
    let audit = store.recent_audit(10).unwrap();
    assert!(!audit[0].success);
    assert!(audit[0].duration_ms >= 1000.0);
}

#[tokio::test]
async fn open_mode_without_assignments_permits_everything() {
    let mut config = config();
    config.assignments.clear();
    let (ctl, _store) = controller(&config);
    let handler = Echo::default();

    let outcome = ctl.handle(command(VIEWER, "/nmap 10.0.0.1"), &handler).await;
    assert!(outcome.is_success());
}

#[tokio::test]
async fn ban_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("netwarden.db");
    let mut config = config();
    config.security.max_failed_attempts = 1;
    let handler = Echo::default();

    {
        let ctl = AccessController::new(&config, Store::open(&path).unwrap()).unwrap();
        let outcome = ctl.handle(command(VIEWER, "/nmap 10.0.0.1"), &handler).await;
        assert_eq!(outcome.denial(), Some(Denial::PermissionDenied));
    }

    let ctl = AccessController::new(&config, Store::open(&path).unwrap()).unwrap();
    let outcome = ctl.handle(command(VIEWER, "/list"), &handler).await;
    assert_eq!(outcome.denial(), Some(Denial::Banned));
}
