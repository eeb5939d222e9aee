//! Allow-list enforcement for inbound chats.
//!
//! Deny-by-default: an empty `allowed_chat_ids` list means no one is allowed.
//! The thread allow-list only applies to group chats that send a thread id;
//! a message without one is the group's main timeline and passes.

use std::collections::HashSet;

use netwarden_core::config::AccessConfig;
use netwarden_core::ChatId;
use tracing::debug;

use crate::ban::BanTracker;
use crate::error::Result;

/// Why a chat was turned away at the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    UnauthorizedChat,
    UnauthorizedThread,
}

impl Rejection {
    /// Reason string stored with the failed attempt.
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::UnauthorizedChat => "unauthorized_chat",
            Rejection::UnauthorizedThread => "unauthorized_thread",
        }
    }
}

/// Returns the reason `chat_id` / `thread_id` is not allowed, or `None`.
pub fn check_allowed(
    allowed_chats: &HashSet<i64>,
    allowed_threads: &HashSet<i64>,
    chat_id: ChatId,
    thread_id: Option<i64>,
) -> Option<Rejection> {
    if !allowed_chats.contains(&chat_id.as_i64()) {
        return Some(Rejection::UnauthorizedChat);
    }
    match thread_id {
        Some(thread) if chat_id.is_group() && !allowed_threads.contains(&thread) => {
            Some(Rejection::UnauthorizedThread)
        }
        _ => None,
    }
}

/// Allow-list gate. Every rejection counts as a failed attempt.
pub struct AuthorizationGate {
    allowed_chats: HashSet<i64>,
    allowed_threads: HashSet<i64>,
    bans: BanTracker,
}

impl AuthorizationGate {
    pub fn new(config: &AccessConfig, bans: BanTracker) -> Self {
        Self {
            allowed_chats: config.allowed_chat_ids.iter().copied().collect(),
            allowed_threads: config.allowed_threads.iter().copied().collect(),
            bans,
        }
    }

    pub fn authorize(&self, chat_id: ChatId, thread_id: Option<i64>) -> Result<bool> {
        match check_allowed(&self.allowed_chats, &self.allowed_threads, chat_id, thread_id) {
            None => Ok(true),
            Some(rejection) => {
                debug!(chat_id = %chat_id, ?thread_id, reason = rejection.as_str(), "chat rejected");
                self.bans.record_failure(chat_id, rejection.as_str())?;
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netwarden_core::config::SecurityConfig;
    use netwarden_store::Store;

    fn set(ids: &[i64]) -> HashSet<i64> {
        ids.iter().copied().collect()
    }

    #[test]
    fn empty_list_denies_all() {
        assert_eq!(
            check_allowed(&set(&[]), &set(&[]), ChatId(111), None),
            Some(Rejection::UnauthorizedChat)
        );
    }

    #[test]
    fn listed_chat_allowed() {
        assert_eq!(check_allowed(&set(&[111]), &set(&[]), ChatId(111), None), None);
        assert_eq!(
            check_allowed(&set(&[111]), &set(&[]), ChatId(222), None),
            Some(Rejection::UnauthorizedChat)
        );
    }

    #[test]
    fn empty_thread_list_rejects_threaded_group_messages() {
        assert_eq!(
            check_allowed(&set(&[-100]), &set(&[]), ChatId(-100), Some(9)),
            Some(Rejection::UnauthorizedThread)
        );
    }

    #[test]
    fn group_thread_must_be_listed() {
        let chats = set(&[-100]);
        let threads = set(&[7]);
        assert_eq!(check_allowed(&chats, &threads, ChatId(-100), Some(7)), None);
        assert_eq!(
            check_allowed(&chats, &threads, ChatId(-100), Some(8)),
            Some(Rejection::UnauthorizedThread)
        );
        // No thread id: the main group timeline.
        assert_eq!(check_allowed(&chats, &threads, ChatId(-100), None), None);
    }

    #[test]
    fn thread_list_ignored_for_private_chats() {
        assert_eq!(
            check_allowed(&set(&[111]), &set(&[7]), ChatId(111), Some(8)),
            None
        );
    }

    #[test]
    fn rejection_records_failed_attempt() {
        let store = Store::open_in_memory().unwrap();
        let bans = BanTracker::new(store, &SecurityConfig::default());
        let gate = AuthorizationGate::new(
            &AccessConfig {
                allowed_chat_ids: vec![111],
                allowed_threads: vec![],
            },
            bans.clone(),
        );

        assert!(gate.authorize(ChatId(111), None).unwrap());
        assert!(!gate.authorize(ChatId(222), None).unwrap());

        let record = bans.record(ChatId(222)).unwrap().unwrap();
        assert_eq!(record.attempts, 1);
        assert_eq!(record.last_reason.as_deref(), Some("unauthorized_chat"));
        assert_eq!(bans.record(ChatId(111)).unwrap(), None);
    }
}
