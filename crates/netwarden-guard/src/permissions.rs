use std::collections::HashMap;

use netwarden_core::{ChatId, NetwardenConfig};
use tracing::debug;

use crate::ban::BanTracker;
use crate::error::Result;

/// One entry of a role's capability list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityPattern {
    Exact(String),
    /// Written as `prefix*`; grants every permission starting with `prefix`.
    Prefix(String),
}

impl CapabilityPattern {
    pub fn parse(raw: &str) -> Self {
        match raw.strip_suffix('*') {
            Some(prefix) => CapabilityPattern::Prefix(prefix.trim_end_matches('*').to_string()),
            None => CapabilityPattern::Exact(raw.to_string()),
        }
    }

    pub fn matches(&self, permission: &str) -> bool {
        match self {
            CapabilityPattern::Exact(name) => name == permission,
            CapabilityPattern::Prefix(prefix) => permission.starts_with(prefix.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    name: String,
    capabilities: Vec<CapabilityPattern>,
}

impl Role {
    pub fn new(name: &str, patterns: &[String]) -> Self {
        Self {
            name: name.to_string(),
            capabilities: patterns.iter().map(|p| CapabilityPattern::parse(p)).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn grants(&self, permission: &str) -> bool {
        self.capabilities.iter().any(|c| c.matches(permission))
    }
}

/// Maps principals to roles and roles to permissions.
///
/// With no assignments configured at all the engine runs in open mode and
/// grants everything. Once any assignment exists, unassigned principals get
/// the default role.
pub struct PermissionEngine {
    roles: HashMap<String, Role>,
    assignments: HashMap<ChatId, String>,
    default_role: Role,
    commands: HashMap<String, String>,
    bans: BanTracker,
}

impl PermissionEngine {
    pub fn new(config: &NetwardenConfig, bans: BanTracker) -> netwarden_core::Result<Self> {
        let roles: HashMap<String, Role> = config
            .roles
            .iter()
            .map(|(name, patterns)| (name.clone(), Role::new(name, patterns)))
            .collect();
        // A default role missing from the table grants nothing.
        let default_role = roles
            .get(&config.default_role)
            .cloned()
            .unwrap_or_else(|| Role::new(&config.default_role, &[]));

        Ok(Self {
            roles,
            assignments: config.role_assignments()?,
            default_role,
            commands: config.commands.clone(),
            bans,
        })
    }

    pub fn is_open_mode(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn resolve_role(&self, chat_id: ChatId) -> &Role {
        self.assignments
            .get(&chat_id)
            .and_then(|name| self.roles.get(name))
            .unwrap_or(&self.default_role)
    }

    /// Permission required by a command verb. Unmapped verbs require a
    /// permission of the same name.
    pub fn permission_for<'a>(&'a self, verb: &'a str) -> &'a str {
        self.commands.get(verb).map(String::as_str).unwrap_or(verb)
    }

    /// Pure check with no side effects.
    pub fn evaluate(&self, chat_id: ChatId, permission: &str) -> bool {
        self.is_open_mode() || self.resolve_role(chat_id).grants(permission)
    }

    /// Check `permission` for `chat_id`, counting a failed attempt on denial.
    pub fn has_permission(&self, chat_id: ChatId, permission: &str) -> Result<bool> {
        if self.evaluate(chat_id, permission) {
            return Ok(true);
        }
        let role = self.resolve_role(chat_id).name();
        debug!(chat_id = %chat_id, role, permission, "permission denied");
        self.bans
            .record_failure(chat_id, &format!("permission_denied_{permission}"))?;
        Ok(false)
    }
}
