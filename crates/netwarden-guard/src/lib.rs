//! `netwarden-guard`: the gate every inbound command passes before it may
//! touch the network.
//!
//! Order of checks in [`AccessController::handle`]:
//!   1. [`AuthorizationGate`]: chat and thread allow-lists
//!   2. [`BanTracker`]: temporary bans after repeated failures
//!   3. [`RateLimiter`]: sliding per-minute and per-hour ceilings
//!   4. [`PermissionEngine`]: role → capability patterns
//!
//! Handlers validate free-form arguments with [`ShellInputValidator`] before
//! building any external process invocation.

pub mod allow;
pub mod ban;
pub mod controller;
pub mod error;
pub mod housekeeping;
pub mod permissions;
pub mod ratelimit;
pub mod validate;

pub use allow::AuthorizationGate;
pub use ban::{BanRecord, BanTracker, FailureOutcome};
pub use controller::{
    AccessController, CommandContext, CommandHandler, Denial, InboundCommand, Outcome,
};
pub use error::{GuardError, Result};
pub use housekeeping::{Housekeeper, SweepReport};
pub use permissions::{CapabilityPattern, PermissionEngine, Role};
pub use ratelimit::RateLimiter;
pub use validate::{CidrBlock, InputKind, ShellInputValidator, ValidationError};
