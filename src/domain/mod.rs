//! Domain types for account management with strong typing.
//!
//! This module holds the account state machine and the type-safe wrappers
//! shared by the store, the services and the API layer.

pub mod account;
pub mod events;
pub mod permalink;
pub mod validation;

pub use account::{Account, Authenticatable, Roleable};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Unique identifier for an account.
///
/// Keeps account ids from being mixed up with forum ids at call sites.
///
/// # Examples
///
/// ```rust
/// use townhall::domain::AccountId;
///
/// let id = AccountId::new(42);
/// assert_eq!(id.value(), 42);
/// assert_eq!(id.to_string(), "42");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AccountId(i32);

impl AccountId {
    #[must_use]
    pub const fn new(id: i32) -> Self {
        debug_assert!(id >= 0, "AccountId should be non-negative");
        Self(id)
    }

    #[must_use]
    pub const fn value(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<AccountId> for i32 {
    fn from(id: AccountId) -> Self {
        id.0
    }
}

impl From<i32> for AccountId {
    fn from(id: i32) -> Self {
        Self::new(id)
    }
}

impl Serialize for AccountId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_i32(self.0)
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let id = i32::deserialize(deserializer)?;
        Ok(Self::new(id))
    }
}

/// Lifecycle state of an account.
///
/// `passive -> pending -> active`, with `active <-> suspended` and
/// `* -> deleted`. Stored as lowercase text in the `users.state` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountState {
    /// Registered, activation code outstanding.
    Passive,
    /// Activation mail delivered, still awaiting activation.
    Pending,
    Active,
    Suspended,
    Deleted,
}

impl AccountState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Passive => "passive",
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Deleted => "deleted",
        }
    }

    /// States in which the activation code may still be consumed.
    pub const AWAITING_ACTIVATION: [Self; 2] = [Self::Passive, Self::Pending];

    #[must_use]
    pub const fn is_awaiting_activation(&self) -> bool {
        matches!(self, Self::Passive | Self::Pending)
    }

    /// Applies a lifecycle event, returning the next state.
    pub fn apply(self, event: StateEvent) -> Result<Self, InvalidTransition> {
        let next = match (self, event) {
            (Self::Passive, StateEvent::ActivationMailed) => Self::Pending,
            (Self::Passive | Self::Pending, StateEvent::Activate) => Self::Active,
            (Self::Passive | Self::Pending | Self::Active, StateEvent::Suspend) => Self::Suspended,
            (Self::Suspended, StateEvent::Unsuspend(history)) => history.restore_target(),
            (Self::Deleted, StateEvent::Delete) => {
                return Err(InvalidTransition { from: self, event: event.name() });
            }
            (_, StateEvent::Delete) => Self::Deleted,
            _ => return Err(InvalidTransition { from: self, event: event.name() }),
        };

        Ok(next)
    }
}

impl fmt::Display for AccountState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "passive" => Ok(Self::Passive),
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "suspended" => Ok(Self::Suspended),
            "deleted" => Ok(Self::Deleted),
            other => anyhow::bail!("Unknown account state: {other}"),
        }
    }
}

/// What an account went through before it was suspended.
///
/// Unsuspending derives the restored state from these markers so the
/// account comes back exactly as authenticable as it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActivationHistory {
    pub activated: bool,
    pub activation_mailed: bool,
}

impl ActivationHistory {
    #[must_use]
    pub const fn restore_target(&self) -> AccountState {
        if self.activated {
            AccountState::Active
        } else if self.activation_mailed {
            AccountState::Pending
        } else {
            AccountState::Passive
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEvent {
    ActivationMailed,
    Activate,
    Suspend,
    Unsuspend(ActivationHistory),
    Delete,
}

impl StateEvent {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ActivationMailed => "mark as mailed",
            Self::Activate => "activate",
            Self::Suspend => "suspend",
            Self::Unsuspend(_) => "unsuspend",
            Self::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Cannot {event} an account that is {from}")]
pub struct InvalidTransition {
    pub from: AccountState,
    pub event: &'static str,
}

/// Unique identifier for a forum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ForumId(pub i32);

impl fmt::Display for ForumId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Timestamp format used for every text timestamp column.
///
/// Fixed-width second precision in UTC so stored values sort correctly.
#[must_use]
pub fn timestamp(at: chrono::DateTime<chrono::Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

#[must_use]
pub fn now_timestamp() -> String {
    timestamp(chrono::Utc::now())
}

/// True if `expires_at` is missing, unparsable or in the past.
#[must_use]
pub fn is_expired(expires_at: Option<&str>, now: chrono::DateTime<chrono::Utc>) -> bool {
    expires_at
        .and_then(|value| chrono::DateTime::parse_from_rfc3339(value).ok())
        .is_none_or(|at| at.with_timezone(&chrono::Utc) <= now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_id_roundtrip() {
        let id = AccountId::new(7);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "7");
        let back: AccountId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn registration_path() {
        let state = AccountState::Passive;
        let state = state.apply(StateEvent::ActivationMailed).unwrap();
        assert_eq!(state, AccountState::Pending);
        let state = state.apply(StateEvent::Activate).unwrap();
        assert_eq!(state, AccountState::Active);
    }

    #[test]
    fn passive_can_activate_before_mail_receipt() {
        assert_eq!(
            AccountState::Passive.apply(StateEvent::Activate),
            Ok(AccountState::Active)
        );
    }

    #[test]
    fn active_cannot_activate_again() {
        let err = AccountState::Active.apply(StateEvent::Activate).unwrap_err();
        assert_eq!(err.from, AccountState::Active);
        assert_eq!(err.to_string(), "Cannot activate an account that is active");
    }

    #[test]
    fn suspend_unsuspend_restores_previous_state() {
        let cases = [
            (AccountState::Active, ActivationHistory { activated: true, activation_mailed: true }),
            (AccountState::Pending, ActivationHistory { activated: false, activation_mailed: true }),
            (AccountState::Passive, ActivationHistory::default()),
        ];

        for (before, history) in cases {
            let suspended = before.apply(StateEvent::Suspend).unwrap();
            assert_eq!(suspended, AccountState::Suspended);
            let restored = suspended.apply(StateEvent::Unsuspend(history)).unwrap();
            assert_eq!(restored, before);
        }
    }

    #[test]
    fn unsuspend_requires_suspension() {
        let history = ActivationHistory { activated: true, activation_mailed: true };
        assert!(AccountState::Active.apply(StateEvent::Unsuspend(history)).is_err());
    }

    #[test]
    fn delete_from_any_live_state() {
        for state in [
            AccountState::Passive,
            AccountState::Pending,
            AccountState::Active,
            AccountState::Suspended,
        ] {
            assert_eq!(state.apply(StateEvent::Delete), Ok(AccountState::Deleted));
        }
        assert!(AccountState::Deleted.apply(StateEvent::Delete).is_err());
    }

    #[test]
    fn deleted_is_terminal() {
        for event in [StateEvent::Activate, StateEvent::Suspend, StateEvent::ActivationMailed] {
            assert!(AccountState::Deleted.apply(event).is_err());
        }
    }

    #[test]
    fn state_parses_its_own_text() {
        for state in [
            AccountState::Passive,
            AccountState::Pending,
            AccountState::Active,
            AccountState::Suspended,
            AccountState::Deleted,
        ] {
            assert_eq!(state.as_str().parse::<AccountState>().unwrap(), state);
        }
        assert!("banned".parse::<AccountState>().is_err());
    }

    #[test]
    fn expiry_checks() {
        let now = chrono::Utc::now();
        let past = timestamp(now - chrono::Duration::minutes(1));
        let future = timestamp(now + chrono::Duration::minutes(5));
        assert!(is_expired(Some(&past), now));
        assert!(!is_expired(Some(&future), now));
        assert!(is_expired(None, now));
        assert!(is_expired(Some("garbage"), now));
    }
}
