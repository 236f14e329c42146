use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Three-tier authority, totally ordered from least to most restrictive.
///
/// `JustDoIt < DoItAndShowMe < AskMeFirst` — an agent holding a claim at a
/// given tier is authorized for everything at or below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AuthorityTier {
    JustDoIt,
    DoItAndShowMe,
    AskMeFirst,
}

/// A grant of authority from one agent to another, optionally scoped to a
/// specific action and optionally time-bound.
///
/// An empty `permitted_actions` means the claim applies to any action
/// (wildcard). `expires_at`, when present, is honoured at read time —
/// callers must not treat a claim as valid without checking expiry against
/// the current time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityClaim {
    pub granted_by: String,
    pub granted_to: String,
    pub tier: AuthorityTier,
    pub permitted_actions: Vec<String>,
    pub granted_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthorityClaim {
    pub fn new(
        granted_by: impl Into<String>,
        granted_to: impl Into<String>,
        tier: AuthorityTier,
        permitted_actions: Vec<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            granted_by: granted_by.into(),
            granted_to: granted_to.into(),
            tier,
            permitted_actions,
            granted_at: Utc::now(),
            expires_at,
        }
    }

    /// Whether this claim covers `action` — either named explicitly or via
    /// the empty-vec wildcard.
    pub fn covers(&self, action: &str) -> bool {
        self.permitted_actions.is_empty() || self.permitted_actions.iter().any(|a| a == action)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}
