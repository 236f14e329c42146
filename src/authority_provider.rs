//! Store, expire, wildcard, and validate authority claims (C2).

use chrono::Utc;
use cos_core::{AuthorityClaim, AuthorityTier};
use dashmap::DashMap;

const WILDCARD: &str = "*";

/// Claims are indexed by `(agent_id, action)`, exploded across every action
/// a claim permits at grant time (or a single `"*"` entry for a wildcard
/// claim). Lookup tries the specific key first, then falls back to the
/// wildcard key, per the lookup policy.
#[derive(Default)]
pub struct AuthorityProvider {
    claims: DashMap<(String, String), AuthorityClaim>,
}

impl AuthorityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, claim: AuthorityClaim) {
        if claim.permitted_actions.is_empty() {
            self.claims
                .insert((claim.granted_to.clone(), WILDCARD.to_string()), claim);
        } else {
            for action in &claim.permitted_actions {
                self.claims
                    .insert((claim.granted_to.clone(), action.clone()), claim.clone());
            }
        }
    }

    pub fn revoke(&self, agent_id: &str, action: &str) {
        self.claims.remove(&(agent_id.to_string(), action.to_string()));
    }

    /// Returns the claim covering `(agent_id, action)`, evicting it first if
    /// expired. Falls back to the agent's wildcard claim on a specific miss.
    pub fn get_claim(&self, agent_id: &str, action: &str) -> Option<AuthorityClaim> {
        let now = Utc::now();
        if let Some(claim) = self.evict_if_expired((agent_id.to_string(), action.to_string()), now) {
            return Some(claim);
        }
        self.evict_if_expired((agent_id.to_string(), WILDCARD.to_string()), now)
    }

    pub fn has_authority(&self, agent_id: &str, action: &str, minimum_tier: AuthorityTier) -> bool {
        self.get_claim(agent_id, action)
            .is_some_and(|claim| claim.tier >= minimum_tier)
    }

    fn evict_if_expired(&self, key: (String, String), now: chrono::DateTime<Utc>) -> Option<AuthorityClaim> {
        let entry = self.claims.get(&key)?;
        if entry.is_expired_at(now) {
            drop(entry);
            self.claims.remove(&key);
            None
        } else {
            Some(entry.clone())
        }
    }
}
