//! Seam for the external user-profile/auth provider (spec §1: "Out of
//! scope (external collaborators): the user-profile/auth provider
//! (supplies UID, gender, location, tier, and stats increments)").
//!
//! This broker never implements that provider; it only defines the trait
//! boundary so `join_queue` admission has somewhere to ask for the fields
//! it does not own. Absent a configured provider, admission correctly
//! surfaces `ProfileMissing` (spec §7) rather than fabricating data.

use async_trait::async_trait;

use crate::queue::{Gender, Tier};

/// The subset of profile data the matching pipeline needs.
#[derive(Debug, Clone)]
pub struct UserProfile {
    /// Partition this uid belongs to.
    pub gender: Gender,
    /// Subscription tier, governing preference retention.
    pub tier: Tier,
    /// Opaque location string, if the provider has one on file.
    pub location: Option<String>,
}

/// External profile lookup (spec §1, `FIREBASE_PROJECT_ID` in spec §6's
/// configuration table names the concrete backend a deployment would wire
/// in here).
#[async_trait]
pub trait ProfileProvider: Send + Sync {
    /// Resolve `uid`'s profile, or `None` if unknown (spec §7:
    /// `ProfileMissing` — "authenticated user lacks required profile
    /// fields").
    async fn lookup(&self, uid: &str) -> Option<UserProfile>;
}

/// The default provider when no backend is configured: every lookup
/// reports `None`, causing `join_queue` to fail closed with
/// `ProfileMissing` rather than guessing at gender/tier/location.
#[derive(Debug, Default)]
pub struct UnconfiguredProfileProvider;

#[async_trait]
impl ProfileProvider for UnconfiguredProfileProvider {
    async fn lookup(&self, _uid: &str) -> Option<UserProfile> {
        None
    }
}

/// A static, in-memory provider for tests and local development.
#[derive(Debug, Default)]
pub struct StaticProfileProvider {
    profiles: std::collections::HashMap<String, UserProfile>,
}

impl StaticProfileProvider {
    /// Build a provider from a fixed uid→profile map.
    pub fn new(profiles: std::collections::HashMap<String, UserProfile>) -> Self {
        Self { profiles }
    }
}

#[async_trait]
impl ProfileProvider for StaticProfileProvider {
    async fn lookup(&self, uid: &str) -> Option<UserProfile> {
        self.profiles.get(uid).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_provider_reports_missing() {
        let provider = UnconfiguredProfileProvider;
        assert!(provider.lookup("alice").await.is_none());
    }

    #[tokio::test]
    async fn static_provider_returns_configured_profile() {
        let mut profiles = std::collections::HashMap::new();
        profiles.insert(
            "alice".to_string(),
            UserProfile {
                gender: Gender::Female,
                tier: Tier::Gold,
                location: Some("US".to_string()),
            },
        );
        let provider = StaticProfileProvider::new(profiles);
        let profile = provider.lookup("alice").await.unwrap();
        assert_eq!(profile.gender, Gender::Female);
    }
}
