//! Client identities and their rotation
//!
//! An identity is what a target site sees of us: user agent, client hints,
//! and the proxy the request leaves through. One `IdentityRotator` is shared
//! by every query against the same site.

mod profiles;

pub use profiles::{profile_by_tag, FingerprintProfile};

use crate::config::IdentityConfig;
use rand::seq::SliceRandom;
use std::sync::RwLock;

/// The identity presented by a single request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub user_agent: String,
    pub proxy: Option<String>,
    pub profile: &'static FingerprintProfile,
}

impl ClientIdentity {
    fn from_profile(profile: &'static FingerprintProfile, proxy: Option<String>) -> Self {
        Self {
            user_agent: profile.user_agent.to_string(),
            proxy,
            profile,
        }
    }

    /// Short label for log lines
    pub fn tag(&self) -> &'static str {
        self.profile.tag
    }

    /// Browser window size (width, height) presented with this identity
    pub fn viewport(&self) -> (u32, u32) {
        (self.profile.viewport_width, self.profile.viewport_height)
    }
}

/// Produces request identities and rotates them after clean responses
#[derive(Debug)]
pub struct IdentityRotator {
    enabled: bool,
    proxy: Option<String>,
    current: RwLock<ClientIdentity>,
}

impl IdentityRotator {
    /// Creates a rotator starting from a random profile
    pub fn new(enabled: bool, proxy: Option<String>) -> Self {
        let profile = random_profile();
        Self {
            enabled,
            current: RwLock::new(ClientIdentity::from_profile(profile, proxy.clone())),
            proxy,
        }
    }

    /// Creates a rotator whose first identity uses the given profile
    pub fn with_profile(enabled: bool, proxy: Option<String>, tag: &str) -> Self {
        let profile = profile_by_tag(tag).unwrap_or_else(random_profile);
        Self {
            enabled,
            current: RwLock::new(ClientIdentity::from_profile(profile, proxy.clone())),
            proxy,
        }
    }

    /// Builds a rotator from the `[identity]` section
    pub fn from_config(config: &IdentityConfig, enabled: bool) -> Self {
        match &config.fingerprint_profile {
            Some(tag) => Self::with_profile(enabled, config.proxy.clone(), tag),
            None => Self::new(enabled, config.proxy.clone()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the identity to use for the next request
    pub fn current(&self) -> ClientIdentity {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Picks a fresh identity and makes it current
    ///
    /// Sampling is with replacement, so the new identity may repeat the old
    /// profile. The proxy is carried over unchanged. Does nothing when
    /// rotation is disabled.
    pub fn rotate(&self) -> ClientIdentity {
        if !self.enabled {
            return self.current();
        }

        let next = ClientIdentity::from_profile(random_profile(), self.proxy.clone());
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = next.clone();
        tracing::trace!("Rotated client identity to {}", next.tag());
        next
    }
}

fn random_profile() -> &'static FingerprintProfile {
    let mut rng = rand::thread_rng();
    profiles::PROFILES
        .choose(&mut rng)
        .unwrap_or(&profiles::PROFILES[0])
}
