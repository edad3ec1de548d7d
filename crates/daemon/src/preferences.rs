//! Per-user settings read by the coordinator.
//!
//! The core keeps no durable state. Front ends that persist settings
//! implement [`PreferenceStore`]; [`InMemoryPreferences`] is the default.

use crate::job::UserId;
use crate::presets::QualityPreset;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Account tier selecting the upload size limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserTier {
    #[default]
    Regular,
    Premium,
}

impl fmt::Display for UserTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserTier::Regular => f.write_str("regular"),
            UserTier::Premium => f.write_str("premium"),
        }
    }
}

/// Stored settings for one user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserPreferences {
    pub default_preset: Option<QualityPreset>,
    pub tier: UserTier,
}

pub trait PreferenceStore: Send + Sync {
    /// Settings for `user`, or the defaults if none were stored.
    fn get(&self, user: UserId) -> UserPreferences;

    fn set_default_preset(&self, user: UserId, preset: QualityPreset);

    fn set_tier(&self, user: UserId, tier: UserTier);
}

/// Process-local preference store
#[derive(Debug, Default)]
pub struct InMemoryPreferences {
    users: RwLock<HashMap<UserId, UserPreferences>>,
}

impl InMemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for InMemoryPreferences {
    fn get(&self, user: UserId) -> UserPreferences {
        self.users.read().get(&user).copied().unwrap_or_default()
    }

    fn set_default_preset(&self, user: UserId, preset: QualityPreset) {
        self.users.write().entry(user).or_default().default_preset = Some(preset);
    }

    fn set_tier(&self, user: UserId, tier: UserTier) {
        self.users.write().entry(user).or_default().tier = tier;
    }
}
