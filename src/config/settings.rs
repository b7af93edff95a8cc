use crate::store::Store;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Which lifecycle automations are armed. Defaults keep a fresh install
/// fully armed; individual toggles are flipped off through the settings
/// table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationToggles {
    pub auto_thank_you_email: bool,
    pub auto_follow_up_1h: bool,
    pub auto_review_request: bool,
    pub auto_reengagement_12m: bool,
}

impl Default for AutomationToggles {
    fn default() -> Self {
        Self {
            auto_thank_you_email: true,
            auto_follow_up_1h: true,
            auto_review_request: true,
            auto_reengagement_12m: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleReviewSettings {
    pub enabled: bool,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferralProgramSettings {
    pub enabled: bool,
    pub reward_description: String,
}

impl Default for ReferralProgramSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            reward_description: "10% off".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailIdentity {
    pub from_name: String,
    pub from_email: String,
    pub reply_to: String,
}

impl Default for EmailIdentity {
    fn default() -> Self {
        Self {
            from_name: "ClearFlow Home Services".to_string(),
            from_email: "dispatch@clearflowhome.com".to_string(),
            reply_to: "dispatch@clearflowhome.com".to_string(),
        }
    }
}

struct CachedSettings {
    loaded_at: Instant,
    values: HashMap<String, serde_json::Value>,
}

/// Typed view over the jsonb settings table, with a short in-process
/// cache so batch processors do not re-read the table per row.
#[derive(Clone)]
pub struct SettingsManager {
    store: Arc<dyn Store>,
    cache: Arc<Mutex<Option<CachedSettings>>>,
}

impl SettingsManager {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            cache: Arc::new(Mutex::new(None)),
        }
    }

    fn all(&self) -> HashMap<String, serde_json::Value> {
        {
            let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(cached) = cache.as_ref() {
                if cached.loaded_at.elapsed() < CACHE_TTL {
                    return cached.values.clone();
                }
            }
        }

        let values = match self.store.settings() {
            Ok(rows) => rows.into_iter().collect(),
            Err(e) => {
                warn!("Failed to load settings, using defaults: {}", e);
                HashMap::new()
            }
        };

        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        *cache = Some(CachedSettings {
            loaded_at: Instant::now(),
            values: values.clone(),
        });
        values
    }

    fn typed<T: Default + for<'de> Deserialize<'de>>(&self, key: &str) -> T {
        match self.all().get(key) {
            Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|e| {
                warn!("Setting '{}' is malformed, using defaults: {}", key, e);
                T::default()
            }),
            None => T::default(),
        }
    }

    pub fn automations(&self) -> AutomationToggles {
        self.typed("automations")
    }

    pub fn google_review(&self) -> GoogleReviewSettings {
        self.typed("google_review")
    }

    pub fn referral_program(&self) -> ReferralProgramSettings {
        self.typed("referral_program")
    }

    pub fn email_identity(&self) -> EmailIdentity {
        self.typed("email_config")
    }

    /// Drop the cache so the next read sees fresh rows. Called after an
    /// admin writes a setting.
    pub fn invalidate(&self) {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        *cache = None;
    }
}
