use crate::channels::{EmailChannel, SmsChannel, VoiceChannel};
use crate::config::settings::SettingsManager;
use crate::config::AppConfig;
use crate::store::Store;
use std::sync::Arc;

/// Shared application state. Every processor and handler receives its
/// store and channel clients through here rather than reaching for
/// globals, so the engine runs against in-memory fakes in tests.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn Store>,
    pub settings: SettingsManager,
    pub email: Arc<dyn EmailChannel>,
    pub sms: Arc<dyn SmsChannel>,
    pub voice: Arc<dyn VoiceChannel>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn Store>,
        email: Arc<dyn EmailChannel>,
        sms: Arc<dyn SmsChannel>,
        voice: Arc<dyn VoiceChannel>,
    ) -> Self {
        let settings = SettingsManager::new(store.clone());
        Self {
            config: Arc::new(config),
            store,
            settings,
            email,
            sms,
            voice,
        }
    }
}
