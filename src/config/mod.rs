use std::env;

pub mod settings;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    /// Public base URL, used to build confirmation links in outbound email.
    pub site_url: String,
    pub company_name: String,
    pub dispatch_phone: String,
    /// Shared secret for the externally-scheduled cron entrypoints.
    pub cron_secret: String,
    /// Shared secret for admin trigger endpoints.
    pub admin_token: String,
    pub smtp: SmtpConfig,
    pub sms: SmsProviderConfig,
    pub voice: VoiceProviderConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct SmsProviderConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

#[derive(Debug, Clone)]
pub struct VoiceProviderConfig {
    pub api_key: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        let database = DatabaseConfig {
            url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://dispatch:@localhost:5432/dispatchserver".to_string()),
        };
        Ok(AppConfig {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                port: env::var("SERVER_PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(8080),
            },
            database,
            site_url: env::var("SITE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            company_name: env::var("COMPANY_NAME")
                .unwrap_or_else(|_| "ClearFlow Home Services".to_string()),
            dispatch_phone: env::var("DISPATCH_PHONE")
                .unwrap_or_else(|_| "(208) 555-0199".to_string()),
            cron_secret: env::var("CRON_SECRET").unwrap_or_default(),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or_default(),
            smtp: SmtpConfig {
                host: env::var("SMTP_HOST").unwrap_or_else(|_| "localhost".to_string()),
                port: env::var("SMTP_PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(587),
                username: env::var("SMTP_USERNAME").unwrap_or_default(),
                password: env::var("SMTP_PASSWORD").unwrap_or_default(),
            },
            sms: SmsProviderConfig {
                account_sid: env::var("TWILIO_ACCOUNT_SID").unwrap_or_default(),
                auth_token: env::var("TWILIO_AUTH_TOKEN").unwrap_or_default(),
                from_number: env::var("TWILIO_PHONE_NUMBER").unwrap_or_default(),
            },
            voice: VoiceProviderConfig {
                api_key: env::var("VOICE_API_KEY").unwrap_or_default(),
            },
        })
    }
}
