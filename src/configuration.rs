use crate::domain::RecipientEmail;
use secrecy::Secret;
use serde_aux::field_attributes::deserialize_number_from_string;
use std::path::PathBuf;

pub enum Environment {
    Local,
    Production,
}

#[derive(serde::Deserialize)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub smtp: SmtpSettings,
    pub recipient_source: RecipientSourceSettings,
    pub campaign: CampaignSettings,
}

#[derive(serde::Deserialize)]
pub struct ApplicationSettings {
    pub progress_dir: PathBuf,
    pub template_path: Option<PathBuf>,
    pub logo_path: Option<PathBuf>,
    /// Directory holding `icon_<name>.png` files for the social links.
    pub icon_dir: Option<PathBuf>,
}

#[derive(serde::Deserialize)]
pub struct SmtpSettings {
    pub host: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub username: String,
    pub password: Secret<String>,
    pub sender_email: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub timeout_seconds: u64,
}

impl SmtpSettings {
    pub fn sender(&self) -> Result<RecipientEmail, String> {
        RecipientEmail::parse(self.sender_email.clone())
    }
}

#[derive(serde::Deserialize)]
pub struct RecipientSourceSettings {
    pub url: String,
    pub api_key: Secret<String>,
    pub table: String,
}

#[derive(serde::Deserialize, Clone)]
pub struct CampaignSettings {
    pub subject: String,
    pub body: String,
    #[serde(default = "default_delay_min")]
    pub delay_min: u64,
    #[serde(default = "default_delay_max")]
    pub delay_max: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_pause")]
    pub batch_pause: u64,
    pub unsubscribe_base_url: String,
    pub brand_name: String,
    pub greeting: String,
    pub cta_text: String,
    pub cta_url: String,
    #[serde(default = "default_social_link")]
    pub social_instagram: String,
    #[serde(default = "default_social_link")]
    pub social_twitter: String,
    #[serde(default = "default_social_link")]
    pub social_facebook: String,
    #[serde(default = "default_social_link")]
    pub social_tiktok: String,
}

// A send loop that never pauses gets the account throttled; anything beyond
// this per-batch ceiling is almost certainly a configuration mistake.
pub const MAX_BATCH_SIZE: usize = 500;

impl CampaignSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.delay_min > self.delay_max {
            return Err(format!(
                "delay_min ({}) must not exceed delay_max ({}).",
                self.delay_min, self.delay_max
            ));
        }
        if self.batch_size == 0 {
            return Err("batch_size must be greater than zero.".into());
        }
        if self.batch_size > MAX_BATCH_SIZE {
            return Err(format!(
                "batch_size ({}) exceeds the maximum of {}.",
                self.batch_size, MAX_BATCH_SIZE
            ));
        }
        Ok(())
    }
}

fn default_delay_min() -> u64 {
    5
}

fn default_delay_max() -> u64 {
    15
}

fn default_batch_size() -> usize {
    20
}

fn default_batch_pause() -> u64 {
    120
}

fn default_social_link() -> String {
    "#".into()
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either 'local' or 'production'.",
                other
            )),
        }
    }
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let base_path = std::env::current_dir().expect("Failed to determine the current directory");
    let configuration_directory = base_path.join("configuration");
    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .expect("Failed to parse APP_ENVIRONMENT");

    let mut settings = config::Config::default();
    settings.merge(config::File::from(configuration_directory.join("base")).required(true))?;
    settings.merge(
        config::File::from(configuration_directory.join(environment.as_str())).required(true),
    )?;
    settings.merge(config::Environment::with_prefix("app").separator("__"))?;
    settings.try_into()
}
