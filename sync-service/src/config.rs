use meter_domain::MeteringPoint;
use serde::Deserialize;
use std::{fs, path::PathBuf, time::Duration};
use time_tz::{timezones, Tz};

use crate::pipeline::WindowAnchor;

#[derive(Debug, Clone, Deserialize)]
pub struct FluviusAuthConfig {
    pub client_id: String,
    pub tenant_id: String,
    #[serde(default = "default_authority_host")]
    pub authority_host: String,
    pub certificate_thumbprint: String,
    pub private_key_path: PathBuf,
    pub certificate_path: PathBuf,
    pub scope: String,
}

impl FluviusAuthConfig {
    pub fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host.trim_end_matches('/'),
            self.tenant_id
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FluviusConfig {
    #[serde(default = "default_readings_url")]
    pub readings_url: String,
    /// `eanNumber` on the older API, `ean` on the newer one.
    #[serde(default = "default_identifier_param")]
    pub identifier_param: String,
    #[serde(default = "default_period_type")]
    pub period_type: String,
    #[serde(default = "default_granularity")]
    pub granularity: String,
    pub subscription_key: Option<String>,
    #[serde(default = "default_short_url_endpoint")]
    pub short_url_endpoint: String,
    #[serde(default = "default_consumer_url_template")]
    pub consumer_url_template: String,
    #[serde(default = "default_data_service_types")]
    pub data_service_types: Vec<String>,
    pub auth: FluviusAuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpinumConfig {
    #[serde(default = "default_push_url")]
    pub push_url: String,
    pub token_url: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub username: String,
    pub password: Option<String>,
    pub scope: String,
    #[serde(default = "default_push_scope")]
    pub push_scope: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl HttpConfig {
    pub fn client(&self) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(self.request_timeout_secs))
            .build()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub anchor: WindowAnchor,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            anchor: WindowAnchor::default(),
        }
    }
}

impl WindowConfig {
    pub fn zone(&self) -> anyhow::Result<&'static Tz> {
        timezones::get_by_name(&self.timezone)
            .ok_or_else(|| anyhow::anyhow!("unknown timezone '{}'", self.timezone))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub report_unrecognized_schema: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Prometheus text file rewritten at the end of every sync run.
    pub textfile: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub fluvius: FluviusConfig,
    pub opinum: OpinumConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub metering_points: Vec<MeteringPoint>,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("SYNC_CONFIG").unwrap_or_else(|_| "sync-config.toml".to_string());
        let mut cfg = Self::load_from(&path)?;
        cfg.fill_secrets(|name| env::var(name).ok());
        Ok(cfg)
    }

    pub fn load_from(path: &str) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read config {path}: {e}"))?;
        let cfg: AppConfig = toml::from_str(&contents)?;
        Ok(cfg)
    }

    /// Fills secrets left out of the file from the environment.
    ///
    /// Secrets still missing afterwards are reported by the component that needs them.
    pub fn fill_secrets<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let slots = [
            (&mut self.fluvius.subscription_key, "FLUVIUS_SUBSCRIPTION_KEY"),
            (&mut self.opinum.client_secret, "OPINUM_CLIENT_SECRET"),
            (&mut self.opinum.password, "OPINUM_PASSWORD"),
        ];
        for (slot, var) in slots {
            if slot.as_deref().map_or(true, str::is_empty) {
                *slot = lookup(var).filter(|v| !v.is_empty());
            }
        }
    }
}

fn default_authority_host() -> String {
    "https://login.microsoftonline.com".to_string()
}

fn default_readings_url() -> String {
    "https://apihub.fluvius.be/esco-live/api/v2.0/mandate/energy".to_string()
}

fn default_identifier_param() -> String {
    "eanNumber".to_string()
}

fn default_period_type() -> String {
    "readTime".to_string()
}

fn default_granularity() -> String {
    "hourly_quarterhourly".to_string()
}

fn default_short_url_endpoint() -> String {
    "https://apihub.fluvius.be/esco-live/api/v2.0/shortUrlIdentifier".to_string()
}

fn default_consumer_url_template() -> String {
    "https://mijn.fluvius.be/verbruik/dienstverlener?id={id}".to_string()
}

fn default_data_service_types() -> Vec<String> {
    vec!["VH_dag".to_string(), "VH_kwartier_uur".to_string()]
}

fn default_push_url() -> String {
    "https://push.opinum.com/api/data".to_string()
}

fn default_push_scope() -> String {
    "push-data".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_timezone() -> String {
    "Europe/Brussels".to_string()
}
