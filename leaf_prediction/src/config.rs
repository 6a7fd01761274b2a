use serde::Deserialize;
use std::{fmt, time::Duration};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    pub watson: WatsonConfig,
    #[serde(default = "default_class_labels")]
    pub class_labels: Vec<String>,
    #[serde(default)]
    pub advisor: Option<AdvisorConfig>,
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_max_body_bytes() -> usize {
    20 * 1024 * 1024
}

impl ServerConfig {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Credentials and endpoints of the hosted model.
#[derive(Deserialize, Clone)]
pub struct WatsonConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_iam_url")]
    pub iam_url: String,
    #[serde(default = "default_grant_type")]
    pub grant_type: String,
    pub ml_base_url: String,
    #[serde(default)]
    pub deployment_id: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_iam_url() -> String {
    "https://iam.cloud.ibm.com/identity/token".into()
}

fn default_grant_type() -> String {
    "urn:ibm:params:oauth:grant-type:apikey".into()
}

fn default_api_version() -> String {
    "2021-05-01".into()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl WatsonConfig {
    pub fn prediction_url(&self) -> String {
        format!(
            "{}/ml/v4/deployments/{}/predictions?version={}",
            self.ml_base_url.trim_end_matches('/'),
            self.deployment_id,
            self.api_version
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.api_key.trim().is_empty() {
            return Err("watson.api_key is not set (use LP_WATSON__API_KEY)".into());
        }
        if self.deployment_id.trim().is_empty() {
            return Err("watson.deployment_id is not set (use LP_WATSON__DEPLOYMENT_ID)".into());
        }
        if self.request_timeout_ms == 0 {
            return Err("watson.request_timeout_ms must be greater than zero".into());
        }
        Ok(())
    }
}

impl fmt::Debug for WatsonConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatsonConfig")
            .field("api_key", &"<redacted>")
            .field("iam_url", &self.iam_url)
            .field("grant_type", &self.grant_type)
            .field("ml_base_url", &self.ml_base_url)
            .field("deployment_id", &self.deployment_id)
            .field("api_version", &self.api_version)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish()
    }
}

/// Text generation settings for the plant-doctor advisor.
#[derive(Debug, Deserialize, Clone)]
pub struct AdvisorConfig {
    pub project_id: String,
    #[serde(default = "default_advisor_model")]
    pub model_id: String,
    #[serde(default = "default_advisor_api_version")]
    pub api_version: String,
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,
}

fn default_advisor_model() -> String {
    "ibm/granite-3-8b-instruct".into()
}

fn default_advisor_api_version() -> String {
    "2023-05-29".into()
}

fn default_max_new_tokens() -> u32 {
    900
}

impl AdvisorConfig {
    pub fn text_generation_url(&self, ml_base_url: &str) -> String {
        format!(
            "{}/ml/v1/text/generation?version={}",
            ml_base_url.trim_end_matches('/'),
            self.api_version
        )
    }
}

pub fn default_class_labels() -> Vec<String> {
    [
        "Anthracnose",
        "Bacterial Canker",
        "Cutting Weevil",
        "Die Back",
        "Gall Midge",
        "Healthy",
        "Powdery Mildew",
        "Sooty Mould",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub enum Environment {
    Local,
    Production,
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
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub enum LogLevel {
    Debug,
    Info,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            other => Err(format!(
                "{} is not a supported minimum log level. Use either `debug` or `info`.",
                other
            )),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), String> {
        self.watson.validate()?;
        if self.class_labels.is_empty() {
            return Err("class_labels must not be empty".into());
        }
        if let Some(advisor) = &self.advisor {
            if advisor.project_id.trim().is_empty() {
                return Err("advisor.project_id must not be empty".into());
            }
        }
        Ok(())
    }
}

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| config::ConfigError::Message(format!("no current directory: {}", e)))?;
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;

    let config = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(
            config::File::from(
                configuration_directory.join(format!("{}.yaml", environment.as_str())),
            )
            .required(false),
        )
        .add_source(
            config::Environment::with_prefix("LP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    let config: Config = config.try_deserialize::<Config>()?;
    if let Err(e) = config.validate() {
        tracing::error!("Configuration validation failed: {}", e);
        return Err(config::ConfigError::Message(e));
    }

    Ok(config)
}
