use std::{env, fmt::Display, str::FromStr, time::Duration};

use log::*;
use vending_engine::{
    pipeline::config::{
        DEFAULT_IDEMPOTENCY_RETENTION,
        DEFAULT_LIVENESS_WINDOW,
        DEFAULT_LOG_CAPACITY,
        DEFAULT_MAX_TEMPERATURE,
        DEFAULT_MIN_TEMPERATURE,
        DEFAULT_SETTLEMENT_TIMEOUT,
    },
    PipelineConfig,
};
use vm_common::{helpers::parse_duration, Secret};

const DEFAULT_VMP_HOST: &str = "127.0.0.1";
const DEFAULT_VMP_PORT: u16 = 8360;
const DEFAULT_DATABASE_URL: &str = "sqlite://data/vending.db";
const DEFAULT_MQTT_BROKER_URL: &str = "mqtt://127.0.0.1:1883";
const DEFAULT_MQTT_CLIENT_ID: &str = "vending-pipeline";
const DEFAULT_MQTT_KEEP_ALIVE: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub mqtt: MqttConfig,
    pub pipeline: PipelineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_VMP_HOST.to_string(),
            port: DEFAULT_VMP_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            mqtt: MqttConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("VMP_HOST").ok().unwrap_or_else(|| DEFAULT_VMP_HOST.into());
        let port = env::var("VMP_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for VMP_PORT. {e} Using the default, {DEFAULT_VMP_PORT}, instead."
                    );
                    DEFAULT_VMP_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_VMP_PORT);
        let database_url = env::var("VMP_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ VMP_DATABASE_URL is not set. Using {DEFAULT_DATABASE_URL}");
            DEFAULT_DATABASE_URL.to_string()
        });
        let mqtt = MqttConfig::from_env_or_defaults();
        let pipeline = pipeline_config_from_env();
        Self { host, port, database_url, mqtt, pipeline }
    }
}

//----------------------------------------------   MqttConfig  ----------------------------------------------------
#[derive(Clone, Debug)]
pub struct MqttConfig {
    /// e.g. `mqtt://broker.local:1883`. The port defaults to 1883.
    pub broker_url: String,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Secret<String>,
    pub keep_alive: Duration,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_url: DEFAULT_MQTT_BROKER_URL.to_string(),
            client_id: DEFAULT_MQTT_CLIENT_ID.to_string(),
            username: None,
            password: Secret::default(),
            keep_alive: DEFAULT_MQTT_KEEP_ALIVE,
        }
    }
}

impl MqttConfig {
    pub fn from_env_or_defaults() -> Self {
        let broker_url = env::var("VMP_MQTT_BROKER_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ VMP_MQTT_BROKER_URL is not set. Using {DEFAULT_MQTT_BROKER_URL}");
            DEFAULT_MQTT_BROKER_URL.to_string()
        });
        let client_id = env::var("VMP_MQTT_CLIENT_ID").ok().unwrap_or_else(|| DEFAULT_MQTT_CLIENT_ID.into());
        let username = env::var("VMP_MQTT_USERNAME").ok().filter(|s| !s.trim().is_empty());
        let password = Secret::new(env::var("VMP_MQTT_PASSWORD").ok().unwrap_or_default());
        if username.is_none() && !password.reveal().is_empty() {
            warn!("🪛️ VMP_MQTT_PASSWORD is set without VMP_MQTT_USERNAME. The password will be ignored.");
        }
        let keep_alive = duration_from_env("VMP_MQTT_KEEP_ALIVE_SECS", Duration::from_secs(1), DEFAULT_MQTT_KEEP_ALIVE);
        Self { broker_url, client_id, username, password, keep_alive }
    }
}

//----------------------------------------------   PipelineConfig  ----------------------------------------------------
fn pipeline_config_from_env() -> PipelineConfig {
    let topic_root = env::var("VMP_TOPIC_ROOT").ok().map(|s| s.trim().trim_end_matches('/').to_string()).unwrap_or_default();
    let liveness_window =
        duration_from_env("VMP_LIVENESS_WINDOW_SECS", Duration::from_secs(1), DEFAULT_LIVENESS_WINDOW);
    let log_capacity = parsed_from_env("VMP_LOG_CAPACITY", DEFAULT_LOG_CAPACITY).max(1);
    let settlement_timeout =
        duration_from_env("VMP_SETTLEMENT_TIMEOUT_MS", Duration::from_millis(1), DEFAULT_SETTLEMENT_TIMEOUT);
    let idempotency_retention =
        duration_from_env("VMP_IDEMPOTENCY_RETENTION_SECS", Duration::from_secs(1), DEFAULT_IDEMPOTENCY_RETENTION);
    let mut min_temperature = parsed_from_env("VMP_MIN_TEMPERATURE", DEFAULT_MIN_TEMPERATURE);
    let mut max_temperature = parsed_from_env("VMP_MAX_TEMPERATURE", DEFAULT_MAX_TEMPERATURE);
    if !(min_temperature.is_finite() && max_temperature.is_finite()) || min_temperature > max_temperature {
        warn!(
            "🪛️ The temperature range [{min_temperature}, {max_temperature}] is not valid. Using the default range, \
             [{DEFAULT_MIN_TEMPERATURE}, {DEFAULT_MAX_TEMPERATURE}], instead."
        );
        min_temperature = DEFAULT_MIN_TEMPERATURE;
        max_temperature = DEFAULT_MAX_TEMPERATURE;
    }
    PipelineConfig {
        topic_root,
        liveness_window,
        log_capacity,
        settlement_timeout,
        idempotency_retention,
        min_temperature,
        max_temperature,
    }
}

fn duration_from_env(name: &str, unit: Duration, default: Duration) -> Duration {
    match env::var(name) {
        Ok(s) => parse_duration(&s, unit).unwrap_or_else(|| {
            warn!("🪛️ {s} is not a valid value for {name}. Using the default, {default:?}, instead.");
            default
        }),
        Err(_) => default,
    }
}

fn parsed_from_env<T>(name: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(name) {
        Ok(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            warn!("🪛️ {s} is not a valid value for {name}. {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => default,
    }
}
