use crate::prelude::*;

use serde::Deserialize;
use serde_with::{serde_as, DurationMilliSeconds};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::profile::ProfileKind;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub device: Device,

    #[serde(default)]
    pub mqtt: Mqtt,

    pub scheduler: Option<Scheduler>,

    #[serde(default = "Config::default_loglevel")]
    pub loglevel: String,

    #[serde(default)]
    pub read_only: bool,
}

// Device {{{
#[serde_as]
#[derive(Clone, Debug, Deserialize)]
pub struct Device {
    pub profile: ProfileKind,

    #[serde(default = "Config::default_unit_id")]
    pub unit_id: u8,

    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "timeout_ms", default = "Config::default_timeout")]
    pub timeout: Duration,

    pub link: Link,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Link {
    Rtu {
        path: String,
        #[serde(default = "Config::default_baud_rate")]
        baud_rate: u32,
    },
    Tcp {
        host: String,
        #[serde(default = "Config::default_modbus_port")]
        port: u16,
    },
}

impl Device {
    pub fn profile(&self) -> ProfileKind {
        self.profile
    }

    pub fn unit_id(&self) -> u8 {
        self.unit_id
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn link(&self) -> &Link {
        &self.link
    }
} // }}}

// Mqtt {{{
#[derive(Clone, Debug, Deserialize)]
pub struct Mqtt {
    #[serde(default = "Config::default_enabled")]
    pub enabled: bool,

    pub host: String,
    #[serde(default = "Config::default_mqtt_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,

    #[serde(default = "Config::default_mqtt_namespace")]
    pub namespace: String,
}

impl Default for Mqtt {
    // no mqtt section means no broker
    fn default() -> Self {
        Self {
            enabled: false,
            host: "localhost".to_string(),
            port: Config::default_mqtt_port(),
            username: None,
            password: None,
            namespace: Config::default_mqtt_namespace(),
        }
    }
}

impl Mqtt {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> &Option<String> {
        &self.username
    }

    pub fn password(&self) -> &Option<String> {
        &self.password
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
} // }}}

// Scheduler {{{
#[derive(Clone, Debug, Deserialize)]
pub struct Scheduler {
    #[serde(default = "Config::default_enabled")]
    pub enabled: bool,

    #[serde(default = "Config::default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Scheduler {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
} // }}}

#[derive(Clone)]
pub struct ConfigWrapper {
    config: Arc<Mutex<Config>>,
}

impl ConfigWrapper {
    pub fn new(file: String) -> Result<Self> {
        Ok(Self::from_config(Config::new(file)?))
    }

    pub fn from_config(config: Config) -> Self {
        Self {
            config: Arc::new(Mutex::new(config)),
        }
    }

    pub fn device(&self) -> Device {
        self.config().device.clone()
    }

    pub fn mqtt(&self) -> Mqtt {
        self.config().mqtt.clone()
    }

    pub fn scheduler(&self) -> Option<Scheduler> {
        self.config().scheduler.clone()
    }

    pub fn loglevel(&self) -> String {
        self.config().loglevel.clone()
    }

    pub fn read_only(&self) -> bool {
        self.config().read_only
    }

    pub fn log_summary(&self) {
        self.config().log_summary();
    }

    fn config(&self) -> MutexGuard<'_, Config> {
        self.config.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Config {
    pub fn new(file: String) -> Result<Self> {
        let content = std::fs::read_to_string(&file)
            .map_err(|err| anyhow!("config.rs:error reading {}: {}", file, err))?;

        Self::from_yaml(&content).map_err(|err| anyhow!("config.rs:{}: {}", file, err))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn log_summary(&self) {
        info!("Configuration loaded successfully:");
        info!("  Device:");
        info!("    Profile: {}", self.device.profile);
        info!("    Unit ID: {}", self.device.unit_id);
        info!("    Timeout: {}ms", self.device.timeout.as_millis());
        match &self.device.link {
            Link::Rtu { path, baud_rate } => info!("    Link: rtu {} @ {} baud", path, baud_rate),
            Link::Tcp { host, port } => info!("    Link: tcp {}:{}", host, port),
        }

        info!("  MQTT: {}", if self.mqtt.enabled { "enabled" } else { "disabled" });
        if self.mqtt.enabled {
            info!("    Host: {}", self.mqtt.host);
            info!("    Port: {}", self.mqtt.port);
            info!("    Namespace: {}", self.mqtt.namespace);
        }

        info!("  Scheduler: {}", if self.scheduler.is_some() { "enabled" } else { "disabled" });
        if let Some(scheduler) = &self.scheduler {
            info!("    Enabled: {}", scheduler.enabled);
            info!("    Poll Interval: {}s", scheduler.poll_interval_secs);
        }

        info!("  Read Only: {}", self.read_only);
        info!("  Log Level: {}", self.loglevel);
    }

    fn validate(&self) -> Result<()> {
        let timeout = self.device.timeout.as_millis();
        if !(1..=30_000).contains(&timeout) {
            bail!("device.timeout_ms must be between 1 and 30000, got {}", timeout);
        }

        match &self.device.link {
            Link::Rtu { path, baud_rate } => {
                if path.is_empty() {
                    bail!("device.link.path cannot be empty");
                }
                if *baud_rate == 0 {
                    bail!("device.link.baud_rate must be non-zero");
                }
            }
            Link::Tcp { host, port } => {
                if host.is_empty() {
                    bail!("device.link.host cannot be empty");
                }
                if *port == 0 {
                    bail!("device.link.port must be between 1 and 65535");
                }
            }
        }

        if self.mqtt.enabled {
            if self.mqtt.port == 0 {
                bail!("mqtt.port must be between 1 and 65535");
            }
            if self.mqtt.host.is_empty() {
                bail!("mqtt.host cannot be empty");
            }
            if self.mqtt.namespace.is_empty() {
                bail!("mqtt.namespace cannot be empty");
            }
        }

        if let Some(scheduler) = &self.scheduler {
            if scheduler.enabled && scheduler.poll_interval_secs == 0 {
                bail!("scheduler.poll_interval_secs must be non-zero");
            }
        }

        Ok(())
    }

    fn default_unit_id() -> u8 {
        1
    }

    fn default_timeout() -> Duration {
        Duration::from_millis(2000)
    }

    fn default_baud_rate() -> u32 {
        9600
    }

    fn default_modbus_port() -> u16 {
        502
    }

    fn default_mqtt_port() -> u16 {
        1883
    }

    fn default_mqtt_namespace() -> String {
        "tou".to_string()
    }

    fn default_poll_interval_secs() -> u64 {
        30
    }

    fn default_enabled() -> bool {
        true
    }

    fn default_loglevel() -> String {
        "info".to_string()
    }
}
