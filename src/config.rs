use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::alarm::model::{AlarmCreateInfo, DelayUnit};
use crate::manager::{CreatePolicy, ManagerSettings};

pub const DEFAULT_TICK_MS: u64 = 250;

#[derive(Debug, Clone, Default)]
pub struct DemoConfig {
    pub settings: DemoSettings,
    pub alarms: Vec<SeedAlarm>,
}

#[derive(Debug, Clone)]
pub struct DemoSettings {
    pub log_capacity: Option<usize>,
    pub refresh_timeout_ms: Option<u64>,
    pub create_policy: CreatePolicy,
    pub tick_ms: u64,
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            log_capacity: None,
            refresh_timeout_ms: None,
            create_policy: CreatePolicy::Strict,
            tick_ms: DEFAULT_TICK_MS,
        }
    }
}

impl DemoSettings {
    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            log_capacity: self.log_capacity,
            refresh_timeout: self.refresh_timeout_ms.map(Duration::from_millis),
            create_policy: self.create_policy,
        }
    }
}

/// An alarm created through the manager when the demo starts.
#[derive(Debug, Clone)]
pub struct SeedAlarm {
    pub name: String,
    pub delay: f64,
    pub unit: DelayUnit,
    pub period: Option<f64>,
}

impl SeedAlarm {
    pub fn create_info(&self, now_ms: f64) -> AlarmCreateInfo {
        AlarmCreateInfo::from_form(self.delay, self.unit, self.period, now_ms)
    }
}

pub fn load_demo_config(path: &Path) -> Result<DemoConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("unable to read config file {}", path.display()))?;
    parse_demo_config_text(&content)
}

pub fn parse_demo_config_text(content: &str) -> Result<DemoConfig> {
    let raw = serde_json::from_str::<DemoConfigFile>(content).map_err(|err| {
        let line = err.line();
        let column = err.column();
        anyhow::anyhow!("invalid JSON at line {line}, column {column}: {err}")
    })?;

    if raw.version != 1 {
        bail!(
            "unsupported config version {}; expected version 1",
            raw.version
        );
    }
    if raw.settings.log_capacity == Some(0) {
        bail!("log_capacity must be greater than zero when set");
    }
    if raw.settings.tick_ms == 0 {
        bail!("tick_ms must be greater than zero");
    }

    let mut names = HashSet::new();
    let mut alarms = Vec::with_capacity(raw.alarms.len());
    for alarm in raw.alarms {
        if alarm.name.trim().is_empty() {
            bail!("seed alarm names must not be empty");
        }
        if !names.insert(alarm.name.clone()) {
            bail!("duplicate alarm name found: {}", alarm.name);
        }
        if !alarm.delay.is_finite() || alarm.delay < 0.0 {
            bail!(
                "alarm '{}' must have a non-negative delay, got {}",
                alarm.name,
                alarm.delay
            );
        }
        if let Some(period) = alarm.period
            && (!period.is_finite() || period < 0.0)
        {
            bail!(
                "alarm '{}' must have a non-negative period, got {period}",
                alarm.name
            );
        }
        alarms.push(SeedAlarm {
            name: alarm.name,
            delay: alarm.delay,
            unit: alarm.unit,
            period: alarm.period,
        });
    }

    Ok(DemoConfig {
        settings: DemoSettings {
            log_capacity: raw.settings.log_capacity,
            refresh_timeout_ms: raw.settings.refresh_timeout_ms,
            create_policy: raw.settings.create_policy,
            tick_ms: raw.settings.tick_ms,
        },
        alarms,
    })
}

#[derive(Debug, Deserialize)]
struct DemoConfigFile {
    version: u32,
    #[serde(default)]
    settings: DemoSettingsFile,
    #[serde(default)]
    alarms: Vec<SeedAlarmFile>,
}

#[derive(Debug, Deserialize)]
struct DemoSettingsFile {
    #[serde(default)]
    log_capacity: Option<usize>,
    #[serde(default)]
    refresh_timeout_ms: Option<u64>,
    #[serde(default)]
    create_policy: CreatePolicy,
    #[serde(default = "default_tick_ms")]
    tick_ms: u64,
}

impl Default for DemoSettingsFile {
    fn default() -> Self {
        Self {
            log_capacity: None,
            refresh_timeout_ms: None,
            create_policy: CreatePolicy::default(),
            tick_ms: DEFAULT_TICK_MS,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SeedAlarmFile {
    name: String,
    delay: f64,
    #[serde(default = "default_unit")]
    unit: DelayUnit,
    #[serde(default)]
    period: Option<f64>,
}

fn default_tick_ms() -> u64 {
    DEFAULT_TICK_MS
}

fn default_unit() -> DelayUnit {
    DelayUnit::Min
}
