use crate::model::SchoolDay;
use anyhow::Context;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Données refusées à la saisie (l'algorithme suppose qu'elles n'arrivent jamais).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("cover limit of {0} must be strictly positive")]
    ZeroCoverLimit(String),
    #[error("teacher {0} already exists")]
    DuplicateTeacher(String),
    #[error("unknown teacher: {0}")]
    UnknownTeacher(String),
    #[error("unknown role: {0}")]
    UnknownRole(String),
    #[error("not a school day: {0}")]
    UnknownDay(String),
    #[error("lesson {number} does not exist on {day}")]
    LessonOutOfRange { day: SchoolDay, number: u8 },
    #[error("invalid cycle configuration: {0}")]
    InvalidCycle(&'static str),
}

/// Fenêtres horaires du cycle quotidien (heure locale).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    pub allocation_start: NaiveTime,
    pub allocation_end: NaiveTime,
    pub revert_after: NaiveTime,
    /// Fin de la nuit : avant cette heure on peut encore annuler, et la journée du cycle bascule.
    pub overnight_until: NaiveTime,
    pub poll_interval_secs: u64,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            allocation_start: hm(6, 30),
            allocation_end: hm(7, 0),
            revert_after: hm(15, 0),
            overnight_until: hm(6, 0),
            poll_interval_secs: 10,
        }
    }
}

impl CycleConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.allocation_end <= self.allocation_start {
            return Err(ConfigError::InvalidCycle(
                "allocation window must end after it starts",
            ));
        }
        if self.overnight_until > self.allocation_start {
            return Err(ConfigError::InvalidCycle(
                "overnight cutoff must not be after the allocation window",
            ));
        }
        if self.revert_after < self.allocation_end {
            return Err(ConfigError::InvalidCycle(
                "revert cutoff must come after the allocation window",
            ));
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidCycle("poll interval must be > 0"));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Configuration du démon (`run`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub cycle: CycleConfig,
    /// Fichier du drapeau de remise à zéro mensuelle.
    pub state_file: PathBuf,
    /// Répertoire des messages d'escalade ; journal seul si absent.
    pub outbox_dir: Option<PathBuf>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            cycle: CycleConfig::default(),
            state_file: PathBuf::from("cover-state.json"),
            outbox_dir: None,
        }
    }
}

impl DaemonConfig {
    /// Charge un fichier TOML ; les clés absentes prennent leur valeur par défaut.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: DaemonConfig =
            toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
        config.cycle.validate()?;
        Ok(config)
    }
}

fn hm(hour: u32, min: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, min, 0).unwrap_or(NaiveTime::MIN)
}
