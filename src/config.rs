use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::LoadError;
use crate::histoer::peak_finder::PeakFindingSettings;

/// Defaults applied to every fit slot a session creates.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct SessionSettings {
    pub default_model: String,
    pub default_options: String,
    pub debounce_ms: u64,
    /// Engine deadline per fit. `None` lets a fit run as long as it takes.
    pub timeout_ms: Option<u64>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            default_model: "gaus".to_owned(),
            default_options: "SQ".to_owned(),
            debounce_ms: 500,
            timeout_ms: None,
        }
    }
}

impl SessionSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct BatchConfig {
    pub histograms: Vec<PathBuf>,
    pub output_dir: PathBuf,
    pub fit_width: f64,
    pub model: String,
    pub options: String,
    pub peak_finding: PeakFindingSettings,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            histograms: Vec::new(),
            output_dir: PathBuf::from("batch_output"),
            fit_width: 10.0,
            model: "gaus".to_owned(),
            options: "SQ".to_owned(),
            peak_finding: PeakFindingSettings::default(),
        }
    }
}

impl BatchConfig {
    pub fn load_yaml(path: &Path) -> Result<Self, LoadError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let config: BatchConfig = serde_yaml::from_reader(reader)?;

        if config.fit_width <= 0.0 {
            return Err(LoadError::Invalid(format!(
                "fit_width must be positive, got {}",
                config.fit_width
            )));
        }

        log::info!(
            "Loaded batch config with {} histograms from {}",
            config.histograms.len(),
            path.display()
        );
        Ok(config)
    }
}
