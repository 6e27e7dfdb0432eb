//! Local runner detection and on-disk model discovery results.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Whether a local runner is installed and answering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerStatus {
    NotInstalled,
    InstalledNotRunning,
    Running,
}

impl RunnerStatus {
    /// A reachable API means running even when no binary was found (a
    /// container, a custom install path).
    pub fn from_checks(binary_found: bool, api_accessible: bool) -> Self {
        match (binary_found, api_accessible) {
            (_, true) => Self::Running,
            (true, false) => Self::InstalledNotRunning,
            (false, false) => Self::NotInstalled,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotInstalled => "not installed",
            Self::InstalledNotRunning => "installed, not running",
            Self::Running => "running",
        }
    }
}

impl fmt::Display for RunnerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a check of one local provider found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerDetection {
    pub provider: String,
    pub status: RunnerStatus,
    pub binary_path: Option<PathBuf>,
    pub api_accessible: bool,
    pub version: Option<String>,
}

/// Where a discovered model came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSource {
    Ollama,
    LmStudio,
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ollama => "Ollama",
            Self::LmStudio => "LM Studio",
        })
    }
}

/// Weight file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    Gguf,
    Bin,
    SafeTensors,
}

impl ModelFormat {
    /// Format from a weight file's extension; `None` for anything else.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let (_, ext) = name.rsplit_once('.')?;
        Self::from_label(ext)
    }

    /// Format from a label such as Ollama's `details.format` ("gguf").
    pub fn from_label(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "gguf" => Some(Self::Gguf),
            "bin" => Some(Self::Bin),
            "safetensors" => Some(Self::SafeTensors),
            _ => None,
        }
    }
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Gguf => "GGUF",
            Self::Bin => "BIN",
            Self::SafeTensors => "SafeTensors",
        })
    }
}

/// A model available to a local runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalModel {
    pub name: String,
    /// On-disk location; `None` when listed by a running server.
    pub path: Option<PathBuf>,
    pub size_bytes: u64,
    pub source: ModelSource,
    pub format: Option<ModelFormat>,
}

/// Every model found across local runners. Per-source failures are
/// collected in `errors` instead of aborting the scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDiscovery {
    pub models: Vec<LocalModel>,
    pub total_size_bytes: u64,
    pub errors: Vec<String>,
}

impl ModelDiscovery {
    pub fn push(&mut self, model: LocalModel) {
        self.total_size_bytes = self.total_size_bytes.saturating_add(model.size_bytes);
        self.models.push(model);
    }

    /// Fold another source's results into this one.
    pub fn merge(&mut self, other: ModelDiscovery) {
        for model in other.models {
            self.push(model);
        }
        self.errors.extend(other.errors);
    }

    pub fn total_count(&self) -> usize {
        self.models.len()
    }
}
