//! Local model discovery.
//!
//! Three sources: a running Ollama server's `/api/tags`, Ollama's manifest
//! store on disk (used when the server is down), and LM Studio model
//! folders. Disk scans are blocking and run on the blocking pool.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use walkdir::WalkDir;

use parley_types::local::{LocalModel, ModelDiscovery, ModelFormat, ModelSource};

/// Per-request timeout for `/api/tags`.
const TAGS_TIMEOUT: Duration = Duration::from_secs(5);

/// Media type of the weights layer in an Ollama manifest.
const OLLAMA_MODEL_LAYER: &str = "application/vnd.ollama.image.model";

/// Registry and namespace omitted from Ollama's short model names.
const OLLAMA_DEFAULT_REGISTRY: &str = "registry.ollama.ai";
const OLLAMA_DEFAULT_NAMESPACE: &str = "library";

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Ollama tag listing failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid Ollama manifest {}: {source}", .path.display())]
    Manifest {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
struct TagList {
    #[serde(default)]
    models: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
struct Tag {
    name: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    details: TagDetails,
}

#[derive(Debug, Default, Deserialize)]
struct TagDetails {
    #[serde(default)]
    format: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    layers: Vec<Layer>,
}

#[derive(Debug, Deserialize)]
struct Layer {
    #[serde(rename = "mediaType", default)]
    media_type: String,
    #[serde(default)]
    digest: String,
    #[serde(default)]
    size: u64,
}

/// Models a running Ollama server has pulled. `root` is the server root
/// without `/v1`.
pub async fn list_ollama_tags(
    client: &reqwest::Client,
    root: &str,
) -> Result<Vec<LocalModel>, DiscoveryError> {
    let url = format!("{}/api/tags", root.trim_end_matches('/'));
    let tags: TagList = client
        .get(&url)
        .timeout(TAGS_TIMEOUT)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    Ok(tags
        .models
        .into_iter()
        .map(|tag| LocalModel {
            format: tag.details.format.as_deref().and_then(ModelFormat::from_label),
            name: tag.name,
            path: None,
            size_bytes: tag.size,
            source: ModelSource::Ollama,
        })
        .collect())
}

/// On-disk model locations.
#[derive(Debug, Clone, Default)]
pub struct LocalModelScanner {
    ollama_dir: Option<PathBuf>,
    lmstudio_dirs: Vec<PathBuf>,
}

impl LocalModelScanner {
    pub fn new(ollama_dir: Option<PathBuf>, lmstudio_dirs: Vec<PathBuf>) -> Self {
        Self {
            ollama_dir,
            lmstudio_dirs,
        }
    }

    /// The platform's default stores. `OLLAMA_MODELS` overrides the Ollama
    /// location the same way it does for Ollama itself.
    pub fn from_platform() -> Self {
        let home = dirs::home_dir();
        let ollama_dir = std::env::var_os("OLLAMA_MODELS")
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
            .or_else(|| home.as_ref().map(|h| h.join(".ollama").join("models")));

        let mut lmstudio_dirs = Vec::new();
        if let Some(home) = &home {
            lmstudio_dirs.push(home.join(".lmstudio").join("models"));
            lmstudio_dirs.push(home.join(".cache").join("lm-studio").join("models"));
        }
        if let Some(config) = dirs::config_dir() {
            lmstudio_dirs.push(config.join("LM Studio").join("models"));
            lmstudio_dirs.push(config.join("lmstudio").join("models"));
        }
        if let Some(documents) = dirs::document_dir() {
            lmstudio_dirs.push(documents.join("LM Studio").join("models"));
        }
        Self::new(ollama_dir, lmstudio_dirs)
    }

    /// Walk the stores. Missing directories are skipped silently; anything
    /// unreadable lands in `errors`. Blocking.
    pub fn scan(&self, include_ollama: bool) -> ModelDiscovery {
        let mut discovery = ModelDiscovery::default();
        if include_ollama {
            if let Some(dir) = self.ollama_dir.as_deref() {
                scan_ollama_store(dir, &mut discovery);
            }
        }
        let mut seen = Vec::new();
        for dir in &self.lmstudio_dirs {
            if seen.contains(dir) {
                continue;
            }
            scan_weight_files(dir, ModelSource::LmStudio, &mut discovery);
            seen.push(dir.clone());
        }
        discovery
    }
}

/// Read `{dir}/manifests/<registry>/<namespace>/<model>/<tag>`. Each
/// manifest is one model; its size is the sum of its layers.
fn scan_ollama_store(dir: &Path, discovery: &mut ModelDiscovery) {
    let manifests = dir.join("manifests");
    if !manifests.is_dir() {
        return;
    }

    for entry in WalkDir::new(&manifests) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                discovery.errors.push(walk_error(&manifests, e).to_string());
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(&manifests) else {
            continue;
        };
        let Some(name) = ollama_model_name(relative) else {
            continue;
        };
        match read_manifest(entry.path()) {
            Ok(manifest) => discovery.push(ollama_model(dir, entry.path(), name, &manifest)),
            Err(e) => discovery.errors.push(e.to_string()),
        }
    }
}

fn read_manifest(path: &Path) -> Result<Manifest, DiscoveryError> {
    let raw = std::fs::read(path).map_err(|source| DiscoveryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&raw).map_err(|source| DiscoveryError::Manifest {
        path: path.to_path_buf(),
        source,
    })
}

fn ollama_model(store: &Path, manifest_path: &Path, name: String, manifest: &Manifest) -> LocalModel {
    let weights = manifest
        .layers
        .iter()
        .find(|layer| layer.media_type == OLLAMA_MODEL_LAYER);
    // Blobs are stored as `sha256-<hex>` for digest `sha256:<hex>`.
    let path = weights
        .map(|layer| store.join("blobs").join(layer.digest.replace(':', "-")))
        .filter(|blob| blob.is_file())
        .unwrap_or_else(|| manifest_path.to_path_buf());

    LocalModel {
        name,
        path: Some(path),
        size_bytes: manifest.layers.iter().map(|layer| layer.size).sum(),
        source: ModelSource::Ollama,
        format: weights.map(|_| ModelFormat::Gguf),
    }
}

/// `registry.ollama.ai/library/llama3/8b` is `llama3:8b`; other namespaces
/// and registries stay in the name (`hf.co/org/repo:Q4_K_M`).
fn ollama_model_name(relative: &Path) -> Option<String> {
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    let (tag, path) = parts.split_last()?;
    if path.is_empty() {
        return None;
    }

    let path: &[String] = match path {
        [registry, namespace, rest @ ..]
            if registry == OLLAMA_DEFAULT_REGISTRY
                && namespace == OLLAMA_DEFAULT_NAMESPACE
                && !rest.is_empty() =>
        {
            rest
        }
        [registry, rest @ ..] if registry == OLLAMA_DEFAULT_REGISTRY && !rest.is_empty() => rest,
        _ => path,
    };
    Some(format!("{}:{tag}", path.join("/")))
}

/// Every `.gguf`, `.bin`, or `.safetensors` file under `dir`, named by
/// file stem.
fn scan_weight_files(dir: &Path, source: ModelSource, discovery: &mut ModelDiscovery) {
    if !dir.is_dir() {
        return;
    }

    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                discovery.errors.push(walk_error(dir, e).to_string());
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy();
        let Some(format) = ModelFormat::from_file_name(&file_name) else {
            continue;
        };
        let name = entry
            .path()
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_name.clone().into_owned());
        let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);

        discovery.push(LocalModel {
            name,
            path: Some(entry.path().to_path_buf()),
            size_bytes,
            source,
            format: Some(format),
        });
    }
}

fn walk_error(root: &Path, error: walkdir::Error) -> DiscoveryError {
    let path = error.path().unwrap_or(root).to_path_buf();
    let source = error
        .into_io_error()
        .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
    DiscoveryError::Io { path, source }
}
