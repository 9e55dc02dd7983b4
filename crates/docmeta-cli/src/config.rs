use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context;
use docmeta_core::ConfigBag;
use docmeta_core::config::{OUTPUT_FAULT, OUTPUT_META};

pub const PROJECT_CONFIG: &str = ".docmeta.toml";
pub const WORKERS_ENV: &str = "DOCMETA_WORKERS";

/// A config file layer. Optional layers are skipped when the file is absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLayer {
    pub path: PathBuf,
    pub required: bool,
}

pub fn defaults() -> ConfigBag {
    [(OUTPUT_META, "meta"), (OUTPUT_FAULT, "fault")]
        .into_iter()
        .collect()
}

/// File layers, lowest precedence first: platform config, project config,
/// then the `--config` file if given.
pub fn layers(explicit: Option<&Path>) -> Vec<ConfigLayer> {
    let mut layers = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        layers.push(ConfigLayer {
            path: dir.join("docmeta").join("config.toml"),
            required: false,
        });
    }
    layers.push(ConfigLayer {
        path: PathBuf::from(PROJECT_CONFIG),
        required: false,
    });
    if let Some(path) = explicit {
        layers.push(ConfigLayer {
            path: path.to_path_buf(),
            required: true,
        });
    }
    layers
}

/// Resolve the full cascade: defaults, file layers, then `--set` overrides.
pub fn resolve(explicit: Option<&Path>, overrides: &[String]) -> anyhow::Result<ConfigBag> {
    layered(&layers(explicit), overrides)
}

pub fn layered(layers: &[ConfigLayer], overrides: &[String]) -> anyhow::Result<ConfigBag> {
    let mut bag = defaults();
    for layer in layers {
        let content = match std::fs::read_to_string(&layer.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound && !layer.required => continue,
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read config {}", layer.path.display()));
            }
        };
        let file_bag = ConfigBag::from_toml_str(&content)
            .with_context(|| format!("invalid config {}", layer.path.display()))?;
        tracing::debug!(path = %layer.path.display(), keys = file_bag.len(), "loaded config layer");
        bag.merge(file_bag);
    }
    for raw in overrides {
        let (key, value) = parse_override(raw)?;
        bag.set(key, value);
    }
    Ok(bag)
}

/// Parse a `key=value` override. The value may be empty or contain `=`.
pub fn parse_override(raw: &str) -> anyhow::Result<(String, String)> {
    let (key, value) = raw
        .split_once('=')
        .with_context(|| format!("expected KEY=VALUE, got {raw:?}"))?;
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("empty key in override {raw:?}");
    }
    Ok((key.to_string(), value.to_string()))
}

/// Worker count: the flag, then `DOCMETA_WORKERS`, then available parallelism.
pub fn worker_count(flag: Option<usize>) -> anyhow::Result<usize> {
    if let Some(n) = flag {
        return Ok(n.max(1));
    }
    match std::env::var(WORKERS_ENV) {
        Ok(raw) => raw
            .trim()
            .parse::<usize>()
            .map(|n| n.max(1))
            .with_context(|| format!("invalid {WORKERS_ENV}: {raw:?}")),
        Err(_) => Ok(std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)),
    }
}
