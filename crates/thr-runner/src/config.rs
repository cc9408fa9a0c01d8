use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_RENDER_SPEC: &str = "inter_throughput";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderFailurePolicy {
    #[default]
    Continue,
    FailFast,
}

impl RenderFailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderFailurePolicy::Continue => "continue",
            RenderFailurePolicy::FailFast => "fail_fast",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlotSettings {
    pub render_spec: String,
    pub gnuplot: String,
    pub scripts_dir: PathBuf,
    pub staging_root: Option<PathBuf>,
    pub on_render_failure: RenderFailurePolicy,
}

impl Default for PlotSettings {
    fn default() -> Self {
        Self {
            render_spec: DEFAULT_RENDER_SPEC.to_string(),
            gnuplot: "gnuplot".to_string(),
            scripts_dir: PathBuf::from("."),
            staging_root: None,
            on_render_failure: RenderFailurePolicy::Continue,
        }
    }
}

impl PlotSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read config {}: {}", path.display(), e))?;
        Self::from_yaml(&raw).map_err(|e| anyhow!("invalid config {}: {}", path.display(), e))
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: PlotSettings = serde_yaml::from_str(raw)?;
        if settings.render_spec.trim().is_empty() {
            return Err(anyhow!("render_spec cannot be empty"));
        }
        Ok(settings)
    }

    pub fn staging_root(&self) -> PathBuf {
        self.staging_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}
