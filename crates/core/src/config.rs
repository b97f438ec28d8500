use providers::{ScorerCommand, ScorerSettings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use storage::DatasetLayout;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub dataset: DatasetConfig,
    pub scorer: ScorerConfig,
    pub thumbnails: ThumbnailConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Static front-end served for any path no route matches.
    pub public_dir: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            public_dir: Some("public".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub rejected_dir: Option<String>,
    pub final_dir: Option<String>,
    pub thumbnail_dir: String,
    pub sidecar_extension: String,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            rejected_dir: None,
            final_dir: None,
            thumbnail_dir: ".thumbnails".to_string(),
            sidecar_extension: "txt".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    pub tagger: ScorerCommand,
    pub general_rater: ScorerCommand,
    pub anime_rater: ScorerCommand,
    pub ready_marker: String,
    pub ready_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub default_threshold: f32,
    pub working_dir: Option<String>,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        let defaults = ScorerSettings::default();
        Self {
            tagger: defaults.tagger,
            general_rater: defaults.general_rater,
            anime_rater: defaults.anime_rater,
            ready_marker: defaults.ready_marker,
            ready_timeout_secs: defaults.ready_timeout.as_secs(),
            request_timeout_secs: defaults.request_timeout.as_secs(),
            default_threshold: 0.3,
            working_dir: None,
        }
    }
}

impl ScorerConfig {
    pub fn settings(&self) -> ScorerSettings {
        ScorerSettings {
            tagger: self.tagger.clone(),
            general_rater: self.general_rater.clone(),
            anime_rater: self.anime_rater.clone(),
            ready_marker: self.ready_marker.clone(),
            ready_timeout: Duration::from_secs(self.ready_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            working_dir: self.working_dir.as_ref().map(PathBuf::from),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    pub size: u32,
    pub quality: u8,
    pub generate_on_start: bool,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            size: 300,
            quality: 80,
            generate_on_start: true,
        }
    }
}

impl AppConfig {
    /// Dataset trees rooted at `root`; relative overrides resolve against it.
    pub fn layout(&self, root: &Path) -> DatasetLayout {
        let resolve = |dir: &Option<String>, default: &str| match dir {
            Some(d) if Path::new(d).is_absolute() => PathBuf::from(d),
            Some(d) => root.join(d),
            None => root.join(default),
        };
        DatasetLayout::new(
            root,
            resolve(&self.dataset.rejected_dir, "_rejected"),
            resolve(&self.dataset.final_dir, "_final"),
        )
        .with_thumbnail_dir(self.dataset.thumbnail_dir.clone())
        .with_sidecar_extension(self.dataset.sidecar_extension.clone())
    }
}

pub fn load(path: Option<&str>) -> anyhow::Result<AppConfig> {
    let mut settings = config::Config::builder();
    if let Some(p) = path {
        settings = settings.add_source(config::File::with_name(p));
    } else {
        settings = settings.add_source(config::File::with_name("config/default").required(false));
    }
    settings = settings.add_source(config::Environment::with_prefix("CURATOR").separator("__"));
    let cfg = settings.build()?;
    Ok(cfg.try_deserialize()?)
}
