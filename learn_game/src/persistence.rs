use crate::agent::{LearnedPolicy, Mode};
use crate::config::Config;
use crate::model::{Mlp, ModelVersion, QModel};
use anyhow::{anyhow, bail, Context};
use chrono::offset::Local;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

const PARAMETER_EXTENSION: &str = "mpk";

/// Written next to every saved parameter file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub tag: String,
    pub version: Option<ModelVersion>,
    pub parameters: usize,
    pub saved_at: String,
}

/// Directory of saved models keyed by tag: `<tag>.mpk` holds the parameters
/// (burn's default recorder), `<tag>.json` the metadata.
#[derive(Debug, Clone)]
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        ModelStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path handed to the recorder, which adds the extension itself.
    fn record_path(&self, tag: &str) -> PathBuf {
        self.dir.join(tag)
    }

    fn parameter_path(&self, tag: &str) -> PathBuf {
        self.record_path(tag).with_extension(PARAMETER_EXTENSION)
    }

    fn json_path(&self, tag: &str) -> PathBuf {
        self.record_path(tag).with_extension("json")
    }

    pub fn exists(&self, tag: &str) -> bool {
        self.parameter_path(tag).is_file() && self.json_path(tag).is_file()
    }

    pub fn save(&self, model: &dyn QModel, tag: &str) -> anyhow::Result<PathBuf> {
        if tag.is_empty() || tag.contains(['.', '/', '\\']) {
            bail!("'{}' is not a usable model tag", tag);
        }
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating model directory {}", self.dir.display()))?;

        model.save_to(&self.record_path(tag))?;

        let metadata = ModelMetadata {
            tag: tag.to_owned(),
            version: model.version(),
            parameters: model.parameter_count(),
            saved_at: Local::now().to_rfc3339(),
        };
        let json = self.json_path(tag);
        let file_json = File::create(&json).with_context(|| format!("creating {}", json.display()))?;
        serde_json::to_writer_pretty(file_json, &metadata)?;

        let parameters = self.parameter_path(tag);
        info!("saved {} ({} parameters) to {}", tag, metadata.parameters, parameters.display());
        Ok(parameters)
    }

    pub fn metadata(&self, tag: &str) -> anyhow::Result<ModelMetadata> {
        let json = self.json_path(tag);
        let file = File::open(&json).with_context(|| format!("opening {}", json.display()))?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// The saved network, with a fresh optimiser at `learning_rate`.
    pub fn load_model(&self, tag: &str, learning_rate: f32) -> anyhow::Result<Mlp> {
        let metadata = self.metadata(tag)?;
        let version = metadata
            .version
            .ok_or_else(|| anyhow!("{} was saved without a model version", tag))?;
        Mlp::load(&self.record_path(tag), version, learning_rate)
    }

    /// Restores a saved model as a policy that keeps learning or stays frozen,
    /// with trainer, memory and batch size taken from `config`.
    pub fn load(&self, tag: &str, config: &Config, mode: Mode) -> anyhow::Result<LearnedPolicy> {
        let model = self.load_model(tag, config.learning_rate)?;
        info!("loaded {} as {:?}", tag, mode);
        Ok(config.learned_policy(Box::new(model), mode))
    }
}
