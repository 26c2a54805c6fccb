use crate::agent::{LearnedPolicy, Mode, RewardShaping};
use crate::error::ConfigError;
use crate::memory::{ReplayMemory, MAX_MEMORY};
use crate::minimax::{MinimaxSolver, Opening, CORNERS, DEFAULT_DEPTH_LIMIT};
use crate::model::{ModelVersion, QModel};
use crate::persistence::ModelStore;
use crate::trainer::{Trainer, BATCH_SIZE, GAMMA, LR};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const EPSILON: f32 = 0.1;
pub const MODEL_DIR: &str = "./model_archive/";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub epsilon: f32,
    pub gamma: f32,
    pub learning_rate: f32,
    pub memory_capacity: usize,
    pub batch_size: usize,
    pub depth_limit: usize,
    pub opening: Opening,
    pub reward_shaping: bool,
    pub model_version: ModelVersion,
    pub model_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            epsilon: EPSILON,
            gamma: GAMMA,
            learning_rate: LR,
            memory_capacity: MAX_MEMORY,
            batch_size: BATCH_SIZE,
            depth_limit: DEFAULT_DEPTH_LIMIT,
            opening: Opening::default(),
            reward_shaping: false,
            model_version: ModelVersion::V1,
            model_dir: PathBuf::from(MODEL_DIR),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults when the file does not exist; any other failure is returned.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            warn!("{} not found, using default config", path.display());
            return Ok(Config::default());
        }
        Config::load(path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.epsilon) {
            return Err(ConfigError::Validation(format!(
                "epsilon must be in [0, 1], got {}",
                self.epsilon
            )));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(ConfigError::Validation(format!(
                "gamma must be in [0, 1], got {}",
                self.gamma
            )));
        }
        if !(self.learning_rate > 0.0) {
            return Err(ConfigError::Validation(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Validation("batch_size must be positive".into()));
        }
        if self.memory_capacity == 0 {
            return Err(ConfigError::Validation("memory_capacity must be at least 1".into()));
        }
        if let Opening::Fixed(index) = self.opening {
            if !CORNERS.contains(&index) {
                return Err(ConfigError::Validation(format!(
                    "opening cell {index} is not a corner, expected one of {CORNERS:?}"
                )));
            }
        }
        Ok(())
    }

    pub fn solver(&self) -> MinimaxSolver {
        MinimaxSolver::new(self.depth_limit, self.opening)
    }

    pub fn trainer(&self) -> Trainer {
        Trainer::new(self.gamma)
    }

    pub fn shaping(&self) -> Option<RewardShaping> {
        self.reward_shaping.then(RewardShaping::default)
    }

    pub fn store(&self) -> ModelStore {
        ModelStore::new(&self.model_dir)
    }

    /// Wraps `model` with this config's trainer, memory and batch size. The
    /// solver is attached as oracle when reward shaping is on.
    pub fn learned_policy(&self, model: Box<dyn QModel>, mode: Mode) -> LearnedPolicy {
        let policy = LearnedPolicy::new(model, mode)
            .with_trainer(self.trainer())
            .with_memory(ReplayMemory::new(self.memory_capacity))
            .with_batch_size(self.batch_size);
        if self.reward_shaping {
            policy.with_oracle(self.solver())
        } else {
            policy
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Mlp;
    use std::io::Write;

    fn write_config(text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gamma, 0.9);
        assert_eq!(config.learning_rate, 0.001);
        assert_eq!(config.memory_capacity, 100_000);
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.depth_limit, 7);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let file = write_config(r#"{ "gamma": 0.5, "opening": "RandomCorner" }"#);
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.gamma, 0.5);
        assert_eq!(config.opening, Opening::RandomCorner);
        assert_eq!(config.batch_size, BATCH_SIZE);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let file = write_config(r#"{ "gamma": 1.5 }"#);
        assert!(matches!(Config::load(file.path()), Err(ConfigError::Validation(_))));
        let file = write_config(r#"{ "batch_size": 0 }"#);
        assert!(matches!(Config::load(file.path()), Err(ConfigError::Validation(_))));
        let file = write_config(r#"{ "opening": { "Fixed": 9 } }"#);
        assert!(matches!(Config::load(file.path()), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn fixed_opening_must_be_a_corner() {
        for index in [1, 4, 5, 7] {
            let text = format!(r#"{{ "opening": {{ "Fixed": {index} }} }}"#);
            let file = write_config(&text);
            assert!(
                matches!(Config::load(file.path()), Err(ConfigError::Validation(_))),
                "cell {index} accepted as opening"
            );
        }
        let file = write_config(r#"{ "opening": { "Fixed": 8 } }"#);
        assert_eq!(Config::load(file.path()).unwrap().opening, Opening::Fixed(8));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let file = write_config("{ gamma: ");
        assert!(matches!(Config::load(file.path()), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        assert!(matches!(Config::load(&path), Err(ConfigError::FileRead { .. })));
        assert_eq!(Config::load_or_default(&path).unwrap(), Config::default());
    }

    #[test]
    fn shaping_attaches_oracle() {
        let config = Config {
            reward_shaping: true,
            ..Config::default()
        };
        let model = Mlp::new(ModelVersion::V1, config.learning_rate);
        let policy = config.learned_policy(Box::new(model), Mode::Trainable);
        assert_eq!(policy.oracle, Some(config.solver()));
        assert_eq!(config.shaping(), Some(RewardShaping::default()));
    }
}
