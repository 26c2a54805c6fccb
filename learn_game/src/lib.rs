pub mod agent;
pub mod board;
pub mod config;
pub mod error;
pub mod memory;
pub mod minimax;
pub mod model;
pub mod persistence;
pub mod session;
pub mod trainer;

pub use agent::{Agent, AgentStats, GameOutcome, LearnedPolicy, Mode, Policy, RewardShaping};
pub use board::{Board, IsGameOver, Marks};
pub use config::Config;
pub use error::{BoardError, ConfigError};
pub use memory::{ReplayMemory, Transition, TransitionBatch};
pub use minimax::{MinimaxSolver, Opening};
pub use model::{Mlp, ModelVersion, QModel};
pub use persistence::ModelStore;
pub use session::{Game, GameResult, SessionSummary};
pub use trainer::{StepReport, Trainer};
