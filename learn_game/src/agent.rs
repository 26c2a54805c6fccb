use crate::board::{Board, IsGameOver, Marks};
use crate::memory::{ReplayMemory, Transition, MAX_MEMORY};
use crate::minimax::MinimaxSolver;
use crate::model::{argmax, QModel};
use crate::trainer::{Trainer, BATCH_SIZE};
use log::{debug, error, info, warn};
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

pub const REWARD_WIN: f32 = 2.0;
pub const REWARD_DRAW: f32 = 1.0;
pub const REWARD_LOSS: f32 = -1.0;

/// Exploration rate after `games_played` games for a configured rate `epsilon`.
///
/// `min(epsilon, 0.1)^0.01 * 0.99^(games_played + 1)`, snapped to zero once it is
/// no longer above `1e-4`.
pub fn exploration_rate(epsilon: f32, games_played: i64) -> f32 {
    let base = f64::from(epsilon.min(0.1)).powf(0.01);
    let value = base * 0.99_f64.powf((games_played.max(0) + 1) as f64);
    if value > 1e-4 {
        value as f32
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameOutcome {
    InProgress,
    Won,
    Lost,
    Drawn,
}

impl GameOutcome {
    pub fn reward(self) -> f32 {
        match self {
            GameOutcome::Won => REWARD_WIN,
            GameOutcome::Drawn => REWARD_DRAW,
            GameOutcome::Lost => REWARD_LOSS,
            GameOutcome::InProgress => 0.0,
        }
    }

    /// How a board ends for the side playing `mark`.
    pub fn of(board: &Board, mark: Marks) -> Self {
        match board.outcome() {
            IsGameOver::Win(winner) if winner == mark => GameOutcome::Won,
            IsGameOver::Win(_) => GameOutcome::Lost,
            IsGameOver::Drawn => GameOutcome::Drawn,
            IsGameOver::InPlay => GameOutcome::InProgress,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentStats {
    pub games_won: i64,
    pub games_lost: i64,
    pub games_drawn: i64,
    pub total_reward: f32,
    pub record: f32,
    pub n_best_move: u64,
    pub n_invalid_move: u64,
}

impl AgentStats {
    pub fn game_count(&self) -> i64 {
        self.games_won + self.games_lost + self.games_drawn
    }

    fn has_negative_counter(&self) -> bool {
        self.games_won < 0 || self.games_lost < 0 || self.games_drawn < 0
    }

    pub fn wl_ratio(&self) -> f32 {
        if self.has_negative_counter() {
            warn!("negative game counters, win/loss ratio reported as 0");
            return 0.0;
        }
        if self.games_lost > 0 {
            self.games_won as f32 / self.games_lost as f32
        } else {
            self.games_won as f32
        }
    }

    pub fn win_rate(&self) -> f32 {
        if self.has_negative_counter() {
            warn!("negative game counters, win rate reported as 0");
            return 0.0;
        }
        let games = self.game_count();
        if games > 0 {
            self.games_won as f32 / games as f32
        } else {
            0.0
        }
    }
}

/// Extra reward for a learned policy: a bonus when its move matches the
/// oracle's and a penalty when its move had to be corrected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardShaping {
    pub oracle_bonus: f32,
    pub invalid_penalty: f32,
}

impl Default for RewardShaping {
    fn default() -> Self {
        RewardShaping {
            oracle_bonus: 0.5,
            invalid_penalty: -0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Trainable,
    Frozen,
}

/// A model-backed policy together with everything it needs to keep learning.
#[derive(Debug)]
pub struct LearnedPolicy {
    pub model: Box<dyn QModel>,
    pub trainer: Trainer,
    pub memory: ReplayMemory,
    pub batch_size: usize,
    pub mode: Mode,
    pub oracle: Option<MinimaxSolver>,
}

impl LearnedPolicy {
    pub fn new(model: Box<dyn QModel>, mode: Mode) -> Self {
        LearnedPolicy {
            model,
            trainer: Trainer::default(),
            memory: ReplayMemory::new(MAX_MEMORY),
            batch_size: BATCH_SIZE,
            mode,
            oracle: None,
        }
    }

    pub fn with_trainer(mut self, trainer: Trainer) -> Self {
        self.trainer = trainer;
        self
    }

    pub fn with_memory(mut self, memory: ReplayMemory) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_oracle(mut self, oracle: MinimaxSolver) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn is_trainable(&self) -> bool {
        self.mode == Mode::Trainable
    }

    /// Highest-scoring cell according to the model, occupied or not.
    pub fn greedy_move(&self, board: &Board) -> usize {
        argmax(self.model.evaluate_one(board.flatten().view()).view())
    }
}

#[derive(Debug)]
pub enum Policy {
    Minimax(MinimaxSolver),
    Learned(LearnedPolicy),
}

/// A move waiting for the opponent's reply before it becomes a transition.
#[derive(Debug, Clone)]
struct PendingMove {
    state: Array1<f32>,
    action: usize,
    bonus: f32,
}

#[derive(Debug)]
pub struct Agent {
    pub name: String,
    mark: Marks,
    policy: Policy,
    epsilon: f32,
    stats: AgentStats,
    outcome: GameOutcome,
    shaping: Option<RewardShaping>,
    move_bonus: f32,
    pending: Option<PendingMove>,
    rng: StdRng,
}

impl Agent {
    pub fn new(name: impl Into<String>, mark: Marks, policy: Policy, epsilon: f32) -> Self {
        Agent {
            name: name.into(),
            mark,
            policy,
            epsilon,
            stats: AgentStats::default(),
            outcome: GameOutcome::InProgress,
            shaping: None,
            move_bonus: 0.0,
            pending: None,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn minimax(name: impl Into<String>, mark: Marks, solver: MinimaxSolver, epsilon: f32) -> Self {
        Self::new(name, mark, Policy::Minimax(solver), epsilon)
    }

    pub fn learned(name: impl Into<String>, mark: Marks, policy: LearnedPolicy, epsilon: f32) -> Self {
        Self::new(name, mark, Policy::Learned(policy), epsilon)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_shaping(mut self, shaping: RewardShaping) -> Self {
        self.shaping = Some(shaping);
        self
    }

    pub fn mark(&self) -> Marks {
        self.mark
    }

    pub fn set_mark(&mut self, mark: Marks) {
        self.mark = mark;
    }

    pub fn stats(&self) -> &AgentStats {
        &self.stats
    }

    pub fn outcome(&self) -> GameOutcome {
        self.outcome
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn policy_mut(&mut self) -> &mut Policy {
        &mut self.policy
    }

    pub fn gamma(&self) -> Option<f32> {
        match &self.policy {
            Policy::Learned(learned) => Some(learned.trainer.gamma),
            Policy::Minimax(_) => None,
        }
    }

    /// Current exploration rate; frozen policies never explore.
    pub fn exploration_rate(&self) -> f32 {
        match &self.policy {
            Policy::Learned(learned) if !learned.is_trainable() => 0.0,
            _ => exploration_rate(self.epsilon, self.stats.game_count()),
        }
    }

    fn is_training(&self) -> bool {
        matches!(&self.policy, Policy::Learned(learned) if learned.is_trainable())
    }

    /// Starts the per-game state machine over.
    pub fn new_game(&mut self) {
        self.outcome = GameOutcome::InProgress;
        self.pending = None;
        self.move_bonus = 0.0;
    }

    /// Epsilon-greedy choice of a cell; `None` on a finished board.
    pub fn select_move(&mut self, board: &mut Board) -> Option<usize> {
        self.move_bonus = 0.0;
        if board.is_terminal() {
            return None;
        }
        let rate = self.exploration_rate();
        if rate > 0.0 && self.rng.gen::<f32>() < rate {
            self.stats.n_invalid_move += 1;
            return board.random_free_index(&mut self.rng);
        }
        self.stats.n_best_move += 1;
        match &self.policy {
            Policy::Minimax(solver) => solver.best_move(board, self.mark, &mut self.rng),
            Policy::Learned(learned) => {
                let choice = learned.greedy_move(board);
                let oracle_move = match (&self.shaping, &learned.oracle) {
                    (Some(_), Some(oracle)) => oracle.best_move(board, self.mark, &mut self.rng),
                    _ => None,
                };
                if board.at(choice) == Ok(Marks::EMPTY) {
                    if let (Some(shaping), Some(oracle_choice)) = (&self.shaping, oracle_move) {
                        if oracle_choice == choice {
                            self.move_bonus += shaping.oracle_bonus;
                        }
                    }
                    return Some(choice);
                }
                self.stats.n_invalid_move += 1;
                if let Some(shaping) = &self.shaping {
                    self.move_bonus += shaping.invalid_penalty;
                }
                let corrected = match &learned.oracle {
                    Some(oracle) => oracle_move.or_else(|| oracle.best_move(board, self.mark, &mut self.rng)),
                    None => board.random_free_index(&mut self.rng),
                };
                warn!(
                    "{} picked occupied cell {}, corrected to {:?}",
                    self.name, choice, corrected
                );
                corrected
            }
        }
    }

    /// Chooses a cell and marks it on `board`. Returns the index played, or
    /// `None` when no move could be made.
    ///
    /// A live board after a finished game starts the next game.
    pub fn perform_action(&mut self, board: &mut Board) -> Option<usize> {
        if self.outcome != GameOutcome::InProgress && !board.is_terminal() {
            debug!("{} ({:?}) starts a new game", self.name, self.mark);
            self.new_game();
        }
        self.complete_pending(board);
        let Some(choice) = self.select_move(board) else {
            error!("no valid move found for {} ({:?})", self.name, self.mark);
            return None;
        };
        let before = board.flatten();
        if let Err(e) = board.apply(choice, self.mark) {
            error!("invalid move by {} ({:?}): {}", self.name, self.mark, e);
            return None;
        }
        debug!("{} ({:?}) plays {}", self.name, self.mark, choice);
        self.stats.total_reward += self.move_bonus;
        if self.is_training() {
            self.pending = Some(PendingMove {
                state: before,
                action: choice,
                bonus: self.move_bonus,
            });
            if board.is_terminal() {
                self.complete_pending(board);
            }
        }
        Some(choice)
    }

    /// Classifies a finished game once, updates counters and reward, and
    /// runs the end-of-game training pass for learning agents.
    pub fn update_stats(&mut self, board: &Board) {
        if !board.is_terminal() || self.outcome != GameOutcome::InProgress {
            return;
        }
        self.complete_pending(board);
        let outcome = GameOutcome::of(board, self.mark);
        match outcome {
            GameOutcome::Won => self.stats.games_won += 1,
            GameOutcome::Lost => self.stats.games_lost += 1,
            GameOutcome::Drawn => self.stats.games_drawn += 1,
            GameOutcome::InProgress => return,
        }
        self.outcome = outcome;
        self.stats.total_reward += outcome.reward();
        info!(
            "{} ({:?}) {:?}: won {} lost {} drawn {} reward {:.2}",
            self.name,
            self.mark,
            outcome,
            self.stats.games_won,
            self.stats.games_lost,
            self.stats.games_drawn,
            self.stats.total_reward
        );
        if let Policy::Learned(learned) = &mut self.policy {
            if learned.is_trainable() {
                learned.trainer.train_long_memory(
                    learned.model.as_mut(),
                    &learned.memory,
                    learned.batch_size,
                    &mut self.rng,
                );
            }
        }
    }

    /// True, and the record raised, when the cumulative reward is positive and
    /// beats every earlier value.
    pub fn is_new_record(&mut self) -> bool {
        if self.stats.total_reward > 0.0 && self.stats.total_reward > self.stats.record {
            self.stats.record = self.stats.total_reward;
            return true;
        }
        false
    }

    /// Turns the pending move into a transition ending at `board`, stores it
    /// and trains on it.
    fn complete_pending(&mut self, board: &Board) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        let done = board.is_terminal();
        let reward = if done {
            GameOutcome::of(board, self.mark).reward() + pending.bonus
        } else {
            pending.bonus
        };
        let transition = Transition {
            state: pending.state,
            action: pending.action,
            reward,
            next_state: board.flatten(),
            done,
        };
        if let Policy::Learned(learned) = &mut self.policy {
            let report = learned
                .trainer
                .train_short_memory(learned.model.as_mut(), &transition);
            debug!("{} short memory loss {:.5}", self.name, report.loss);
            learned.memory.push(transition);
        }
    }
}
