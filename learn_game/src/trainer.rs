use crate::board::CELLS;
use crate::memory::{ReplayMemory, Transition, TransitionBatch};
use crate::model::QModel;
use log::debug;
use ndarray::prelude::*;
use rand::Rng;

pub const GAMMA: f32 = 0.9;
pub const LR: f32 = 0.001;
pub const BATCH_SIZE: usize = 1000;

/// Outcome of one gradient step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub loss: f32,
    pub targets: Array2<f32>,
}

/// Bootstrapped Q-learning update over any [`QModel`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trainer {
    pub gamma: f32,
}

impl Default for Trainer {
    fn default() -> Self {
        Trainer { gamma: GAMMA }
    }
}

impl Trainer {
    pub fn new(gamma: f32) -> Self {
        Trainer { gamma }
    }

    /// The model's own predictions with the taken action's entry replaced by
    /// `reward`, plus `gamma * max(next scores)` for non-terminal samples.
    pub fn targets<M: QModel + ?Sized>(&self, model: &M, batch: &TransitionBatch) -> Array2<f32> {
        let n = batch.len();
        assert_eq!(batch.actions.len(), n, "action count differs from state count");
        assert_eq!(batch.rewards.len(), n, "reward count differs from state count");
        assert_eq!(batch.dones.len(), n, "terminal flag count differs from state count");
        assert_eq!(batch.next_states.nrows(), n, "next state count differs from state count");

        let mut targets = model.evaluate(batch.states.view());
        assert_eq!(targets.dim(), (n, CELLS), "model must score every cell");
        let next_scores = model.evaluate(batch.next_states.view());

        for i in 0..n {
            let action = batch.actions[i];
            assert!(action < CELLS, "action {} is not a cell", action);
            let q_new = if batch.dones[i] {
                batch.rewards[i]
            } else {
                let best_next = next_scores
                    .row(i)
                    .iter()
                    .copied()
                    .fold(f32::NEG_INFINITY, f32::max);
                batch.rewards[i] + self.gamma * best_next
            };
            targets[[i, action]] = q_new;
        }
        targets
    }

    pub fn step<M: QModel + ?Sized>(&self, model: &mut M, batch: &TransitionBatch) -> StepReport {
        let targets = self.targets(model, batch);
        let loss = model.fit(batch.states.view(), targets.view());
        StepReport { loss, targets }
    }

    /// Update on the move just made.
    pub fn train_short_memory<M: QModel + ?Sized>(
        &self,
        model: &mut M,
        transition: &Transition,
    ) -> StepReport {
        self.step(model, &TransitionBatch::from(transition))
    }

    /// Update on a sample of past moves, or on all of them if fewer than `batch_size`.
    pub fn train_long_memory<M: QModel + ?Sized, R: Rng + ?Sized>(
        &self,
        model: &mut M,
        memory: &ReplayMemory,
        batch_size: usize,
        rng: &mut R,
    ) -> Option<StepReport> {
        if memory.is_empty() {
            return None;
        }
        let sample = memory.sample_batch(batch_size, rng);
        let report = self.step(model, &TransitionBatch::from_transitions(&sample));
        debug!("long memory step on {} transitions, loss {:.5}", sample.len(), report.loss);
        Some(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelVersion, Mlp};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Scores every cell with its own index and remembers what it was fitted on.
    #[derive(Debug, Default)]
    struct FixedModel {
        fitted: Vec<Array2<f32>>,
    }

    impl QModel for FixedModel {
        fn evaluate(&self, states: ArrayView2<f32>) -> Array2<f32> {
            Array2::from_shape_fn((states.nrows(), CELLS), |(_, j)| j as f32)
        }
        fn fit(&mut self, _states: ArrayView2<f32>, targets: ArrayView2<f32>) -> f32 {
            self.fitted.push(targets.to_owned());
            0.0
        }
    }

    fn transition(action: usize, reward: f32, done: bool) -> Transition {
        Transition {
            state: Array1::zeros(CELLS),
            action,
            reward,
            next_state: Array1::zeros(CELLS),
            done,
        }
    }

    #[test]
    fn terminal_target_is_the_reward() {
        let trainer = Trainer::default();
        let mut model = FixedModel::default();
        let report = trainer.train_short_memory(&mut model, &transition(3, 2.0, true));
        assert_eq!(report.targets[[0, 3]], 2.0);
        for j in (0..CELLS).filter(|&j| j != 3) {
            assert_eq!(report.targets[[0, j]], j as f32);
        }
        assert_eq!(model.fitted, vec![report.targets]);
    }

    #[test]
    fn non_terminal_target_is_bootstrapped() {
        let trainer = Trainer::new(0.9);
        let model = FixedModel::default();
        let batch = TransitionBatch::from_transitions(&[
            transition(0, 0.0, false),
            transition(5, -1.0, true),
            transition(8, 1.0, false),
        ]);
        let targets = trainer.targets(&model, &batch);
        assert_eq!(targets[[0, 0]], 0.0 + 0.9 * 8.0);
        assert_eq!(targets[[1, 5]], -1.0);
        assert_eq!(targets[[2, 8]], 1.0 + 0.9 * 8.0);
        assert_eq!(targets[[2, 7]], 7.0);
    }

    #[test]
    #[should_panic(expected = "action count differs from state count")]
    fn mismatched_batch_is_fatal() {
        let mut batch = TransitionBatch::from(&transition(1, 0.0, false));
        batch.actions.push(2);
        Trainer::default().targets(&FixedModel::default(), &batch);
    }

    #[test]
    fn long_memory_on_empty_memory_is_skipped() {
        let memory = ReplayMemory::new(10);
        let mut model = FixedModel::default();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(Trainer::default()
            .train_long_memory(&mut model, &memory, BATCH_SIZE, &mut rng)
            .is_none());
        assert!(model.fitted.is_empty());
    }

    #[test]
    fn long_memory_uses_whole_small_memory() {
        let mut memory = ReplayMemory::new(10);
        for a in 0..4 {
            memory.push(transition(a, 1.0, true));
        }
        let mut model = FixedModel::default();
        let mut rng = StdRng::seed_from_u64(1);
        let report = Trainer::default()
            .train_long_memory(&mut model, &memory, BATCH_SIZE, &mut rng)
            .unwrap();
        assert_eq!(report.targets.nrows(), 4);
    }

    #[test]
    fn repeated_terminal_updates_move_prediction_towards_reward() {
        let mut model = Mlp::new(ModelVersion::V1, 0.01);
        let mut t = transition(4, 2.0, true);
        t.state[0] = 1.0;
        let before = (model.evaluate_one(t.state.view())[4] - 2.0).abs();
        let trainer = Trainer::default();
        for _ in 0..50 {
            trainer.train_short_memory(&mut model, &t);
        }
        let after = (model.evaluate_one(t.state.view())[4] - 2.0).abs();
        assert!(after < before, "error went from {before} to {after}");
    }
}
