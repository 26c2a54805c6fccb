use crate::board::CELLS;
use ndarray::prelude::*;
use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const MAX_MEMORY: usize = 100_000;

/// One observed move: position before, chosen cell, reward, position after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub state: Array1<f32>,
    pub action: usize,
    pub reward: f32,
    pub next_state: Array1<f32>,
    pub done: bool,
}

/// Columnar view of several transitions, the shape the trainer consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionBatch {
    pub states: Array2<f32>,
    pub actions: Vec<usize>,
    pub rewards: Vec<f32>,
    pub next_states: Array2<f32>,
    pub dones: Vec<bool>,
}

impl TransitionBatch {
    pub fn from_transitions(transitions: &[Transition]) -> Self {
        let n = transitions.len();
        let mut states = Array2::zeros((n, CELLS));
        let mut next_states = Array2::zeros((n, CELLS));
        for (i, t) in transitions.iter().enumerate() {
            states.row_mut(i).assign(&t.state);
            next_states.row_mut(i).assign(&t.next_state);
        }
        TransitionBatch {
            states,
            actions: transitions.iter().map(|t| t.action).collect(),
            rewards: transitions.iter().map(|t| t.reward).collect(),
            next_states,
            dones: transitions.iter().map(|t| t.done).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.states.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&Transition> for TransitionBatch {
    fn from(transition: &Transition) -> Self {
        TransitionBatch::from_transitions(std::slice::from_ref(transition))
    }
}

/// Fixed-capacity ring buffer of transitions; the oldest entry is overwritten first.
#[derive(Debug, Clone)]
pub struct ReplayMemory {
    buffer: Vec<Transition>,
    capacity: usize,
    position: usize,
}

impl Default for ReplayMemory {
    fn default() -> Self {
        Self::new(MAX_MEMORY)
    }
}

impl ReplayMemory {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "replay memory capacity must be positive");
        ReplayMemory {
            buffer: Vec::with_capacity(capacity.min(1024)),
            capacity,
            position: 0,
        }
    }

    pub fn push(&mut self, transition: Transition) {
        if self.buffer.len() < self.capacity {
            self.buffer.push(transition);
        } else {
            self.buffer[self.position] = transition;
        }
        self.position = (self.position + 1) % self.capacity;
    }

    /// `n` distinct transitions drawn uniformly, or everything when `n` does not
    /// undercut the current size.
    pub fn sample_batch<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<Transition> {
        if self.len() > n {
            index::sample(rng, self.len(), n)
                .iter()
                .map(|i| self.buffer[i].clone())
                .collect()
        } else {
            self.buffer.clone()
        }
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Transition> + '_ {
        let split = if self.buffer.len() < self.capacity { 0 } else { self.position };
        self.buffer[split..].iter().chain(self.buffer[..split].iter())
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
