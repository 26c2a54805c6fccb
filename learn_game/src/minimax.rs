use crate::board::{Board, Marks};
use log::{debug, trace, warn};
use rand::prelude::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const DEFAULT_DEPTH_LIMIT: usize = 7;
pub const CORNERS: [usize; 4] = [0, 2, 6, 8];

/// How the solver opens on an empty board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Opening {
    Fixed(usize),
    RandomCorner,
}

impl Default for Opening {
    fn default() -> Self {
        Opening::Fixed(CORNERS[0])
    }
}

impl Opening {
    /// The opening cell. Only corners are valid; any other fixed cell falls
    /// back to the first corner.
    pub fn cell<R: Rng + ?Sized>(self, rng: &mut R) -> usize {
        match self {
            Opening::Fixed(index) if CORNERS.contains(&index) => index,
            Opening::Fixed(index) => {
                warn!("opening cell {} is not a corner, using {}", index, CORNERS[0]);
                CORNERS[0]
            }
            Opening::RandomCorner => *CORNERS.choose(rng).unwrap_or(&CORNERS[0]),
        }
    }
}

/// Exhaustive game-tree search with a ply cutoff.
///
/// Wins for the searching mark score `+inf`, losses `-inf`, draws and
/// positions cut off at `depth_limit` score `0`. Moves are scanned in
/// row-major order and the first maximal one is kept.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinimaxSolver {
    pub depth_limit: usize,
    pub opening: Opening,
}

impl Default for MinimaxSolver {
    fn default() -> Self {
        MinimaxSolver {
            depth_limit: DEFAULT_DEPTH_LIMIT,
            opening: Opening::default(),
        }
    }
}

impl MinimaxSolver {
    pub fn new(depth_limit: usize, opening: Opening) -> Self {
        MinimaxSolver { depth_limit, opening }
    }

    pub fn best_move<R: Rng + ?Sized>(
        &self,
        board: &mut Board,
        mark: Marks,
        rng: &mut R,
    ) -> Option<usize> {
        if board.is_terminal() || !mark.is_playing() {
            return None;
        }
        if board.is_empty() {
            return Some(self.opening.cell(rng));
        }
        let mut best: Option<(usize, f32)> = None;
        for (index, score) in self.evaluate_moves(board, mark) {
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((index, score));
            }
        }
        debug!("minimax {:?} picks {:?}", mark, best);
        best.map(|(index, _)| index)
    }

    /// Scores every free cell for `mark`, in row-major order.
    pub fn evaluate_moves(&self, board: &mut Board, mark: Marks) -> Vec<(usize, f32)> {
        let free = board.free_indices().collect::<Vec<usize>>();
        free.into_iter()
            .map(|index| (index, self.score_after(board, index, mark, mark, 0, false)))
            .collect()
    }

    /// Places `placed` at `index`, scores the position for `root` and empties the cell again.
    /// `index` must be free.
    fn score_after(
        &self,
        board: &mut Board,
        index: usize,
        placed: Marks,
        root: Marks,
        depth: usize,
        is_max: bool,
    ) -> f32 {
        let placed_ok = board.apply(index, placed).is_ok();
        debug_assert!(placed_ok, "search placed {:?} on unavailable cell {}", placed, index);
        let score = self.minimax(board, root, depth, is_max);
        let cleared = board.clear(index).is_ok();
        debug_assert!(cleared, "search could not clear cell {}", index);
        score
    }

    fn minimax(&self, board: &mut Board, root: Marks, depth: usize, is_max: bool) -> f32 {
        let opponent = root.other();
        if board.is_winner(root).unwrap_or(false) {
            return f32::INFINITY;
        }
        if board.is_winner(opponent).unwrap_or(false) {
            return f32::NEG_INFINITY;
        }
        if board.is_full() {
            return 0.0;
        }
        if depth >= self.depth_limit {
            trace!("depth cutoff at {} on {}", depth, board.to_state_key());
            return 0.0;
        }
        let free = board.free_indices().collect::<Vec<usize>>();
        if is_max {
            free.into_iter()
                .map(|index| self.score_after(board, index, root, root, depth + 1, false))
                .fold(f32::NEG_INFINITY, f32::max)
        } else {
            free.into_iter()
                .map(|index| self.score_after(board, index, opponent, root, depth + 1, true))
                .fold(f32::INFINITY, f32::min)
        }
    }
}
