use crate::agent::{Agent, GameOutcome};
use crate::board::{Board, IsGameOver, Marks};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::mem;

/// How one game ended and the moves that led there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameResult {
    pub outcome: IsGameOver,
    pub moves: Vec<(Marks, usize)>,
    pub aborted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub games: usize,
    pub cross_wins: usize,
    pub nought_wins: usize,
    pub draws: usize,
    pub aborted: usize,
}

impl SessionSummary {
    fn record(&mut self, result: &GameResult) {
        self.games += 1;
        if result.aborted {
            self.aborted += 1;
            return;
        }
        match result.outcome {
            IsGameOver::Win(Marks::CROSS) => self.cross_wins += 1,
            IsGameOver::Win(_) => self.nought_wins += 1,
            IsGameOver::Drawn => self.draws += 1,
            IsGameOver::InPlay => {}
        }
    }
}

/// Two agents sharing one board; CROSS always moves first.
#[derive(Debug)]
pub struct Game {
    pub board: Board,
    pub current_player: Agent,
    pub other_player: Agent,

    episode: usize,
}

impl Game {
    /// The second agent takes whichever mark the first one does not hold.
    pub fn new(player1: Agent, mut player2: Agent) -> Self {
        player2.set_mark(player1.mark().other());
        let mut game = Game {
            board: Board::new(),
            current_player: player1,
            other_player: player2,
            episode: 0,
        };
        game.cross_to_move();
        game
    }

    pub fn swap_players(&mut self) {
        mem::swap(&mut self.current_player, &mut self.other_player);
    }

    fn cross_to_move(&mut self) {
        if self.current_player.mark() != Marks::CROSS {
            self.swap_players();
        }
    }

    pub fn episode(&self) -> usize {
        self.episode
    }

    pub fn agent(&self, mark: Marks) -> Option<&Agent> {
        [&self.current_player, &self.other_player]
            .into_iter()
            .find(|agent| agent.mark() == mark)
    }

    pub fn agent_mut(&mut self, mark: Marks) -> Option<&mut Agent> {
        if self.current_player.mark() == mark {
            Some(&mut self.current_player)
        } else if self.other_player.mark() == mark {
            Some(&mut self.other_player)
        } else {
            None
        }
    }

    /// Plays one game from an empty board and updates both agents' stats.
    pub fn play_game(&mut self) -> GameResult {
        self.board.reset();
        self.current_player.new_game();
        self.other_player.new_game();
        self.cross_to_move();

        let mut moves = Vec::new();
        let mut aborted = false;
        while !self.board.is_terminal() {
            match self.current_player.perform_action(&mut self.board) {
                Some(index) => moves.push((self.current_player.mark(), index)),
                None => {
                    warn!(
                        "game {} aborted, {} could not move",
                        self.episode, self.current_player.name
                    );
                    aborted = true;
                    break;
                }
            }
            self.swap_players();
        }

        if !aborted {
            self.current_player.update_stats(&self.board);
            self.other_player.update_stats(&self.board);
        }
        let outcome = self.board.outcome();
        debug!("game {} over: {:?}\n{}", self.episode, outcome, self.board);
        self.episode += 1;
        GameResult { outcome, moves, aborted }
    }

    /// Plays `n` games, calling `after_game` with the finished game and its result.
    pub fn play_with<F>(&mut self, n: usize, mut after_game: F) -> SessionSummary
    where
        F: FnMut(&mut Game, &GameResult),
    {
        let mut summary = SessionSummary::default();
        for _ in 0..n {
            let result = self.play_game();
            summary.record(&result);
            after_game(self, &result);
        }
        info!(
            "{} games: X won {}, O won {}, drawn {}, aborted {}",
            summary.games, summary.cross_wins, summary.nought_wins, summary.draws, summary.aborted
        );
        summary
    }

    pub fn play(&mut self, n: usize) -> SessionSummary {
        self.play_with(n, |_, _| {})
    }

    pub fn outcome_for(&self, mark: Marks) -> GameOutcome {
        GameOutcome::of(&self.board, mark)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::minimax::MinimaxSolver;

    fn minimax(name: &str, mark: Marks) -> Agent {
        Agent::minimax(name, mark, MinimaxSolver::default(), 0.0).with_seed(1)
    }

    #[test]
    fn cross_moves_first() {
        let game = Game::new(minimax("a", Marks::NOUGHT), minimax("b", Marks::CROSS));
        assert_eq!(game.current_player.mark(), Marks::CROSS);
        assert_eq!(game.current_player.name, "b");
        assert_eq!(game.agent(Marks::NOUGHT).unwrap().name, "a");
    }

    #[test]
    fn second_agent_takes_the_other_mark() {
        let game = Game::new(minimax("a", Marks::CROSS), minimax("b", Marks::CROSS));
        assert_eq!(game.other_player.mark(), Marks::NOUGHT);
    }

    #[test]
    fn minimax_duel_is_always_drawn() {
        let mut game = Game::new(minimax("a", Marks::CROSS), minimax("b", Marks::NOUGHT));
        let result = game.play_game();
        assert!(!result.aborted);
        assert_eq!(result.outcome, IsGameOver::Drawn);
        assert_eq!(result.moves.len(), 9);
        assert_eq!(result.moves[0], (Marks::CROSS, 0));
        assert!(result
            .moves
            .iter()
            .zip(result.moves.iter().skip(1))
            .all(|(a, b)| a.0 != b.0));

        let summary = game.play(3);
        assert_eq!(summary.games, 3);
        assert_eq!(summary.draws, 3);
        assert_eq!(game.episode(), 4);
        for mark in [Marks::CROSS, Marks::NOUGHT] {
            let stats = game.agent(mark).unwrap().stats();
            assert_eq!(stats.games_drawn, 4);
            assert_eq!(stats.total_reward, 4.0);
        }
    }

    #[test]
    fn callback_sees_every_game() {
        let mut game = Game::new(minimax("a", Marks::CROSS), minimax("b", Marks::NOUGHT));
        let mut seen = 0;
        game.play_with(2, |game, result| {
            seen += 1;
            assert!(game.board.is_terminal());
            assert_eq!(game.outcome_for(Marks::CROSS), GameOutcome::Drawn);
            assert!(!result.aborted);
        });
        assert_eq!(seen, 2);
    }
}
