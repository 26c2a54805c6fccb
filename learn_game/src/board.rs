use crate::error::BoardError;
use itertools::Itertools;
use ndarray::prelude::*;
use rand::prelude::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::{fmt, ops::Deref};

pub const BOARD_SIZE: usize = 3;
pub const CELLS: usize = BOARD_SIZE * BOARD_SIZE;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Marks {
    CROSS,
    NOUGHT,
    EMPTY,
}

impl Marks {
    pub fn other(self) -> Self {
        match self {
            Self::CROSS => Marks::NOUGHT,
            Self::NOUGHT => Marks::CROSS,
            Self::EMPTY => Marks::EMPTY,
        }
    }
    pub fn as_char(self) -> char {
        match self {
            Self::CROSS => 'X',
            Self::NOUGHT => 'O',
            Self::EMPTY => '-',
        }
    }
    /// Numeric encoding used as model input.
    pub fn value(self) -> f32 {
        match self {
            Self::CROSS => 1.0,
            Self::NOUGHT => -1.0,
            Self::EMPTY => 0.0,
        }
    }
    pub fn is_playing(self) -> bool {
        self != Self::EMPTY
    }
    pub fn from_char(c: char) -> Result<Self, BoardError> {
        match c {
            'X' | 'x' => Ok(Self::CROSS),
            'O' | 'o' | '0' => Ok(Self::NOUGHT),
            '-' | '.' | ' ' => Ok(Self::EMPTY),
            other => Err(BoardError::InvalidMark(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IsGameOver {
    InPlay,
    Drawn,
    Win(Marks),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    state: Array2<Marks>,
}

impl Deref for Board {
    type Target = Array2<Marks>;
    fn deref(&self) -> &Self::Target {
        &self.state
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}", "-".repeat(9))?;
        for row in self.state.rows() {
            writeln!(f, "{}", row.iter().map(|m| m.as_char()).join(" | "))?;
            writeln!(f, "{}", "-".repeat(9))?;
        }
        Ok(())
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl Board {
    pub fn new() -> Self {
        Board {
            state: Array::from_elem((BOARD_SIZE, BOARD_SIZE), Marks::EMPTY),
        }
    }

    /// Builds a board from nine `X`/`O`/`-` characters in row-major order.
    pub fn parse(s: &str) -> Result<Self, BoardError> {
        let mut board = Board::new();
        let mut count = 0;
        for (index, c) in s.chars().enumerate() {
            if index >= CELLS {
                return Err(BoardError::InvalidIndex(index));
            }
            let (row, col) = Self::row_col(index)?;
            board.state[[row, col]] = Marks::from_char(c)?;
            count += 1;
        }
        if count != CELLS {
            return Err(BoardError::InvalidIndex(count));
        }
        Ok(board)
    }

    pub fn reset(&mut self) {
        self.state.fill(Marks::EMPTY);
    }

    pub fn flat_index(row: usize, col: usize) -> Result<usize, BoardError> {
        if row >= BOARD_SIZE || col >= BOARD_SIZE {
            return Err(BoardError::InvalidIndex(row * BOARD_SIZE + col));
        }
        Ok(row * BOARD_SIZE + col)
    }

    pub fn row_col(index: usize) -> Result<(usize, usize), BoardError> {
        if index >= CELLS {
            return Err(BoardError::InvalidIndex(index));
        }
        Ok((index / BOARD_SIZE, index % BOARD_SIZE))
    }

    pub fn cell(&self, row: usize, col: usize) -> Result<Marks, BoardError> {
        let index = Self::flat_index(row, col)?;
        Ok(self.state[[index / BOARD_SIZE, index % BOARD_SIZE]])
    }

    pub fn at(&self, index: usize) -> Result<Marks, BoardError> {
        let (row, col) = Self::row_col(index)?;
        Ok(self.state[[row, col]])
    }

    pub fn apply(&mut self, index: usize, mark: Marks) -> Result<(), BoardError> {
        if !mark.is_playing() {
            return Err(BoardError::InvalidMark(mark.as_char()));
        }
        let (row, col) = Self::row_col(index)?;
        let cell = &mut self.state[[row, col]];
        if *cell != Marks::EMPTY {
            return Err(BoardError::OccupiedCell(index));
        }
        *cell = mark;
        Ok(())
    }

    /// Empties a cell again; the undo half of a search step.
    pub fn clear(&mut self, index: usize) -> Result<(), BoardError> {
        let (row, col) = Self::row_col(index)?;
        self.state[[row, col]] = Marks::EMPTY;
        Ok(())
    }

    pub fn row(&self, row: usize) -> Result<[Marks; BOARD_SIZE], BoardError> {
        if row >= BOARD_SIZE {
            return Err(BoardError::InvalidIndex(row));
        }
        let r = self.state.row(row);
        Ok([r[0], r[1], r[2]])
    }

    pub fn column(&self, col: usize) -> Result<[Marks; BOARD_SIZE], BoardError> {
        if col >= BOARD_SIZE {
            return Err(BoardError::InvalidIndex(col));
        }
        let c = self.state.column(col);
        Ok([c[0], c[1], c[2]])
    }

    /// 0 is the main diagonal, 1 the anti-diagonal.
    pub fn diagonal(&self, diagonal: usize) -> Result<[Marks; BOARD_SIZE], BoardError> {
        match diagonal {
            0 => Ok([self.state[[0, 0]], self.state[[1, 1]], self.state[[2, 2]]]),
            1 => Ok([self.state[[0, 2]], self.state[[1, 1]], self.state[[2, 0]]]),
            other => Err(BoardError::InvalidIndex(other)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.state.iter().all(|&m| m == Marks::EMPTY)
    }

    pub fn is_full(&self) -> bool {
        self.state.iter().all(|&m| m != Marks::EMPTY)
    }

    pub fn is_winner(&self, mark: Marks) -> Result<bool, BoardError> {
        if !mark.is_playing() {
            return Err(BoardError::InvalidMark(mark.as_char()));
        }
        Ok(self.has_line(mark))
    }

    pub fn is_terminal(&self) -> bool {
        self.is_full() || self.has_line(Marks::CROSS) || self.has_line(Marks::NOUGHT)
    }

    pub fn outcome(&self) -> IsGameOver {
        if self.has_line(Marks::CROSS) {
            IsGameOver::Win(Marks::CROSS)
        } else if self.has_line(Marks::NOUGHT) {
            IsGameOver::Win(Marks::NOUGHT)
        } else if self.is_full() {
            IsGameOver::Drawn
        } else {
            IsGameOver::InPlay
        }
    }

    pub fn flatten(&self) -> Array1<f32> {
        self.state.iter().map(|m| m.value()).collect()
    }

    /// Empty cell indices in row-major order.
    pub fn free_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.state
            .iter()
            .enumerate()
            .filter(|(_index, &value)| value == Marks::EMPTY)
            .map(|(index, _)| index)
    }

    pub fn random_free_index<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<usize> {
        let free = self.free_indices().collect::<Vec<usize>>();
        free.choose(rng).copied()
    }

    pub fn to_state_key(&self) -> String {
        self.state.iter().map(|m| m.as_char()).collect::<String>()
    }

    pub fn draw(&self) {
        print!("{}", self);
    }

    fn has_line(&self, mark: Marks) -> bool {
        let rows = self
            .state
            .rows()
            .into_iter()
            .any(|row| row.iter().all(|&m| m == mark));
        let columns = self
            .state
            .columns()
            .into_iter()
            .any(|column| column.iter().all(|&m| m == mark));
        let diag = self.state.diag().iter().all(|&m| m == mark);
        let anti_diag =
            self.state[[0, 2]] == mark && self.state[[1, 1]] == mark && self.state[[2, 0]] == mark;
        rows || columns || diag || anti_diag
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn new_board_is_empty() {
        let board = Board::new();
        assert_eq!(board.len(), CELLS);
        assert!(board.is_empty());
        assert!(!board.is_full());
        assert!(!board.is_terminal());
        assert_eq!(board.free_indices().collect::<Vec<_>>(), (0..9).collect::<Vec<_>>());
    }

    #[test]
    fn flat_index_round_trips() {
        for row in 0..3 {
            for col in 0..3 {
                let index = Board::flat_index(row, col).unwrap();
                assert_eq!(index, row * 3 + col);
                assert_eq!(Board::row_col(index).unwrap(), (row, col));
            }
        }
        assert_eq!(Board::flat_index(3, 0), Err(BoardError::InvalidIndex(9)));
        assert_eq!(Board::row_col(9), Err(BoardError::InvalidIndex(9)));
        assert!(Board::new().cell(0, 3).is_err());
    }

    #[test]
    fn apply_rejects_occupied_and_bad_marks() {
        let mut board = Board::new();
        board.apply(4, Marks::CROSS).unwrap();
        assert_eq!(board.apply(4, Marks::NOUGHT), Err(BoardError::OccupiedCell(4)));
        assert_eq!(board.apply(9, Marks::NOUGHT), Err(BoardError::InvalidIndex(9)));
        assert_eq!(board.apply(0, Marks::EMPTY), Err(BoardError::InvalidMark('-')));
        assert_eq!(board.cell(1, 1), Ok(Marks::CROSS));
        board.clear(4).unwrap();
        assert!(board.is_empty());
    }

    #[test]
    fn lines_are_read_back() {
        let board = Board::parse("XO-OXO--X").unwrap();
        assert_eq!(board.row(1).unwrap(), [Marks::NOUGHT, Marks::CROSS, Marks::NOUGHT]);
        assert_eq!(board.column(0).unwrap(), [Marks::CROSS, Marks::NOUGHT, Marks::EMPTY]);
        assert_eq!(board.diagonal(0).unwrap(), [Marks::CROSS; 3]);
        assert_eq!(board.diagonal(1).unwrap(), [Marks::EMPTY, Marks::CROSS, Marks::EMPTY]);
        assert_eq!(board.row(3), Err(BoardError::InvalidIndex(3)));
        assert_eq!(board.column(100), Err(BoardError::InvalidIndex(100)));
        assert_eq!(board.diagonal(2), Err(BoardError::InvalidIndex(2)));
    }

    #[test]
    fn winner_detection_covers_all_lines() {
        let lines = [
            "XXX------", "---XXX---", "------XXX", "X--X--X--", "-X--X--X-", "--X--X--X",
            "X---X---X", "--X-X-X--",
        ];
        for line in lines {
            let board = Board::parse(line).unwrap();
            assert!(board.is_winner(Marks::CROSS).unwrap(), "{line}");
            assert!(!board.is_winner(Marks::NOUGHT).unwrap(), "{line}");
            assert!(board.is_terminal());
            assert_eq!(board.outcome(), IsGameOver::Win(Marks::CROSS));
        }
        let partial = Board::parse("X--X--O--").unwrap();
        assert!(!partial.is_winner(Marks::CROSS).unwrap());
        assert!(!partial.is_winner(Marks::NOUGHT).unwrap());
        assert_eq!(partial.is_winner(Marks::EMPTY), Err(BoardError::InvalidMark('-')));
    }

    #[test]
    fn full_board_without_line_is_drawn() {
        let board = Board::parse("XOXXOOOXX").unwrap();
        assert!(board.is_full());
        assert!(board.is_terminal());
        assert_eq!(board.outcome(), IsGameOver::Drawn);
        assert_eq!(board.free_indices().count(), 0);
        assert_eq!(board.random_free_index(&mut rand::thread_rng()), None);
    }

    #[test]
    fn flatten_encodes_marks() {
        let board = Board::parse("X-O------").unwrap();
        assert_eq!(
            board.flatten(),
            array![1.0, 0.0, -1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]
        );
    }

    #[test]
    fn random_free_index_only_picks_empty_cells() {
        let board = Board::parse("XOX-OX-XO").unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let index = board.random_free_index(&mut rng).unwrap();
            assert!(index == 3 || index == 6);
        }
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert_eq!(Board::parse("XO"), Err(BoardError::InvalidIndex(2)));
        assert_eq!(Board::parse("XOXOXOXOXO"), Err(BoardError::InvalidIndex(9)));
        assert_eq!(Board::parse("XOXOXOXO?"), Err(BoardError::InvalidMark('?')));
    }

    #[test]
    fn display_draws_grid() {
        let mut board = Board::new();
        board.apply(0, Marks::CROSS).unwrap();
        let drawn = board.to_string();
        assert_eq!(drawn.matches("---------").count(), 4);
        assert_eq!(drawn.lines().filter(|l| l.contains('|')).count(), 3);
        assert!(drawn.contains("X | - | -"));
        assert_eq!(board.to_state_key(), "X--------");
        board.reset();
        assert!(board.is_empty());
    }
}
