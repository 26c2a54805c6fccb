use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use learn_game::agent::{Agent, Mode, Policy};
use learn_game::board::{Board, IsGameOver, Marks};
use learn_game::config::Config;
use learn_game::model::{Mlp, QModel};
use learn_game::session::Game;
use log::{info, warn};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

const MAX_ATTEMPTS: usize = 3;

#[derive(Parser, Debug)]
#[command(name = "game", about = "Tic-tac-toe with a minimax solver and a Q-learning agent")]
struct Cli {
    /// Path to a JSON config file
    #[arg(long, global = true, default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train a learned agent by playing against an opponent
    Train {
        #[arg(long, default_value_t = 1000)]
        games: usize,
        #[arg(long, value_enum, default_value_t = Opponent::Minimax)]
        opponent: Opponent,
        /// Continue training the saved model instead of starting fresh
        #[arg(long)]
        resume: bool,
    },
    /// Pit two agents against each other without training
    Duel {
        #[arg(long, default_value_t = 100)]
        games: usize,
        #[arg(long, value_enum, default_value_t = Opponent::Learned)]
        cross: Opponent,
        #[arg(long, value_enum, default_value_t = Opponent::Minimax)]
        nought: Opponent,
    },
    /// Play against an agent on the terminal
    Play {
        #[arg(long, value_enum, default_value_t = Opponent::Minimax)]
        opponent: Opponent,
        /// Take O and let the agent open
        #[arg(long)]
        second: bool,
        /// Print the solver's score for every free cell before each move
        #[arg(long)]
        hints: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Opponent {
    Minimax,
    Learned,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = Config::load_or_default(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    match cli.command {
        Command::Train { games, opponent, resume } => train(&config, games, opponent, resume),
        Command::Duel { games, cross, nought } => duel(&config, games, cross, nought),
        Command::Play { opponent, second, hints } => play(&config, opponent, second, hints),
    }
}

fn saved_agent(config: &Config, name: &str, mark: Marks, mode: Mode) -> Result<Agent> {
    let tag = config.model_version.default_tag();
    let store = config.store();
    if !store.exists(tag) {
        bail!("no saved model {} in {}, run `game train` first", tag, store.dir().display());
    }
    let policy = store.load(tag, config, mode)?;
    Ok(Agent::learned(name, mark, policy, config.epsilon))
}

fn agent(config: &Config, kind: Opponent, name: &str, mark: Marks) -> Result<Agent> {
    match kind {
        Opponent::Minimax => Ok(Agent::minimax(name, mark, config.solver(), 0.0)),
        Opponent::Learned => saved_agent(config, name, mark, Mode::Frozen),
    }
}

fn train(config: &Config, games: usize, opponent: Opponent, resume: bool) -> Result<()> {
    let tag = config.model_version.default_tag();
    let mut learner = if resume {
        saved_agent(config, "learner", Marks::CROSS, Mode::Trainable)?
    } else {
        let model = Mlp::new(config.model_version, config.learning_rate);
        let policy = config.learned_policy(Box::new(model), Mode::Trainable);
        Agent::learned("learner", Marks::CROSS, policy, config.epsilon)
    };
    if let Some(shaping) = config.shaping() {
        learner = learner.with_shaping(shaping);
    }
    let opponent = agent(config, opponent, "opponent", Marks::NOUGHT)?;
    let store = config.store();

    let mut game = Game::new(learner, opponent);
    let mut save_error = None;
    let summary = game.play_with(games, |game, _| {
        let Some(learner) = game.agent_mut(Marks::CROSS) else {
            return;
        };
        if save_error.is_some() || !learner.is_new_record() {
            return;
        }
        if let Policy::Learned(learned) = learner.policy() {
            let model: &dyn QModel = learned.model.as_ref();
            if let Err(e) = store.save(model, tag) {
                warn!("could not save {}: {:#}", tag, e);
                save_error = Some(e);
            }
        }
    });
    if let Some(e) = save_error {
        return Err(e);
    }

    let Some(learner) = game.agent(Marks::CROSS) else {
        bail!("learner left the game");
    };
    let stats = learner.stats();
    info!("training done after {} games", summary.games);
    println!(
        "won {} lost {} drawn {} | win rate {:.3} | w/l {:.3} | reward {:.1} (record {:.1})",
        stats.games_won,
        stats.games_lost,
        stats.games_drawn,
        stats.win_rate(),
        stats.wl_ratio(),
        stats.total_reward,
        stats.record
    );
    Ok(())
}

fn duel(config: &Config, games: usize, cross: Opponent, nought: Opponent) -> Result<()> {
    let mut game = Game::new(
        agent(config, cross, "cross", Marks::CROSS)?,
        agent(config, nought, "nought", Marks::NOUGHT)?,
    );
    let summary = game.play(games);
    println!(
        "{} games: X ({:?}) won {}, O ({:?}) won {}, drawn {}, aborted {}",
        summary.games, cross, summary.cross_wins, nought, summary.nought_wins, summary.draws, summary.aborted
    );
    Ok(())
}

fn play(config: &Config, opponent: Opponent, second: bool, hints: bool) -> Result<()> {
    let human = if second { Marks::NOUGHT } else { Marks::CROSS };
    let mut computer = agent(config, opponent, "computer", human.other())?;
    let solver = config.solver();
    let mut board = Board::new();
    let mut to_move = Marks::CROSS;
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    while !board.is_terminal() {
        if to_move == human {
            println!("{}", board);
            if hints {
                for (index, score) in solver.evaluate_moves(&mut board, human) {
                    let (row, col) = Board::row_col(index)?;
                    println!("  {} {} scores {}", row + 1, col + 1, score);
                }
            }
            let index = read_move(&board, &mut lines)?;
            board.apply(index, human)?;
        } else if computer.perform_action(&mut board).is_none() {
            bail!("the computer could not find a move");
        }
        to_move = to_move.other();
    }

    println!("{}", board);
    computer.update_stats(&board);
    match board.outcome() {
        IsGameOver::Win(mark) if mark == human => println!("Congratulations, you have won!"),
        IsGameOver::Win(_) => println!("Really sorry, you have lost."),
        _ => println!("The game ended in a draw."),
    }
    Ok(())
}

/// Reads "row col" (each 1-3) until a free cell is named.
fn read_move<I>(board: &Board, lines: &mut I) -> Result<usize>
where
    I: Iterator<Item = io::Result<String>>,
{
    for _ in 0..MAX_ATTEMPTS {
        print!("your move, row and column (1-3): ");
        io::stdout().flush()?;
        let Some(line) = lines.next() else {
            bail!("input closed");
        };
        let numbers = line?
            .split_whitespace()
            .map(|s| s.parse::<usize>())
            .collect::<Result<Vec<usize>, _>>();
        let index = match numbers.as_deref() {
            Ok([row, col]) if (1..=3).contains(row) && (1..=3).contains(col) => {
                Board::flat_index(row - 1, col - 1)?
            }
            _ => {
                println!("please type two numbers from 1 to 3");
                continue;
            }
        };
        if board.at(index)? == Marks::EMPTY {
            return Ok(index);
        }
        println!("that cell is taken");
    }
    bail!("no valid move after {} attempts", MAX_ATTEMPTS)
}
