//! `sigil`: record input macros, bind them to mouse gestures, replay them.

mod commands;
mod logging;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use sigil_core::{config, CoordMode, SigilConfig};
use std::path::PathBuf;
use std::sync::OnceLock;

static CONFIG: OnceLock<SigilConfig> = OnceLock::new();

/// Loaded once at startup; defaults if `init_config` was never called.
pub fn app_config() -> &'static SigilConfig {
    CONFIG.get_or_init(SigilConfig::default)
}

fn init_config(path: Option<PathBuf>) {
    let path = path.unwrap_or_else(config::config_file_path);
    let _ = CONFIG.set(config::load_config(path));
}

#[derive(Debug, Parser)]
#[command(name = "sigil", version, about = "Gesture-triggered input macros")]
struct Cli {
    /// Config file (defaults to the platform config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write logs to a daily rolling file.
    #[arg(long, global = true)]
    log_file: bool,

    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log actuations instead of injecting them.
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CoordArg {
    Absolute,
    Monitor,
    Cursor,
}

impl From<CoordArg> for CoordMode {
    fn from(arg: CoordArg) -> Self {
        match arg {
            CoordArg::Absolute => CoordMode::Absolute,
            CoordArg::Monitor => CoordMode::MonitorRelative,
            CoordArg::Cursor => CoordMode::CursorRelative,
        }
    }
}

#[derive(Debug, Clone, clap::Args)]
struct CaptureArgs {
    #[arg(long, value_enum, default_value = "absolute")]
    coords: CoordArg,
    #[arg(long)]
    no_keyboard: bool,
    #[arg(long)]
    no_mouse_move: bool,
    #[arg(long)]
    no_delay: bool,
    /// Wait for the start hotkey before capturing.
    #[arg(long)]
    wait: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Record a macro under KEY; the stop hotkey ends the recording.
    Record {
        key: String,
        #[command(flatten)]
        capture: CaptureArgs,
    },
    /// Replay the macro stored under KEY.
    Play {
        key: String,
        #[arg(long, conflicts_with = "infinite")]
        repeat: Option<u32>,
        #[arg(long)]
        infinite: bool,
        /// Anchor for relative positions as X,Y (defaults to the cursor).
        #[arg(long, value_parser = parse_point)]
        at: Option<(i32, i32)>,
    },
    /// Listen for gestures and play the mapped macros.
    Listen,
    /// Draw a gesture, then record the macro it should trigger.
    Map {
        #[command(flatten)]
        capture: CaptureArgs,
    },
    /// List stored macros in gesture order.
    List,
    /// Print the events of a stored macro.
    Show { key: String },
    /// Edit a stored macro.
    Edit {
        key: String,
        #[command(subcommand)]
        op: EditOp,
    },
    /// Move KEY to the front of the gesture order.
    Promote { key: String },
    Delete { key: String },
    /// List attached monitors.
    Monitors,
    /// Print the effective configuration; `--write` saves it to the config file.
    Config {
        #[arg(long)]
        write: bool,
    },
}

#[derive(Debug, Clone, Subcommand)]
enum EditOp {
    InsertDelay { index: usize, seconds: f64 },
    SetDelay { index: usize, seconds: f64 },
    /// Delay jitter in seconds; omit RANGE to clear it.
    DelayJitter { index: usize, range: Option<f64> },
    /// Position jitter in pixels; omit RANGE to clear it.
    PositionJitter { index: usize, range: Option<u32> },
    Remove { index: usize },
}

fn parse_point(s: &str) -> Result<(i32, i32), String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y, got {s:?}"))?;
    let x = x.trim().parse().map_err(|e| format!("bad x: {e}"))?;
    let y = y.trim().parse().map_err(|e| format!("bad y: {e}"))?;
    Ok((x, y))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::setup(cli.verbose, cli.log_file);
    init_config(cli.config.clone());

    let config_path = cli.config.unwrap_or_else(config::config_file_path);
    let dry_run = cli.dry_run;
    // Hooks, injection and monitor queries are only set up for commands that use them.
    let app = || commands::App::new(app_config(), dry_run);

    match cli.command {
        Command::Record { key, capture } => commands::record(&app()?, &key, capture.into()),
        Command::Play {
            key,
            repeat,
            infinite,
            at,
        } => commands::play(&app()?, &key, repeat, infinite, at),
        Command::Listen => commands::listen(&app()?),
        Command::Map { capture } => commands::map(&app()?, capture.into()),
        Command::List => commands::list(&app()?),
        Command::Show { key } => commands::show(&app()?, &key),
        Command::Edit { key, op } => commands::edit(&app()?, &key, op.into()),
        Command::Promote { key } => commands::promote(&app()?, &key),
        Command::Delete { key } => commands::delete(&app()?, &key),
        Command::Monitors => commands::monitors(),
        Command::Config { write } => commands::show_config(app_config(), &config_path, write),
    }
}

impl From<CaptureArgs> for commands::CaptureRequest {
    fn from(args: CaptureArgs) -> Self {
        Self {
            options: sigil_core::CaptureOptions {
                coord_mode: args.coords.into(),
                record_keyboard: !args.no_keyboard,
                record_mouse_move: !args.no_mouse_move,
                record_delay: !args.no_delay,
            },
            wait_for_hotkey: args.wait,
        }
    }
}

impl From<EditOp> for commands::Edit {
    fn from(op: EditOp) -> Self {
        match op {
            EditOp::InsertDelay { index, seconds } => Self::InsertDelay { index, seconds },
            EditOp::SetDelay { index, seconds } => Self::SetDelay { index, seconds },
            EditOp::DelayJitter { index, range } => Self::DelayJitter { index, range },
            EditOp::PositionJitter { index, range } => Self::PositionJitter { index, range },
            EditOp::Remove { index } => Self::Remove { index },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_point() {
        assert_eq!(parse_point("10,-20"), Ok((10, -20)));
        assert_eq!(parse_point(" 3 , 4 "), Ok((3, 4)));
        assert!(parse_point("10").is_err());
        assert!(parse_point("a,1").is_err());
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from(["sigil", "play", "Ctrl+→", "--repeat", "3", "--at", "5,6"]).unwrap();
        match cli.command {
            Command::Play { key, repeat, infinite, at } => {
                assert_eq!(key, "Ctrl+→");
                assert_eq!(repeat, Some(3));
                assert!(!infinite);
                assert_eq!(at, Some((5, 6)));
            }
            other => panic!("unexpected {:?}", other),
        }

        assert!(Cli::try_parse_from(["sigil", "play", "k", "--repeat", "2", "--infinite"]).is_err());

        let cli = Cli::try_parse_from(["sigil", "record", "NONE+↓", "--coords", "cursor", "--no-delay"]).unwrap();
        match cli.command {
            Command::Record { capture, .. } => {
                let request: commands::CaptureRequest = capture.into();
                assert_eq!(request.options.coord_mode, CoordMode::CursorRelative);
                assert!(!request.options.record_delay);
                assert!(request.options.record_keyboard);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_edit_subcommand() {
        let cli = Cli::try_parse_from(["sigil", "edit", "k", "delay-jitter", "2"]).unwrap();
        match cli.command {
            Command::Edit { op: EditOp::DelayJitter { index, range }, .. } => {
                assert_eq!(index, 2);
                assert_eq!(range, None);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_config_subcommand() {
        let cli = Cli::try_parse_from(["sigil", "--config", "/tmp/s.yaml", "config", "--write"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/s.yaml")));
        assert!(matches!(cli.command, Command::Config { write: true }));
    }
}
