use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;

#[derive(Debug, Subcommand, PartialEq)]
pub(crate) enum Command {
    /// Run the daemon in the foreground.
    Run {
        /// The directory containing padmux.yaml
        #[clap(short, long)]
        workspace: Option<PathBuf>,
        /// Target cycle rate in Hz
        #[clap(short, long, default_value_t = 1000)]
        rate: u32,
    },
    /// List physical devices once and exit.
    Devices,
    /// Parse the settings file and report errors.
    Check {
        /// The directory containing padmux.yaml
        #[clap(short, long)]
        workspace: Option<PathBuf>,
    },
}

/// Remap physical input devices onto virtual controller slots.
#[derive(Parser)]
#[command(version, about, long_about = None)]
pub(crate) struct Cli {
    /// Turn debugging information on
    #[arg(short, long)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// The command to run
    #[clap(subcommand)]
    pub command: Command,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_defaults_to_one_kilohertz() {
        let cli = Cli::parse_from(["padmuxd", "run"]);
        assert_eq!(
            cli.command,
            Command::Run {
                workspace: None,
                rate: 1000
            }
        );
    }

    #[test]
    fn global_flags_and_workspace() {
        let cli = Cli::parse_from(["padmuxd", "-v", "--no-color", "check", "-w", "/tmp/pads"]);
        assert!(cli.verbose);
        assert!(cli.no_color);
        assert_eq!(
            cli.command,
            Command::Check {
                workspace: Some(PathBuf::from("/tmp/pads"))
            }
        );
    }
}
