//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pmrotated")]
#[command(version, about = "Rotates the log files of supervised processes")]
pub struct Cli {
    /// Config file (.toml, .yaml, .yml or .json)
    #[arg(short, long, env = "PMROTATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Supervisor control socket (overrides the config file)
    #[arg(long)]
    pub socket: Option<PathBuf>,

    /// Run a single rotation pass and exit
    #[arg(long)]
    pub once: bool,

    /// With --once, rotate every non-empty file regardless of size
    #[arg(long, requires = "once")]
    pub force: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_force_requires_once() {
        assert!(Cli::try_parse_from(["pmrotated", "--force"]).is_err());

        let cli = Cli::try_parse_from(["pmrotated", "--once", "--force", "-vv"]).unwrap();
        assert!(cli.once && cli.force);
        assert_eq!(cli.verbose, 2);
    }
}
