use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "symstore",
    about = "SymStore: load nested records, inspect the normalized graph, replay updates",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML file with store configuration
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Load a JSON file and report what was normalized
    Load(LoadArgs),
    /// Print one record rebuilt as nested JSON
    Show(ShowArgs),
    /// Load a JSON file, then apply updates and print every notification
    Replay(ReplayArgs),
    /// Print the effective configuration
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct LoadArgs {
    pub file: PathBuf,
}

#[derive(Args)]
pub struct ShowArgs {
    pub file: PathBuf,
    pub type_name: String,
    pub id: String,
}

#[derive(Args)]
pub struct ReplayArgs {
    pub file: PathBuf,
    /// JSON file holding one partial record or an array of them
    pub updates: PathBuf,
}

#[derive(Args)]
pub struct ConfigArgs {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_load() {
        let cli = Cli::try_parse_from(["symstore", "load", "data.json"]).unwrap();
        if let Command::Load(args) = cli.command {
            assert_eq!(args.file, PathBuf::from("data.json"));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_show() {
        let cli = Cli::try_parse_from(["symstore", "show", "data.json", "station", "101"]).unwrap();
        if let Command::Show(args) = cli.command {
            assert_eq!(args.type_name, "station");
            assert_eq!(args.id, "101");
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_show_requires_id() {
        assert!(Cli::try_parse_from(["symstore", "show", "data.json", "station"]).is_err());
    }

    #[test]
    fn parse_replay() {
        let cli = Cli::try_parse_from(["symstore", "replay", "data.json", "updates.json"]).unwrap();
        if let Command::Replay(args) = cli.command {
            assert_eq!(args.updates, PathBuf::from("updates.json"));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_config_flag() {
        let cli =
            Cli::try_parse_from(["symstore", "load", "data.json", "--config", "store.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("store.toml")));
    }

    #[test]
    fn parse_verbose() {
        let cli = Cli::try_parse_from(["symstore", "--verbose", "config"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::Config(_)));
    }

    #[test]
    fn parse_json_format() {
        let cli = Cli::try_parse_from(["symstore", "--format", "json", "load", "x.json"]).unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
    }
}
