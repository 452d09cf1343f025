use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "regis",
    about = "Inspect register keychains and object blobs",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Keychain settings (TOML); defaults apply when omitted
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// List the live keys of a file keychain
    Keys(KeysArgs),
    /// Show the sector record of a key in a file keychain
    Get(KeyArgs),
    /// Mark a key erased in a file keychain
    Erase(KeyArgs),
    /// Bring back an erased key in a file keychain
    Restore(KeyArgs),
    /// Show every stored version of a key in a hashmap keychain
    Probe(KeyArgs),
    /// Decode an object register blob
    Inspect(InspectArgs),
}

#[derive(Args)]
pub struct KeysArgs {
    /// Keychain directory
    pub dir: PathBuf,
}

#[derive(Args)]
pub struct KeyArgs {
    /// Keychain directory
    pub dir: PathBuf,
    /// Key bytes as hex
    pub key: String,
}

#[derive(Args)]
pub struct InspectArgs {
    /// Blob as hex
    pub hex: String,
    /// Treat the blob as a full serialized register state
    #[arg(long)]
    pub state: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["regis", "keys", "/tmp/k", "--format", "json", "-v"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(matches!(cli.command, Command::Keys(_)));
    }

    #[test]
    fn inspect_takes_state_flag() {
        let cli = Cli::try_parse_from(["regis", "inspect", "--state", "00ff"]).unwrap();
        match cli.command {
            Command::Inspect(args) => {
                assert!(args.state);
                assert_eq!(args.hex, "00ff");
            }
            _ => panic!("expected inspect"),
        }
    }

    #[test]
    fn key_commands_need_a_key() {
        assert!(Cli::try_parse_from(["regis", "get", "/tmp/k"]).is_err());
    }
}
