//! Argument definitions for the `gatewatch` binary.

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "gatewatch",
    version,
    about = "Live vehicle entry/exit feed for the fleet gate console",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Feed endpoint URL (e.g., wss://fleet.example.com/ws/vehicle-logs/)
    #[arg(long, global = true, env = "GATEWATCH_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Access token for the feed
    #[arg(long, global = true, env = "GATEWATCH_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Configuration profile to use
    #[arg(long, short = 'p', global = true, env = "GATEWATCH_PROFILE")]
    pub profile: Option<String>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Tail the live feed to the terminal
    Watch(WatchArgs),

    /// Manage configuration and credentials
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Ring the terminal bell and highlight new entries
    #[arg(long)]
    pub notify: bool,

    /// Override the feed window size
    #[arg(long, short = 'n')]
    pub capacity: Option<usize>,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the resolved configuration
    Show,

    /// Print the config file path
    Path,

    /// Write a starter config file
    Init,

    /// Store the feed token in the system keyring (read from stdin)
    SetToken {
        /// Profile to store the token for (defaults to the active profile)
        profile: Option<String>,
    },
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}
