use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "chorus", about = "Fan one prompt out to many models and stream them all back")]
pub struct Args {
    /// Path to the configuration file.
    #[arg(short, long, env = "CHORUS_CONFIG", default_value = "chorus.toml")]
    pub config: PathBuf,

    /// Log filter, e.g. "info" or "chorus=debug,fanout=debug".
    #[arg(long, env = "CHORUS_LOG", default_value = "chorus=info,fanout=info")]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load the registry, probe availability once, and list every model.
    Models,
    /// Stream one prompt to the selected models.
    Chat(ChatArgs),
}

#[derive(Debug, clap::Args)]
pub struct ChatArgs {
    /// Model to stream from; repeat for a fan-out. Defaults to the
    /// registry's preferred model when omitted.
    #[arg(short, long = "model")]
    pub models: Vec<String>,

    /// System prompt prepended to the conversation.
    #[arg(long)]
    pub system: Option<String>,

    /// Upper bound on generated tokens.
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Sampling temperature in [0, 2].
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Nucleus sampling bound.
    #[arg(long)]
    pub top_p: Option<f32>,

    /// Gateway bearer credential, overriding the configured one.
    #[arg(long, env = "GATEWAY_TOKEN", hide_env_values = true)]
    pub gateway_token: Option<String>,

    /// The prompt itself.
    pub prompt: String,
}
