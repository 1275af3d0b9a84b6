// CLI configuration
use clap::{Parser, Subcommand, ValueEnum};

/// opustag - Ogg Opus/Vorbis comment editor
#[derive(Parser, Debug)]
#[command(name = "opustag")]
#[command(about = "Inspect Ogg streams and edit Opus/Vorbis comment headers", long_about = None)]
#[command(version)]
pub struct Config {
    /// Output format
    #[arg(short, long, value_enum, default_value = "pretty", global = true)]
    pub format: OutputFormat,

    /// Quiet mode (suppress progress messages)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show stream summary: serial, codec, pages, packets, size
    Info {
        /// Ogg file path(s) or glob pattern(s)
        #[arg(value_name = "FILE", required = true)]
        files: Vec<String>,
    },

    /// List every page of a file
    Pages {
        /// Ogg file path
        #[arg(value_name = "FILE")]
        file: String,
    },

    /// Print vendor string and comments
    Tags {
        /// Ogg file path(s) or glob pattern(s)
        #[arg(value_name = "FILE", required = true)]
        files: Vec<String>,
    },

    /// Edit the comment header
    Set {
        /// Ogg file path
        #[arg(value_name = "FILE")]
        file: String,

        /// Set a comment; repeat a key to give it several values
        #[arg(short = 't', long = "tag", value_name = "KEY=VALUE", value_parser = parse_assignment)]
        tags: Vec<(String, String)>,

        /// Remove every value of a key
        #[arg(short = 'r', long = "remove", value_name = "KEY")]
        remove: Vec<String>,

        /// Remove all comments before applying --tag
        #[arg(long)]
        clear: bool,

        /// Replace the vendor string
        #[arg(long)]
        vendor: Option<String>,

        /// Leave sequence numbers of later pages untouched
        #[arg(long)]
        preserve_sequence: bool,

        /// Rewrite the file directly instead of through a temporary copy
        #[arg(long)]
        in_place: bool,
    },

    /// Check every page checksum and packet boundary
    Verify {
        /// Ogg file path(s) or glob pattern(s)
        #[arg(value_name = "FILE", required = true)]
        files: Vec<String>,
    },
}

/// Parse a KEY=VALUE argument
pub fn parse_assignment(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {:?}", arg)),
    }
}
