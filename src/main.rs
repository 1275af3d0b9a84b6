// CLI binary entry point for opustag

mod cli;

use clap::Parser;
use env_logger::{Builder, Env};
use opustag::SequencePolicy;
use std::process;

use cli::commands::{self, TagEdits};
use cli::{Commands, Config, OutputFormatter};

fn init_logging(config: &Config) {
    let default_level = if config.verbose {
        "debug"
    } else if config.quiet {
        "warn"
    } else {
        "info"
    };
    Builder::from_env(Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();
}

fn main() {
    let config = Config::parse();
    init_logging(&config);
    let formatter = OutputFormatter::new(config.format, config.quiet);

    let result = match config.command {
        Commands::Info { files } => commands::command_info(&files, &formatter),
        Commands::Pages { file } => commands::command_pages(&file, &formatter),
        Commands::Tags { files } => commands::command_tags(&files, &formatter),
        Commands::Set {
            file,
            tags,
            remove,
            clear,
            vendor,
            preserve_sequence,
            in_place,
        } => {
            let edits = TagEdits {
                tags,
                remove,
                clear,
                vendor,
            };
            let policy = if preserve_sequence {
                SequencePolicy::Preserve
            } else {
                SequencePolicy::Renumber
            };
            commands::command_set(&file, &edits, policy, in_place, &formatter)
        }
        Commands::Verify { files } => commands::command_verify(&files, &formatter),
    };

    match result {
        Ok(0) => {}
        Ok(failed) => {
            log::debug!("{} file(s) failed", failed);
            process::exit(1);
        }
        Err(e) => {
            formatter.print_error(&format!("{:#}", e));
            process::exit(1);
        }
    }
}
