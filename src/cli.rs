// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `reprodag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "reprodag",
    version,
    about = "Rebuild only the outdated targets of a reproducible pipeline.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the pipeline file (TOML).
    ///
    /// Default: `Reprodag.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Reprodag.toml", global = true)]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `REPRODAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Bring outdated targets up to date.
    Make {
        /// Only build these targets (and what they depend on).
        #[arg(long = "target", short = 't', value_name = "NAME")]
        targets: Vec<String>,

        /// Maximum number of targets evaluated at once.
        #[arg(long, short = 'j', value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
        jobs: Option<u64>,

        /// Print the run report as JSON.
        #[arg(long)]
        json: bool,

        /// Classify and print what would run, without running anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Print a target's stored value (JSON) or tracked path.
    Read {
        name: String,
    },

    /// Show every target with its dependencies, format and classification.
    Manifest {
        #[arg(long)]
        json: bool,
    },

    /// List targets that would be rebuilt.
    Outdated,

    /// Remove stored records and values.
    Clean {
        /// Targets to clean.
        names: Vec<String>,

        /// Remove everything in the store.
        #[arg(long, conflicts_with = "names")]
        all: bool,
    },

    /// Force targets to rebuild while keeping their last values readable.
    Invalidate {
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Remove stored state of targets that are no longer declared.
    Prune,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_accepts_repeated_targets() {
        let args =
            CliArgs::try_parse_from(["reprodag", "make", "-t", "model", "--target", "plot2", "-j", "2"])
                .unwrap();
        match args.command {
            Command::Make { targets, jobs, .. } => {
                assert_eq!(targets, vec!["model", "plot2"]);
                assert_eq!(jobs, Some(2));
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(args.config, "Reprodag.toml");
    }

    #[test]
    fn zero_jobs_is_rejected() {
        assert!(CliArgs::try_parse_from(["reprodag", "make", "-j", "0"]).is_err());
    }

    #[test]
    fn clean_all_conflicts_with_names() {
        assert!(CliArgs::try_parse_from(["reprodag", "clean", "--all", "raw"]).is_err());
        assert!(CliArgs::try_parse_from(["reprodag", "--config", "x.toml", "clean", "--all"]).is_ok());
    }
}
