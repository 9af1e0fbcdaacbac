//! Command-line argument parsing.
//!
//! Usage:
//!   sb [--rc FILE | --no-rc] [-v]... build [FILE]
//!   sb [--rc FILE | --no-rc] [-v]... run [FILE] [-c SCRIPT]... [-a ARG]...
//!                                        [--no-new-scope] [--error-action ACTION]

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use crate::config::ConfigFile;
use crate::pipeline::RunOptions;
use crate::policy::ErrorAction;
use crate::script::Value;

#[derive(Debug, Parser)]
#[command(name = "sb", version)]
#[command(about = "Build script units from text and run them in nested sessions", long_about = None)]
pub struct Cli {
    /// Load this rc file instead of searching the standard locations
    #[arg(long, global = true, value_name = "FILE", conflicts_with = "no_rc")]
    pub rc: Option<PathBuf>,

    /// Load no rc file
    #[arg(long, global = true)]
    pub no_rc: bool,

    /// Raise log verbosity (repeatable); SB_LOG takes precedence
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Aggregate text lines into one unit and print its source
    Build {
        /// Read lines from FILE instead of stdin
        file: Option<PathBuf>,
    },

    /// Run text lines and ready units, printing each produced value
    Run {
        /// Read script lines from FILE (stdin when neither FILE nor -c is given)
        file: Option<PathBuf>,

        /// Compile SCRIPT and run it as a ready unit (repeatable, runs first)
        #[arg(short = 'c', long = "command", value_name = "SCRIPT")]
        commands: Vec<String>,

        /// Positional argument for every unit (repeatable)
        #[arg(short = 'a', long = "arg", value_name = "ARG")]
        args: Vec<String>,

        /// Run in the caller's scope so variable writes persist between units
        #[arg(long)]
        no_new_scope: bool,

        /// Error action for every unit, overriding ErrorActionPreference.
        /// Inquire reads its answer from stdin and only when stdin is a
        /// terminal; otherwise, as when the script itself arrives on stdin,
        /// every inquiry is answered "no" and the unit stops
        #[arg(long, value_name = "ACTION")]
        error_action: Option<ErrorAction>,
    },
}

impl Cli {
    pub fn config_file(&self) -> ConfigFile {
        match (&self.rc, self.no_rc) {
            (_, true) => ConfigFile::Skip,
            (Some(path), false) => ConfigFile::Explicit(path.clone()),
            (None, false) => ConfigFile::Search,
        }
    }
}

/// Build [`RunOptions`] from `run` flags.  Arguments are typed the way
/// `/set` types values.
pub fn run_options(args: &[String], no_new_scope: bool, error_action: Option<ErrorAction>) -> RunOptions {
    RunOptions {
        arguments: (!args.is_empty()).then(|| args.iter().map(|a| Value::from_text(a)).collect()),
        no_new_scope,
        error_action,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
