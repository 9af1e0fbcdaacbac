//! `sbrc` configuration file parser.
//!
//! An rc file is a list of `/set` directives:
//!
//! | Directive | Action |
//! |-----------|--------|
//! | `/set sb_fallback_action=<action>` | error action used when no preference is set |
//! | `/set sb_preference_variable=<name>` | variable holding the inherited preference |
//! | `/set sb_channel_depth=<n>` | values allowed to queue ahead of the output sink (at most 4096) |
//! | `/set <name>=<value>` or `/set <name> <value>` | seed a global variable |
//! | Lines starting with `;` or `#` | comment, ignored |
//! | Any other `/command` | silently skipped |

use std::path::{Path, PathBuf};

use directories::{BaseDirs, ProjectDirs};
use tracing::debug;

use crate::error::ConfigError;
use crate::policy::{ErrorAction, PREFERENCE_VARIABLE};
use crate::script::{Interpreter, Value};

// ── Public API ────────────────────────────────────────────────────────────────

/// Largest accepted [`EngineConfig::channel_depth`].
pub const MAX_CHANNEL_DEPTH: usize = 4096;

/// Engine-wide settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Used when neither a hint nor the preference variable gives an action.
    pub fallback_action: ErrorAction,
    /// Name of the inherited error-preference variable.
    pub preference_variable: String,
    /// Output values that may queue ahead of the sink; 0 runs in lockstep.
    /// The engine caps it at [`MAX_CHANNEL_DEPTH`].
    pub channel_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fallback_action: ErrorAction::Continue,
            preference_variable: PREFERENCE_VARIABLE.to_owned(),
            channel_depth: 0,
        }
    }
}

/// Parsed rc file: engine settings plus global variables to seed.
#[derive(Debug, Default)]
pub struct Config {
    pub engine: EngineConfig,
    /// Global variables in file order; a later `/set` of the same name wins.
    pub globals: Vec<(String, Value)>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an rc string.
    ///
    /// Returns the config and a list of any errors on recognised lines; a
    /// bad line is skipped and the rest still load.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut config = Config::new();
        let mut errors = Vec::new();

        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            let Some(rest) = line.strip_prefix('/') else { continue };
            let (cmd, args_str) = rest
                .split_once(|c: char| c.is_ascii_whitespace())
                .unwrap_or((rest, ""));

            if cmd == "set" {
                let tokens = split_args(args_str.trim());
                if let Err(message) = config.parse_set(&tokens) {
                    errors.push(ConfigError { line: lineno, message });
                }
            }
        }

        (config, errors)
    }

    /// Read and parse an rc file from disk.
    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "loading rc file");
        Ok(Self::load_str(&s))
    }

    /// Seed `interp`'s global scope with the configured variables.
    pub fn apply(&self, interp: &mut Interpreter) {
        for (name, value) in &self.globals {
            interp.set_global_var(name.as_str(), value.clone());
        }
    }

    fn parse_set(&mut self, tokens: &[String]) -> Result<(), String> {
        if tokens.is_empty() {
            return Err("/set: requires an argument".into());
        }

        let (name, value) = if let Some(eq) = tokens[0].find('=') {
            let mut value = tokens[0][eq + 1..].to_owned();
            for extra in &tokens[1..] {
                value.push(' ');
                value.push_str(extra);
            }
            (tokens[0][..eq].to_owned(), value)
        } else if tokens.len() >= 2 {
            (tokens[0].clone(), tokens[1..].join(" "))
        } else {
            return Err(format!("/set: missing value for '{}'", tokens[0]));
        };

        if name.is_empty() {
            return Err("/set: variable name cannot be empty".into());
        }

        match name.as_str() {
            "sb_fallback_action" => {
                self.engine.fallback_action = value.parse()?;
            }
            "sb_preference_variable" => {
                if value.is_empty() {
                    return Err("sb_preference_variable cannot be empty".into());
                }
                self.engine.preference_variable = value;
            }
            "sb_channel_depth" => {
                let depth: usize = value
                    .parse()
                    .map_err(|_| format!("sb_channel_depth: not a count: {value}"))?;
                if depth > MAX_CHANNEL_DEPTH {
                    return Err(format!("sb_channel_depth: {depth} exceeds the maximum of {MAX_CHANNEL_DEPTH}"));
                }
                self.engine.channel_depth = depth;
            }
            _ => self.globals.push((name, Value::from_text(&value))),
        }
        Ok(())
    }
}

/// How to choose the rc file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConfigFile {
    /// Look in the standard locations (default).
    #[default]
    Search,
    /// Load no rc file.
    Skip,
    /// Load this specific file.
    Explicit(PathBuf),
}

impl ConfigFile {
    /// The file to load, if any.
    pub fn resolve(&self) -> Option<PathBuf> {
        match self {
            ConfigFile::Search => find_user_config(),
            ConfigFile::Skip => None,
            ConfigFile::Explicit(p) => Some(p.clone()),
        }
    }
}

/// Search `<config dir>/scriptblock/sbrc`, `~/.sbrc`, `./.sbrc` in order.
/// Returns the first path that exists, or `None`.
pub fn find_user_config() -> Option<PathBuf> {
    let project = ProjectDirs::from("", "", "scriptblock").map(|d| d.config_dir().join("sbrc"));
    let home = BaseDirs::new().map(|d| d.home_dir().join(".sbrc"));
    project
        .into_iter()
        .chain(home)
        .chain(std::iter::once(PathBuf::from("./.sbrc")))
        .find(|p| p.exists())
}

// ── Argument tokenizer ────────────────────────────────────────────────────────

/// Split `s` into whitespace-delimited tokens, honouring double-quoted strings
/// and `\"` escapes within them.
fn split_args(s: &str) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();
    let mut cur = String::new();
    let mut in_quotes = false;
    let mut chars = s.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '\\' if in_quotes => {
                if let Some(escaped) = chars.next() {
                    cur.push(escaped);
                }
            }
            c if c.is_ascii_whitespace() && !in_quotes => {
                if !cur.is_empty() {
                    args.push(std::mem::take(&mut cur));
                }
            }
            c => cur.push(c),
        }
    }
    if !cur.is_empty() {
        args.push(cur);
    }
    args
}

// ── Tests ─────────────────────────────────────────────────────────────────────
