//! Configuration for the clipmenu tools: a key/value file,
//! environment-variable overrides, and typed defaults.

mod path;
mod raw;

use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use regex::Regex;

pub use path::{config_file_path, runtime_directory, store_root};

/// Which selections a clipmenu tool should pay attention to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SelectionSet {
    pub clipboard: bool,
    pub primary: bool,
    pub secondary: bool,
}

impl SelectionSet {
    pub fn is_empty(&self) -> bool {
        !(self.clipboard || self.primary || self.secondary)
    }
}

fn parse_selections(value: &str) -> Result<SelectionSet> {
    let mut set = SelectionSet::default();
    for token in value.split_whitespace() {
        match token {
            "clipboard" => set.clipboard = true,
            "primary" => set.primary = true,
            "secondary" => set.secondary = true,
            other => bail!("unrecognized selection {other:?}"),
        }
    }
    Ok(set)
}

/// The external program used to prompt the user for a clip.
#[derive(Clone, Debug)]
pub enum Launcher {
    Rofi,
    Custom(String),
}

fn parse_launcher(value: &str) -> Launcher {
    if value == "rofi" {
        Launcher::Rofi
    } else {
        Launcher::Custom(value.to_string())
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    const TRUTHY: &[&str] = &["1", "y", "yes", "true", "on"];
    const FALSY: &[&str] = &["0", "n", "no", "false", "off"];
    let lower = value.to_ascii_lowercase();
    if TRUTHY.contains(&lower.as_str()) {
        Ok(true)
    } else if FALSY.contains(&lower.as_str()) {
        Ok(false)
    } else {
        bail!("{value:?} is not a valid boolean")
    }
}

fn parse_positive_int(value: &str) -> Result<u32> {
    value
        .parse::<u32>()
        .with_context(|| format!("{value:?} is not a non-negative integer"))
}

/// Fully resolved configuration for a clipmenu tool.
#[derive(Clone, Debug)]
pub struct Config {
    pub runtime_dir: String,
    pub max_clips: u32,
    pub max_clips_batch: u32,
    pub oneshot: bool,
    pub own_clipboard: bool,
    pub selections: SelectionSet,
    pub owned_selections: SelectionSet,
    pub ignore_window: Option<Regex>,
    pub launcher: Launcher,
    pub launcher_pass_dmenu_args: bool,
}

impl Config {
    /// Load configuration from the environment and the config file at
    /// [`config_file_path`]. A missing config file is not an error.
    pub fn load() -> Result<Self> {
        let config_path = config_file_path().ok();
        Self::load_from(config_path.as_deref())
    }

    /// Load configuration using an explicit config file path, or no
    /// config file at all (`None`), bypassing [`config_file_path`].
    /// Exposed for testing.
    pub fn load_from(config_path: Option<&std::path::Path>) -> Result<Self> {
        let entries: &[raw::Entry] = &[
            raw::Entry { key: "max_clips", env_var: "CM_MAX_CLIPS", default: Some("1000") },
            raw::Entry { key: "max_clips_batch", env_var: "CM_MAX_CLIPS_BATCH", default: Some("100") },
            raw::Entry { key: "oneshot", env_var: "CM_ONESHOT", default: Some("0") },
            raw::Entry { key: "own_clipboard", env_var: "CM_OWN_CLIPBOARD", default: Some("0") },
            raw::Entry { key: "selections", env_var: "CM_SELECTIONS", default: Some("clipboard primary") },
            raw::Entry { key: "own_selections", env_var: "CM_OWN_SELECTIONS", default: Some("clipboard") },
            raw::Entry { key: "ignore_window", env_var: "CM_IGNORE_WINDOW", default: None },
            raw::Entry { key: "launcher", env_var: "CM_LAUNCHER", default: Some("dmenu") },
            raw::Entry { key: "launcher_pass_dmenu_args", env_var: "CM_LAUNCHER_PASS_DMENU_ARGS", default: Some("1") },
            raw::Entry { key: "cm_dir", env_var: "CM_DIR", default: None },
        ];

        let values = raw::resolve(entries, config_path);
        Self::from_raw(&values)
    }

    fn from_raw(values: &HashMap<&'static str, Option<String>>) -> Result<Self> {
        let get = |key: &str| values.get(key).cloned().flatten();

        let runtime_dir = get("cm_dir").unwrap_or_else(runtime_directory);

        let max_clips = parse_positive_int(&get("max_clips").context("max_clips missing")?)?;
        let max_clips_batch =
            parse_positive_int(&get("max_clips_batch").context("max_clips_batch missing")?)?;
        let oneshot = parse_positive_int(&get("oneshot").context("oneshot missing")?)? != 0;
        let own_clipboard = parse_bool(&get("own_clipboard").context("own_clipboard missing")?)?;
        let selections = parse_selections(&get("selections").context("selections missing")?)?;
        let owned_selections =
            parse_selections(&get("own_selections").context("own_selections missing")?)?;
        let ignore_window = match get("ignore_window") {
            Some(pattern) => Some(
                Regex::new(&pattern)
                    .with_context(|| format!("invalid ignore_window regex {pattern:?}"))?,
            ),
            None => None,
        };
        let launcher = parse_launcher(&get("launcher").context("launcher missing")?);
        let launcher_pass_dmenu_args = parse_bool(
            &get("launcher_pass_dmenu_args").context("launcher_pass_dmenu_args missing")?,
        )?;

        Ok(Config {
            runtime_dir,
            max_clips,
            max_clips_batch,
            oneshot,
            own_clipboard,
            selections,
            owned_selections,
            ignore_window,
            launcher,
            launcher_pass_dmenu_args,
        })
    }
}

impl Config {
    /// The store root directory for this configuration's `runtime_dir`,
    /// creating it if necessary.
    pub fn store_root(&self) -> Result<std::path::PathBuf> {
        path::store_root(&self.runtime_dir)
    }
}

/// Whether `$CM_DEBUG=1` is set, raising the effective log level.
pub fn debug_mode_enabled() -> bool {
    std::env::var("CM_DEBUG").map(|v| v == "1").unwrap_or(false)
}

/// Initialize `env_logger` with a default filter level driven by
/// [`debug_mode_enabled`], still overridable via `$RUST_LOG`. Shared by
/// every short-lived binary so `$CM_DEBUG=1` has a uniform effect.
pub fn init_logging() {
    let default_filter = if debug_mode_enabled() { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clear_env() {
        for var in [
            "CM_MAX_CLIPS",
            "CM_MAX_CLIPS_BATCH",
            "CM_ONESHOT",
            "CM_OWN_CLIPBOARD",
            "CM_SELECTIONS",
            "CM_OWN_SELECTIONS",
            "CM_IGNORE_WINDOW",
            "CM_LAUNCHER",
            "CM_LAUNCHER_PASS_DMENU_ARGS",
            "CM_DIR",
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn defaults_parse_cleanly() {
        clear_env();
        std::env::set_var("XDG_RUNTIME_DIR", "/run/user/0");
        let cfg = Config::load_from(None).unwrap();
        assert_eq!(cfg.max_clips, 1000);
        assert_eq!(cfg.max_clips_batch, 100);
        assert!(!cfg.oneshot);
        assert!(!cfg.own_clipboard);
        assert_eq!(cfg.selections, SelectionSet { clipboard: true, primary: true, secondary: false });
        assert_eq!(cfg.owned_selections, SelectionSet { clipboard: true, primary: false, secondary: false });
        assert!(cfg.ignore_window.is_none());
        assert!(matches!(cfg.launcher, Launcher::Custom(ref s) if s == "dmenu"));
        assert!(cfg.launcher_pass_dmenu_args);
        std::env::remove_var("XDG_RUNTIME_DIR");
    }

    #[test]
    fn env_overrides_file() {
        clear_env();
        std::env::set_var("CM_MAX_CLIPS", "5");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clipmenu.conf");
        std::fs::write(&path, "max_clips 20\nselections clipboard secondary\n").unwrap();

        let cfg = Config::load_from(Some(&path)).unwrap();
        assert_eq!(cfg.max_clips, 5);
        assert_eq!(
            cfg.selections,
            SelectionSet { clipboard: true, primary: false, secondary: true }
        );
        clear_env();
    }

    #[test]
    fn unknown_selection_token_errors() {
        clear_env();
        std::env::set_var("CM_SELECTIONS", "clipboard bogus");
        let err = Config::load_from(None).unwrap_err();
        assert!(err.to_string().contains("bogus") || err.chain().any(|c| c.to_string().contains("bogus")));
        clear_env();
    }

    #[test]
    fn ignore_window_compiles_regex() {
        clear_env();
        std::env::set_var("CM_IGNORE_WINDOW", "^Private");
        let cfg = Config::load_from(None).unwrap();
        assert!(cfg.ignore_window.unwrap().is_match("Private Browsing"));
        clear_env();
    }

    #[test]
    fn rofi_is_recognized_as_known_launcher() {
        clear_env();
        std::env::set_var("CM_LAUNCHER", "rofi");
        let cfg = Config::load_from(None).unwrap();
        assert!(matches!(cfg.launcher, Launcher::Rofi));
        clear_env();
    }
}
