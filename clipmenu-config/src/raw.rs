//! Generic env-var / config-file / default resolution, independent of
//! the types any individual key eventually converts to.

use std::collections::HashMap;
use std::path::Path;

/// One row of the configuration table: a file key, its environment
/// variable override, and its default (absent for keys with no sane
/// default, like `ignore_window`).
pub struct Entry {
    pub key: &'static str,
    pub env_var: &'static str,
    pub default: Option<&'static str>,
}

/// Resolve every entry's raw string value.
///
/// Resolution order per key: environment variable, then the config
/// file (only if the environment didn't already set it), then the
/// built-in default. A missing config file is treated the same as an
/// empty one.
pub fn resolve(entries: &[Entry], config_path: Option<&Path>) -> HashMap<&'static str, Option<String>> {
    let mut is_set: HashMap<&str, bool> = HashMap::new();
    let mut values: HashMap<&'static str, Option<String>> = HashMap::new();

    for entry in entries {
        if let Ok(value) = std::env::var(entry.env_var) {
            log::debug!("config entry {} set by ${}", entry.key, entry.env_var);
            values.insert(entry.key, Some(value));
            is_set.insert(entry.key, true);
        }
    }

    if let Some(path) = config_path {
        if let Ok(contents) = std::fs::read_to_string(path) {
            for line in contents.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                let mut parts = line.splitn(2, ' ');
                let key = match parts.next() {
                    Some(k) => k,
                    None => continue,
                };
                let value = match parts.next() {
                    Some(v) => v.trim(),
                    None => continue,
                };
                for entry in entries {
                    if entry.key == key && !*is_set.get(entry.key).unwrap_or(&false) {
                        log::debug!("config entry {} set by config file", entry.key);
                        values.insert(entry.key, Some(value.to_string()));
                        is_set.insert(entry.key, true);
                        break;
                    }
                }
            }
        }
    }

    for entry in entries {
        if !*is_set.get(entry.key).unwrap_or(&false) {
            log::debug!("config entry {} set to default", entry.key);
            values.insert(entry.key, entry.default.map(str::to_string));
        }
    }

    values
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENTRIES: &[Entry] = &[
        Entry {
            key: "max_clips",
            env_var: "CM_TEST_MAX_CLIPS",
            default: Some("1000"),
        },
        Entry {
            key: "ignore_window",
            env_var: "CM_TEST_IGNORE_WINDOW",
            default: None,
        },
    ];

    #[test]
    fn default_used_when_nothing_set() {
        std::env::remove_var("CM_TEST_MAX_CLIPS");
        let values = resolve(ENTRIES, None);
        assert_eq!(values["max_clips"].as_deref(), Some("1000"));
        assert_eq!(values["ignore_window"], None);
    }

    #[test]
    fn file_overrides_default_but_not_env() {
        std::env::set_var("CM_TEST_MAX_CLIPS", "42");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clipmenu.conf");
        std::fs::write(&path, "max_clips 7\nignore_window foo.*\n").unwrap();

        let values = resolve(ENTRIES, Some(&path));
        // env wins over file
        assert_eq!(values["max_clips"].as_deref(), Some("42"));
        assert_eq!(values["ignore_window"].as_deref(), Some("foo.*"));

        std::env::remove_var("CM_TEST_MAX_CLIPS");
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clipmenu.conf");
        std::fs::write(&path, "# a comment\n\nmax_clips 3\n").unwrap();
        std::env::remove_var("CM_TEST_MAX_CLIPS");
        let values = resolve(ENTRIES, Some(&path));
        assert_eq!(values["max_clips"].as_deref(), Some("3"));
    }
}
