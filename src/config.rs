use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Embedded default configuration.
const DEFAULT_CONFIG: &str = include_str!("../config.default.toml");

// ── Final (merged) config types ──

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub filenames: Filenames,
    #[serde(default)]
    pub prefix: Prefix,
    /// Alias name -> command text, split like a shell line.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
    /// Key -> command line run when the key is pressed.
    #[serde(default)]
    pub keys: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// `~` is expanded.
    #[serde(default = "default_history_path")]
    pub history_path: String,
    #[serde(default = "default_history_max_size")]
    pub history_max_size: usize,
    /// Print each expanded stage before running it.
    #[serde(default)]
    pub trace: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            history_path: default_history_path(),
            history_max_size: default_history_max_size(),
            trace: false,
        }
    }
}

fn default_history_path() -> String {
    "~/.local/share/jobsh/history".into()
}

fn default_history_max_size() -> usize {
    1000
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Paths {
    /// Directories of administrative commands, indexed after `PATH`.
    #[serde(default)]
    pub super_user: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Filenames {
    /// Glob patterns of names left out of file completion.
    #[serde(default)]
    pub ignore: Vec<String>,
}

/// Commands that run their arguments as another command (`sudo ll`),
/// so the word after them is alias-expanded too.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Prefix {
    #[serde(default)]
    pub commands: Vec<String>,
}

// ── Overlay types (user config that merges with defaults) ──

#[derive(Debug, Deserialize, Default)]
struct ConfigOverlay {
    #[serde(default)]
    settings: SettingsOverlay,
    #[serde(default)]
    paths: PathsOverlay,
    #[serde(default)]
    filenames: FilenamesOverlay,
    #[serde(default)]
    prefix: PrefixOverlay,
    #[serde(default)]
    aliases: TableOverlay,
    #[serde(default)]
    keys: TableOverlay,
}

#[derive(Debug, Deserialize, Default)]
struct SettingsOverlay {
    history_path: Option<String>,
    history_max_size: Option<usize>,
    trace: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct PathsOverlay {
    #[serde(default)]
    replace: bool,
    #[serde(default)]
    super_user: Vec<String>,
    #[serde(default)]
    remove_super_user: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
struct FilenamesOverlay {
    #[serde(default)]
    replace: bool,
    #[serde(default)]
    ignore: Vec<String>,
    #[serde(default)]
    remove_ignore: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
struct PrefixOverlay {
    #[serde(default)]
    replace: bool,
    #[serde(default)]
    commands: Vec<String>,
    #[serde(default)]
    remove_commands: Vec<String>,
}

/// A name -> value table: entries insert or override, `remove` deletes,
/// `replace = true` starts from an empty table.
#[derive(Debug, Deserialize, Default)]
struct TableOverlay {
    #[serde(default)]
    replace: bool,
    #[serde(default)]
    remove: Vec<String>,
    #[serde(flatten)]
    entries: BTreeMap<String, String>,
}

// ── Merge logic ──

/// Merge a user list into a default list.
/// In replace mode: user list replaces default entirely.
/// In merge mode: remove items first, then extend with additions (deduped).
fn merge_list(base: &mut Vec<String>, add: Vec<String>, remove: &[String], replace: bool) {
    if replace {
        *base = add;
    } else {
        base.retain(|item| !remove.contains(item));
        for item in add {
            if !base.contains(&item) {
                base.push(item);
            }
        }
    }
}

fn merge_table(base: &mut BTreeMap<String, String>, overlay: TableOverlay) {
    if overlay.replace {
        base.clear();
    }
    for name in &overlay.remove {
        base.remove(name);
    }
    base.extend(overlay.entries);
}

impl Config {
    /// Load the default embedded configuration.
    pub fn default_config() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("embedded default config must parse")
    }

    /// `~/.config/jobsh`, if `HOME` is set.
    pub fn dir() -> Option<PathBuf> {
        let home = std::env::var_os("HOME")?;
        Some(PathBuf::from(home).join(".config/jobsh"))
    }

    /// Startup script sourced by interactive shells.
    pub fn rc_path() -> Option<PathBuf> {
        Self::dir().map(|d| d.join("rc.shell"))
    }

    /// Load configuration with resolution order:
    /// 1. Start with embedded defaults
    /// 2. Merge user overlay from ~/.config/jobsh/config.toml (if exists)
    ///
    /// User config merges with defaults: lists extend, scalars override,
    /// tables override per key.
    /// Set `replace = true` in any section to replace its defaults entirely.
    /// Use `remove_<field>` lists (`remove` for tables) to subtract items.
    pub fn load() -> Self {
        let mut config = Self::default_config();
        if let Some(overlay) = Self::load_overlay() {
            config.apply_overlay(overlay);
        }
        config
    }

    /// Try to load user overlay from ~/.config/jobsh/config.toml.
    fn load_overlay() -> Option<ConfigOverlay> {
        let path = Self::dir()?.join("config.toml");
        let content = std::fs::read_to_string(path).ok()?;
        match toml::from_str(&content) {
            Ok(overlay) => Some(overlay),
            Err(e) => {
                eprintln!("jobsh: config parse error: {e}");
                None
            }
        }
    }

    /// Apply an overlay on top of this config (merge semantics).
    fn apply_overlay(&mut self, overlay: ConfigOverlay) {
        // Settings: scalar overrides
        let s = overlay.settings;
        if let Some(v) = s.history_path {
            self.settings.history_path = v;
        }
        if let Some(v) = s.history_max_size {
            self.settings.history_max_size = v;
        }
        if let Some(v) = s.trace {
            self.settings.trace = v;
        }

        let p = overlay.paths;
        merge_list(
            &mut self.paths.super_user,
            p.super_user,
            &p.remove_super_user,
            p.replace,
        );

        let f = overlay.filenames;
        merge_list(&mut self.filenames.ignore, f.ignore, &f.remove_ignore, f.replace);

        let pr = overlay.prefix;
        merge_list(
            &mut self.prefix.commands,
            pr.commands,
            &pr.remove_commands,
            pr.replace,
        );

        merge_table(&mut self.aliases, overlay.aliases);
        merge_table(&mut self.keys, overlay.keys);
    }

    /// Apply an overlay from a TOML string. Used for testing.
    #[cfg(test)]
    fn apply_overlay_str(&mut self, toml_str: &str) {
        let overlay: ConfigOverlay = toml::from_str(toml_str).unwrap();
        self.apply_overlay(overlay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_parses() {
        let config = Config::default_config();
        assert!(!config.paths.super_user.is_empty());
        assert!(!config.filenames.ignore.is_empty());
        assert!(!config.prefix.commands.is_empty());
        assert!(!config.aliases.is_empty());
    }

    #[test]
    fn default_settings() {
        let config = Config::default_config();
        assert!(!config.settings.trace);
        assert_eq!(config.settings.history_max_size, 1000);
        assert!(config.prefix.commands.contains(&"sudo".to_string()));
    }

    // ── Merge semantics ──

    #[test]
    fn overlay_overrides_scalars() {
        let mut config = Config::default_config();
        config.apply_overlay_str(
            r#"
            [settings]
            trace = true
            history_max_size = 50
        "#,
        );
        assert!(config.settings.trace);
        assert_eq!(config.settings.history_max_size, 50);
        // Untouched scalar keeps its default
        assert_eq!(config.settings.history_path, "~/.local/share/jobsh/history");
    }

    #[test]
    fn overlay_extends_and_removes_lists() {
        let mut config = Config::default_config();
        config.apply_overlay_str(
            r#"
            [prefix]
            commands = ["chronic"]
            remove_commands = ["nohup"]
        "#,
        );
        assert!(config.prefix.commands.contains(&"chronic".to_string()));
        assert!(config.prefix.commands.contains(&"sudo".to_string()));
        assert!(!config.prefix.commands.contains(&"nohup".to_string()));
    }

    #[test]
    fn overlay_replaces_list() {
        let mut config = Config::default_config();
        config.apply_overlay_str(
            r#"
            [filenames]
            replace = true
            ignore = ["*.tmp"]
        "#,
        );
        assert_eq!(config.filenames.ignore, vec!["*.tmp".to_string()]);
    }

    #[test]
    fn overlay_dedupes() {
        let mut config = Config::default_config();
        let before = config.prefix.commands.len();
        config.apply_overlay_str(
            r#"
            [prefix]
            commands = ["sudo"]
        "#,
        );
        assert_eq!(config.prefix.commands.len(), before);
    }

    #[test]
    fn overlay_tables_per_key() {
        let mut config = Config::default_config();
        config.apply_overlay_str(
            r#"
            [aliases]
            ll = "ls -lh"
            gs = "git status"
            remove = ["la"]
        "#,
        );
        assert_eq!(config.aliases.get("ll").map(String::as_str), Some("ls -lh"));
        assert_eq!(config.aliases.get("gs").map(String::as_str), Some("git status"));
        assert!(!config.aliases.contains_key("la"));
        assert!(!config.aliases.contains_key("remove"));
    }

    #[test]
    fn overlay_replaces_table() {
        let mut config = Config::default_config();
        config.apply_overlay_str(
            r#"
            [keys]
            replace = true
            F2 = "history"
        "#,
        );
        assert_eq!(config.keys.len(), 1);
        assert_eq!(config.keys.get("F2").map(String::as_str), Some("history"));
    }

    #[test]
    fn dump_round_trips() {
        let config = Config::default_config();
        let text = toml::to_string(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.aliases, config.aliases);
        assert_eq!(back.prefix.commands, config.prefix.commands);
    }
}
