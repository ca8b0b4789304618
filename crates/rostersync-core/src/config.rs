// Configuration loading and parsing (rostersync.toml, credentials.toml).

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::enrich::EnrichmentPlan;
use crate::engine::EngineSettings;
use crate::monitor::{MonitorSettings, PageId};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub client: ClientConfig,
    pub connection: ConnectionConfig,
    pub polling: PollingConfig,
    pub rosters: RostersConfig,
    pub credentials: CredentialsConfig,
}

impl Config {
    /// Bound applied to every request made to the client.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.client.request_timeout_ms)
    }

    pub fn engine_settings(&self, roster: &RosterConfig) -> EngineSettings {
        EngineSettings {
            plan: EnrichmentPlan {
                match_history: roster.match_history,
            },
            fetch_timeout: self.request_timeout(),
        }
    }

    pub fn monitor_settings(&self, roster: &RosterConfig) -> MonitorSettings {
        MonitorSettings {
            tracked_page: roster.page.as_deref().map(PageId::from),
            poll_interval: Duration::from_millis(self.polling.interval_ms),
            min_check_interval: Duration::from_millis(self.polling.min_check_interval_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// rostersync.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire rostersync.toml file.
#[derive(Debug, Clone, Deserialize)]
struct RostersyncFile {
    client: ClientConfig,
    #[serde(default)]
    connection: ConnectionConfig,
    polling: PollingConfig,
    rosters: RostersConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,
    pub request_timeout_ms: u64,
    /// The game client serves a self-signed certificate.
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,
}

impl ConnectionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            ttl_ms: default_ttl_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    pub interval_ms: u64,
    #[serde(default = "default_min_check_interval_ms")]
    pub min_check_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RostersConfig {
    pub lobby: RosterConfig,
    pub champ_select: RosterConfig,
    pub pre_game: RosterConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RosterConfig {
    /// Page whose visibility enables polling of this roster. Left unset, the
    /// roster is never monitored and startup reports it.
    #[serde(default)]
    pub page: Option<String>,
    /// Fixed grid size for slot views.
    pub slots: usize,
    #[serde(default)]
    pub match_history: bool,
}

fn default_ttl_ms() -> u64 {
    5000
}

fn default_min_check_interval_ms() -> u64 {
    4000
}

// ---------------------------------------------------------------------------
// credentials.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialsConfig {
    pub auth_token: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

const CONFIG_DIR: &str = "config";
const DEFAULTS_DIR: &str = "defaults";
const MAIN_FILE: &str = "rostersync.toml";
const CREDENTIALS_FILE: &str = "credentials.toml";

/// Load and validate `config/rostersync.toml` plus the optional
/// `config/credentials.toml`, relative to `base_dir`.
///
/// Does not seed defaults; prefer `load_config()`.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join(CONFIG_DIR);
    let file: RostersyncFile = parse_toml(&config_dir.join(MAIN_FILE))?;

    let credentials_path = config_dir.join(CREDENTIALS_FILE);
    let credentials = if credentials_path.is_file() {
        parse_toml(&credentials_path)?
    } else {
        debug!(path = %credentials_path.display(), "no credentials file");
        CredentialsConfig::default()
    };

    let config = Config {
        client: file.client,
        connection: file.connection,
        polling: file.polling,
        rosters: file.rosters,
        credentials,
    };
    validate(&config)?;
    Ok(config)
}

/// Seed `config/rostersync.toml` from `defaults/` when it is missing.
/// Returns the path written, or `None` when the file already existed.
///
/// Credentials are never seeded: `defaults/credentials.toml.example` is a
/// template to copy by hand once a token is known.
pub fn ensure_config_files(base_dir: &Path) -> Result<Option<PathBuf>, ConfigError> {
    let config_dir = base_dir.join(CONFIG_DIR);
    let target = config_dir.join(MAIN_FILE);
    if target.is_file() {
        return Ok(None);
    }

    let source = base_dir.join(DEFAULTS_DIR).join(MAIN_FILE);
    if !source.is_file() {
        return Err(ConfigError::DefaultsCopyError {
            message: format!(
                "{} is missing and there is no {} to seed it from; \
                 run from the project root",
                target.display(),
                source.display()
            ),
        });
    }

    let seed_error = |e: std::io::Error| ConfigError::DefaultsCopyError {
        message: format!("failed to seed {} from {}: {e}", target.display(), source.display()),
    };
    std::fs::create_dir_all(&config_dir).map_err(seed_error)?;
    std::fs::copy(&source, &target).map_err(seed_error)?;
    info!(path = %target.display(), "seeded config from defaults");
    Ok(Some(target))
}

/// Load config relative to the current working directory, seeding it from
/// `defaults/` on first run.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

fn parse_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::ParseError {
        path: path.to_path_buf(),
        source,
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    let base_url = &config.client.base_url;
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(ConfigError::ValidationError {
            field: "client.base_url".into(),
            message: format!("must start with http:// or https://, got {base_url:?}"),
        });
    }

    let durations: &[(&str, u64)] = &[
        ("client.request_timeout_ms", config.client.request_timeout_ms),
        ("connection.ttl_ms", config.connection.ttl_ms),
        ("polling.interval_ms", config.polling.interval_ms),
        (
            "polling.min_check_interval_ms",
            config.polling.min_check_interval_ms,
        ),
    ];
    for (name, val) in durations {
        if *val == 0 {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: "must be > 0".into(),
            });
        }
    }

    let rosters: &[(&str, &RosterConfig)] = &[
        ("rosters.lobby", &config.rosters.lobby),
        ("rosters.champ_select", &config.rosters.champ_select),
        ("rosters.pre_game", &config.rosters.pre_game),
    ];
    for (name, roster) in rosters {
        if roster.slots == 0 {
            return Err(ConfigError::ValidationError {
                field: format!("{name}.slots"),
                message: "must be > 0".into(),
            });
        }
        if roster.page.as_deref().is_some_and(|p| p.trim().is_empty()) {
            return Err(ConfigError::ValidationError {
                field: format!("{name}.page"),
                message: "must not be empty".into(),
            });
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const VALID: &str = r#"
[client]
base_url = "https://127.0.0.1:2999"
request_timeout_ms = 3000
accept_invalid_certs = true

[connection]
ttl_ms = 5000

[polling]
interval_ms = 10000
min_check_interval_ms = 4000

[rosters.lobby]
page = "lobby"
slots = 5

[rosters.champ_select]
page = "champ-select"
slots = 5
match_history = true

[rosters.pre_game]
page = "pre-game"
slots = 10
"#;

    /// Locate the workspace root holding `defaults/` (tests run from the
    /// crate directory).
    fn project_root() -> PathBuf {
        let cwd = std::env::current_dir().unwrap();
        for candidate in [cwd.clone(), cwd.join("../.."), cwd.join("..")] {
            if candidate.join("defaults/rostersync.toml").exists() {
                return candidate;
            }
        }
        panic!("Cannot locate defaults/ directory from CWD {:?}", cwd);
    }

    /// Fresh temp dir with `config/rostersync.toml` set to `main`.
    fn scratch(name: &str, main: &str) -> PathBuf {
        let tmp = std::env::temp_dir().join(name);
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("config")).unwrap();
        fs::write(tmp.join("config/rostersync.toml"), main).unwrap();
        tmp
    }

    fn expect_validation_error(name: &str, main: &str, field: &str) {
        let tmp = scratch(name, main);
        let err = load_config_from(&tmp).unwrap_err();
        match &err {
            ConfigError::ValidationError { field: f, .. } => assert_eq!(f, field),
            other => panic!("expected ValidationError, got: {other}"),
        }
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn load_valid_config_from_project_defaults() {
        let root = project_root();
        let tmp = scratch(
            "rostersync_config_defaults",
            &fs::read_to_string(root.join("defaults/rostersync.toml")).unwrap(),
        );

        let config = load_config_from(&tmp).expect("defaults should be valid");
        assert_eq!(config.connection.ttl(), Duration::from_millis(5000));
        assert_eq!(config.polling.min_check_interval_ms, 4000);
        assert_eq!(config.rosters.lobby.page.as_deref(), Some("lobby"));
        assert_eq!(config.rosters.pre_game.slots, 10);
        assert!(config.rosters.champ_select.match_history);

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn settings_are_derived_from_config() {
        let tmp = scratch("rostersync_config_settings", VALID);
        let config = load_config_from(&tmp).unwrap();

        let monitor = config.monitor_settings(&config.rosters.champ_select);
        assert_eq!(monitor.tracked_page, Some(PageId::from("champ-select")));
        assert_eq!(monitor.poll_interval, Duration::from_secs(10));
        assert_eq!(monitor.min_check_interval, Duration::from_secs(4));

        let engine = config.engine_settings(&config.rosters.champ_select);
        assert!(engine.plan.match_history);
        assert_eq!(engine.fetch_timeout, Duration::from_secs(3));

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn omitted_sections_take_defaults() {
        let main = VALID
            .replace("[connection]\nttl_ms = 5000\n", "")
            .replace("min_check_interval_ms = 4000\n", "");
        let tmp = scratch("rostersync_config_omitted", &main);

        let config = load_config_from(&tmp).unwrap();
        assert_eq!(config.connection.ttl_ms, 5000);
        assert_eq!(config.polling.min_check_interval_ms, 4000);

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_page_loads_but_yields_no_tracked_page() {
        let main = VALID.replace("page = \"pre-game\"\n", "");
        let tmp = scratch("rostersync_config_no_page", &main);

        let config = load_config_from(&tmp).unwrap();
        assert!(config.rosters.pre_game.page.is_none());
        assert!(config
            .monitor_settings(&config.rosters.pre_game)
            .tracked_page
            .is_none());

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_credentials_toml_is_ok() {
        let tmp = scratch("rostersync_config_no_creds", VALID);
        let config = load_config_from(&tmp).expect("should load without credentials.toml");
        assert!(config.credentials.auth_token.is_none());
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn credentials_toml_with_token() {
        let tmp = scratch("rostersync_config_with_creds", VALID);
        fs::write(
            tmp.join("config/credentials.toml"),
            "auth_token = \"abc123\"\n",
        )
        .unwrap();

        let config = load_config_from(&tmp).expect("should load with credentials.toml");
        assert_eq!(config.credentials.auth_token.as_deref(), Some("abc123"));

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_base_url_without_scheme() {
        expect_validation_error(
            "rostersync_config_bad_url",
            &VALID.replace("https://127.0.0.1:2999", "127.0.0.1:2999"),
            "client.base_url",
        );
    }

    #[test]
    fn rejects_zero_poll_interval() {
        expect_validation_error(
            "rostersync_config_zero_interval",
            &VALID.replace("interval_ms = 10000", "interval_ms = 0"),
            "polling.interval_ms",
        );
    }

    #[test]
    fn rejects_zero_ttl() {
        expect_validation_error(
            "rostersync_config_zero_ttl",
            &VALID.replace("ttl_ms = 5000", "ttl_ms = 0"),
            "connection.ttl_ms",
        );
    }

    #[test]
    fn rejects_zero_slots() {
        expect_validation_error(
            "rostersync_config_zero_slots",
            &VALID.replace("slots = 10", "slots = 0"),
            "rosters.pre_game.slots",
        );
    }

    #[test]
    fn rejects_blank_page() {
        expect_validation_error(
            "rostersync_config_blank_page",
            &VALID.replace("page = \"lobby\"", "page = \"  \""),
            "rosters.lobby.page",
        );
    }

    #[test]
    fn file_not_found_for_missing_main_file() {
        let tmp = std::env::temp_dir().join("rostersync_config_missing");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("config")).unwrap();

        let err = load_config_from(&tmp).unwrap_err();
        match &err {
            ConfigError::FileNotFound { path } => assert!(path.ends_with("rostersync.toml")),
            other => panic!("expected FileNotFound, got: {other}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn parse_error_for_invalid_toml() {
        let tmp = scratch("rostersync_config_invalid", "[client\nbase_url = ");
        let err = load_config_from(&tmp).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_files_seeds_main_file_only() {
        let tmp = std::env::temp_dir().join("rostersync_config_ensure_copies");
        let _ = fs::remove_dir_all(&tmp);
        let defaults_dir = tmp.join("defaults");
        fs::create_dir_all(&defaults_dir).unwrap();
        fs::write(defaults_dir.join("rostersync.toml"), VALID).unwrap();
        fs::write(
            defaults_dir.join("credentials.toml.example"),
            "auth_token = \"...\"\n",
        )
        .unwrap();

        assert!(!tmp.join("config").exists());
        let seeded = ensure_config_files(&tmp).expect("should succeed");

        assert_eq!(seeded, Some(tmp.join("config/rostersync.toml")));
        assert!(tmp.join("config/rostersync.toml").exists());
        assert!(!tmp.join("config/credentials.toml.example").exists());
        assert!(!tmp.join("config/credentials.toml").exists());
        load_config_from(&tmp).expect("copied defaults load");

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_files_skips_existing() {
        let tmp = std::env::temp_dir().join("rostersync_config_ensure_skips");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("defaults")).unwrap();
        fs::create_dir_all(tmp.join("config")).unwrap();
        fs::write(tmp.join("defaults/rostersync.toml"), VALID).unwrap();
        fs::write(tmp.join("config/rostersync.toml"), "# custom\n").unwrap();

        let seeded = ensure_config_files(&tmp).expect("should succeed");
        assert_eq!(seeded, None);
        let content = fs::read_to_string(tmp.join("config/rostersync.toml")).unwrap();
        assert_eq!(content, "# custom\n");

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_files_needs_no_defaults_once_configured() {
        let tmp = std::env::temp_dir().join("rostersync_config_no_defaults");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("config")).unwrap();
        fs::write(tmp.join("config/rostersync.toml"), VALID).unwrap();

        assert_eq!(ensure_config_files(&tmp).expect("should succeed"), None);

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_files_errors_without_defaults() {
        let tmp = std::env::temp_dir().join("rostersync_config_both_missing");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();

        let err = ensure_config_files(&tmp).unwrap_err();
        match &err {
            ConfigError::DefaultsCopyError { message } => {
                assert!(message.contains("no "));
                assert!(message.contains("defaults"));
            }
            other => panic!("expected DefaultsCopyError, got: {other}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }
}
