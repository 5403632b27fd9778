//! Settings parser for .rexec/config.toml

use std::path::Path;

use rexec_core::prelude::*;

use super::types::Settings;

const CONFIG_FILENAME: &str = "config.toml";
const REXEC_DIR: &str = ".rexec";

/// Overrides `auth.access_token`
pub const ACCESS_TOKEN_ENV: &str = "REXEC_ACCESS_TOKEN";

/// Overrides `auth.refresh_token`
pub const REFRESH_TOKEN_ENV: &str = "REXEC_REFRESH_TOKEN";

/// Load settings from `.rexec/config.toml` under `project_path`, then apply
/// environment overrides.
///
/// A missing or unreadable file is not an error: defaults are used and a
/// warning is logged.
pub fn load_settings(project_path: &Path) -> Settings {
    let config_path = project_path.join(REXEC_DIR).join(CONFIG_FILENAME);

    let settings = if !config_path.exists() {
        debug!("No config file at {:?}, using defaults", config_path);
        Settings::default()
    } else {
        match std::fs::read_to_string(&config_path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(settings) => {
                    debug!("Loaded settings from {:?}", config_path);
                    settings
                }
                Err(e) => {
                    warn!("Failed to parse {:?}: {}", config_path, e);
                    Settings::default()
                }
            },
            Err(e) => {
                warn!("Failed to read {:?}: {}", config_path, e);
                Settings::default()
            }
        }
    };

    apply_env_overrides(settings)
}

/// Replace file tokens with `REXEC_ACCESS_TOKEN` / `REXEC_REFRESH_TOKEN`
/// when those are set and non-empty.
pub fn apply_env_overrides(mut settings: Settings) -> Settings {
    if let Some(token) = env_token(ACCESS_TOKEN_ENV) {
        debug!("Using access token from {}", ACCESS_TOKEN_ENV);
        settings.auth.access_token = Some(token);
    }
    if let Some(token) = env_token(REFRESH_TOKEN_ENV) {
        debug!("Using refresh token from {}", REFRESH_TOKEN_ENV);
        settings.auth.refresh_token = Some(token);
    }
    settings
}

fn env_token(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Create a commented default config in `.rexec/` if none exists
pub fn init_config_dir(project_path: &Path) -> Result<()> {
    let rexec_dir = project_path.join(REXEC_DIR);

    if !rexec_dir.exists() {
        std::fs::create_dir_all(&rexec_dir)
            .with_context(|| format!("Failed to create {}", rexec_dir.display()))?;
    }

    let config_path = rexec_dir.join(CONFIG_FILENAME);
    if !config_path.exists() {
        let default_content = r#"# Remote Exec Configuration

[directory]
base_url = "http://localhost:3000/v2"

[auth]
# Prefer REXEC_ACCESS_TOKEN / REXEC_REFRESH_TOKEN over storing tokens here
# access_token = ""
# refresh_token = ""

[session]
# connect_timeout_ms = 10000   # Unset = wait for the device indefinitely
event_buffer = 256
default_workspace = "playground"
max_console_lines = 1000
"#;
        std::fs::write(&config_path, default_content).context("Failed to write config.toml")?;
        info!("Created default config at {:?}", config_path);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rexec_core::WorkspaceLocation;
    use serial_test::serial;
    use tempfile::tempdir;

    fn clear_env() {
        std::env::remove_var(ACCESS_TOKEN_ENV);
        std::env::remove_var(REFRESH_TOKEN_ENV);
    }

    #[test]
    #[serial]
    fn test_load_settings_defaults() {
        clear_env();
        let temp = tempdir().unwrap();
        let settings = load_settings(temp.path());
        assert_eq!(settings, Settings::default());
    }

    #[test]
    #[serial]
    fn test_load_settings_custom() {
        clear_env();
        let temp = tempdir().unwrap();
        let rexec_dir = temp.path().join(".rexec");
        std::fs::create_dir_all(&rexec_dir).unwrap();

        let config = r#"
[directory]
base_url = "https://api.example.org/v2"

[auth]
access_token = "file-token"

[session]
connect_timeout_ms = 5000
default_workspace = "grading"
"#;
        std::fs::write(rexec_dir.join("config.toml"), config).unwrap();

        let settings = load_settings(temp.path());
        assert_eq!(settings.directory.base_url, "https://api.example.org/v2");
        assert_eq!(settings.auth.access_token.as_deref(), Some("file-token"));
        assert_eq!(settings.session.connect_timeout_ms, Some(5000));
        assert_eq!(settings.session.default_workspace, WorkspaceLocation::Grading);
    }

    #[test]
    #[serial]
    fn test_load_settings_invalid_toml() {
        clear_env();
        let temp = tempdir().unwrap();
        let rexec_dir = temp.path().join(".rexec");
        std::fs::create_dir_all(&rexec_dir).unwrap();
        std::fs::write(rexec_dir.join("config.toml"), "[session\nbroken = ").unwrap();

        let settings = load_settings(temp.path());
        assert_eq!(settings, Settings::default());
    }

    #[test]
    #[serial]
    fn test_env_overrides_file_tokens() {
        clear_env();
        let temp = tempdir().unwrap();
        let rexec_dir = temp.path().join(".rexec");
        std::fs::create_dir_all(&rexec_dir).unwrap();
        std::fs::write(
            rexec_dir.join("config.toml"),
            "[auth]\naccess_token = \"file-token\"\nrefresh_token = \"file-refresh\"\n",
        )
        .unwrap();

        std::env::set_var(ACCESS_TOKEN_ENV, "env-token");
        let settings = load_settings(temp.path());
        clear_env();

        assert_eq!(settings.auth.access_token.as_deref(), Some("env-token"));
        assert_eq!(settings.auth.refresh_token.as_deref(), Some("file-refresh"));
    }

    #[test]
    #[serial]
    fn test_blank_env_token_is_ignored() {
        clear_env();
        std::env::set_var(REFRESH_TOKEN_ENV, "   ");
        let settings = apply_env_overrides(Settings::default());
        clear_env();
        assert_eq!(settings.auth.refresh_token, None);
    }

    #[test]
    #[serial]
    fn test_init_config_dir_writes_parseable_defaults() {
        clear_env();
        let temp = tempdir().unwrap();
        init_config_dir(temp.path()).unwrap();

        let path = temp.path().join(".rexec").join("config.toml");
        assert!(path.exists());
        assert_eq!(load_settings(temp.path()), Settings::default());
    }

    #[test]
    fn test_init_config_dir_reports_io_failure() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join(".rexec"), "not a directory").unwrap();

        let err = init_config_dir(temp.path()).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_init_config_dir_keeps_existing_file() {
        let temp = tempdir().unwrap();
        let rexec_dir = temp.path().join(".rexec");
        std::fs::create_dir_all(&rexec_dir).unwrap();
        std::fs::write(rexec_dir.join("config.toml"), "# mine\n").unwrap();

        init_config_dir(temp.path()).unwrap();
        let content = std::fs::read_to_string(rexec_dir.join("config.toml")).unwrap();
        assert_eq!(content, "# mine\n");
    }
}
