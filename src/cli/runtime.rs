use std::env;
use std::fs as stdfs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use webagent_kernel::Config;

use super::env::LogFormat;

const LOCAL_ENV_PATH: &str = "config/local.env";

/// Seed unset environment variables from `config/local.env`.
pub fn load_local_env_overrides() {
    let path = Path::new(LOCAL_ENV_PATH);
    if !path.exists() {
        return;
    }

    match stdfs::read_to_string(path) {
        Ok(contents) => {
            let applied = apply_env_lines(&contents);
            info!(path = %path.display(), applied, "Loaded environment overrides from local.env");
        }
        Err(err) => {
            warn!(path = %path.display(), ?err, "failed to read local.env overrides");
        }
    }
}

fn apply_env_lines(contents: &str) -> usize {
    let mut applied = 0;
    for (idx, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            warn!(line = idx + 1, "invalid local.env entry; skipping");
            continue;
        };
        let key = key.trim();
        if key.is_empty() || env::var(key).is_ok() {
            continue;
        }
        env::set_var(key, unescape_value(value.trim()));
        applied += 1;
    }
    applied
}

pub fn init_logging(
    level: &str,
    debug: bool,
    format: LogFormat,
    log_dir: Option<&Path>,
) -> Result<Option<WorkerGuard>> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string()));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            stdfs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "webagent.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);

    // Logs go to stderr so command output on stdout stays machine readable.
    match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }

    Ok(guard)
}

pub struct LoadedConfig {
    pub config: Config,
    pub path: PathBuf,
    pub from_file: bool,
}

pub async fn load_config(config_path: Option<&PathBuf>) -> Result<LoadedConfig> {
    let config_path = match config_path {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };

    let (mut config, from_file) = if config_path.exists() {
        let content = fs::read_to_string(&config_path)
            .await
            .with_context(|| format!("Failed to read config file {}", config_path.display()))?;
        let config = Config::from_yaml(&content).context("Failed to parse config file")?;
        info!("Loaded configuration from: {}", config_path.display());
        (config, true)
    } else {
        warn!(
            "Config file not found, using defaults: {}",
            config_path.display()
        );
        (Config::default(), false)
    };

    config.apply_env_overrides();
    Ok(LoadedConfig {
        config,
        path: config_path,
        from_file,
    })
}

fn default_config_path() -> Result<PathBuf> {
    // Priority: ./config/webagent.yaml > ~/.config/webagent/webagent.yaml
    let local_config = PathBuf::from("config/webagent.yaml");
    if local_config.exists() {
        return Ok(local_config);
    }
    let mut path = dirs::config_dir().context("Failed to get config directory")?;
    path.push("webagent");
    path.push("webagent.yaml");
    Ok(path)
}

fn unescape_value(value: &str) -> String {
    if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
        let inner = &value[1..value.len() - 1];
        inner
            .replace("\\\"", "\"")
            .replace("\\n", "\n")
            .replace("\\r", "\r")
            .replace("\\t", "\t")
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn unescape_strips_quotes_and_escapes() {
        assert_eq!(unescape_value("\"a\\tb\""), "a\tb");
        assert_eq!(unescape_value("plain"), "plain");
        assert_eq!(unescape_value("\""), "\"");
    }

    #[test]
    #[serial]
    fn env_lines_do_not_override_existing_values() {
        env::set_var("WEBAGENT_TEST_PRESET", "kept");
        env::remove_var("WEBAGENT_TEST_FRESH");
        let applied = apply_env_lines(
            "# comment\nWEBAGENT_TEST_PRESET=replaced\nexport WEBAGENT_TEST_FRESH=\"x\"\nbroken line\n",
        );
        assert_eq!(applied, 1);
        assert_eq!(env::var("WEBAGENT_TEST_PRESET").as_deref(), Ok("kept"));
        assert_eq!(env::var("WEBAGENT_TEST_FRESH").as_deref(), Ok("x"));
        env::remove_var("WEBAGENT_TEST_PRESET");
        env::remove_var("WEBAGENT_TEST_FRESH");
    }

    #[tokio::test]
    #[serial]
    async fn missing_explicit_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("absent.yaml");
        let loaded = load_config(Some(&path)).await.expect("load");
        assert!(!loaded.from_file);
        assert_eq!(loaded.path, path);
        assert_eq!(loaded.config.llm.model, Config::default().llm.model);
    }

    #[tokio::test]
    #[serial]
    async fn explicit_config_file_is_parsed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("webagent.yaml");
        std::fs::write(&path, "server:\n  port: 9123\nagent:\n  max_steps: 7\n").expect("write");
        env::remove_var("WEBAGENT_PORT");
        let loaded = load_config(Some(&path)).await.expect("load");
        assert!(loaded.from_file);
        assert_eq!(loaded.config.server.port, 9123);
        assert_eq!(loaded.config.agent.max_steps, 7);
    }
}
