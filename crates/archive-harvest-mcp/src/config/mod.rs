//! Config file resolution and loading.

use std::path::{Path, PathBuf};

use archive_harvest::HarvestConfig;

use crate::types::{McpError, McpResult};

pub const CONFIG_ENV: &str = "ARCHIVE_HARVEST_CONFIG";
const CONFIG_DIR: &str = ".archive-harvest";
const CONFIG_FILE: &str = "config.toml";

/// Explicit path, then `ARCHIVE_HARVEST_CONFIG`, then `./.archive-harvest/config.toml`,
/// then `~/.archive-harvest/config.toml`. `None` means built-in defaults.
pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
    resolve_with(explicit, std::env::var(CONFIG_ENV).ok(), dirs::home_dir())
}

fn resolve_with(explicit: Option<&str>, env: Option<String>, home: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(PathBuf::from(path));
    }
    if let Some(path) = env.filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }

    let local = Path::new(CONFIG_DIR).join(CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }

    home.map(|h| h.join(CONFIG_DIR).join(CONFIG_FILE))
        .filter(|p| p.exists())
}

/// Load the resolved config file and apply environment overrides.
/// An explicitly named file that does not exist is an error.
pub fn load_config(explicit: Option<&str>) -> McpResult<HarvestConfig> {
    let mut config = match resolve_config_path(explicit) {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading config");
            let text = std::fs::read_to_string(&path)
                .map_err(|e| McpError::Config(format!("{}: {e}", path.display())))?;
            parse_config(&text)?
        }
        None => {
            tracing::debug!("no config file found, using defaults");
            HarvestConfig::default()
        }
    };
    config.apply_env();
    Ok(config)
}

pub fn parse_config(text: &str) -> McpResult<HarvestConfig> {
    toml::from_str(text).map_err(|e| McpError::Config(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_partial_toml() {
        let cfg = parse_config(
            r#"
            [portal]
            domain = "example.go.kr"

            [bulk]
            max_wait_ms = 30000

            [download]
            directory = "/data/harvest"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.portal.domain, "example.go.kr");
        assert_eq!(cfg.bulk.max_wait_ms, 30_000);
        assert_eq!(cfg.download.directory, PathBuf::from("/data/harvest"));
        assert_eq!(cfg.alternate.webdriver_url, HarvestConfig::default().alternate.webdriver_url);
    }

    #[test]
    fn test_parse_rejects_bad_types() {
        let err = parse_config("[bulk]\nmax_wait_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, McpError::Config(_)));
    }

    #[test]
    fn test_resolution_order() {
        let home = tempfile::tempdir().unwrap();
        assert_eq!(
            resolve_with(Some("/etc/a.toml"), Some("/etc/b.toml".into()), None),
            Some(PathBuf::from("/etc/a.toml"))
        );
        assert_eq!(
            resolve_with(None, Some("/etc/b.toml".into()), None),
            Some(PathBuf::from("/etc/b.toml"))
        );
        assert_eq!(resolve_with(None, None, Some(home.path().to_path_buf())), None);

        let dir = home.path().join(CONFIG_DIR);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(CONFIG_FILE), "").unwrap();
        assert_eq!(
            resolve_with(None, Some(String::new()), Some(home.path().to_path_buf())),
            Some(dir.join(CONFIG_FILE))
        );
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let err = load_config(Some("/nonexistent/archive-harvest.toml")).unwrap_err();
        assert!(err.to_string().contains("archive-harvest.toml"));
    }
}
