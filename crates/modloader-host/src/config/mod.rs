//! Configuration loading and resolution.

use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "MODLOADER_CONFIG";
pub const ASSETS_ENV: &str = "MODLOADER_ASSETS";

const LOCAL_CONFIG: &str = ".modloader/config.json";

/// Resolved on-disk locations for one host session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPaths {
    pub config: PathBuf,
    pub assets: PathBuf,
    pub patches: PathBuf,
}

impl HostPaths {
    pub fn resolve(config: Option<&str>, assets: Option<&str>, patches: Option<&str>) -> Self {
        let config = resolve_config_path(config);
        let assets = resolve_assets_dir(assets, &config);
        let patches = resolve_patches_dir(patches, &config);
        Self {
            config,
            assets,
            patches,
        }
    }
}

/// Resolve the config file: flag, then env, then `./.modloader`, then the home directory.
pub fn resolve_config_path(explicit: Option<&str>) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        return PathBuf::from(env_path);
    }

    let cwd_config = PathBuf::from(LOCAL_CONFIG);
    if cwd_config.exists() {
        return cwd_config;
    }

    resolve_default_config_path()
}

fn resolve_default_config_path() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());

    PathBuf::from(home).join(LOCAL_CONFIG)
}

fn config_dir(config: &Path) -> PathBuf {
    config
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn resolve_assets_dir(explicit: Option<&str>, config: &Path) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }

    if let Ok(env_path) = std::env::var(ASSETS_ENV) {
        return PathBuf::from(env_path);
    }

    config_dir(config).join("assets")
}

pub fn resolve_patches_dir(explicit: Option<&str>, config: &Path) -> PathBuf {
    match explicit {
        Some(path) => PathBuf::from(path),
        None => config_dir(config).join("patches"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_paths_win() {
        let paths = HostPaths::resolve(
            Some("/etc/ml/config.json"),
            Some("/srv/assets"),
            Some("/srv/patches"),
        );
        assert_eq!(
            paths,
            HostPaths {
                config: PathBuf::from("/etc/ml/config.json"),
                assets: PathBuf::from("/srv/assets"),
                patches: PathBuf::from("/srv/patches"),
            }
        );
    }

    #[test]
    fn test_patches_default_next_to_config() {
        let dir = resolve_patches_dir(None, Path::new("/etc/ml/config.json"));
        assert_eq!(dir, PathBuf::from("/etc/ml/patches"));
    }

    #[test]
    fn test_bare_config_name_uses_current_dir() {
        assert_eq!(
            resolve_patches_dir(None, Path::new("config.json")),
            PathBuf::from("patches")
        );
    }
}
