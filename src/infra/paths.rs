// src/infra/paths.rs — Path management
//
// All paths respect the VENDORA_HOME environment variable for isolation.
// When VENDORA_HOME is set, all config and data live under that directory.
// When unset, config uses ~/.vendora/ and data uses the platform data dir.

use directories::ProjectDirs;
use std::path::PathBuf;

fn project_dirs() -> ProjectDirs {
    ProjectDirs::from("", "", "vendora").expect("Could not determine home directory")
}

/// Returns the VENDORA_HOME override, if set.
fn vendora_home() -> Option<PathBuf> {
    std::env::var_os("VENDORA_HOME").map(PathBuf::from)
}

/// Configuration directory: $VENDORA_HOME/ or ~/.vendora/
pub fn config_dir() -> PathBuf {
    if let Some(home) = vendora_home() {
        return home;
    }
    dirs_home().join(".vendora")
}

/// Data directory: $VENDORA_HOME/data/ or the platform-local data dir.
pub fn data_dir() -> PathBuf {
    if let Some(home) = vendora_home() {
        return home.join("data");
    }
    project_dirs().data_local_dir().to_path_buf()
}

/// Home directory
pub fn dirs_home() -> PathBuf {
    directories::BaseDirs::new()
        .expect("Could not determine home directory")
        .home_dir()
        .to_path_buf()
}

/// Config file path
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Persisted session (token + profile) path
pub fn session_file_path() -> PathBuf {
    config_dir().join("session.json")
}

/// Where fetched report files land (the terminal analogue of a browser
/// download).
pub fn downloads_dir() -> PathBuf {
    data_dir().join("downloads")
}

/// Ensure all required directories exist
pub async fn ensure_dirs() -> anyhow::Result<()> {
    let dirs = [config_dir(), data_dir(), downloads_dir()];

    for dir in &dirs {
        tokio::fs::create_dir_all(dir).await?;
    }

    Ok(())
}
