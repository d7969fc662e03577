use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = "config.yaml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub local_address: String,
    pub remote_address: String,
    pub token_identifier: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            local_address: "0.0.0.0:19132".to_string(),
            remote_address: String::new(),
            token_identifier: "default".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
struct FileConfig {
    connection: ConnectionConfig,
}

#[derive(Debug)]
pub struct AppConfig {
    pub root: PathBuf,
    pub connection: ConnectionConfig,
}

impl AppConfig {
    /// Loads `<root>/config.yaml`, creating it with defaults when
    /// missing. The defaulted file is written back so every key is
    /// visible to the operator. Environment variables override the
    /// file.
    pub fn load(args: &[String]) -> Result<Self, String> {
        let root = args
            .get(1)
            .map(|arg| Path::new(arg).to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        let path = root.join(CONFIG_FILE_NAME);
        let mut file = if path.exists() {
            let data = fs::read_to_string(&path)
                .map_err(|err| format!("config read failed for {}: {}", path.display(), err))?;
            serde_yaml::from_str::<FileConfig>(&data)
                .map_err(|err| format!("config parse failed for {}: {}", path.display(), err))?
        } else {
            FileConfig::default()
        };
        write_config(&path, &file)?;

        if let Some(value) = env_override("SKINRELAY_LOCAL_ADDR") {
            file.connection.local_address = value;
        }
        if let Some(value) = env_override("SKINRELAY_REMOTE_ADDR") {
            file.connection.remote_address = value;
        }
        if let Some(value) = env_override("SKINRELAY_TOKEN_ID") {
            file.connection.token_identifier = value;
        }

        Ok(Self {
            root,
            connection: file.connection,
        })
    }
}

fn write_config(path: &Path, file: &FileConfig) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|err| {
                format!("config dir create failed for {}: {}", parent.display(), err)
            })?;
        }
    }
    let data = serde_yaml::to_string(file)
        .map_err(|err| format!("config encode failed: {}", err))?;
    fs::write(path, data)
        .map_err(|err| format!("config write failed for {}: {}", path.display(), err))
}

fn env_override(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
