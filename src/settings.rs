use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::SettingsError;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 4799;

const SETTINGS_VERSION: u32 = 1;

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 0))
}

fn default_api_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3579))
}

/// Where datagrams go and where the local sockets live.
/// Stored as `settings.json` in the app config directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OscSettings {
    pub version: u32,
    pub host: String,
    pub port: u16,
    /// Local address of the outbound UDP socket.
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,
    /// Listen address of `polynodes-server`.
    #[serde(default = "default_api_address")]
    pub api_address: SocketAddr,
}

impl Default for OscSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            bind_address: default_bind_address(),
            api_address: default_api_address(),
        }
    }
}

impl OscSettings {
    pub const KEYS: [&'static str; 4] = ["host", "port", "bind_address", "api_address"];

    /// Resolve `host:port` to the first matching socket address.
    pub async fn destination(&self) -> Result<SocketAddr, SettingsError> {
        let unresolvable = || SettingsError::Unresolvable {
            host: self.host.clone(),
            port: self.port,
        };
        let mut addrs = tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|_| unresolvable())?;
        addrs.next().ok_or_else(unresolvable)
    }

    /// Update one field from its textual form, as `config set` does.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        let invalid = |message: String| SettingsError::InvalidValue {
            key: key.to_string(),
            message,
        };
        match key {
            "host" => {
                let host = value.trim();
                if host.is_empty() {
                    return Err(invalid("host cannot be empty".to_string()));
                }
                self.host = host.to_string();
            }
            "port" => self.port = value.trim().parse().map_err(|e| invalid(format!("{e}")))?,
            "bind_address" => {
                self.bind_address = value.trim().parse().map_err(|e| invalid(format!("{e}")))?;
            }
            "api_address" => {
                self.api_address = value.trim().parse().map_err(|e| invalid(format!("{e}")))?;
            }
            _ => {
                return Err(invalid(format!(
                    "unknown key (expected one of {})",
                    Self::KEYS.join(", ")
                )))
            }
        }
        Ok(())
    }
}

/// Load settings from the app config directory. Returns None if no settings
/// file exists or it cannot be parsed.
pub fn load_settings(app_config_dir: &Path) -> Option<OscSettings> {
    let path = crate::paths::settings_path(app_config_dir);
    if !path.exists() {
        return None;
    }
    match read_json::<OscSettings>(&path) {
        Ok(settings) => Some(settings),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unreadable settings file");
            None
        }
    }
}

pub fn load_or_default(app_config_dir: &Path) -> OscSettings {
    load_settings(app_config_dir).unwrap_or_default()
}

/// Save settings to the app config directory.
pub fn save_settings(app_config_dir: &Path, settings: &OscSettings) -> Result<(), SettingsError> {
    fs::create_dir_all(app_config_dir)?;
    let json = serde_json::to_string_pretty(settings)?;
    atomic_write(&crate::paths::settings_path(app_config_dir), json.as_bytes())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, SettingsError> {
    let data = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

/// Write to a `.tmp` sibling, fsync, then rename over the target.
fn atomic_write(path: &Path, data: &[u8]) -> Result<(), SettingsError> {
    let mut tmp_name = OsString::from(path.file_name().unwrap_or_default());
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(&tmp_name);

    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp_path, path)?;
    Ok(())
}
