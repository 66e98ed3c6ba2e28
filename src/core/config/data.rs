use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Contents of `config.toml`. Every field is optional; unset fields fall
/// back to the defaults in [`super::defaults`].
#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    /// HTTP(S) base address of the analysis service.
    pub base_url: Option<String>,
    pub debounce_ms: Option<u64>,
    pub fallback_ms: Option<u64>,
    pub reconnect_ms: Option<u64>,
    /// Unset means retry forever.
    pub max_reconnect_attempts: Option<u32>,
}

pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
