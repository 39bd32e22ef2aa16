//! Configuration loading shared by every component in the core.
//!
//! Each component owns its own `*Config` struct (registry poll interval, catalog refresh
//! back-off, coordinator fan-out deadline, ...). What they share is the loading mechanism:
//! try a JSON file, and if it is absent, persist and return `Default::default()`. No
//! configuration-file grammar is parsed here, only a minimal, real way to obtain a config
//! value that a deployment can override by dropping a file next to the process.

use std::fmt::Debug;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

/// Load `T` from `path` as JSON, or construct and persist `T::default()` if the file is
/// absent. A malformed file is a hard error: masking a configuration typo as "just use
/// defaults" has caused real incidents, so only "file does not exist" falls back silently.
pub async fn load_or_default<T>(path: impl AsRef<Path>) -> anyhow::Result<T>
where
    T: Serialize + DeserializeOwned + Default + Debug,
{
    let path = path.as_ref();
    match tokio::fs::read_to_string(path).await {
        Ok(content) => {
            let parsed: T = serde_json::from_str(&content)
                .map_err(|e| anyhow::anyhow!("failed to parse config at {}: {}", path.display(), e))?;
            debug!(path = %path.display(), "loaded configuration");
            Ok(parsed)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let default = T::default();
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await.ok();
                }
            }
            let serialized = serde_json::to_string_pretty(&default)?;
            if let Err(write_err) = tokio::fs::write(path, serialized).await {
                warn!(path = %path.display(), error = %write_err, "could not persist default configuration");
            }
            debug!(path = %path.display(), ?default, "no configuration file found, using defaults");
            Ok(default)
        }
        Err(e) => Err(anyhow::anyhow!("failed to read config at {}: {}", path.display(), e)),
    }
}
