//! `auth_*` bootstrap stubs ("Supplemented features"). OAuth bootstrap
//! itself is out of scope for the core, but the control plane still needs
//! command surfaces that return the stable envelope, so this is a thin
//! file-backed token store the CLI owns directly rather than a core
//! domain concern.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    pub obtained_at_epoch: i64,
}

/// Delegation point for `auth_status`/`auth_clear`. A real OAuth bootstrap
/// would implement this against a browser-driven authorization-code flow;
/// tests and the CLI's default wiring use the file-backed form below.
pub trait TokenStore {
    fn read(&self) -> std::io::Result<Option<StoredToken>>;
    fn clear(&self) -> std::io::Result<()>;
}

pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("token.json"),
        }
    }
}

impl TokenStore for FileTokenStore {
    fn read(&self) -> std::io::Result<Option<StoredToken>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&self.path)?;
        let token: StoredToken = serde_json::from_str(&text)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
        Ok(Some(token))
    }

    fn clear(&self) -> std::io::Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}
