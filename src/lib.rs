mod crypto;
mod document;
mod error;
mod storage;
mod system;

pub use crate::crypto::{IV_LEN, KEY_LEN, PBKDF2_ITERATIONS, SALT_LEN, VERIFIER_LEN};
pub use crate::document::{decrypt_document, encrypt_document, split_front_matter};
pub use crate::error::{CryptoError, MalformedInput};
pub use crate::storage::{FileStorage, MemoryStorage, Storage};
pub use crate::system::{
    CryptoSystem, StorableCryptoSystem, decrypt_with_password, encrypt_with_password,
    setup_system,
};
use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File name of the key file inside the data directory.
pub const KEYFILE_NAME: &str = "crypto.json";

/// A key file plus the storage it lives in.
///
/// Every operation reloads the key file, so a `Krypton` never holds key
/// material between calls.
pub struct Krypton<S: Storage> {
    storage: S,
    path: PathBuf,
}

impl<S: Storage> Krypton<S> {
    pub fn new(storage: S, path: impl Into<PathBuf>) -> Self {
        Self {
            storage,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.storage.exists(&self.path)
    }

    /// Creates the key file. Never overwrites an existing one; use
    /// [`Krypton::change_password`] for that.
    pub fn init(&self, password: &str) -> Result<StorableCryptoSystem> {
        if self.exists() {
            bail!("key file already exists at {}", self.path.display());
        }

        let system = setup_system(password)?;
        self.storage
            .save(&self.path, &to_json(&system)?)
            .context("could not write key file")?;

        info!(path = %self.path.display(), "key file created");
        Ok(system)
    }

    /// Reads and parses the key file.
    pub fn load(&self) -> Result<StorableCryptoSystem> {
        if !self.exists() {
            bail!(
                "no key file at {}; run `krypton init` to choose a password",
                self.path.display()
            );
        }

        let data = self.storage.load(&self.path)?;
        debug!(path = %self.path.display(), bytes = data.len(), "key file loaded");

        serde_json::from_slice(&data).context("key file is not a valid crypto system")
    }

    pub fn encrypt(&self, text: &str, password: &str, include_front_matter: bool) -> Result<String> {
        let system = self.load()?;
        Ok(encrypt_document(text, password, &system, include_front_matter)?)
    }

    pub fn decrypt(&self, text: &str, password: &str, include_front_matter: bool) -> Result<String> {
        let system = self.load()?;
        Ok(decrypt_document(text, password, &system, include_front_matter)?)
    }

    /// Replaces the key file with a brand-new crypto system.
    ///
    /// Anything encrypted under the old system is unrecoverable afterwards.
    /// The new system is first written to a staging file next to the key
    /// file; the key file is only replaced once that write succeeded.
    pub fn change_password(&self, new_password: &str) -> Result<StorableCryptoSystem> {
        if !self.exists() {
            bail!("no key file at {}; nothing to change", self.path.display());
        }

        let system = setup_system(new_password)?;
        let json = to_json(&system)?;
        let staging = self.staging_path()?;

        if let Err(e) = self.storage.save(&staging, &json) {
            if self.storage.exists(&staging) {
                let _ = self.storage.remove(&staging);
            }
            return Err(e.context("could not write new key file; password not changed"));
        }
        debug!(staging = %staging.display(), "new key file staged");

        self.storage.save(&self.path, &json).with_context(|| {
            format!(
                "could not replace key file; the new keys are in {}",
                staging.display()
            )
        })?;

        if let Err(e) = self.storage.remove(&staging) {
            warn!(staging = %staging.display(), error = %e, "could not remove staged key file");
        }

        info!(path = %self.path.display(), "password changed");
        Ok(system)
    }

    /// `crypto.json` stages as `crypto-new.json`.
    fn staging_path(&self) -> Result<PathBuf> {
        let stem = self
            .path
            .file_stem()
            .with_context(|| format!("{} has no file name", self.path.display()))?
            .to_string_lossy();

        let name = match self.path.extension() {
            Some(ext) => format!("{stem}-new.{}", ext.to_string_lossy()),
            None => format!("{stem}-new"),
        };
        Ok(self.path.with_file_name(name))
    }
}

fn to_json(system: &StorableCryptoSystem) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(system).context("failed to serialize crypto system")
}

pub fn default_keyfile_path() -> Result<PathBuf> {
    let project_dirs =
        ProjectDirs::from("", "", "krypton").context("could not determine platform directories")?;

    Ok(project_dirs.data_dir().join(KEYFILE_NAME))
}
