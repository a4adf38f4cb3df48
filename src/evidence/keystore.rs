//! Device identity persistence
//!
//! The key pair lives in two PEM files: PKCS#8 private key and
//! SubjectPublicKeyInfo public key. It is generated on first use and never
//! overwritten afterwards.

use super::signature::DeviceIdentity;
use crate::error::{HemlockError, HemlockResult};
use crate::logger::{LogLevel, LOGGER};
use p256::ecdsa::VerifyingKey;
use p256::pkcs8::DecodePublicKey;
use p256::PublicKey;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct KeyStore {
    private_key_path: PathBuf,
    public_key_path: PathBuf,
}

impl KeyStore {
    pub fn new(private_key_path: impl Into<PathBuf>, public_key_path: impl Into<PathBuf>) -> Self {
        Self {
            private_key_path: private_key_path.into(),
            public_key_path: public_key_path.into(),
        }
    }

    /// Store using `private_key.pem` / `public_key.pem` inside `dir`
    pub fn in_dir<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        Self::new(dir.join("private_key.pem"), dir.join("public_key.pem"))
    }

    pub fn private_key_path(&self) -> &Path {
        &self.private_key_path
    }

    pub fn public_key_path(&self) -> &Path {
        &self.public_key_path
    }

    pub fn has_identity(&self) -> bool {
        self.private_key_path.exists() && self.public_key_path.exists()
    }

    /// Load the device identity, generating it on first call.
    ///
    /// Existing key files are never replaced. A missing public key is
    /// re-derived from the private key; a public key without its private half
    /// is an error.
    pub fn ensure_identity(&self) -> HemlockResult<DeviceIdentity> {
        match (self.private_key_path.exists(), self.public_key_path.exists()) {
            (true, true) => self.load_identity(),
            (true, false) => {
                let identity = self.load_identity()?;
                LOGGER.log(
                    LogLevel::Warn,
                    &format!(
                        "Public key missing, re-deriving {}",
                        self.public_key_path.display()
                    ),
                    "keystore",
                );
                write_new(&self.public_key_path, identity.public_key_pem()?.as_bytes(), false)?;
                Ok(identity)
            }
            (false, true) => Err(HemlockError::KeyLoad(format!(
                "public key {} exists without its private key; refusing to overwrite it",
                self.public_key_path.display()
            ))),
            (false, false) => self.generate_identity(),
        }
    }

    fn generate_identity(&self) -> HemlockResult<DeviceIdentity> {
        LOGGER.log(LogLevel::Info, "Generating device identity keys", "keystore");

        let identity = DeviceIdentity::generate()?;
        write_new(&self.private_key_path, identity.to_pkcs8_pem()?.as_bytes(), true)?;
        write_new(&self.public_key_path, identity.public_key_pem()?.as_bytes(), false)?;

        LOGGER.log(
            LogLevel::Info,
            &format!("Device identity created (key id: {})", identity.key_id()),
            "keystore",
        );
        Ok(identity)
    }

    /// Load the existing key pair
    pub fn load_identity(&self) -> HemlockResult<DeviceIdentity> {
        let pem = read_key_file(&self.private_key_path)?;
        DeviceIdentity::from_pkcs8_pem(&pem)
    }

    /// PEM text of the device public key
    pub fn public_key_pem(&self) -> HemlockResult<String> {
        let pem = read_key_file(&self.public_key_path)?;
        // Parse before handing it out so callers never get a corrupt key
        parse_public_key_pem(&pem)?;
        Ok(pem)
    }

    pub fn device_verifying_key(&self) -> HemlockResult<VerifyingKey> {
        load_public_key(&self.public_key_path)
    }
}

/// Parse a SubjectPublicKeyInfo PEM file into a verifying key
pub fn load_public_key<P: AsRef<Path>>(path: P) -> HemlockResult<VerifyingKey> {
    let pem = read_key_file(path.as_ref())?;
    parse_public_key_pem(&pem)
}

/// Parse caller-supplied SubjectPublicKeyInfo PEM text
pub fn parse_public_key_pem(pem: &str) -> HemlockResult<VerifyingKey> {
    let public_key = PublicKey::from_public_key_pem(pem.trim())
        .map_err(|e| HemlockError::KeyLoad(format!("invalid public key PEM: {}", e)))?;
    Ok(VerifyingKey::from(&public_key))
}

fn read_key_file(path: &Path) -> HemlockResult<String> {
    fs::read_to_string(path).map_err(|e| {
        HemlockError::KeyLoad(format!("cannot read {}: {}", path.display(), e))
    })
}

/// Create `path` with `contents`, failing if it already exists
fn write_new(path: &Path, contents: &[u8], private: bool) -> HemlockResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    if private {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    #[cfg(not(unix))]
    let _ = private;

    let mut file = options.open(path).map_err(|e| match e.kind() {
        ErrorKind::AlreadyExists => HemlockError::KeyGeneration(format!(
            "{} already exists; not overwriting",
            path.display()
        )),
        _ => HemlockError::Io(e),
    })?;
    file.write_all(contents)?;
    file.sync_all()?;
    Ok(())
}
