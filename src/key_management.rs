use crate::error::KeyError;
use base64::{engine::general_purpose, Engine as _};
use rand::rngs::OsRng;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use std::fmt;
use std::fs;
use std::path::Path;

/// Modulus size used for freshly generated keys.
pub const KEY_BITS: usize = 2048;

pub const PRIVATE_KEY_FILE: &str = "private.pem";
pub const PUBLIC_KEY_FILE: &str = "public.pem";

/// RSA key pair owned by the listener for its whole lifetime.
///
/// Only the public half is ever meant to leave the process, through
/// [`KeyPair::public_key_line`] or [`KeyPair::public_key_pem`].
#[derive(Clone)]
pub struct KeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl KeyPair {
    /// Generate a fresh 2048-bit pair from the operating system RNG.
    pub fn generate() -> Result<Self, KeyError> {
        let private = RsaPrivateKey::new(&mut OsRng, KEY_BITS)
            .map_err(|e| KeyError::Generation(e.to_string()))?;
        Ok(Self::from_private(private))
    }

    pub fn from_private(private: RsaPrivateKey) -> Self {
        let public = RsaPublicKey::from(&private);
        Self { private, public }
    }

    /// Load a private key in either PKCS#8 (`BEGIN PRIVATE KEY`) or
    /// PKCS#1 (`BEGIN RSA PRIVATE KEY`) PEM form.
    pub fn from_private_pem(pem: &str) -> Result<Self, KeyError> {
        let pem = pem.trim();
        let private = match RsaPrivateKey::from_pkcs8_pem(pem) {
            Ok(key) => key,
            Err(pkcs8_err) => RsaPrivateKey::from_pkcs1_pem(pem).map_err(|pkcs1_err| {
                KeyError::KeyFormat(format!("not PKCS#8 ({pkcs8_err}) nor PKCS#1 ({pkcs1_err})"))
            })?,
        };
        Ok(Self::from_private(private))
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    /// Size of one ciphertext block in bytes (the modulus length).
    pub fn block_size(&self) -> usize {
        self.public.size()
    }

    pub fn private_key_pem(&self) -> Result<String, KeyError> {
        self.private
            .to_pkcs8_pem(LineEnding::LF)
            .map(|pem| pem.to_string())
            .map_err(|e| KeyError::KeyFormat(e.to_string()))
    }

    pub fn public_key_pem(&self) -> Result<String, KeyError> {
        self.public
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| KeyError::KeyFormat(e.to_string()))
    }

    /// Public key as the single-line base64 body vote sites ask for: the PEM
    /// document without its header, footer and line breaks.
    pub fn public_key_line(&self) -> Result<String, KeyError> {
        let der = self
            .public
            .to_public_key_der()
            .map_err(|e| KeyError::KeyFormat(e.to_string()))?;
        Ok(general_purpose::STANDARD.encode(der.as_bytes()))
    }

    /// Raw PKCS#1 v1.5 decryption of exactly one ciphertext block.
    pub fn decrypt_pkcs1v15(&self, ciphertext: &[u8]) -> Result<Vec<u8>, rsa::Error> {
        self.private.decrypt(Pkcs1v15Encrypt, ciphertext)
    }

    /// Write `private.pem` and `public.pem` into `dir`, creating it if needed.
    pub fn persist(&self, dir: &Path) -> Result<(), KeyError> {
        fs::create_dir_all(dir)?;

        let private_path = dir.join(PRIVATE_KEY_FILE);
        fs::write(&private_path, self.private_key_pem()?)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&private_path, fs::Permissions::from_mode(0o600))?;
        }

        fs::write(dir.join(PUBLIC_KEY_FILE), self.public_key_pem()?)?;
        tracing::info!(dir = %dir.display(), "persisted vote listener key pair");
        Ok(())
    }

    /// Reuse `dir/private.pem` when present, otherwise generate and persist a new pair.
    pub fn load_or_generate(dir: &Path) -> Result<Self, KeyError> {
        let private_path = dir.join(PRIVATE_KEY_FILE);
        if private_path.exists() {
            let pem = fs::read_to_string(&private_path)?;
            return Self::from_private_pem(&pem);
        }

        let pair = Self::generate()?;
        pair.persist(dir)?;
        Ok(pair)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("bits", &(self.block_size() * 8))
            .finish_non_exhaustive()
    }
}
