use crate::error::{HemlockError, HemlockResult};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use p256::{PublicKey, SecretKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Algorithm label recorded next to signatures
pub const SIGNATURE_ALGORITHM: &str = "ECDSA-P256-SHA256";

/// Summary of a signature, suitable for reports and logs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureInfo {
    pub algorithm: String,
    pub key_id: String,
    pub signature_len: usize,
    pub signed_data_hash: String,
    /// DER signature bytes, base64
    pub signature: String,
}

/// Device key pair used to sign provenance records
#[derive(Clone)]
pub struct DeviceIdentity {
    secret_key: SecretKey,
    signing_key: SigningKey,
    public_key: PublicKey,
    key_id: String,
}

impl std::fmt::Debug for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceIdentity")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl DeviceIdentity {
    /// Generate a fresh P-256 key pair
    pub fn generate() -> HemlockResult<Self> {
        Self::from_secret(SecretKey::random(&mut rand::rngs::OsRng))
    }

    fn from_secret(secret: SecretKey) -> HemlockResult<Self> {
        let public_key = secret.public_key();
        let key_id = key_id(&public_key)?;
        Ok(Self {
            signing_key: SigningKey::from(&secret),
            secret_key: secret,
            public_key,
            key_id,
        })
    }

    /// Parse an unencrypted PKCS#8 private key PEM
    pub fn from_pkcs8_pem(pem: &str) -> HemlockResult<Self> {
        let secret = SecretKey::from_pkcs8_pem(pem)
            .map_err(|e| HemlockError::KeyLoad(format!("invalid PKCS#8 private key: {}", e)))?;
        Self::from_secret(secret)
    }

    pub fn to_pkcs8_pem(&self) -> HemlockResult<String> {
        let pem = self
            .secret_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| HemlockError::KeyGeneration(format!("PKCS#8 encoding failed: {}", e)))?;
        Ok(String::from(pem.as_str()))
    }

    /// SubjectPublicKeyInfo PEM of the public half
    pub fn public_key_pem(&self) -> HemlockResult<String> {
        public_key_pem(&self.public_key)
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey::from(&self.public_key)
    }

    /// Lowercase hex SHA-256 of the public key's SPKI DER encoding
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// ECDSA P-256 over SHA-256 of `data`, DER-encoded
    pub fn sign(&self, data: &[u8]) -> Vec<u8> {
        let signature: Signature = self.signing_key.sign(data);
        signature.to_der().as_bytes().to_vec()
    }

    pub fn signature_info(&self, data: &[u8], signature: &[u8]) -> SignatureInfo {
        SignatureInfo {
            algorithm: SIGNATURE_ALGORITHM.to_string(),
            key_id: self.key_id.clone(),
            signature_len: signature.len(),
            signed_data_hash: format!("sha256:{}", hex::encode(Sha256::digest(data))),
            signature: BASE64.encode(signature),
        }
    }
}

/// Check a DER signature over `data`.
///
/// Undecodable signature bytes are reported the same way as a bad signature.
pub fn verify(key: &VerifyingKey, data: &[u8], signature_der: &[u8]) -> HemlockResult<()> {
    let signature = Signature::from_der(signature_der)
        .map_err(|e| HemlockError::SignatureInvalid(format!("malformed signature: {}", e)))?;
    key.verify(data, &signature)
        .map_err(|e| HemlockError::SignatureInvalid(e.to_string()))
}

fn public_key_pem(public_key: &PublicKey) -> HemlockResult<String> {
    public_key
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| HemlockError::KeyGeneration(format!("SPKI encoding failed: {}", e)))
}

pub fn key_id(public_key: &PublicKey) -> HemlockResult<String> {
    let der = public_key
        .to_public_key_der()
        .map_err(|e| HemlockError::KeyGeneration(format!("SPKI encoding failed: {}", e)))?;
    Ok(hex::encode(Sha256::digest(der.as_bytes())))
}
