//! RSA identities, keys and RSA-PSS/SHA-256 signatures.
//!
//! Identities travel as the body of a PEM document with the
//! `-----BEGIN ...-----` / `-----END ...-----` armor lines removed. Anything
//! that needs the actual key re-attaches the armor and parses the PEM.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey, LineEnding};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::pss::{Signature as PssSignature, SigningKey, VerifyingKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use thiserror::Error;

/// Default modulus size for generated wallets.
pub const DEFAULT_KEY_BITS: usize = 2048;

/// Errors that can occur during cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid public key")]
    InvalidPublicKey,
    #[error("invalid private key")]
    InvalidPrivateKey,
    #[error("invalid signature encoding")]
    InvalidSignature,
    #[error("signature verification failed")]
    VerificationFailed,
    #[error("key generation failed: {0}")]
    KeyGeneration(String),
}

/// PEM armor labels understood by [`armor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PemLabel {
    /// PKCS#1 `RSA PUBLIC KEY`.
    RsaPublicKey,
    /// SubjectPublicKeyInfo `PUBLIC KEY`.
    PublicKey,
    /// PKCS#1 `RSA PRIVATE KEY`.
    RsaPrivateKey,
    /// PKCS#8 `PRIVATE KEY`.
    PrivateKey,
}

impl PemLabel {
    fn as_str(self) -> &'static str {
        match self {
            PemLabel::RsaPublicKey => "RSA PUBLIC KEY",
            PemLabel::PublicKey => "PUBLIC KEY",
            PemLabel::RsaPrivateKey => "RSA PRIVATE KEY",
            PemLabel::PrivateKey => "PRIVATE KEY",
        }
    }
}

/// Wrap a reduced key body in PEM armor. Armor already present is kept.
pub fn armor(body: &str, label: PemLabel) -> String {
    let body = body.trim();
    if body.starts_with("-----BEGIN ") {
        return format!("{}\n", body);
    }
    format!(
        "-----BEGIN {label}-----\n{body}\n-----END {label}-----\n",
        label = label.as_str(),
        body = body
    )
}

/// Remove the PEM header and footer lines, keeping the body's line breaks.
pub fn strip_armor(pem: &str) -> String {
    pem.lines()
        .filter(|line| !line.starts_with("-----"))
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// The identity a transaction names as its sender or receiver.
///
/// Compared byte for byte; no normalization is applied.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// The protocol-reserved minting identity.
    pub const ROOT: &'static str = "root";

    /// Wrap an identity string as-is.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The minting identity.
    pub fn root() -> Self {
        Self(Self::ROOT.to_string())
    }

    /// Whether this is the minting identity.
    pub fn is_root(&self) -> bool {
        self.0 == Self::ROOT
    }

    /// Get the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse this identity as an RSA public key.
    pub fn public_key(&self) -> Result<PublicKey, CryptoError> {
        PublicKey::from_identity(self)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let compact: Vec<char> = self.0.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.len() > 16 {
            let tail: String = compact[compact.len() - 16..].iter().collect();
            write!(f, "Identity(...{})", tail)
        } else {
            write!(f, "Identity({})", compact.iter().collect::<String>())
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A base64-encoded RSA-PSS signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Signature {
    /// Wrap base64 text as received on the wire.
    pub fn from_base64(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Encode raw signature bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(BASE64.encode(bytes))
    }

    /// Get the base64 text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode the raw signature bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CryptoError> {
        BASE64
            .decode(self.0.trim())
            .map_err(|_| CryptoError::InvalidSignature)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A public key for signature verification.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey(RsaPublicKey);

impl PublicKey {
    /// Parse an identity, trying PKCS#1 then SubjectPublicKeyInfo armor.
    ///
    /// A private key body is accepted too and reduced to its public half,
    /// since reference wallets armor everything as `RSA PRIVATE KEY`.
    pub fn from_identity(identity: &Identity) -> Result<Self, CryptoError> {
        let body = identity.as_str();
        if let Ok(key) = RsaPublicKey::from_pkcs1_pem(&armor(body, PemLabel::RsaPublicKey)) {
            return Ok(Self(key));
        }
        if let Ok(key) = RsaPublicKey::from_public_key_pem(&armor(body, PemLabel::PublicKey)) {
            return Ok(Self(key));
        }
        match parse_private_key(body) {
            Ok(private) => Ok(Self(private.to_public_key())),
            Err(_) => Err(CryptoError::InvalidPublicKey),
        }
    }

    /// The reduced PKCS#1 representation used as an identity.
    pub fn to_identity(&self) -> Result<Identity, CryptoError> {
        let pem = self
            .0
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Identity(strip_armor(&pem)))
    }

    /// Verify an RSA-PSS/SHA-256 signature over `message`.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), CryptoError> {
        let bytes = signature.to_bytes()?;
        let signature =
            PssSignature::try_from(bytes.as_slice()).map_err(|_| CryptoError::InvalidSignature)?;
        VerifyingKey::<Sha256>::new(self.0.clone())
            .verify(message, &signature)
            .map_err(|_| CryptoError::VerificationFailed)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_identity() {
            Ok(identity) => write!(f, "PublicKey({:?})", identity),
            Err(_) => f.write_str("PublicKey(<unencodable>)"),
        }
    }
}

fn parse_private_key(body: &str) -> Result<RsaPrivateKey, CryptoError> {
    if let Ok(key) = RsaPrivateKey::from_pkcs1_pem(&armor(body, PemLabel::RsaPrivateKey)) {
        return Ok(key);
    }
    RsaPrivateKey::from_pkcs8_pem(&armor(body, PemLabel::PrivateKey))
        .map_err(|_| CryptoError::InvalidPrivateKey)
}

/// A keypair for signing and verification.
pub struct Keypair {
    private_key: RsaPrivateKey,
    pub public_key: PublicKey,
}

impl Keypair {
    /// Generate a new random 2048-bit keypair.
    pub fn generate() -> Result<Self, CryptoError> {
        Self::generate_with_bits(DEFAULT_KEY_BITS)
    }

    /// Generate a new random keypair with the given modulus size.
    pub fn generate_with_bits(bits: usize) -> Result<Self, CryptoError> {
        let private_key = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        Ok(Self::from_rsa(private_key))
    }

    /// Load a keypair from a reduced (armor-less) or full PEM private key.
    pub fn from_private_key(body: &str) -> Result<Self, CryptoError> {
        Ok(Self::from_rsa(parse_private_key(body)?))
    }

    fn from_rsa(private_key: RsaPrivateKey) -> Self {
        let public_key = PublicKey(private_key.to_public_key());
        Self {
            private_key,
            public_key,
        }
    }

    /// The reduced PKCS#1 private key body.
    pub fn private_key(&self) -> Result<String, CryptoError> {
        let pem = self
            .private_key
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(strip_armor(&pem))
    }

    /// The identity derived from the public key.
    pub fn identity(&self) -> Result<Identity, CryptoError> {
        self.public_key.to_identity()
    }

    /// Sign a message with RSA-PSS/SHA-256.
    pub fn sign(&self, message: &[u8]) -> Signature {
        let signing_key = SigningKey::<Sha256>::new(self.private_key.clone());
        let signature = signing_key.sign_with_rng(&mut OsRng, message);
        Signature::from_bytes(&signature.to_bytes())
    }

    /// Verify a signature against our public key.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), CryptoError> {
        self.public_key.verify(message, signature)
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &self.public_key)
            .finish()
    }
}
