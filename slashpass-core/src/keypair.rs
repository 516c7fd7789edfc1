// SPDX-License-Identifier: AGPL-3.0-or-later

use std::fmt;

use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha20Rng;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use crate::envelope::{self, EnvelopeError};

/// Key size used by the relay and by the chat frontend it talks to.
pub const DEFAULT_KEY_BITS: usize = 2048;

/// Bytes of padding overhead added by RSA-OAEP with a SHA-1 digest (`2 * 20 + 2`).
pub const OAEP_SHA1_OVERHEAD: usize = 42;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("keypair seed is empty")]
    EmptySeed,

    #[error("key size of {0} bits leaves no room for an OAEP payload")]
    KeyTooSmall(usize),

    #[error("could not derive rsa keypair: {0}")]
    Derivation(#[from] rsa::Error),

    #[error("could not encode public key: {0}")]
    Encoding(String),

    #[error("could not parse public key, expected PEM encoded SPKI or PKCS#1")]
    MalformedPublicKey,
}

/// Returns the largest plaintext that fits into a single OAEP block for a key of the given
/// size in bytes, or `None` when the key is too small to carry any payload.
pub fn max_chunk_len(key_size_bytes: usize) -> Option<usize> {
    key_size_bytes
        .checked_sub(OAEP_SHA1_OVERHEAD)
        .filter(|len| *len > 0)
}

/// An RSA public key together with its block geometry.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    inner: RsaPublicKey,
    chunk_len: usize,
}

impl PublicKey {
    fn new(inner: RsaPublicKey) -> Result<Self, KeyError> {
        let chunk_len =
            max_chunk_len(inner.size()).ok_or(KeyError::KeyTooSmall(inner.size() * 8))?;
        Ok(Self { inner, chunk_len })
    }

    /// Parses a PEM encoded public key, either SubjectPublicKeyInfo ("BEGIN PUBLIC KEY") or
    /// PKCS#1 ("BEGIN RSA PUBLIC KEY").
    pub fn from_pem(bytes: &[u8]) -> Result<Self, KeyError> {
        let pem = std::str::from_utf8(bytes).map_err(|_| KeyError::MalformedPublicKey)?;
        let pem = pem.trim();
        let inner = RsaPublicKey::from_public_key_pem(pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
            .map_err(|_| KeyError::MalformedPublicKey)?;
        Self::new(inner)
    }

    pub fn to_pem(&self) -> Result<String, KeyError> {
        self.inner
            .to_public_key_pem(LineEnding::LF)
            .map_err(|err| KeyError::Encoding(err.to_string()))
    }

    /// Size of one ciphertext block in bytes.
    pub fn block_len(&self) -> usize {
        self.inner.size()
    }

    /// Largest plaintext carried by one ciphertext block.
    pub fn chunk_len(&self) -> usize {
        self.chunk_len
    }

    pub(crate) fn rsa(&self) -> &RsaPublicKey {
        &self.inner
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("bits", &(self.block_len() * 8))
            .field("chunk_len", &self.chunk_len)
            .finish()
    }
}

/// The relay's long-lived keypair.
///
/// The private half never leaves this type, it is only used through [`Keypair::decrypt`].
pub struct Keypair {
    private_key: RsaPrivateKey,
    public_key: PublicKey,
    public_pem: String,
}

impl Keypair {
    /// Deterministically derives a keypair from a seed phrase.
    ///
    /// The seed is hashed into the state of a ChaCha20 generator which then drives RSA key
    /// generation, so the same seed and key size always yield the same keypair.
    pub fn derive(seed: &str, bits: usize) -> Result<Self, KeyError> {
        let seed = seed.trim();
        if seed.is_empty() {
            return Err(KeyError::EmptySeed);
        }
        if max_chunk_len(bits / 8).is_none() {
            return Err(KeyError::KeyTooSmall(bits));
        }

        let digest: [u8; 32] = Sha256::digest(seed.as_bytes()).into();
        let mut rng = ChaCha20Rng::from_seed(digest);
        let private_key = RsaPrivateKey::new(&mut rng, bits)?;
        let public_key = PublicKey::new(private_key.to_public_key())?;
        let public_pem = public_key.to_pem()?;

        debug!(
            bits,
            chunk_len = public_key.chunk_len(),
            "derived relay keypair from seed"
        );

        Ok(Self {
            private_key,
            public_key,
            public_pem,
        })
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// PEM encoded public key, as handed out to the chat frontend and browsers.
    pub fn public_key_pem(&self) -> &str {
        &self.public_pem
    }

    /// Encrypts a payload so that only this keypair can read it again.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        envelope::encrypt(plaintext, &self.public_key, true)
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        envelope::decrypt(ciphertext, &self.private_key)
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}
