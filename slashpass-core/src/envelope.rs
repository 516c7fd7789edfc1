//! Chunked RSA-OAEP envelopes.
//!
//! A single RSA block can only carry `key_size - 42` bytes of plaintext, so longer payloads are
//! split into chunks of that size which are encrypted independently and concatenated. There is
//! no framing: every ciphertext block is exactly `key_size` bytes long and readers split on that
//! boundary.
use rsa::rand_core::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey};
use sha1::Sha1;
use thiserror::Error;

use crate::keypair::PublicKey;

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("payload of {len} bytes exceeds the {max} byte bound of a single block")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("encryption failed: {0}")]
    Encryption(rsa::Error),

    #[error("ciphertext of {len} bytes is not aligned to {block_len} byte blocks")]
    Misaligned { len: usize, block_len: usize },

    #[error("decryption of block {index} failed")]
    Decryption { index: usize },
}

fn padding() -> Oaep {
    Oaep::new::<Sha1>()
}

/// Encrypts `plaintext` for the holder of the private half of `key`.
///
/// With `chunked` unset the payload must fit into a single block. With `chunked` set it is split
/// into `key.chunk_len()` sized chunks, an empty payload yielding an empty envelope.
pub fn encrypt(plaintext: &[u8], key: &PublicKey, chunked: bool) -> Result<Vec<u8>, EnvelopeError> {
    let max = key.chunk_len();
    if !chunked {
        if plaintext.len() > max {
            return Err(EnvelopeError::PayloadTooLarge {
                len: plaintext.len(),
                max,
            });
        }
        return encrypt_block(plaintext, key);
    }

    let blocks = plaintext.len().div_ceil(max);
    let mut envelope = Vec::with_capacity(blocks * key.block_len());
    for chunk in plaintext.chunks(max) {
        envelope.extend(encrypt_block(chunk, key)?);
    }
    Ok(envelope)
}

fn encrypt_block(block: &[u8], key: &PublicKey) -> Result<Vec<u8>, EnvelopeError> {
    key.rsa()
        .encrypt(&mut OsRng, padding(), block)
        .map_err(EnvelopeError::Encryption)
}

/// Inverse of [`encrypt`]. Works for single block and chunked envelopes alike.
pub fn decrypt(ciphertext: &[u8], key: &RsaPrivateKey) -> Result<Vec<u8>, EnvelopeError> {
    let block_len = key.size();
    if ciphertext.len() % block_len != 0 {
        return Err(EnvelopeError::Misaligned {
            len: ciphertext.len(),
            block_len,
        });
    }

    let mut plaintext = Vec::with_capacity(ciphertext.len());
    for (index, block) in ciphertext.chunks(block_len).enumerate() {
        let chunk = key
            .decrypt(padding(), block)
            .map_err(|_| EnvelopeError::Decryption { index })?;
        plaintext.extend(chunk);
    }
    Ok(plaintext)
}

#[cfg(test)]
mod tests {
    use super::{encrypt, EnvelopeError};
    use crate::keypair::Keypair;
    use crate::test_keypair;

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn chunked_round_trip() {
        let keypair = test_keypair();
        let chunk_len = keypair.public_key().chunk_len();
        let block_len = keypair.public_key().block_len();

        for len in [0, 1, chunk_len, chunk_len * 3 + 17] {
            let plaintext = payload(len);
            let envelope = encrypt(&plaintext, keypair.public_key(), true).unwrap();
            assert_eq!(envelope.len(), len.div_ceil(chunk_len) * block_len);
            assert_eq!(keypair.decrypt(&envelope).unwrap(), plaintext, "length {len}");
        }
    }

    #[test]
    fn single_block_is_bounded() {
        let keypair = test_keypair();
        let chunk_len = keypair.public_key().chunk_len();

        let envelope = encrypt(b"https://onetimesecret.com/secret/abc", keypair.public_key(), false)
            .unwrap();
        assert_eq!(
            keypair.decrypt(&envelope).unwrap(),
            b"https://onetimesecret.com/secret/abc"
        );

        let result = encrypt(&payload(chunk_len + 1), keypair.public_key(), false);
        assert!(matches!(
            result,
            Err(EnvelopeError::PayloadTooLarge { max, .. }) if max == chunk_len
        ));
    }

    #[test]
    fn wrong_key_fails() {
        let keypair = test_keypair();
        let stranger = Keypair::derive("somebody else", 1024).unwrap();

        let envelope = encrypt(&payload(200), keypair.public_key(), true).unwrap();
        assert!(matches!(
            stranger.decrypt(&envelope),
            Err(EnvelopeError::Decryption { index: 0 })
        ));
    }

    #[test]
    fn truncated_envelope_fails() {
        let keypair = test_keypair();
        let mut envelope = encrypt(&payload(200), keypair.public_key(), true).unwrap();
        envelope.pop();

        assert!(matches!(
            keypair.decrypt(&envelope),
            Err(EnvelopeError::Misaligned { .. })
        ));
    }

    #[test]
    fn tampered_block_fails_whole_envelope() {
        let keypair = test_keypair();
        let block_len = keypair.public_key().block_len();
        let mut envelope = encrypt(&payload(200), keypair.public_key(), true).unwrap();
        envelope[block_len + 5] ^= 0xff;

        assert!(matches!(
            keypair.decrypt(&envelope),
            Err(EnvelopeError::Decryption { index: 1 })
        ));
    }
}
