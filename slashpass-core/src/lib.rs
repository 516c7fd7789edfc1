pub mod envelope;
pub mod keypair;
pub mod path;

pub use envelope::{decrypt, encrypt, EnvelopeError};
pub use keypair::{max_chunk_len, KeyError, Keypair, PublicKey, DEFAULT_KEY_BITS};
pub use path::{is_hidden_key, Channel, SecretPath};

/// Object key of the chat frontend's public key inside the storage bucket.
pub const PEER_KEY_OBJECT: &str = "slack.slashpass.id_rsa.pub";

#[cfg(test)]
pub(crate) fn test_keypair() -> &'static Keypair {
    use once_cell::sync::Lazy;

    static KEYPAIR: Lazy<Keypair> =
        Lazy::new(|| Keypair::derive("bip39 seed", 1024).expect("test keypair"));
    &KEYPAIR
}
