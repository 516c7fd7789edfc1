use std::sync::Arc;

use once_cell::sync::Lazy;
use slashpass_core::Keypair;

/// Seed the relay keypair is derived from in tests.
pub const TEST_SEED: &str = "bip39 seed";

/// Key size used in tests, large enough for OAEP and quick to derive.
pub const TEST_KEY_BITS: usize = 1024;

static RELAY_KEYPAIR: Lazy<Arc<Keypair>> = Lazy::new(|| {
    Arc::new(Keypair::derive(TEST_SEED, TEST_KEY_BITS).expect("relay test keypair"))
});

static PEER_KEYPAIR: Lazy<Arc<Keypair>> = Lazy::new(|| {
    Arc::new(Keypair::derive("slack server seed", TEST_KEY_BITS).expect("peer test keypair"))
});

/// The keypair a relay configured with [`TEST_SEED`] derives.
pub fn test_keypair() -> Arc<Keypair> {
    RELAY_KEYPAIR.clone()
}

/// Keypair of the chat frontend, whose public half the relay encrypts listings and links for.
pub fn peer_keypair() -> Arc<Keypair> {
    PEER_KEYPAIR.clone()
}
