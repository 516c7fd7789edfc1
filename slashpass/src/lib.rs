pub mod context;
pub mod context_builder;
pub mod gateway;
mod http;
pub mod onetime;
pub mod peer_key;
pub mod token;
pub mod tracing;

pub use gateway::{Gateway, GatewayError, SecretStats};
pub use onetime::{LinkIssuer, OneTimeLinkError, OneTimeSecretClient};
pub use peer_key::{PeerKeyCache, PeerKeyError};
pub use token::{TokenError, TokenResolver};

use reqwest::Url;

/// Appends path segments to a service base url, percent-encoding each of them.
///
/// Returns `None` for urls which cannot carry a path, like `mailto:` urls.
pub(crate) fn service_url(base: &Url, segments: &[&str]) -> Option<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .ok()?
        .pop_if_empty()
        .extend(segments);
    Some(url)
}

#[cfg(test)]
mod tests;
