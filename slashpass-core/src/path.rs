use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, bail};
use serde::{Deserialize, Serialize};

const KEY_PREFIX_TOKEN: char = '/';

/// Marker for objects which are not user secrets (backups and other system objects).
const HIDDEN_TOKEN: char = '.';

pub type Channel = String;

/// Location of a secret in the storage bucket: `<channel>/<app>`.
///
/// The app part may contain further `/` separated segments, the last one of which is the
/// secret's file name. Everything between the channel and the file name is the "route".
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SecretPath {
    channel: Channel,
    app: String,
}

impl SecretPath {
    pub fn new(channel: &str, app: &str) -> anyhow::Result<Self> {
        if channel.is_empty() || channel.contains(KEY_PREFIX_TOKEN) {
            bail!("invalid channel {channel:?} in secret path");
        }
        if app.is_empty() || app.split(KEY_PREFIX_TOKEN).any(str::is_empty) {
            bail!("invalid app {app:?} in secret path");
        }
        Ok(Self {
            channel: channel.to_string(),
            app: app.to_string(),
        })
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn app(&self) -> &str {
        &self.app
    }

    /// Name of the secret without its channel, as shown to users.
    pub fn file(&self) -> &str {
        self.app
            .rsplit_once(KEY_PREFIX_TOKEN)
            .map_or(self.app.as_str(), |(_, file)| file)
    }

    /// Object key under which a snapshot of this secret taken at `timestamp` is stored:
    /// `<channel>/<route>.<file>.<timestamp>`.
    pub fn backup_key(&self, timestamp: i64) -> String {
        let (route, file) = match self.app.rsplit_once(KEY_PREFIX_TOKEN) {
            Some((route, file)) => (format!("{route}{KEY_PREFIX_TOKEN}"), file),
            None => (String::new(), self.app.as_str()),
        };
        format!("{}{KEY_PREFIX_TOKEN}{route}{HIDDEN_TOKEN}{file}.{timestamp}", self.channel)
    }
}

/// Returns true for object keys whose last segment starts with a dot, those hold backups and
/// other objects which are never listed to users.
pub fn is_hidden_key(key: &str) -> bool {
    key.rsplit(KEY_PREFIX_TOKEN)
        .next()
        .is_some_and(|segment| segment.starts_with(HIDDEN_TOKEN))
}

impl fmt::Display for SecretPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.channel, KEY_PREFIX_TOKEN, self.app)
    }
}

impl FromStr for SecretPath {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (channel, app) = value
            .split_once(KEY_PREFIX_TOKEN)
            .ok_or_else(|| anyhow!("needs at least one {KEY_PREFIX_TOKEN} in secret path"))?;
        Self::new(channel, app)
    }
}

impl Serialize for SecretPath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SecretPath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value: String = String::deserialize(deserializer)?;
        Self::from_str(&value).map_err(|err| serde::de::Error::custom(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::{is_hidden_key, SecretPath};

    #[test]
    fn parses_channel_and_app() {
        let path: SecretPath = "ABC123/github".parse().unwrap();
        assert_eq!(path.channel(), "ABC123");
        assert_eq!(path.app(), "github");
        assert_eq!(path.file(), "github");
        assert_eq!(path.to_string(), "ABC123/github");

        let nested: SecretPath = "ABC123/aws/prod/root".parse().unwrap();
        assert_eq!(nested.app(), "aws/prod/root");
        assert_eq!(nested.file(), "root");

        assert!("loose".parse::<SecretPath>().is_err());
        assert!("/app".parse::<SecretPath>().is_err());
        assert!("ABC123/".parse::<SecretPath>().is_err());
        assert!("ABC123/aws//root".parse::<SecretPath>().is_err());
    }

    #[test]
    fn backup_key_keeps_route() {
        let path = SecretPath::new("mock-channel", "mock-key").unwrap();
        assert_eq!(path.backup_key(1700000000), "mock-channel/.mock-key.1700000000");

        let nested = SecretPath::new("ABC123", "aws/prod/root").unwrap();
        assert_eq!(nested.backup_key(42), "ABC123/aws/prod/.root.42");
    }

    #[test]
    fn hidden_keys() {
        assert!(is_hidden_key("ABC123/.foo.1700000000"));
        assert!(is_hidden_key("ABC123/aws/.root.42"));
        assert!(is_hidden_key(".keep"));
        assert!(!is_hidden_key("ABC123/foo"));
        assert!(!is_hidden_key("ABC123/.aws/root"));
        assert!(!is_hidden_key("slack.slashpass.id_rsa.pub"));
    }
}
