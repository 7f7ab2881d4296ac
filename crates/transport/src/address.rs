use std::fmt;

use serde::{Deserialize, Serialize};

/// Domain suffix for direct user chats.
pub const USER_DOMAIN: &str = "s.whatsapp.net";
/// Domain suffix for group chats.
pub const GROUP_DOMAIN: &str = "g.us";

/// A fully-qualified network address (`<local>@<domain>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Wrap an already-formatted address as received from the wire.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Normalize a phone-like identifier into a user address: strip
    /// everything that is not a digit and append the user domain, unless the
    /// input is already fully qualified.
    pub fn phone(raw: &str) -> Self {
        if raw.ends_with(&format!("@{USER_DOMAIN}")) {
            return Self(raw.to_string());
        }
        let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
        Self(format!("{digits}@{USER_DOMAIN}"))
    }

    /// Normalize a group identifier: keep digits and dashes and append the
    /// group domain, unless already fully qualified.
    pub fn group(raw: &str) -> Self {
        if raw.ends_with(&format!("@{GROUP_DOMAIN}")) {
            return Self(raw.to_string());
        }
        let cleaned: String = raw
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '-')
            .collect();
        Self(format!("{cleaned}@{GROUP_DOMAIN}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The domain part, if the address is well-formed.
    pub fn domain(&self) -> Option<&str> {
        self.0.split('@').nth(1)
    }

    /// True for direct user chats. Server-reserved addresses (broadcasts,
    /// status updates, newsletters) carry other domains and return false.
    pub fn is_user(&self) -> bool {
        self.domain() == Some(USER_DOMAIN)
    }

    pub fn is_group(&self) -> bool {
        self.domain() == Some(GROUP_DOMAIN)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
