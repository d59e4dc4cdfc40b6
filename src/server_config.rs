// src/server_config.rs - Time server addresses as delivered by the master board
use serde::{Deserialize, Serialize};

/// Minimum length of an address string that is worth querying.
pub const MIN_USABLE_ADDRESS_LEN: usize = 7;

/// A dotted-quad server address.
///
/// Octets are not range checked: the master board is trusted to send what
/// it means, and an out-of-range octet simply fails at query time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Longer than six characters, the same bar used when reloading
    /// persisted addresses and when deciding whether failover is possible.
    pub fn is_usable(&self) -> bool {
        self.0.len() >= MIN_USABLE_ADDRESS_LEN
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Primary and optional secondary time server.
///
/// Never edited in place; a new configuration replaces the old one whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    primary: Address,
    secondary: Option<Address>,
}

impl ServerConfig {
    pub fn new(primary: Address, secondary: Option<Address>) -> Self {
        Self { primary, secondary }
    }

    pub fn primary(&self) -> &Address {
        &self.primary
    }

    pub fn secondary(&self) -> Option<&Address> {
        self.secondary.as_ref()
    }

    /// The secondary, if one is configured and long enough to fail over to.
    pub fn usable_secondary(&self) -> Option<&Address> {
        self.secondary.as_ref().filter(|addr| addr.is_usable())
    }
}
