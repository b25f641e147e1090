use std::fmt::{Debug, Display};
use std::net::{SocketAddr, ToSocketAddrs};
use std::ops::Deref;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A TCP address given as `host:port`, resolved once at load time.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ListenEndpoint(pub SocketAddr);

impl Deref for ListenEndpoint {
    type Target = SocketAddr;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromStr for ListenEndpoint {
    type Err = String;

    fn from_str(v: &str) -> Result<Self, Self::Err> {
        v.to_socket_addrs()
            .map_err(|e| format!("failed to resolve {v} into a TCP endpoint: {e:?}"))?
            .next()
            .map(Self)
            .ok_or_else(|| format!("failed to resolve {v} into a TCP endpoint"))
    }
}

impl<'de> Deserialize<'de> for ListenEndpoint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let v: String = Deserialize::deserialize::<D>(deserializer)?;
        v.parse().map_err(serde::de::Error::custom)
    }
}

impl Serialize for ListenEndpoint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl Debug for ListenEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

impl Display for ListenEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ip_and_port() {
        let endpoint: ListenEndpoint = "127.0.0.1:2222".parse().unwrap();
        assert_eq!(endpoint.port(), 2222);
        assert!(endpoint.ip().is_loopback());
    }

    #[test]
    fn rejects_missing_port() {
        assert!("127.0.0.1".parse::<ListenEndpoint>().is_err());
    }

    #[test]
    fn formats_like_the_socket_address() {
        let endpoint: ListenEndpoint = "0.0.0.0:2222".parse().unwrap();
        assert_eq!(format!("{endpoint:?}"), "0.0.0.0:2222");
        assert_eq!(endpoint.to_string(), "0.0.0.0:2222");
    }
}
