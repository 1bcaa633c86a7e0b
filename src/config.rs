//! Configuration for a lan-sync node.

use std::{
    net::{IpAddr, Ipv4Addr},
    time::Duration,
};

use crate::{
    error::{Error, Result},
    message::validate_node_id,
};

/// Well-known UDP port every node binds and broadcasts to.
pub const DEFAULT_PORT: u16 = 4242;

/// Capacity of every actor inbox and of the dispatcher's outgoing queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 20;

/// Largest datagram the transport will read.
pub const DEFAULT_MAX_DATAGRAM_SIZE: usize = 2048;

/// Configuration options for a node.
///
/// The node identity and advertise interval are fixed for the lifetime of
/// the process; everything else tunes timers and buffer sizes.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeConfig {
    /// Symbolic name of this node.
    ///
    /// Must match `\w+` and be at most 16 characters long.
    ///
    /// Default: "node"
    pub node_id: String,

    /// Maximum time in seconds between two advertisements from this node.
    ///
    /// Peers use it as the lifetime of our entry in their peer table.
    ///
    /// Default: 30
    pub advertise_interval: u8,

    /// Period of the advertisement loop.
    ///
    /// When unset, advertisements go out every `advertise_interval / 2`.
    ///
    /// Default: None
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde_opt"))]
    pub hello_period: Option<Duration>,

    /// UDP port to bind and broadcast to.
    ///
    /// Default: 4242
    pub port: u16,

    /// Destination address for outbound datagrams.
    ///
    /// Default: 255.255.255.255
    pub broadcast_addr: IpAddr,

    /// Capacity of actor inboxes and of the outgoing queue.
    ///
    /// Default: 20
    pub queue_capacity: usize,

    /// Delay between two SYN emissions towards a peer that is not yet
    /// synchronized.
    ///
    /// Default: 6s
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde_impl"))]
    pub syn_retry_interval: Duration,

    /// Receive buffer size for inbound datagrams.
    ///
    /// Default: 2048
    pub max_datagram_size: usize,

    /// Push a peer's expiration forward on every advertisement it sends.
    ///
    /// When false, a peer expires a fixed time after it was first heard,
    /// even if it keeps advertising.
    ///
    /// Default: true
    pub refresh_expiry: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: "node".to_string(),
            advertise_interval: 30,
            hello_period: None,
            port: DEFAULT_PORT,
            broadcast_addr: IpAddr::V4(Ipv4Addr::BROADCAST),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            syn_retry_interval: Duration::from_secs(6),
            max_datagram_size: DEFAULT_MAX_DATAGRAM_SIZE,
            refresh_expiry: true,
        }
    }
}

impl NodeConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration for a node on a local network segment.
    ///
    /// Uses the default intervals and the given node identifier.
    pub fn lan(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            ..Self::default()
        }
    }

    /// Configuration with short timers for in-process tests.
    ///
    /// - 2s advertise interval (1s hello period)
    /// - 200ms SYN retry
    pub fn testing(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            advertise_interval: 2,
            hello_period: Some(Duration::from_millis(1000)),
            syn_retry_interval: Duration::from_millis(200),
            ..Self::default()
        }
    }

    /// Set the node identifier (builder pattern).
    pub fn with_node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = node_id.into();
        self
    }

    /// Set the advertise interval in seconds (builder pattern).
    pub const fn with_advertise_interval(mut self, secs: u8) -> Self {
        self.advertise_interval = secs;
        self
    }

    /// Override the advertisement period (builder pattern).
    pub const fn with_hello_period(mut self, period: Duration) -> Self {
        self.hello_period = Some(period);
        self
    }

    /// Set the UDP port (builder pattern).
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the broadcast destination (builder pattern).
    pub const fn with_broadcast_addr(mut self, addr: IpAddr) -> Self {
        self.broadcast_addr = addr;
        self
    }

    /// Set the queue capacity (builder pattern).
    pub const fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the SYN retry interval (builder pattern).
    pub const fn with_syn_retry_interval(mut self, interval: Duration) -> Self {
        self.syn_retry_interval = interval;
        self
    }

    /// Set the receive buffer size (builder pattern).
    pub const fn with_max_datagram_size(mut self, size: usize) -> Self {
        self.max_datagram_size = size;
        self
    }

    /// Enable or disable expiry refresh on advertisements (builder pattern).
    pub const fn with_refresh_expiry(mut self, refresh: bool) -> Self {
        self.refresh_expiry = refresh;
        self
    }

    /// Period of the advertisement loop.
    ///
    /// Falls back to half the advertise interval, never less than 100ms so
    /// an interval of 0 or 1 does not spin.
    pub fn effective_hello_period(&self) -> Duration {
        self.hello_period.unwrap_or_else(|| {
            let half = Duration::from_secs(u64::from(self.advertise_interval)) / 2;
            half.max(Duration::from_millis(100))
        })
    }

    /// Check the configuration for values the protocol cannot carry.
    pub fn validate(&self) -> Result<()> {
        validate_node_id(&self.node_id)?;
        if self.queue_capacity == 0 {
            return Err(Error::Config("queue_capacity must be at least 1".into()));
        }
        if self.max_datagram_size == 0 {
            return Err(Error::Config(
                "max_datagram_size must be at least 1".into(),
            ));
        }
        if self.syn_retry_interval.is_zero() {
            return Err(Error::Config("syn_retry_interval must be non-zero".into()));
        }
        if matches!(self.hello_period, Some(p) if p.is_zero()) {
            return Err(Error::Config("hello_period must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(feature = "serde")]
mod humantime_serde_impl {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        } else {
            serializer.serialize_u64(duration.as_millis() as u64)
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            let ms: u64 = s
                .trim_end_matches("ms")
                .parse()
                .map_err(serde::de::Error::custom)?;
            Ok(Duration::from_millis(ms))
        } else {
            let ms = u64::deserialize(deserializer)?;
            Ok(Duration::from_millis(ms))
        }
    }
}

#[cfg(feature = "serde")]
mod humantime_serde_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => super::humantime_serde_impl::serialize(d, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|s| {
            s.trim_end_matches("ms")
                .parse()
                .map(Duration::from_millis)
                .map_err(serde::de::Error::custom)
        })
        .transpose()
    }
}
