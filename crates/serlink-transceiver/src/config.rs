use std::time::Duration;

/// Default transmit buffer capacity in bytes.
pub const DEFAULT_TX_CAPACITY: usize = 2048;

/// Default timeout for establishing a link.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for a single blocking link write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for a [`LinkTransceiver`](crate::LinkTransceiver).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// Transmit ring buffer capacity. Bytes beyond it are dropped on send.
    pub tx_capacity: usize,
    /// Link establishment timeout. Honoured by every link kind on Linux;
    /// elsewhere only by TCP links.
    pub connect_timeout: Option<Duration>,
    /// Per-read timeout. A read that times out counts as a lost link. `None`
    /// blocks until data arrives or the link is shut down.
    pub read_timeout: Option<Duration>,
    /// Per-write timeout. A write that times out counts as a lost link.
    pub write_timeout: Option<Duration>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            tx_capacity: DEFAULT_TX_CAPACITY,
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            read_timeout: None,
            write_timeout: Some(DEFAULT_WRITE_TIMEOUT),
        }
    }
}

impl LinkConfig {
    pub fn with_tx_capacity(mut self, capacity: usize) -> Self {
        self.tx_capacity = capacity;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }
}
