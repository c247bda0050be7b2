//! Endpoint configuration and protocol constants

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// First port tried when no explicit port is configured.
pub const DEFAULT_PORT: u16 = 49500;
/// Largest frame payload accepted or sent, in bytes.
pub const MAX_FRAME_SIZE: usize = 16384;
/// The single handshake version this endpoint speaks.
pub const SUPPORTED_API_VERSION: u32 = 2;
/// Message id marking notifications. Never registered as a pending request.
pub const RESERVED_REQUEST_ID: u32 = 0;
/// Size of a dSUID in bytes. Its string form has twice as many hex digits.
pub const DSUID_LENGTH: usize = 17;

pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(20);
pub const SOCKET_IO_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_SERVICE_NAME: &str = "dsvdc";

/// [`EndpointConfig`] specifies how an [`Endpoint`](crate::Endpoint) listens and
/// how long it waits for its peer.
///
/// # Examples
///
/// ```
/// let config = dsvdc::EndpointConfig {
///     port: 8440,
///     ..Default::default()
/// };
/// assert_eq!(config.max_frame_size, dsvdc::MAX_FRAME_SIZE);
/// assert_eq!(config.api_version, 2);
/// ```
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Preferred listen port. `0` searches upward from [`DEFAULT_PORT`].
    pub port: u16,
    pub bind_address: IpAddr,
    /// Service name handed to discovery.
    pub name: String,
    /// Age after which an unanswered request completes with a timeout.
    pub response_timeout: Duration,
    /// Minimum time between two sweeps while a peer is connected.
    pub sweep_interval: Duration,
    /// Upper bound for reading a frame body or writing a frame.
    pub io_timeout: Duration,
    pub max_frame_size: usize,
    pub api_version: u32,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        EndpointConfig {
            port: 0,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            name: DEFAULT_SERVICE_NAME.into(),
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            sweep_interval: SWEEP_INTERVAL,
            io_timeout: SOCKET_IO_TIMEOUT,
            max_frame_size: MAX_FRAME_SIZE,
            api_version: SUPPORTED_API_VERSION,
        }
    }
}

impl EndpointConfig {
    /// The port to try first when binding.
    pub fn first_port(&self) -> u16 {
        if self.port == 0 {
            DEFAULT_PORT
        } else {
            self.port
        }
    }
}
