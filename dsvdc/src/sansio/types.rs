//! Core types shared by the sans-io pieces.

/// Result of parsing one length-prefixed frame from a byte buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseResult {
    /// A complete frame was found
    Complete {
        /// The frame payload, without the length prefix
        payload: Vec<u8>,
        /// Number of bytes consumed from the input, prefix included
        consumed: usize,
    },
    /// More data is needed to complete the frame
    Incomplete {
        /// Minimum number of additional bytes needed
        needed: usize,
    },
    /// The length prefix is unacceptable; the stream is out of sync
    Invalid {
        /// Description of the parse error
        error: String,
    },
}

/// Where a connection stands in the session protocol.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    /// A peer is accepted but has not completed the handshake.
    Connected,
    /// Handshake completed with the peer identified by `peer`.
    Active { peer: String },
}
