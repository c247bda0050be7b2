//! Sans-IO pieces of the session protocol.
//!
//! Framing, message encoding and the session state machine are kept free of
//! socket code so they can be tested on plain byte buffers. The
//! [`Endpoint`](crate::Endpoint) drives them from its work cycle; the
//! session-manager side [`Connection`](crate::client::Connection) reuses the
//! same framing.
//!
//! # Example
//!
//! ```
//! use dsvdc::message::{Message, VdcSendPong};
//! use dsvdc::sansio::protocol::{decode_message, encode_message, parse_frame, serialize_frame};
//! use dsvdc::sansio::ParseResult;
//!
//! let message = Message::notification(VdcSendPong { dsuid: "D1".into() });
//! let frame = serialize_frame(&encode_message(&message)?, dsvdc::MAX_FRAME_SIZE)?;
//!
//! match parse_frame(&frame, dsvdc::MAX_FRAME_SIZE) {
//!     ParseResult::Complete { payload, consumed } => {
//!         assert_eq!(consumed, frame.len());
//!         assert_eq!(decode_message(&payload)?, message);
//!     }
//!     _ => unreachable!(),
//! }
//! # Ok::<(), dsvdc::Error>(())
//! ```

pub mod protocol;
pub mod session;
pub mod types;

pub use self::protocol::{decode_message, encode_message, parse_frame, serialize_frame};
pub use self::session::{Admission, SessionMachine};
pub use self::types::{ParseResult, SessionState};
