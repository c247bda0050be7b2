//! The session-manager side of a connection
//!
//! [`Connection`] talks to an endpoint the way a session manager does. It is
//! used by the `dsvdc` probe tool and by the tests.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::{MAX_FRAME_SIZE, RESERVED_REQUEST_ID};
use crate::error::*;
use crate::message::*;
use crate::sansio::protocol::{decode_message, encode_message, parse_frame, serialize_frame};
use crate::sansio::ParseResult;
use crate::stream::Stream;

pub struct Connection {
    stream: Box<dyn Stream>,
    buffer: Vec<u8>,
    max_frame_size: usize,
    request_id: u32,
}

impl Connection {
    pub fn connect<A: ToSocketAddrs>(address: A) -> Result<Self> {
        let stream = TcpStream::connect(address)?;
        stream.set_nodelay(true)?;
        Ok(Connection::from_stream(Box::new(stream)))
    }

    pub fn from_stream(stream: Box<dyn Stream>) -> Self {
        Connection {
            stream,
            buffer: Vec::new(),
            max_frame_size: MAX_FRAME_SIZE,
            request_id: RESERVED_REQUEST_ID,
        }
    }

    /// Next request id, never `0`.
    pub fn next_id(&mut self) -> u32 {
        self.request_id = self.request_id.wrapping_add(1);
        if self.request_id == RESERVED_REQUEST_ID {
            self.request_id = 1;
        }
        self.request_id
    }

    pub fn send(&mut self, message: &Message) -> Result<()> {
        let frame = serialize_frame(&encode_message(message)?, self.max_frame_size)?;
        self.stream.write_all(&frame)?;
        self.stream.flush()?;
        debug!(
            message_id = message.message_id,
            kind = message.payload.name(),
            "message sent"
        );
        Ok(())
    }

    /// Send `payload` with a fresh request id and return the id.
    pub fn request(&mut self, payload: impl Into<Payload>) -> Result<u32> {
        let id = self.next_id();
        self.send(&Message::new(id, payload))?;
        Ok(id)
    }

    /// Wait up to `timeout` for the next message.
    pub fn recv(&mut self, timeout: Duration) -> Result<Message> {
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; 4096];
        loop {
            match parse_frame(&self.buffer, self.max_frame_size) {
                ParseResult::Complete { payload, consumed } => {
                    self.buffer.drain(..consumed);
                    let message = decode_message(&payload)?;
                    debug!(
                        message_id = message.message_id,
                        kind = message.payload.name(),
                        "message received"
                    );
                    return Ok(message);
                }
                ParseResult::Invalid { error } => return Err(ErrorKind::Protocol(error).into()),
                ParseResult::Incomplete { .. } => {}
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ErrorKind::Timeout.into());
            }
            self.stream.set_read_timeout(Some(remaining))?;
            match self.stream.read(&mut chunk) {
                Ok(0) => return Err(ErrorKind::Transport(io::ErrorKind::UnexpectedEof).into()),
                Ok(n) => self.buffer.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Wait for the message answering request `id`. Anything else that
    /// arrives first is handed to `other`.
    pub fn recv_response(
        &mut self,
        id: u32,
        timeout: Duration,
        mut other: impl FnMut(Message),
    ) -> Result<Message> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let message = self.recv(remaining)?;
            if message.message_id == id {
                return Ok(message);
            }
            other(message);
        }
    }

    /// Run the handshake and return the endpoint's dSUID.
    pub fn hello(&mut self, dsuid: &str, api_version: u32, timeout: Duration) -> Result<String> {
        let id = self.request(VdsmRequestHello {
            dsuid: Some(dsuid.into()),
            api_version: Some(api_version),
        })?;
        match self.recv_response(id, timeout, |_| {})?.payload {
            Payload::VdcResponseHello(r) => Ok(r.dsuid),
            p => Err(ErrorKind::Protocol(format!("unexpected {} to hello", p.name())).into()),
        }
    }

    pub fn shutdown(&mut self) -> Result<()> {
        self.stream.shutdown()
    }
}
