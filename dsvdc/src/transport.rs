//! Listening socket and the single peer connection

use std::io::{self, Read, Write};
use std::net::{IpAddr, TcpListener};
use std::os::unix::io::AsRawFd;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::EndpointConfig;
use crate::error::*;
use crate::sansio::protocol::{frame_length, serialize_frame, HEADER_SIZE};
use crate::stream::Stream;

/// What [`Transport::poll`] found ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Readiness {
    /// A connection is waiting to be accepted.
    pub incoming: bool,
    /// The peer connection has data, or has hung up.
    pub readable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accepted {
    /// The new connection is now the peer connection.
    Connected(String),
    /// A peer was already connected; the newcomer got an error frame and was closed.
    Rejected(String),
}

pub struct Transport {
    listener: Option<TcpListener>,
    connection: Option<Box<dyn Stream>>,
    port: u16,
    io_timeout: Duration,
    max_frame_size: usize,
}

fn bind(address: IpAddr, first_port: u16) -> Result<TcpListener> {
    let mut port = first_port;
    loop {
        match TcpListener::bind((address, port)) {
            Ok(listener) => return Ok(listener),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse && port < u16::MAX => {
                debug!(port, "port in use, trying the next one");
                port += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn read_frame_from(
    stream: &mut dyn Stream,
    timeout: Option<Duration>,
    max_frame_size: usize,
) -> Result<Vec<u8>> {
    stream.set_read_timeout(timeout)?;
    let mut header = [0u8; HEADER_SIZE];
    stream.read_exact(&mut header)?;
    let len = frame_length(header, max_frame_size)?;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload)?;
    Ok(payload)
}

fn write_all(stream: &mut dyn Stream, timeout: Option<Duration>, frame: &[u8]) -> Result<()> {
    stream.set_write_timeout(timeout)?;
    stream
        .write_all(frame)
        .and_then(|_| stream.flush())
        .map_err(|e| Error::with_source(ErrorKind::Transport(e.kind()), e))
}

impl Transport {
    /// Bind the listening socket. A busy port makes it try the next one up.
    pub fn listen(config: &EndpointConfig) -> Result<Self> {
        let listener = bind(config.bind_address, config.first_port())?;
        listener.set_nonblocking(true)?;
        let port = listener.local_addr()?.port();
        info!(address = %config.bind_address, port, "listening");

        Ok(Transport {
            listener: Some(listener),
            connection: None,
            port,
            io_timeout: config.io_timeout,
            max_frame_size: config.max_frame_size,
        })
    }

    /// A transport over an already connected stream, without a listener.
    #[cfg(test)]
    pub(crate) fn with_stream(stream: Box<dyn Stream>, config: &EndpointConfig) -> Self {
        Transport {
            listener: None,
            connection: Some(stream),
            port: 0,
            io_timeout: config.io_timeout,
            max_frame_size: config.max_frame_size,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    fn timeout(&self) -> Option<Duration> {
        Some(self.io_timeout).filter(|t| !t.is_zero())
    }

    /// Wait up to `timeout` for an incoming connection or peer data. A zero
    /// timeout only checks. A signal ends the wait early with nothing ready.
    pub fn poll(&self, timeout: Duration) -> Result<Readiness> {
        let mut fds = Vec::with_capacity(2);
        let listener_index = self.listener.as_ref().map(|l| {
            fds.push(libc::pollfd {
                fd: l.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            });
            fds.len() - 1
        });
        let connection_index = self.connection.as_ref().map(|c| {
            fds.push(libc::pollfd {
                fd: c.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            });
            fds.len() - 1
        });

        let ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
        let r = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, ms) };
        if r < 0 {
            let e = io::Error::last_os_error();
            if e.kind() == io::ErrorKind::Interrupted {
                return Ok(Readiness::default());
            }
            return Err(e.into());
        }

        let ready = |index: Option<usize>| index.map_or(false, |i| fds[i].revents != 0);
        Ok(Readiness {
            incoming: ready(listener_index),
            readable: ready(connection_index),
        })
    }

    /// Accept a waiting connection. If a peer is already connected the
    /// newcomer is sent `reject_payload` as a single frame and closed.
    pub fn accept(&mut self, reject_payload: &[u8]) -> Result<Accepted> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| Error::from(ErrorKind::NotConnected))?;
        let (stream, addr) = listener.accept()?;
        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;
        let addr = addr.to_string();

        if self.connection.is_some() {
            warn!(peer = %addr, "rejecting second connection");
            let mut stream: Box<dyn Stream> = Box::new(stream);
            let frame = serialize_frame(reject_payload, self.max_frame_size)?;
            if let Err(e) = write_all(stream.as_mut(), self.timeout(), &frame) {
                debug!(peer = %addr, error = %e, "could not notify rejected connection");
            }
            let _ = stream.shutdown();
            return Ok(Accepted::Rejected(addr));
        }

        info!(peer = %addr, "connection accepted");
        self.connection = Some(Box::new(stream));
        Ok(Accepted::Connected(addr))
    }

    /// Read one frame from the peer. Any failure closes the connection.
    pub fn read_frame(&mut self) -> Result<Vec<u8>> {
        let timeout = self.timeout();
        let stream = self
            .connection
            .as_mut()
            .ok_or_else(|| Error::from(ErrorKind::NotConnected))?;

        match read_frame_from(stream.as_mut(), timeout, self.max_frame_size) {
            Ok(payload) => Ok(payload),
            Err(e) => {
                warn!(error = %e, "connection reset");
                self.reset();
                Err(e)
            }
        }
    }

    pub fn write_frame(&mut self, payload: &[u8]) -> Result<()> {
        let timeout = self.timeout();
        let stream = self
            .connection
            .as_mut()
            .ok_or_else(|| Error::from(ErrorKind::NotConnected))?;
        let frame = serialize_frame(payload, self.max_frame_size)?;
        write_all(stream.as_mut(), timeout, &frame)
    }

    /// Close the peer connection, if any. The listener stays open.
    pub fn reset(&mut self) {
        if let Some(mut stream) = self.connection.take() {
            debug!(peer = %stream.peer(), "closing connection");
            let _ = stream.shutdown();
        }
    }

    /// Close everything.
    pub fn close(&mut self) {
        self.reset();
        self.listener = None;
    }
}
