use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::os::unix::io::AsRawFd;
use std::os::unix::net::UnixStream;
use std::time::Duration;

use crate::error::*;

/// A connected byte stream the transport can frame messages over.
pub trait Stream: Read + Write + Send + Sync + AsRawFd {
    fn shutdown(&mut self) -> Result<()>;
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()>;
    fn set_write_timeout(&mut self, timeout: Option<Duration>) -> Result<()>;
    /// Human readable peer address for logging.
    fn peer(&self) -> String;
}

impl Stream for TcpStream {
    #[inline]
    fn shutdown(&mut self) -> Result<()> {
        TcpStream::shutdown(self, Shutdown::Both)?;
        Ok(())
    }

    #[inline]
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        TcpStream::set_read_timeout(self, timeout)?;
        Ok(())
    }

    #[inline]
    fn set_write_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        TcpStream::set_write_timeout(self, timeout)?;
        Ok(())
    }

    fn peer(&self) -> String {
        self.peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "<unknown>".into())
    }
}

impl Stream for UnixStream {
    #[inline]
    fn shutdown(&mut self) -> Result<()> {
        UnixStream::shutdown(self, Shutdown::Both)?;
        Ok(())
    }

    #[inline]
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        UnixStream::set_read_timeout(self, timeout)?;
        Ok(())
    }

    #[inline]
    fn set_write_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        UnixStream::set_write_timeout(self, timeout)?;
        Ok(())
    }

    fn peer(&self) -> String {
        "unix".into()
    }
}
