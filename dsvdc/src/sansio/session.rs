//! Session state machine.
//!
//! Tracks `Disconnected -> Connected -> Active -> Disconnected` and decides
//! which inbound messages get through in each state. It performs no I/O; the
//! endpoint feeds it transport events and acts on its answers.

use super::types::SessionState;
use crate::config::RESERVED_REQUEST_ID;
use crate::error::*;
use crate::message::{Message, Payload, VdsmRequestHello};

/// What to do with an inbound message in the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Deliver,
    Drop,
    /// Drop it and tell the peer the service is not available yet.
    Reject,
}

#[derive(Debug)]
pub struct SessionMachine {
    state: SessionState,
    api_version: u32,
}

impl SessionMachine {
    pub fn new(api_version: u32) -> Self {
        SessionMachine {
            state: SessionState::Disconnected,
            api_version,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn peer(&self) -> Option<&str> {
        match &self.state {
            SessionState::Active { peer } => Some(peer),
            _ => None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state != SessionState::Disconnected
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Active { .. })
    }

    /// The transport accepted a peer.
    pub fn connected(&mut self) {
        self.state = SessionState::Connected;
    }

    /// Validate a handshake request and return the peer's dSUID.
    pub fn check_hello(&self, message_id: u32, hello: &VdsmRequestHello) -> Result<String> {
        if message_id == RESERVED_REQUEST_ID {
            return Err(ErrorKind::Protocol("hello without message id".into()).into());
        }
        match hello.api_version {
            Some(v) if v == self.api_version => {}
            Some(v) => {
                return Err(ErrorKind::Protocol(format!(
                    "unsupported api version {}, expected {}",
                    v, self.api_version
                ))
                .into())
            }
            None => return Err(ErrorKind::Protocol("hello without api version".into()).into()),
        }
        match &hello.dsuid {
            Some(dsuid) if !dsuid.is_empty() => Ok(dsuid.clone()),
            _ => Err(ErrorKind::Protocol("hello without dsuid".into()).into()),
        }
    }

    /// The handshake reply went out; the session is up.
    pub fn activate(&mut self, peer: String) {
        self.state = SessionState::Active { peer };
    }

    pub fn admit(&self, message: &Message) -> Admission {
        match self.state {
            SessionState::Disconnected => Admission::Drop,
            SessionState::Active { .. } => Admission::Deliver,
            SessionState::Connected => match message.payload {
                Payload::VdsmRequestHello(_)
                | Payload::VdsmSendBye(_)
                | Payload::GenericResponse(_) => Admission::Deliver,
                _ if message.message_id != RESERVED_REQUEST_ID => Admission::Reject,
                _ => Admission::Drop,
            },
        }
    }

    /// The connection is gone. Returns the peer of the ended session, if any.
    pub fn disconnected(&mut self) -> Option<String> {
        match std::mem::take(&mut self.state) {
            SessionState::Active { peer } => Some(peer),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{VdsmSendPing, VdsmSendRemove};

    fn hello(version: u32) -> VdsmRequestHello {
        VdsmRequestHello {
            dsuid: Some("VDSM".into()),
            api_version: Some(version),
        }
    }

    #[test]
    fn test_handshake() {
        let mut m = SessionMachine::new(2);
        assert!(!m.is_connected());
        m.connected();
        assert_eq!(*m.state(), SessionState::Connected);

        let peer = m.check_hello(1, &hello(2)).unwrap();
        m.activate(peer);
        assert!(m.is_active());
        assert_eq!(m.peer(), Some("VDSM"));

        assert_eq!(m.disconnected(), Some("VDSM".into()));
        assert_eq!(*m.state(), SessionState::Disconnected);
        assert_eq!(m.disconnected(), None);
    }

    #[test]
    fn test_hello_rejections() {
        let m = SessionMachine::new(2);
        assert!(m.check_hello(1, &hello(1)).is_err());
        assert!(m.check_hello(0, &hello(2)).is_err());
        assert!(m
            .check_hello(
                1,
                &VdsmRequestHello {
                    dsuid: None,
                    api_version: Some(2)
                }
            )
            .is_err());
        assert!(m
            .check_hello(
                1,
                &VdsmRequestHello {
                    dsuid: Some("X".into()),
                    api_version: None
                }
            )
            .is_err());
    }

    #[test]
    fn test_admission_before_handshake() {
        let mut m = SessionMachine::new(2);
        let ping = Message::notification(VdsmSendPing::default());
        assert_eq!(m.admit(&ping), Admission::Drop);

        m.connected();
        assert_eq!(m.admit(&Message::new(1, hello(2))), Admission::Deliver);
        assert_eq!(m.admit(&ping), Admission::Drop);
        assert_eq!(
            m.admit(&Message::new(5, VdsmSendRemove::default())),
            Admission::Reject
        );

        m.activate("VDSM".into());
        assert_eq!(m.admit(&ping), Admission::Deliver);
    }
}
