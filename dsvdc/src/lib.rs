//!Device side of the vDC session protocol
//!
//!A virtual device connector (vDC) makes devices available to a session
//!manager (vdSM). The vdSM connects over TCP, performs a handshake, and from
//!then on exchanges length-prefixed messages with the vDC: scene calls,
//!property queries, pings, and announcements of the devices the vDC hosts.
//!
//!This crate implements the vDC end of that conversation. An [`Endpoint`]
//!listens for the single vdSM it serves, runs the session state machine,
//!answers what it can answer itself, and forwards everything else to a
//![`Handler`] supplied by the application.
//!
//!```rust,no_run
//!use std::time::Duration;
//!use dsvdc::{Endpoint, Handler, Property, Session};
//!
//!const LAMP: &str = "198C033E330755E78015F97AD093DD1C01";
//!
//!struct Vdc;
//!
//!impl Handler for Vdc {
//!    fn on_hello(&mut self, session: &mut Session) {
//!        let container = session.dsuid().to_string();
//!        let vdc = container.clone();
//!        let _ = session.announce_container(&vdc, move |session, result| {
//!            if let Ok(code) = result {
//!                if code.is_ok() {
//!                    let _ = session.announce_device(&container, LAMP, |_, _| {});
//!                }
//!            }
//!        });
//!    }
//!
//!    fn on_ping(&mut self, session: &mut Session, dsuid: &str) {
//!        if dsuid == LAMP {
//!            let _ = session.send_pong(dsuid);
//!        }
//!    }
//!
//!    fn on_get_property(
//!        &mut self,
//!        session: &mut Session,
//!        _dsuid: &str,
//!        _query: &Property,
//!        mut response: Property,
//!    ) {
//!        response.add_string("name", "Lamp");
//!        let _ = session.send_property_response(response);
//!    }
//!}
//!
//!let endpoint = Endpoint::new("198C033E330755E78015F97AD093DD1C00", Vdc)?;
//!loop {
//!    endpoint.work(Duration::from_secs(2))?;
//!}
//!# Ok::<(), dsvdc::Error>(())
//!```
//!
//!Requests the vDC sends, such as announcements, are answered asynchronously.
//!Their completion runs from a later [`Endpoint::work`] call with the result
//!code of the reply, or with a timeout or not-connected error if the reply
//!never comes.

pub mod cache;
pub mod client;
pub mod config;
mod dispatch;
pub mod discovery;
pub mod dsuid;
pub mod endpoint;
pub mod error;
pub mod handler;
pub mod message;
pub mod properties;
pub mod sansio;
pub mod store;
pub mod stream;
pub mod transport;

pub use crate::config::{
    EndpointConfig, DEFAULT_PORT, DSUID_LENGTH, MAX_FRAME_SIZE, RESERVED_REQUEST_ID,
    SUPPORTED_API_VERSION,
};
pub use crate::discovery::{Discovery, DiscoveryInfo, NoDiscovery, StaticAnnouncement};
pub use crate::dsuid::{parse_dsuid, random_dsuid};
pub use crate::endpoint::{Completion, Endpoint, Session};
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::handler::Handler;
pub use crate::message::{ResultCode, Scope};
pub use crate::properties::legacy::LegacyProperty;
pub use crate::properties::{Node, Property, Value, ValueType};
pub use crate::sansio::SessionState;
pub use crate::store::{JsonFileStore, PropertyStore};

#[cfg(test)]
mod test;
