//! Service announcement on the local network
//!
//! The endpoint starts its [`Discovery`] after binding and stops it on
//! close. Failures are logged and never stop the endpoint; retrying is up to
//! the implementation.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::info;

use crate::error::*;

/// DNS-SD service type of a vDC.
pub const SERVICE_TYPE: &str = "_ds-vdc._tcp";

/// What gets announced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryInfo {
    pub name: String,
    pub dsuid: String,
    pub port: u16,
}

pub trait Discovery: Send {
    fn start(&mut self, info: &DiscoveryInfo) -> Result<()>;

    /// Called once per work cycle.
    fn work(&mut self) {}

    fn stop(&mut self) {}
}

/// Announces nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDiscovery;

impl Discovery for NoDiscovery {
    fn start(&mut self, _info: &DiscoveryInfo) -> Result<()> {
        Ok(())
    }
}

/// The next name to try after `name` collided: `"vdc"` becomes `"vdc #2"`,
/// `"vdc #2"` becomes `"vdc #3"`.
pub fn alternative_service_name(name: &str) -> String {
    if let Some((base, n)) = name.rsplit_once(" #") {
        if let Ok(n) = n.parse::<u32>() {
            if n >= 1 {
                return format!("{} #{}", base, n.saturating_add(1));
            }
        }
    }
    format!("{} #2", name)
}

/// A service record as a DNS-SD responder would publish it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    pub name: String,
    pub service_type: &'static str,
    pub port: u16,
    pub txt: Vec<String>,
}

/// Builds the service record without talking to a responder.
///
/// Names listed with [`taken`](StaticAnnouncement::taken) count as already
/// used on the network and trigger renaming. The current record is readable
/// through the handle from [`record`](StaticAnnouncement::record), also after
/// the announcement was moved into an endpoint.
#[derive(Debug, Default, Clone)]
pub struct StaticAnnouncement {
    taken: HashSet<String>,
    record: Arc<Mutex<Option<ServiceRecord>>>,
}

impl StaticAnnouncement {
    pub fn new() -> Self {
        StaticAnnouncement::default()
    }

    pub fn taken<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.taken.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn record(&self) -> Arc<Mutex<Option<ServiceRecord>>> {
        self.record.clone()
    }

    fn set(&self, record: Option<ServiceRecord>) {
        *self.record.lock().unwrap_or_else(PoisonError::into_inner) = record;
    }
}

impl Discovery for StaticAnnouncement {
    fn start(&mut self, info: &DiscoveryInfo) -> Result<()> {
        if info.name.is_empty() {
            return Err(ErrorKind::Param("empty service name".into()).into());
        }
        let mut name = info.name.clone();
        while self.taken.contains(&name) {
            let next = alternative_service_name(&name);
            info!(from = %name, to = %next, "service name collision, renaming");
            name = next;
        }
        info!(name = %name, port = info.port, "announcing service");
        self.set(Some(ServiceRecord {
            name,
            service_type: SERVICE_TYPE,
            port: info.port,
            txt: vec![format!("dSUID={}", info.dsuid)],
        }));
        Ok(())
    }

    fn stop(&mut self) {
        self.set(None);
    }
}
