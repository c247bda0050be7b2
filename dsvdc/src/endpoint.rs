//! The endpoint and its session

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::cache::RequestCache;
use crate::config::{EndpointConfig, RESERVED_REQUEST_ID};
use crate::discovery::{Discovery, DiscoveryInfo, NoDiscovery};
use crate::dispatch;
use crate::error::*;
use crate::handler::Handler;
use crate::message::*;
use crate::properties::legacy::LegacyProperty;
use crate::properties::Property;
use crate::sansio::protocol::encode_message;
use crate::sansio::{SessionMachine, SessionState};
use crate::transport::{Accepted, Transport};

/// Runs once the session manager answers an endpoint request, with the
/// result code of its reply, or with a [`ErrorKind::Timeout`] or
/// [`ErrorKind::NotConnected`] error when no reply will come.
pub type Completion = Box<dyn FnOnce(&mut Session, Result<ResultCode>) + Send>;

/// Connection state and the send primitives.
///
/// Handlers and completions receive `&mut Session` and may send from inside
/// a callback. Outside of callbacks use [`Endpoint::with_session`] or the
/// forwarding methods on [`Endpoint`].
pub struct Session {
    dsuid: String,
    pub(crate) transport: Transport,
    pub(crate) machine: SessionMachine,
    pub(crate) cache: RequestCache<Completion>,
    request_id: u32,
}

impl Session {
    fn new(dsuid: String, config: &EndpointConfig, transport: Transport) -> Self {
        Session {
            dsuid,
            transport,
            machine: SessionMachine::new(config.api_version),
            cache: RequestCache::new(config.response_timeout, config.sweep_interval),
            request_id: RESERVED_REQUEST_ID,
        }
    }

    /// A session over an already connected stream, past the accept step.
    #[cfg(test)]
    pub(crate) fn for_stream(
        dsuid: &str,
        config: &EndpointConfig,
        stream: Box<dyn crate::stream::Stream>,
    ) -> Self {
        let transport = Transport::with_stream(stream, config);
        let mut session = Session::new(dsuid.into(), config, transport);
        session.machine.connected();
        session
    }

    /// This endpoint's own dSUID.
    pub fn dsuid(&self) -> &str {
        &self.dsuid
    }

    /// dSUID of the session manager once the handshake completed.
    pub fn peer_dsuid(&self) -> Option<&str> {
        self.machine.peer()
    }

    pub fn state(&self) -> &SessionState {
        self.machine.state()
    }

    pub fn port(&self) -> u16 {
        self.transport.port()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn is_session_active(&self) -> bool {
        self.machine.is_active()
    }

    /// Number of requests still waiting for a reply.
    pub fn pending_requests(&self) -> usize {
        self.cache.len()
    }

    pub(crate) fn send(&mut self, message: &Message) -> Result<()> {
        let payload = encode_message(message)?;
        self.transport.write_frame(&payload)?;
        debug!(
            message_id = message.message_id,
            kind = message.payload.name(),
            "message sent"
        );
        Ok(())
    }

    fn next_request_id(&mut self) -> u32 {
        loop {
            self.request_id = self.request_id.wrapping_add(1);
            if self.request_id != RESERVED_REQUEST_ID && !self.cache.contains(self.request_id) {
                return self.request_id;
            }
        }
    }

    /// Send a request and keep `completion` until its reply arrives. Returns
    /// the request id. A failed send returns the error and drops `completion`
    /// without calling it.
    fn request<F>(&mut self, payload: impl Into<Payload>, completion: F) -> Result<u32>
    where
        F: FnOnce(&mut Session, Result<ResultCode>) + Send + 'static,
    {
        let id = self.next_request_id();
        self.send(&Message::new(id, payload))?;
        self.cache.register(id, Box::new(completion))?;
        Ok(id)
    }

    /// Announce a device container (vDC) to the session manager.
    pub fn announce_container<F>(&mut self, dsuid: &str, completion: F) -> Result<u32>
    where
        F: FnOnce(&mut Session, Result<ResultCode>) + Send + 'static,
    {
        self.request(
            VdcSendAnnounceVdc {
                dsuid: dsuid.into(),
            },
            completion,
        )
    }

    /// Announce a device living in `container`.
    pub fn announce_device<F>(&mut self, container: &str, dsuid: &str, completion: F) -> Result<u32>
    where
        F: FnOnce(&mut Session, Result<ResultCode>) + Send + 'static,
    {
        self.request(
            VdcSendAnnounceDevice {
                dsuid: dsuid.into(),
                vdc_dsuid: container.into(),
            },
            completion,
        )
    }

    pub fn send_generic_response(&mut self, message_id: u32, code: ResultCode) -> Result<()> {
        self.send(&Message::generic_response(message_id, code))
    }

    pub fn send_pong(&mut self, dsuid: &str) -> Result<()> {
        self.send(&Message::notification(VdcSendPong {
            dsuid: dsuid.into(),
        }))
    }

    pub fn device_vanished(&mut self, dsuid: &str) -> Result<()> {
        self.send(&Message::notification(VdcSendVanish {
            dsuid: dsuid.into(),
        }))
    }

    pub fn identify_device(&mut self, dsuid: &str) -> Result<()> {
        self.send(&Message::notification(VdcSendIdentify {
            dsuid: dsuid.into(),
        }))
    }

    /// Push property values for `dsuid` without being asked.
    pub fn push_property(&mut self, dsuid: &str, property: Property) -> Result<()> {
        self.send(&Message::notification(PushProperty {
            dsuid: dsuid.into(),
            properties: property.into_elements(),
        }))
    }

    /// Answer the property query `property` was handed out for.
    pub fn send_property_response(&mut self, property: Property) -> Result<()> {
        let id = property.message_id();
        if id == RESERVED_REQUEST_ID {
            return Err(ErrorKind::Param("property tree does not answer a request".into()).into());
        }
        self.send(&Message::new(
            id,
            GetPropertyResponse {
                properties: property.into_elements(),
            },
        ))
    }

    /// Acknowledge the property update `property` was handed out for.
    pub fn send_set_property_response(
        &mut self,
        property: Property,
        code: ResultCode,
    ) -> Result<()> {
        let id = property.message_id();
        if id == RESERVED_REQUEST_ID {
            return Err(ErrorKind::Param("property tree does not answer a request".into()).into());
        }
        self.send_generic_response(id, code)
    }

    /// Answer a property query with rows. An unsound tree is not sent; the
    /// peer gets an error response for the request instead.
    pub fn send_legacy_property_response(&mut self, property: LegacyProperty) -> Result<()> {
        let id = property.message_id();
        match property.into_property() {
            Ok(property) => self.send_property_response(property),
            Err(e) => {
                warn!(message_id = id, error = %e, "refusing to send property rows");
                if id != RESERVED_REQUEST_ID {
                    self.send_generic_response(id, ResultCode::NoContentForArray)?;
                }
                Err(e)
            }
        }
    }

    /// Hand a reply to the request it answers.
    pub(crate) fn complete(&mut self, message_id: u32, code: ResultCode) {
        match self.cache.take(message_id) {
            Some(request) => {
                debug!(message_id, %code, "request completed");
                (request.completion)(self, Ok(code));
            }
            None => debug!(message_id, "response for unknown request"),
        }
    }

    fn fail_all(&mut self, expired: Vec<(crate::cache::PendingRequest<Completion>, ErrorKind)>) {
        for (request, kind) in expired {
            debug!(message_id = request.id, error = %kind, "request abandoned");
            (request.completion)(self, Err(kind.into()));
        }
    }

    pub(crate) fn sweep(&mut self, now: Instant) {
        let expired = self.cache.sweep(now, self.transport.is_connected());
        self.fail_all(expired);
    }

    pub(crate) fn accept_incoming(&mut self) {
        let reject = match encode_message(&Message::generic_response(
            RESERVED_REQUEST_ID,
            ResultCode::ServiceNotAvailable,
        )) {
            Ok(reject) => reject,
            Err(e) => {
                warn!(error = %e, "cannot encode rejection");
                return;
            }
        };
        match self.transport.accept(&reject) {
            Ok(Accepted::Connected(_)) => self.machine.connected(),
            Ok(Accepted::Rejected(_)) => {}
            Err(e) => warn!(error = %e, "accept failed"),
        }
    }

    /// Close the connection and fail everything still pending. Returns the
    /// peer of the session that ended, if one was active.
    pub(crate) fn disconnect(&mut self) -> Option<String> {
        self.transport.reset();
        let peer = self.machine.disconnected();
        if let Some(peer) = &peer {
            info!(peer = %peer, "session ended");
        }
        let pending = self.cache.flush();
        self.fail_all(pending);
        peer
    }

    #[cfg(test)]
    pub(crate) fn set_request_counter(&mut self, id: u32) {
        self.request_id = id;
    }
}

struct Inner<H> {
    session: Session,
    handler: H,
    discovery: Box<dyn Discovery>,
    closed: bool,
}

/// A virtual device connector serving one session manager at a time.
///
/// All state sits behind one lock. Drive the endpoint by calling
/// [`work`](Endpoint::work) in a loop; every callback runs from there.
///
/// ```no_run
/// use std::time::Duration;
/// use dsvdc::{Endpoint, Handler, Session};
///
/// struct Lamp;
///
/// impl Handler for Lamp {
///     fn on_hello(&mut self, session: &mut Session) {
///         let container = session.dsuid().to_string();
///         let _ = session.announce_container(&container, |_, result| {
///             println!("announced: {:?}", result);
///         });
///     }
/// }
///
/// let endpoint = Endpoint::new("198C033E330755E78015F97AD093DD1C00", Lamp)?;
/// println!("listening on {}", endpoint.port());
/// loop {
///     endpoint.work(Duration::from_secs(2))?;
/// }
/// # Ok::<(), dsvdc::Error>(())
/// ```
pub struct Endpoint<H: Handler> {
    inner: Mutex<Inner<H>>,
}

impl<H: Handler> Endpoint<H> {
    pub fn new(dsuid: &str, handler: H) -> Result<Self> {
        Self::with_config(dsuid, handler, EndpointConfig::default())
    }

    pub fn with_config(dsuid: &str, handler: H, config: EndpointConfig) -> Result<Self> {
        Self::with_discovery(dsuid, handler, config, NoDiscovery)
    }

    /// Bind the listening socket and start `discovery`. A discovery failure
    /// is logged and does not stop the endpoint.
    pub fn with_discovery<D>(
        dsuid: &str,
        handler: H,
        config: EndpointConfig,
        discovery: D,
    ) -> Result<Self>
    where
        D: Discovery + 'static,
    {
        if dsuid.is_empty() {
            return Err(ErrorKind::Param("empty dsuid".into()).into());
        }
        if config.max_frame_size == 0 || config.max_frame_size > u16::MAX as usize {
            return Err(ErrorKind::Param(format!(
                "max frame size {} out of range",
                config.max_frame_size
            ))
            .into());
        }

        let transport = Transport::listen(&config)?;
        let mut discovery: Box<dyn Discovery> = Box::new(discovery);
        let info = DiscoveryInfo {
            name: config.name.clone(),
            dsuid: dsuid.into(),
            port: transport.port(),
        };
        if let Err(e) = discovery.start(&info) {
            warn!(error = %e, "discovery unavailable");
        }

        info!(dsuid, port = transport.port(), "endpoint ready");
        Ok(Endpoint {
            inner: Mutex::new(Inner {
                session: Session::new(dsuid.into(), &config, transport),
                handler,
                discovery,
                closed: false,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner<H>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// One work cycle: expire pending requests, wait up to `timeout` for the
    /// socket, then accept a connection and handle one message if ready.
    pub fn work(&self, timeout: Duration) -> Result<()> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if inner.closed {
            return Err(ErrorKind::NotConnected.into());
        }

        inner.discovery.work();
        inner.session.sweep(Instant::now());

        let ready = inner.session.transport.poll(timeout)?;
        if ready.incoming {
            inner.session.accept_incoming();
        }
        if ready.readable {
            match inner.session.transport.read_frame() {
                Ok(frame) => dispatch::handle_frame(&mut inner.session, &mut inner.handler, &frame),
                Err(_) => {
                    inner.session.disconnect();
                }
            }
        }
        Ok(())
    }

    /// Run `f` with the session, for sending from outside a callback.
    pub fn with_session<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        f(&mut self.lock().session)
    }

    pub fn with_handler<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        f(&mut self.lock().handler)
    }

    pub fn dsuid(&self) -> String {
        self.lock().session.dsuid().into()
    }

    pub fn port(&self) -> u16 {
        self.lock().session.port()
    }

    pub fn peer_dsuid(&self) -> Option<String> {
        self.lock().session.peer_dsuid().map(String::from)
    }

    pub fn is_connected(&self) -> bool {
        self.lock().session.is_connected()
    }

    pub fn is_session_active(&self) -> bool {
        self.lock().session.is_session_active()
    }

    pub fn announce_container<F>(&self, dsuid: &str, completion: F) -> Result<u32>
    where
        F: FnOnce(&mut Session, Result<ResultCode>) + Send + 'static,
    {
        self.with_session(|s| s.announce_container(dsuid, completion))
    }

    pub fn announce_device<F>(&self, container: &str, dsuid: &str, completion: F) -> Result<u32>
    where
        F: FnOnce(&mut Session, Result<ResultCode>) + Send + 'static,
    {
        self.with_session(|s| s.announce_device(container, dsuid, completion))
    }

    pub fn send_pong(&self, dsuid: &str) -> Result<()> {
        self.with_session(|s| s.send_pong(dsuid))
    }

    pub fn device_vanished(&self, dsuid: &str) -> Result<()> {
        self.with_session(|s| s.device_vanished(dsuid))
    }

    pub fn identify_device(&self, dsuid: &str) -> Result<()> {
        self.with_session(|s| s.identify_device(dsuid))
    }

    pub fn push_property(&self, dsuid: &str, property: Property) -> Result<()> {
        self.with_session(|s| s.push_property(dsuid, property))
    }

    /// Close the connection and the listener, fail pending requests with
    /// [`ErrorKind::NotConnected`] and stop discovery. Later calls to
    /// [`work`](Endpoint::work) fail.
    pub fn close(&self) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if inner.closed {
            return;
        }
        inner.closed = true;
        inner.session.disconnect();
        inner.session.transport.close();
        inner.discovery.stop();
        info!(dsuid = inner.session.dsuid(), "endpoint closed");
    }
}

impl<H: Handler> Drop for Endpoint<H> {
    fn drop(&mut self) {
        self.close();
    }
}
