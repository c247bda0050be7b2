use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use static_assertions::assert_impl_all;

use crate::client::Connection;
use crate::message::*;
use crate::*;

const OWN: &str = "D1";
const DEVICE: &str = "D2";
const VDSM: &str = "VDSM";
const WAIT: Duration = Duration::from_secs(2);

#[derive(Default)]
struct Recorder {
    hellos: usize,
    byes: Vec<String>,
    pings: Vec<String>,
}

impl Handler for Recorder {
    fn on_hello(&mut self, _session: &mut Session) {
        self.hellos += 1;
    }

    fn on_bye(&mut self, _session: &mut Session, dsuid: &str) {
        self.byes.push(dsuid.into());
    }

    fn on_ping(&mut self, session: &mut Session, dsuid: &str) {
        self.pings.push(dsuid.into());
        session.send_pong(dsuid).unwrap();
    }

    fn on_get_property(
        &mut self,
        session: &mut Session,
        dsuid: &str,
        query: &Property,
        mut response: Property,
    ) {
        if query.find("name").is_some() {
            response.add_string("name", format!("device {}", dsuid));
        }
        let mut output = Property::new();
        output.add_uint("function", 1).add_bool("variableRamp", true);
        response.add_property("outputDescription", output);
        session.send_property_response(response).unwrap();
    }
}

assert_impl_all!(Endpoint<Recorder>: Send, Sync);

fn config() -> EndpointConfig {
    EndpointConfig {
        bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
        io_timeout: Duration::from_millis(500),
        ..Default::default()
    }
}

fn endpoint(config: EndpointConfig) -> Endpoint<Recorder> {
    Endpoint::with_config(OWN, Recorder::default(), config).unwrap()
}

fn connect(endpoint: &Endpoint<Recorder>) -> Connection {
    let peer = Connection::connect((Ipv4Addr::LOCALHOST, endpoint.port())).unwrap();
    endpoint.work(WAIT).unwrap();
    assert!(endpoint.is_connected());
    peer
}

fn handshake(endpoint: &Endpoint<Recorder>, peer: &mut Connection) {
    let id = peer
        .request(VdsmRequestHello {
            dsuid: Some(VDSM.into()),
            api_version: Some(SUPPORTED_API_VERSION),
        })
        .unwrap();
    endpoint.work(WAIT).unwrap();
    let reply = peer.recv(WAIT).unwrap();
    assert_eq!(reply, Message::new(id, VdcResponseHello { dsuid: OWN.into() }));
    assert!(endpoint.is_session_active());
}

#[test]
fn test_hello_with_unsupported_version() {
    let endpoint = endpoint(config());
    let mut peer = connect(&endpoint);

    peer.request(VdsmRequestHello {
        dsuid: Some(VDSM.into()),
        api_version: Some(1),
    })
    .unwrap();
    endpoint.work(WAIT).unwrap();

    assert!(peer.recv(Duration::from_millis(100)).is_err());
    endpoint.with_session(|s| assert_eq!(*s.state(), SessionState::Connected));
    assert_eq!(endpoint.with_handler(|h| h.hellos), 0);
    assert_eq!(endpoint.peer_dsuid(), None);
}

#[test]
fn test_handshake() {
    let endpoint = endpoint(config());
    let mut peer = connect(&endpoint);
    handshake(&endpoint, &mut peer);
    assert_eq!(endpoint.peer_dsuid().as_deref(), Some(VDSM));
    assert_eq!(endpoint.with_handler(|h| h.hellos), 1);
}

#[test]
fn test_announce_device() {
    let endpoint = endpoint(config());
    let mut peer = connect(&endpoint);
    handshake(&endpoint, &mut peer);

    let results = Arc::new(Mutex::new(Vec::new()));
    let r = results.clone();
    let id = endpoint
        .announce_device(OWN, DEVICE, move |_, result| {
            r.lock().unwrap().push(result.map_err(|e| e.kind().clone()))
        })
        .unwrap();

    let request = peer.recv(WAIT).unwrap();
    assert_eq!(request.message_id, id);
    assert_eq!(
        request.payload,
        Payload::VdcSendAnnounceDevice(VdcSendAnnounceDevice {
            dsuid: DEVICE.into(),
            vdc_dsuid: OWN.into(),
        })
    );

    peer.send(&Message::generic_response(id, ResultCode::Ok)).unwrap();
    endpoint.work(WAIT).unwrap();
    endpoint.work(Duration::ZERO).unwrap();

    assert_eq!(*results.lock().unwrap(), vec![Ok(ResultCode::Ok)]);
    endpoint.with_session(|s| assert_eq!(s.pending_requests(), 0));
}

#[test]
fn test_bye_ends_session() {
    let endpoint = endpoint(config());
    let mut peer = connect(&endpoint);
    handshake(&endpoint, &mut peer);

    peer.send(&Message::notification(VdsmSendBye {
        dsuid: Some(OWN.into()),
    }))
    .unwrap();
    endpoint.work(WAIT).unwrap();

    assert!(!endpoint.is_connected());
    endpoint.with_session(|s| assert_eq!(*s.state(), SessionState::Disconnected));
    assert_eq!(endpoint.with_handler(|h| h.byes.clone()), vec![OWN.to_string()]);
    assert!(peer.recv(WAIT).is_err());

    endpoint.work(Duration::from_millis(10)).unwrap();
    assert_eq!(endpoint.with_handler(|h| h.byes.len()), 1);
}

#[test]
fn test_second_peer_is_rejected() {
    let endpoint = endpoint(config());
    let mut first = connect(&endpoint);
    handshake(&endpoint, &mut first);

    let mut second = Connection::connect((Ipv4Addr::LOCALHOST, endpoint.port())).unwrap();
    endpoint.work(WAIT).unwrap();

    assert_eq!(
        second.recv(WAIT).unwrap(),
        Message::generic_response(RESERVED_REQUEST_ID, ResultCode::ServiceNotAvailable)
    );
    assert!(second.recv(WAIT).is_err());

    // the first peer is untouched
    assert!(endpoint.is_session_active());
    first
        .send(&Message::notification(VdsmSendPing {
            dsuid: Some(OWN.into()),
        }))
        .unwrap();
    endpoint.work(WAIT).unwrap();
    assert_eq!(
        first.recv(WAIT).unwrap(),
        Message::notification(VdcSendPong { dsuid: OWN.into() })
    );
    assert!(endpoint.with_handler(|h| h.pings.is_empty()));
}

#[test]
fn test_unanswered_request_times_out() {
    let endpoint = endpoint(EndpointConfig {
        response_timeout: Duration::from_millis(20),
        sweep_interval: Duration::ZERO,
        ..config()
    });
    let mut peer = connect(&endpoint);
    handshake(&endpoint, &mut peer);

    let results = Arc::new(Mutex::new(Vec::new()));
    let r = results.clone();
    endpoint
        .announce_container(OWN, move |_, result| {
            r.lock().unwrap().push(result.unwrap_err().kind().clone())
        })
        .unwrap();

    thread::sleep(Duration::from_millis(50));
    endpoint.work(Duration::ZERO).unwrap();
    assert_eq!(*results.lock().unwrap(), vec![ErrorKind::Timeout]);
    assert!(endpoint.is_connected());
}

#[test]
fn test_connection_loss_flushes_pending() {
    let endpoint = endpoint(config());
    let mut peer = connect(&endpoint);
    handshake(&endpoint, &mut peer);

    let results = Arc::new(Mutex::new(Vec::new()));
    for _ in 0..3 {
        let r = results.clone();
        endpoint
            .announce_container(OWN, move |_, result| {
                r.lock().unwrap().push(result.unwrap_err().kind().clone())
            })
            .unwrap();
    }

    drop(peer);
    endpoint.work(WAIT).unwrap();

    assert_eq!(*results.lock().unwrap(), vec![ErrorKind::NotConnected; 3]);
    assert!(!endpoint.is_connected());
    // a lost connection is not a goodbye
    assert!(endpoint.with_handler(|h| h.byes.is_empty()));

    // the endpoint accepts the next session manager
    let mut peer = connect(&endpoint);
    handshake(&endpoint, &mut peer);
}

#[test]
fn test_close_stops_everything() {
    let announcement = StaticAnnouncement::new();
    let record = announcement.record();
    let endpoint =
        Endpoint::with_discovery(OWN, Recorder::default(), config(), announcement).unwrap();

    let announced = record.lock().unwrap().clone().unwrap();
    assert_eq!(announced.port, endpoint.port());
    assert_eq!(announced.txt, vec![format!("dSUID={}", OWN)]);

    let mut peer = connect(&endpoint);
    handshake(&endpoint, &mut peer);

    let results = Arc::new(Mutex::new(Vec::new()));
    let r = results.clone();
    endpoint
        .announce_container(OWN, move |_, result| {
            r.lock().unwrap().push(result.unwrap_err().kind().clone())
        })
        .unwrap();

    endpoint.close();
    assert_eq!(*results.lock().unwrap(), vec![ErrorKind::NotConnected]);
    assert!(record.lock().unwrap().is_none());
    assert_eq!(
        *endpoint.work(Duration::ZERO).unwrap_err().kind(),
        ErrorKind::NotConnected
    );
    assert_eq!(
        *endpoint.identify_device(DEVICE).unwrap_err().kind(),
        ErrorKind::NotConnected
    );
}

#[test]
fn test_empty_dsuid_is_refused() {
    let e = Endpoint::with_config("", Recorder::default(), config())
        .err()
        .unwrap();
    assert!(matches!(e.kind(), ErrorKind::Param(_)));
}

#[test]
fn test_session_from_client_thread() {
    let endpoint = endpoint(config());
    let port = endpoint.port();

    let client = thread::spawn(move || -> Result<Vec<Message>> {
        let mut peer = Connection::connect((Ipv4Addr::LOCALHOST, port))?;
        let own = peer.hello(VDSM, SUPPORTED_API_VERSION, WAIT)?;
        assert_eq!(own, OWN);

        let mut seen = Vec::new();

        peer.send(&Message::notification(VdsmSendPing {
            dsuid: Some(DEVICE.into()),
        }))?;
        seen.push(peer.recv(WAIT)?);

        let mut query = Property::new();
        query.push(Node::nested(Some("name".into()), Vec::new()));
        let id = peer.request(GetProperty {
            dsuid: Some(DEVICE.into()),
            query: query.into_elements(),
        })?;
        seen.push(peer.recv_response(id, WAIT, |_| {})?);

        peer.send(&Message::notification(VdsmSendBye {
            dsuid: Some(OWN.into()),
        }))?;
        Ok(seen)
    });

    while !client.is_finished() || endpoint.is_connected() {
        endpoint.work(Duration::from_millis(50)).unwrap();
    }
    let seen = client.join().unwrap().unwrap();

    assert_eq!(
        seen[0],
        Message::notification(VdcSendPong {
            dsuid: DEVICE.into()
        })
    );
    let Payload::VdcResponseGetProperty(ref response) = seen[1].payload else {
        panic!("expected property response, got {}", seen[1].payload.name());
    };
    let properties = Property::from_elements(response.properties.clone()).unwrap();
    assert_eq!(properties.get_string(0).unwrap(), "device D2");
    let output = properties.get_property_by_name("outputDescription").unwrap();
    assert_eq!(output.get_uint(0).unwrap(), 1);
    assert!(output.get_bool(1).unwrap());

    assert_eq!(endpoint.with_handler(|h| h.pings.clone()), vec![DEVICE.to_string()]);
    assert_eq!(endpoint.with_handler(|h| h.byes.clone()), vec![OWN.to_string()]);
}
