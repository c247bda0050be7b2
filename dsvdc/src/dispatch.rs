//! Routing of inbound messages

use tracing::{debug, info, warn};

use crate::config::RESERVED_REQUEST_ID;
use crate::endpoint::Session;
use crate::handler::Handler;
use crate::message::*;
use crate::properties::Property;
use crate::sansio::protocol::{decode_message, peek_message_id};
use crate::sansio::Admission;

fn reply(session: &mut Session, message_id: u32, code: ResultCode) {
    if let Err(e) = session.send_generic_response(message_id, code) {
        warn!(message_id, %code, error = %e, "could not send response");
    }
}

/// Log a message that lacks `field`; requests also get an error response.
fn missing(session: &mut Session, message_id: u32, kind: &str, field: &str) {
    warn!(message_id, kind, field, "dropping message without required field");
    if message_id != RESERVED_REQUEST_ID {
        reply(session, message_id, ResultCode::MissingData);
    }
}

/// Decode one frame payload and act on it.
pub(crate) fn handle_frame<H: Handler>(session: &mut Session, handler: &mut H, payload: &[u8]) {
    if payload.is_empty() {
        return;
    }

    let message = match decode_message(payload) {
        Ok(message) => message,
        Err(e) => {
            match peek_message_id(payload) {
                Some(id) if id != RESERVED_REQUEST_ID => {
                    warn!(message_id = id, error = %e, "unknown message");
                    reply(session, id, ResultCode::MessageUnknown);
                }
                _ => warn!(error = %e, "dropping undecodable message"),
            }
            return;
        }
    };

    debug!(
        message_id = message.message_id,
        kind = message.payload.name(),
        "message received"
    );

    match session.machine.admit(&message) {
        Admission::Deliver => dispatch(session, handler, message),
        Admission::Drop => {
            warn!(kind = message.payload.name(), "dropping message outside of a session")
        }
        Admission::Reject => {
            warn!(
                message_id = message.message_id,
                kind = message.payload.name(),
                "rejecting request outside of a session"
            );
            reply(session, message.message_id, ResultCode::ServiceNotAvailable);
        }
    }
}

pub(crate) fn dispatch<H: Handler>(session: &mut Session, handler: &mut H, message: Message) {
    let id = message.message_id;
    let kind = message.payload.name();

    match message.payload {
        Payload::VdsmRequestHello(hello) => handle_hello(session, handler, id, hello),
        Payload::VdsmSendBye(bye) => {
            let peer = session.disconnect();
            let dsuid = bye.dsuid.or(peer).unwrap_or_default();
            handler.on_bye(session, &dsuid);
        }
        Payload::VdsmSendPing(ping) => match ping.dsuid {
            None => missing(session, id, kind, "dsuid"),
            Some(dsuid) if dsuid == session.dsuid() => {
                if let Err(e) = session.send_pong(&dsuid) {
                    warn!(error = %e, "could not answer ping");
                }
            }
            Some(dsuid) => handler.on_ping(session, &dsuid),
        },
        Payload::VdsmSendRemove(remove) => match remove.dsuid {
            None => missing(session, id, kind, "dsuid"),
            Some(dsuid) => {
                let allowed = handler.on_remove(session, &dsuid);
                if id != RESERVED_REQUEST_ID {
                    let code = if allowed {
                        ResultCode::Ok
                    } else {
                        ResultCode::Forbidden
                    };
                    reply(session, id, code);
                }
            }
        },
        Payload::GenericResponse(response) => {
            if id == RESERVED_REQUEST_ID {
                debug!(code = %response.code, "ignoring response without message id");
            } else {
                session.complete(id, response.code);
            }
        }

        Payload::VdsmNotificationCallScene(n) => match (n.dsuid.is_empty(), n.scene) {
            (false, Some(scene)) => {
                handler.on_call_scene(session, &n.dsuid, scene, n.force, n.scope)
            }
            (true, _) => missing(session, id, kind, "dsuid"),
            (_, None) => missing(session, id, kind, "scene"),
        },
        Payload::VdsmNotificationSaveScene(n) => match (n.dsuid.is_empty(), n.scene) {
            (false, Some(scene)) => handler.on_save_scene(session, &n.dsuid, scene, n.scope),
            (true, _) => missing(session, id, kind, "dsuid"),
            (_, None) => missing(session, id, kind, "scene"),
        },
        Payload::VdsmNotificationUndoScene(n) => match (n.dsuid.is_empty(), n.scene) {
            (false, Some(scene)) => handler.on_undo_scene(session, &n.dsuid, scene, n.scope),
            (true, _) => missing(session, id, kind, "dsuid"),
            (_, None) => missing(session, id, kind, "scene"),
        },
        Payload::VdsmNotificationSetLocalPrio(n) => match (n.dsuid.is_empty(), n.scene) {
            (false, Some(scene)) => {
                handler.on_set_local_priority(session, &n.dsuid, scene, n.scope)
            }
            (true, _) => missing(session, id, kind, "dsuid"),
            (_, None) => missing(session, id, kind, "scene"),
        },
        Payload::VdsmNotificationCallMinScene(n) => match (n.dsuid.is_empty(), n.scene) {
            (false, Some(scene)) => handler.on_call_min_scene(session, &n.dsuid, scene, n.scope),
            (true, _) => missing(session, id, kind, "dsuid"),
            (_, None) => missing(session, id, kind, "scene"),
        },
        Payload::VdsmNotificationIdentify(n) => {
            if n.dsuid.is_empty() {
                missing(session, id, kind, "dsuid");
            } else {
                handler.on_identify(session, &n.dsuid, n.scope);
            }
        }
        Payload::VdsmNotificationSetControlValue(n) => match (n.dsuid.is_empty(), n.name, n.value) {
            (false, Some(name), Some(value)) => {
                handler.on_set_control_value(session, &n.dsuid, &name, value, n.scope)
            }
            (true, _, _) => missing(session, id, kind, "dsuid"),
            (_, None, _) => missing(session, id, kind, "name"),
            (_, _, None) => missing(session, id, kind, "value"),
        },
        Payload::VdsmNotificationSetOutputChannelValue(n) => {
            match (n.dsuid.is_empty(), n.channel, n.value) {
                (false, Some(channel), Some(value)) => handler.on_set_output_channel_value(
                    session,
                    &n.dsuid,
                    n.apply_now,
                    channel,
                    value,
                    n.scope,
                ),
                (true, _, _) => missing(session, id, kind, "dsuid"),
                (_, None, _) => missing(session, id, kind, "channel"),
                (_, _, None) => missing(session, id, kind, "value"),
            }
        }

        Payload::VdsmRequestGetProperty(request) => {
            let Some((dsuid, query)) =
                property_request(session, id, kind, request.dsuid, request.query)
            else {
                return;
            };
            handler.on_get_property(session, &dsuid, &query, Property::for_request(id));
        }
        Payload::VdsmRequestSetProperty(request) => {
            let Some((dsuid, values)) =
                property_request(session, id, kind, request.dsuid, request.properties)
            else {
                return;
            };
            handler.on_set_property(session, &dsuid, &values, Property::for_request(id));
        }

        Payload::VdcResponseHello(_)
        | Payload::VdcSendPong(_)
        | Payload::VdcSendAnnounceVdc(_)
        | Payload::VdcSendAnnounceDevice(_)
        | Payload::VdcSendVanish(_)
        | Payload::VdcSendIdentify(_)
        | Payload::VdcResponseGetProperty(_)
        | Payload::VdcSendPushProperty(_) => {
            warn!(message_id = id, kind, "message not meant for this side");
            if id != RESERVED_REQUEST_ID {
                reply(session, id, ResultCode::MessageUnknown);
            }
        }
    }
}

fn handle_hello<H: Handler>(
    session: &mut Session,
    handler: &mut H,
    id: u32,
    hello: VdsmRequestHello,
) {
    let peer = match session.machine.check_hello(id, &hello) {
        Ok(peer) => peer,
        Err(e) => {
            warn!(message_id = id, error = %e, "dropping hello");
            return;
        }
    };

    let response = Message::new(
        id,
        VdcResponseHello {
            dsuid: session.dsuid().into(),
        },
    );
    if let Err(e) = session.send(&response) {
        warn!(error = %e, "could not answer hello");
        return;
    }

    info!(peer = %peer, "session started");
    session.machine.activate(peer);
    handler.on_hello(session);
}

/// Validate the common part of get and set property requests.
fn property_request(
    session: &mut Session,
    id: u32,
    kind: &str,
    dsuid: Option<String>,
    elements: Vec<PropertyElement>,
) -> Option<(String, Property)> {
    if id == RESERVED_REQUEST_ID {
        warn!(kind, "dropping property request without message id");
        return None;
    }
    let Some(dsuid) = dsuid else {
        missing(session, id, kind, "dsuid");
        return None;
    };
    match Property::from_elements(elements) {
        Ok(property) => Some((dsuid, property)),
        Err(e) => {
            warn!(message_id = id, error = %e, "malformed property elements");
            reply(session, id, ResultCode::InvalidValueType);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Connection;
    use crate::config::EndpointConfig;
    use crate::sansio::protocol::encode_message;
    use crate::sansio::SessionState;
    use std::os::unix::net::UnixStream;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
        allow_remove: bool,
    }

    impl Handler for Recorder {
        fn on_hello(&mut self, session: &mut Session) {
            self.events
                .push(format!("hello {}", session.peer_dsuid().unwrap_or("")));
        }

        fn on_bye(&mut self, _session: &mut Session, dsuid: &str) {
            self.events.push(format!("bye {}", dsuid));
        }

        fn on_remove(&mut self, _session: &mut Session, dsuid: &str) -> bool {
            self.events.push(format!("remove {}", dsuid));
            self.allow_remove
        }

        fn on_ping(&mut self, session: &mut Session, dsuid: &str) {
            self.events.push(format!("ping {}", dsuid));
            session.send_pong(dsuid).unwrap();
        }

        fn on_call_scene(
            &mut self,
            _session: &mut Session,
            dsuids: &[String],
            scene: i32,
            force: bool,
            scope: Scope,
        ) {
            self.events.push(format!(
                "call_scene {:?} {} {} {:?} {:?}",
                dsuids, scene, force, scope.group, scope.zone_id
            ));
        }

        fn on_get_property(
            &mut self,
            session: &mut Session,
            dsuid: &str,
            query: &Property,
            mut response: Property,
        ) {
            self.events.push(format!("get {} {}", dsuid, query.len()));
            for node in query {
                if let Some(name) = node.name() {
                    response.add_string(name, format!("{}-value", name));
                }
            }
            session.send_property_response(response).unwrap();
        }
    }

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn setup() -> (Session, Recorder, Connection) {
        let (ours, theirs) = UnixStream::pair().unwrap();
        let session = Session::for_stream("D1", &EndpointConfig::default(), Box::new(ours));
        (
            session,
            Recorder::default(),
            Connection::from_stream(Box::new(theirs)),
        )
    }

    fn feed(session: &mut Session, handler: &mut Recorder, message: Message) {
        let payload = encode_message(&message).unwrap();
        handle_frame(session, handler, &payload);
    }

    fn hello(session: &mut Session, handler: &mut Recorder, peer: &mut Connection) {
        feed(
            session,
            handler,
            Message::new(
                1,
                VdsmRequestHello {
                    dsuid: Some("VDSM".into()),
                    api_version: Some(2),
                },
            ),
        );
        let m = peer.recv(TIMEOUT).unwrap();
        assert_eq!(
            m,
            Message::new(1, VdcResponseHello { dsuid: "D1".into() })
        );
    }

    #[test]
    fn test_hello_version_mismatch() {
        let (mut session, mut handler, mut peer) = setup();
        feed(
            &mut session,
            &mut handler,
            Message::new(
                1,
                VdsmRequestHello {
                    dsuid: Some("VDSM".into()),
                    api_version: Some(1),
                },
            ),
        );
        assert_eq!(*session.state(), SessionState::Connected);
        assert!(handler.events.is_empty());
        assert_eq!(
            *peer.recv(Duration::from_millis(50)).unwrap_err().kind(),
            crate::ErrorKind::Timeout
        );
    }

    #[test]
    fn test_hello_then_callback() {
        let (mut session, mut handler, mut peer) = setup();
        hello(&mut session, &mut handler, &mut peer);
        assert!(session.is_session_active());
        assert_eq!(session.peer_dsuid(), Some("VDSM"));
        assert_eq!(handler.events, vec!["hello VDSM"]);
    }

    #[test]
    fn test_requests_before_hello_are_rejected() {
        let (mut session, mut handler, mut peer) = setup();
        feed(
            &mut session,
            &mut handler,
            Message::new(
                9,
                GetProperty {
                    dsuid: Some("D2".into()),
                    query: vec![],
                },
            ),
        );
        feed(
            &mut session,
            &mut handler,
            Message::notification(VdsmSendPing {
                dsuid: Some("D1".into()),
            }),
        );
        assert_eq!(
            peer.recv(TIMEOUT).unwrap(),
            Message::generic_response(9, ResultCode::ServiceNotAvailable)
        );
        assert!(peer.recv(Duration::from_millis(50)).is_err());
        assert!(handler.events.is_empty());
    }

    #[test]
    fn test_ping_routing() {
        let (mut session, mut handler, mut peer) = setup();
        hello(&mut session, &mut handler, &mut peer);

        feed(
            &mut session,
            &mut handler,
            Message::notification(VdsmSendPing {
                dsuid: Some("D1".into()),
            }),
        );
        assert_eq!(
            peer.recv(TIMEOUT).unwrap(),
            Message::notification(VdcSendPong { dsuid: "D1".into() })
        );

        feed(
            &mut session,
            &mut handler,
            Message::notification(VdsmSendPing {
                dsuid: Some("D2".into()),
            }),
        );
        assert_eq!(
            peer.recv(TIMEOUT).unwrap(),
            Message::notification(VdcSendPong { dsuid: "D2".into() })
        );
        assert_eq!(handler.events, vec!["hello VDSM", "ping D2"]);
    }

    #[test]
    fn test_bye_ends_session() {
        let (mut session, mut handler, mut peer) = setup();
        hello(&mut session, &mut handler, &mut peer);

        feed(
            &mut session,
            &mut handler,
            Message::notification(VdsmSendBye {
                dsuid: Some("D1".into()),
            }),
        );
        assert!(!session.is_connected());
        assert_eq!(*session.state(), SessionState::Disconnected);
        assert_eq!(handler.events, vec!["hello VDSM", "bye D1"]);
    }

    #[test]
    fn test_remove_answers() {
        let (mut session, mut handler, mut peer) = setup();
        hello(&mut session, &mut handler, &mut peer);

        feed(
            &mut session,
            &mut handler,
            Message::new(
                4,
                VdsmSendRemove {
                    dsuid: Some("D2".into()),
                },
            ),
        );
        assert_eq!(
            peer.recv(TIMEOUT).unwrap(),
            Message::generic_response(4, ResultCode::Forbidden)
        );

        handler.allow_remove = true;
        feed(
            &mut session,
            &mut handler,
            Message::new(
                5,
                VdsmSendRemove {
                    dsuid: Some("D2".into()),
                },
            ),
        );
        assert_eq!(
            peer.recv(TIMEOUT).unwrap(),
            Message::generic_response(5, ResultCode::Ok)
        );

        feed(&mut session, &mut handler, Message::new(6, VdsmSendRemove::default()));
        assert_eq!(
            peer.recv(TIMEOUT).unwrap(),
            Message::generic_response(6, ResultCode::MissingData)
        );
    }

    #[test]
    fn test_notification_scope_defaults() {
        let (mut session, mut handler, mut peer) = setup();
        hello(&mut session, &mut handler, &mut peer);

        feed(
            &mut session,
            &mut handler,
            Message::notification(CallScene {
                dsuid: vec!["D2".into()],
                scene: Some(5),
                force: true,
                scope: Scope {
                    group: Some(0),
                    zone_id: None,
                },
            }),
        );
        // a notice without a scene is dropped without a reply
        feed(
            &mut session,
            &mut handler,
            Message::notification(CallScene {
                dsuid: vec!["D2".into()],
                ..Default::default()
            }),
        );
        assert_eq!(
            handler.events[1],
            r#"call_scene ["D2"] 5 true Some(0) None"#
        );
        assert_eq!(handler.events.len(), 2);
        assert!(peer.recv(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_get_property() {
        let (mut session, mut handler, mut peer) = setup();
        hello(&mut session, &mut handler, &mut peer);

        let mut query = Property::new();
        query.push(crate::properties::Node::nested(Some("name".into()), vec![]));
        feed(
            &mut session,
            &mut handler,
            Message::new(
                12,
                GetProperty {
                    dsuid: Some("D2".into()),
                    query: query.into_elements(),
                },
            ),
        );

        let m = peer.recv(TIMEOUT).unwrap();
        assert_eq!(m.message_id, 12);
        let Payload::VdcResponseGetProperty(r) = m.payload else {
            panic!("expected property response");
        };
        let p = Property::from_elements(r.properties).unwrap();
        assert_eq!(p.get_string(0).unwrap(), "name-value");
        assert_eq!(handler.events[1], "get D2 1");
    }

    #[test]
    fn test_default_set_property_is_not_implemented() {
        let (mut session, mut handler, mut peer) = setup();
        hello(&mut session, &mut handler, &mut peer);

        feed(
            &mut session,
            &mut handler,
            Message::new(
                13,
                SetProperty {
                    dsuid: Some("D2".into()),
                    properties: vec![],
                },
            ),
        );
        assert_eq!(
            peer.recv(TIMEOUT).unwrap(),
            Message::generic_response(13, ResultCode::NotImplemented)
        );
    }

    #[test]
    fn test_unknown_message_kind() {
        let (mut session, mut handler, mut peer) = setup();
        hello(&mut session, &mut handler, &mut peer);

        handle_frame(
            &mut session,
            &mut handler,
            br#"{"message_id":21,"vdsm_request_frobnicate":{}}"#,
        );
        assert_eq!(
            peer.recv(TIMEOUT).unwrap(),
            Message::generic_response(21, ResultCode::MessageUnknown)
        );

        handle_frame(&mut session, &mut handler, b"garbage");
        assert!(peer.recv(Duration::from_millis(50)).is_err());
        assert!(session.is_session_active());
    }
}
