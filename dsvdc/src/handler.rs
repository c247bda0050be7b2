//! Application callbacks

use crate::endpoint::Session;
use crate::message::{ResultCode, Scope};
use crate::properties::Property;
use tracing::warn;

/// Device logic plugged into an [`Endpoint`](crate::Endpoint).
///
/// Every method has a default, so implementors only override the messages
/// they care about. All methods run inside [`Endpoint::work`](crate::Endpoint::work)
/// and get the [`Session`] so they can answer right away.
pub trait Handler: Send {
    /// The session manager completed the handshake.
    fn on_hello(&mut self, _session: &mut Session) {}

    /// The session manager ended the session. The connection is already closed.
    fn on_bye(&mut self, _session: &mut Session, _dsuid: &str) {}

    /// The session manager asks to remove a device. Return `true` to allow it.
    fn on_remove(&mut self, _session: &mut Session, _dsuid: &str) -> bool {
        false
    }

    /// Ping for one of this endpoint's devices. Answer with
    /// [`Session::send_pong`]. Pings for the endpoint itself are answered
    /// automatically and never show up here.
    fn on_ping(&mut self, _session: &mut Session, _dsuid: &str) {}

    fn on_call_scene(
        &mut self,
        _session: &mut Session,
        _dsuids: &[String],
        _scene: i32,
        _force: bool,
        _scope: Scope,
    ) {
    }

    fn on_save_scene(
        &mut self,
        _session: &mut Session,
        _dsuids: &[String],
        _scene: i32,
        _scope: Scope,
    ) {
    }

    fn on_undo_scene(
        &mut self,
        _session: &mut Session,
        _dsuids: &[String],
        _scene: i32,
        _scope: Scope,
    ) {
    }

    fn on_set_local_priority(
        &mut self,
        _session: &mut Session,
        _dsuids: &[String],
        _scene: i32,
        _scope: Scope,
    ) {
    }

    fn on_call_min_scene(
        &mut self,
        _session: &mut Session,
        _dsuids: &[String],
        _scene: i32,
        _scope: Scope,
    ) {
    }

    fn on_identify(&mut self, _session: &mut Session, _dsuids: &[String], _scope: Scope) {}

    fn on_set_control_value(
        &mut self,
        _session: &mut Session,
        _dsuids: &[String],
        _name: &str,
        _value: f64,
        _scope: Scope,
    ) {
    }

    fn on_set_output_channel_value(
        &mut self,
        _session: &mut Session,
        _dsuids: &[String],
        _apply_now: bool,
        _channel: i32,
        _value: f64,
        _scope: Scope,
    ) {
    }

    /// Property query for `dsuid`. Fill `response` and hand it to
    /// [`Session::send_property_response`].
    fn on_get_property(
        &mut self,
        session: &mut Session,
        _dsuid: &str,
        _query: &Property,
        response: Property,
    ) {
        let id = response.message_id();
        if let Err(e) = session.send_generic_response(id, ResultCode::NotImplemented) {
            warn!(error = %e, "dropped getProperty reply");
        }
    }

    /// Property update for `dsuid`. Apply `values` and acknowledge with
    /// [`Session::send_set_property_response`].
    fn on_set_property(
        &mut self,
        session: &mut Session,
        _dsuid: &str,
        _values: &Property,
        response: Property,
    ) {
        if let Err(e) = session.send_set_property_response(response, ResultCode::NotImplemented) {
            warn!(error = %e, "dropped setProperty reply");
        }
    }
}
