//! Message kinds exchanged with the session manager
//!
//! Every frame carries one [`Message`]: an envelope with the request id and a
//! tagged [`Payload`]. The JSON layout is produced by serde from these types.
//! Fields a well-behaved peer always sends are still `Option`s here, so the
//! dispatcher can answer a message that lacks them with
//! [`ResultCode::MissingData`] instead of failing to decode it.

use serde::{Deserialize, Serialize};

use crate::config::RESERVED_REQUEST_ID;
use crate::properties::Value;

/// Result codes carried by [`GenericResponse`].
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    #[serde(rename = "ERR_OK")]
    Ok,
    #[serde(rename = "ERR_MESSAGE_UNKNOWN")]
    MessageUnknown,
    #[serde(rename = "ERR_INCOMPATIBLE_API")]
    IncompatibleApi,
    #[serde(rename = "ERR_SERVICE_NOT_AVAILABLE")]
    ServiceNotAvailable,
    #[serde(rename = "ERR_INSUFFICIENT_STORAGE")]
    InsufficientStorage,
    #[serde(rename = "ERR_FORBIDDEN")]
    Forbidden,
    #[serde(rename = "ERR_NOT_IMPLEMENTED")]
    NotImplemented,
    #[serde(rename = "ERR_NO_CONTENT_FOR_ARRAY")]
    NoContentForArray,
    #[serde(rename = "ERR_INVALID_VALUE_TYPE")]
    InvalidValueType,
    #[serde(rename = "ERR_MISSING_SUBMESSAGE")]
    MissingSubmessage,
    #[serde(rename = "ERR_MISSING_DATA")]
    MissingData,
    #[serde(rename = "ERR_NOT_FOUND")]
    NotFound,
    #[serde(rename = "ERR_NOT_AUTHORIZED")]
    NotAuthorized,
}

impl ResultCode {
    pub fn description(self) -> &'static str {
        match self {
            ResultCode::Ok => "OK",
            ResultCode::MessageUnknown => "Unknown message type",
            ResultCode::IncompatibleApi => "Incompatible API version",
            ResultCode::ServiceNotAvailable => "Service not available",
            ResultCode::InsufficientStorage => "Insufficient storage",
            ResultCode::Forbidden => "Forbidden",
            ResultCode::NotImplemented => "Not implemented",
            ResultCode::NoContentForArray => "Array data was expected",
            ResultCode::InvalidValueType => "Invalid data type",
            ResultCode::MissingSubmessage => "Protocol error, missing submessage",
            ResultCode::MissingData => "Missing protocol data",
            ResultCode::NotFound => "Requested entity was not found",
            ResultCode::NotAuthorized => "Not authorized to perform requested action",
        }
    }

    pub fn is_ok(self) -> bool {
        self == ResultCode::Ok
    }
}

impl std::fmt::Display for ResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

fn is_reserved(id: &u32) -> bool {
    *id == RESERVED_REQUEST_ID
}

/// One framed message.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Message {
    #[serde(default, skip_serializing_if = "is_reserved")]
    pub message_id: u32,
    #[serde(flatten)]
    pub payload: Payload,
}

impl Message {
    pub fn new(message_id: u32, payload: impl Into<Payload>) -> Self {
        Message {
            message_id,
            payload: payload.into(),
        }
    }

    /// A message without correlation id.
    pub fn notification(payload: impl Into<Payload>) -> Self {
        Message::new(RESERVED_REQUEST_ID, payload)
    }

    pub fn generic_response(message_id: u32, code: ResultCode) -> Self {
        Message::new(
            message_id,
            GenericResponse {
                code,
                description: Some(code.description().into()),
            },
        )
    }
}

/// The closed set of message kinds, tagged by their protocol name.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    GenericResponse(GenericResponse),

    VdsmRequestHello(VdsmRequestHello),
    VdcResponseHello(VdcResponseHello),
    VdsmSendPing(VdsmSendPing),
    VdcSendPong(VdcSendPong),
    VdsmSendBye(VdsmSendBye),
    VdsmSendRemove(VdsmSendRemove),

    VdcSendAnnounceVdc(VdcSendAnnounceVdc),
    VdcSendAnnounceDevice(VdcSendAnnounceDevice),
    VdcSendVanish(VdcSendVanish),
    VdcSendIdentify(VdcSendIdentify),

    VdsmNotificationCallScene(CallScene),
    VdsmNotificationSaveScene(SaveScene),
    VdsmNotificationUndoScene(UndoScene),
    VdsmNotificationSetLocalPrio(SetLocalPrio),
    VdsmNotificationCallMinScene(CallMinScene),
    VdsmNotificationIdentify(Identify),
    VdsmNotificationSetControlValue(SetControlValue),
    VdsmNotificationSetOutputChannelValue(SetOutputChannelValue),

    VdsmRequestGetProperty(GetProperty),
    VdcResponseGetProperty(GetPropertyResponse),
    VdsmRequestSetProperty(SetProperty),
    VdcSendPushProperty(PushProperty),
}

impl Payload {
    /// Protocol name of this kind, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Payload::GenericResponse(_) => "generic_response",
            Payload::VdsmRequestHello(_) => "vdsm_request_hello",
            Payload::VdcResponseHello(_) => "vdc_response_hello",
            Payload::VdsmSendPing(_) => "vdsm_send_ping",
            Payload::VdcSendPong(_) => "vdc_send_pong",
            Payload::VdsmSendBye(_) => "vdsm_send_bye",
            Payload::VdsmSendRemove(_) => "vdsm_send_remove",
            Payload::VdcSendAnnounceVdc(_) => "vdc_send_announce_vdc",
            Payload::VdcSendAnnounceDevice(_) => "vdc_send_announce_device",
            Payload::VdcSendVanish(_) => "vdc_send_vanish",
            Payload::VdcSendIdentify(_) => "vdc_send_identify",
            Payload::VdsmNotificationCallScene(_) => "vdsm_notification_call_scene",
            Payload::VdsmNotificationSaveScene(_) => "vdsm_notification_save_scene",
            Payload::VdsmNotificationUndoScene(_) => "vdsm_notification_undo_scene",
            Payload::VdsmNotificationSetLocalPrio(_) => "vdsm_notification_set_local_prio",
            Payload::VdsmNotificationCallMinScene(_) => "vdsm_notification_call_min_scene",
            Payload::VdsmNotificationIdentify(_) => "vdsm_notification_identify",
            Payload::VdsmNotificationSetControlValue(_) => {
                "vdsm_notification_set_control_value"
            }
            Payload::VdsmNotificationSetOutputChannelValue(_) => {
                "vdsm_notification_set_output_channel_value"
            }
            Payload::VdsmRequestGetProperty(_) => "vdsm_request_get_property",
            Payload::VdcResponseGetProperty(_) => "vdc_response_get_property",
            Payload::VdsmRequestSetProperty(_) => "vdsm_request_set_property",
            Payload::VdcSendPushProperty(_) => "vdc_send_push_property",
        }
    }
}

macro_rules! payload_from {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for Payload {
                fn from(v: $ty) -> Self {
                    Payload::$variant(v)
                }
            }
        )*
    };
}

payload_from! {
    GenericResponse(GenericResponse),
    VdsmRequestHello(VdsmRequestHello),
    VdcResponseHello(VdcResponseHello),
    VdsmSendPing(VdsmSendPing),
    VdcSendPong(VdcSendPong),
    VdsmSendBye(VdsmSendBye),
    VdsmSendRemove(VdsmSendRemove),
    VdcSendAnnounceVdc(VdcSendAnnounceVdc),
    VdcSendAnnounceDevice(VdcSendAnnounceDevice),
    VdcSendVanish(VdcSendVanish),
    VdcSendIdentify(VdcSendIdentify),
    VdsmNotificationCallScene(CallScene),
    VdsmNotificationSaveScene(SaveScene),
    VdsmNotificationUndoScene(UndoScene),
    VdsmNotificationSetLocalPrio(SetLocalPrio),
    VdsmNotificationCallMinScene(CallMinScene),
    VdsmNotificationIdentify(Identify),
    VdsmNotificationSetControlValue(SetControlValue),
    VdsmNotificationSetOutputChannelValue(SetOutputChannelValue),
    VdsmRequestGetProperty(GetProperty),
    VdcResponseGetProperty(GetPropertyResponse),
    VdsmRequestSetProperty(SetProperty),
    VdcSendPushProperty(PushProperty),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GenericResponse {
    pub code: ResultCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct VdsmRequestHello {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dsuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VdcResponseHello {
    pub dsuid: String,
}

/// Single-target messages: ping, bye, remove.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct VdsmSendPing {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dsuid: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VdcSendPong {
    pub dsuid: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct VdsmSendBye {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dsuid: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct VdsmSendRemove {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dsuid: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VdcSendAnnounceVdc {
    pub dsuid: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VdcSendAnnounceDevice {
    pub dsuid: String,
    pub vdc_dsuid: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VdcSendVanish {
    pub dsuid: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VdcSendIdentify {
    pub dsuid: String,
}

/// Group and zone qualifiers of a notification. Absent means unset, which is
/// not the same as zero.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Scope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_id: Option<i32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct CallScene {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dsuid: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene: Option<i32>,
    #[serde(default)]
    pub force: bool,
    #[serde(flatten)]
    pub scope: Scope,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct SaveScene {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dsuid: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene: Option<i32>,
    #[serde(flatten)]
    pub scope: Scope,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct UndoScene {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dsuid: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene: Option<i32>,
    #[serde(flatten)]
    pub scope: Scope,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct SetLocalPrio {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dsuid: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene: Option<i32>,
    #[serde(flatten)]
    pub scope: Scope,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct CallMinScene {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dsuid: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene: Option<i32>,
    #[serde(flatten)]
    pub scope: Scope,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Identify {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dsuid: Vec<String>,
    #[serde(flatten)]
    pub scope: Scope,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct SetControlValue {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dsuid: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "crate::properties::finite_option"
    )]
    pub value: Option<f64>,
    #[serde(flatten)]
    pub scope: Scope,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct SetOutputChannelValue {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dsuid: Vec<String>,
    #[serde(default)]
    pub apply_now: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<i32>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "crate::properties::finite_option"
    )]
    pub value: Option<f64>,
    #[serde(flatten)]
    pub scope: Scope,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct GetProperty {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dsuid: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub query: Vec<PropertyElement>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct GetPropertyResponse {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<PropertyElement>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct SetProperty {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dsuid: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<PropertyElement>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PushProperty {
    pub dsuid: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<PropertyElement>,
}

/// Wire form of one property node. A node carries either a value or nested
/// elements; [`Property`](crate::Property) enforces that when converting.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct PropertyElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub elements: Vec<PropertyElement>,
}
