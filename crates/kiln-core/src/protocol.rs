//! Request and response envelopes exchanged with the daemon.
//!
//! Both envelopes are serialized as JSON with externally tagged,
//! `snake_case` variants:
//!
//! ```text
//! request:  {"create":{"name":"web"}}
//! response: {"error":0,"result":{"list":{"names":["web"]}}}
//! response: {"error":3,"error_msg":"container web already exists"}
//! ```

use crate::error::{CallError, ErrorCode};
use serde::{Deserialize, Serialize};

/// One operation sent to the daemon. Exactly one variant per request.
///
/// Unknown fields are rejected, so a misspelt raw request fails to parse
/// instead of being sent with the field silently dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum Request {
    Create {
        name: String,
    },
    Destroy {
        name: String,
    },
    List {},
    PropertyList {},
    DataList {},
    Get {
        names: Vec<String>,
        variables: Vec<String>,
    },
    GetProperty {
        name: String,
        property: String,
    },
    SetProperty {
        name: String,
        property: String,
        value: String,
    },
    GetData {
        name: String,
        data: String,
    },
    Start {
        name: String,
    },
    Stop {
        name: String,
    },
    Kill {
        name: String,
        signal: i32,
    },
    Pause {
        name: String,
    },
    Resume {
        name: String,
    },
    Wait {
        names: Vec<String>,
    },
    CreateVolume {
        path: String,
        source: String,
        quota: String,
        flags: String,
    },
    DestroyVolume {
        path: String,
    },
    ListVolumes {},
    Version {},
}

impl Request {
    /// Operation name as it appears on the wire.
    pub fn method(&self) -> &'static str {
        match self {
            Request::Create { .. } => "create",
            Request::Destroy { .. } => "destroy",
            Request::List {} => "list",
            Request::PropertyList {} => "property_list",
            Request::DataList {} => "data_list",
            Request::Get { .. } => "get",
            Request::GetProperty { .. } => "get_property",
            Request::SetProperty { .. } => "set_property",
            Request::GetData { .. } => "get_data",
            Request::Start { .. } => "start",
            Request::Stop { .. } => "stop",
            Request::Kill { .. } => "kill",
            Request::Pause { .. } => "pause",
            Request::Resume { .. } => "resume",
            Request::Wait { .. } => "wait",
            Request::CreateVolume { .. } => "create_volume",
            Request::DestroyVolume { .. } => "destroy_volume",
            Request::ListVolumes {} => "list_volumes",
            Request::Version {} => "version",
        }
    }
}

/// A `(name, description)` pair from the property or data listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl Descriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// One variable of one container in a bulk `get` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetKeyValue {
    pub variable: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// All requested variables of one container in a bulk `get` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetEntry {
    pub name: String,
    #[serde(default)]
    pub keyval: Vec<GetKeyValue>,
}

/// A volume as reported by `list_volumes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeDescription {
    pub path: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub quota: String,
    #[serde(default)]
    pub flags: String,
    #[serde(default)]
    pub used: u64,
    #[serde(default)]
    pub available: u64,
}

/// Daemon build identification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub tag: String,
    pub revision: String,
}

/// Operation-specific part of a successful reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponsePayload {
    List {
        #[serde(default)]
        names: Vec<String>,
    },
    PropertyList {
        #[serde(default)]
        list: Vec<Descriptor>,
    },
    DataList {
        #[serde(default)]
        list: Vec<Descriptor>,
    },
    Get {
        #[serde(default)]
        list: Vec<GetEntry>,
    },
    GetProperty {
        value: String,
    },
    GetData {
        value: String,
    },
    Version(Version),
    Wait {
        name: String,
    },
    VolumeList {
        #[serde(default)]
        list: Vec<VolumeDescription>,
    },
}

/// A reply from the daemon.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub error: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ResponsePayload>,
}

impl Response {
    /// Successful reply without a payload.
    pub fn ok() -> Self {
        Self::default()
    }

    /// Successful reply carrying `payload`.
    pub fn success(payload: ResponsePayload) -> Self {
        Self {
            error: 0,
            error_msg: String::new(),
            result: Some(payload),
        }
    }

    /// Failed reply. The payload is always absent.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: code.as_raw(),
            error_msg: message.into(),
            result: None,
        }
    }

    pub fn code(&self) -> ErrorCode {
        ErrorCode::from_raw(self.error)
    }

    /// Split the reply into its payload or the server-reported error.
    ///
    /// A non-zero error code hides whatever payload came along with it.
    pub fn into_result(self) -> Result<Option<ResponsePayload>, CallError> {
        if self.error != 0 {
            return Err(CallError::server(self.code(), self.error_msg));
        }
        Ok(self.result)
    }
}
