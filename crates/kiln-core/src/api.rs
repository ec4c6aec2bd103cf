//! Typed container and volume operations.
//!
//! Each method builds exactly one [`Request`] variant, hands it to the
//! [`RpcClient`], and unpacks the matching [`ResponsePayload`] variant.
//! Payloads are only looked at after the engine reported success.

use crate::config::ClientOptions;
use crate::error::{CallError, ErrorCode, Result};
use crate::protocol::{Descriptor, Request, Response, ResponsePayload, Version, VolumeDescription};
use crate::retry::RetryPolicy;
use crate::rpc::RpcClient;
use crate::transport::{Connector, UnixConnector};
use std::collections::BTreeMap;

/// One variable of one container from [`Client::get`].
///
/// A failed lookup of a single variable is reported here instead of
/// failing the whole call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetValue {
    pub error: ErrorCode,
    pub message: String,
    pub value: Option<String>,
}

impl GetValue {
    pub fn is_ok(&self) -> bool {
        self.error.is_success()
    }
}

/// Container name -> variable name -> value.
pub type GetResult = BTreeMap<String, BTreeMap<String, GetValue>>;

/// Client for the kiln daemon control socket.
///
/// # Example
///
/// ```rust,ignore
/// use kiln_core::{Client, ClientOptions};
///
/// let mut client = Client::new(ClientOptions::new().with_socket_path("/run/kilnd.socket"));
/// client.create("web")?;
/// client.set_property("web", "command", "sleep 1000")?;
/// client.start("web")?;
/// println!("{:?}", client.list()?);
/// ```
pub struct Client<C: Connector = UnixConnector> {
    rpc: RpcClient<C>,
}

impl Client<UnixConnector> {
    pub fn new(options: ClientOptions) -> Self {
        Self {
            rpc: RpcClient::new(&options),
        }
    }
}

impl<C: Connector> Client<C> {
    /// Client over a custom connector.
    pub fn with_connector(connector: C, policy: RetryPolicy) -> Self {
        Self {
            rpc: RpcClient::with_connector(connector, policy),
        }
    }

    /// The underlying engine.
    pub fn rpc(&self) -> &RpcClient<C> {
        &self.rpc
    }

    pub fn rpc_mut(&mut self) -> &mut RpcClient<C> {
        &mut self.rpc
    }

    /// Send a request whose reply carries no payload.
    fn execute(&mut self, request: Request) -> Result<()> {
        self.rpc.call(request).map(|_| ())
    }

    /// Send a request and require a payload in the reply.
    fn query(&mut self, request: Request) -> Result<ResponsePayload> {
        let method = request.method();
        self.rpc
            .call(request)?
            .ok_or_else(|| CallError::protocol(format!("Reply to {} carries no result", method)))
    }

    pub fn create(&mut self, name: &str) -> Result<()> {
        self.execute(Request::Create { name: name.into() })
    }

    pub fn destroy(&mut self, name: &str) -> Result<()> {
        self.execute(Request::Destroy { name: name.into() })
    }

    pub fn start(&mut self, name: &str) -> Result<()> {
        self.execute(Request::Start { name: name.into() })
    }

    pub fn stop(&mut self, name: &str) -> Result<()> {
        self.execute(Request::Stop { name: name.into() })
    }

    /// Send `signal` to the container's tasks.
    pub fn kill(&mut self, name: &str, signal: i32) -> Result<()> {
        self.execute(Request::Kill {
            name: name.into(),
            signal,
        })
    }

    pub fn pause(&mut self, name: &str) -> Result<()> {
        self.execute(Request::Pause { name: name.into() })
    }

    pub fn resume(&mut self, name: &str) -> Result<()> {
        self.execute(Request::Resume { name: name.into() })
    }

    /// Container names in the order the daemon returned them.
    pub fn list(&mut self) -> Result<Vec<String>> {
        match self.query(Request::List {})? {
            ResponsePayload::List { names } => Ok(names),
            other => Err(unexpected("list", &other)),
        }
    }

    /// Properties the daemon supports, with descriptions.
    pub fn property_list(&mut self) -> Result<Vec<Descriptor>> {
        match self.query(Request::PropertyList {})? {
            ResponsePayload::PropertyList { list } => Ok(list),
            other => Err(unexpected("property_list", &other)),
        }
    }

    /// Read-only data fields the daemon supports, with descriptions.
    pub fn data_list(&mut self) -> Result<Vec<Descriptor>> {
        match self.query(Request::DataList {})? {
            ResponsePayload::DataList { list } => Ok(list),
            other => Err(unexpected("data_list", &other)),
        }
    }

    /// Read several variables of several containers in one round trip.
    ///
    /// Entries the daemon could not resolve carry their own error code; the
    /// call as a whole still succeeds.
    pub fn get<N, V>(&mut self, names: &[N], variables: &[V]) -> Result<GetResult>
    where
        N: AsRef<str>,
        V: AsRef<str>,
    {
        let request = Request::Get {
            names: names.iter().map(|n| n.as_ref().to_string()).collect(),
            variables: variables.iter().map(|v| v.as_ref().to_string()).collect(),
        };

        let list = match self.query(request)? {
            ResponsePayload::Get { list } => list,
            other => return Err(unexpected("get", &other)),
        };

        let mut result = GetResult::new();
        for entry in list {
            let values = result.entry(entry.name).or_default();
            for keyval in entry.keyval {
                let value = GetValue {
                    error: ErrorCode::from_raw(keyval.error.unwrap_or(0)),
                    message: keyval.error_msg.unwrap_or_default(),
                    value: keyval.value,
                };
                values.insert(keyval.variable, value);
            }
        }
        Ok(result)
    }

    pub fn get_property(&mut self, name: &str, property: &str) -> Result<String> {
        let request = Request::GetProperty {
            name: name.into(),
            property: property.into(),
        };
        match self.query(request)? {
            ResponsePayload::GetProperty { value } => Ok(value),
            other => Err(unexpected("get_property", &other)),
        }
    }

    pub fn set_property(&mut self, name: &str, property: &str, value: &str) -> Result<()> {
        self.execute(Request::SetProperty {
            name: name.into(),
            property: property.into(),
            value: value.into(),
        })
    }

    pub fn get_data(&mut self, name: &str, data: &str) -> Result<String> {
        let request = Request::GetData {
            name: name.into(),
            data: data.into(),
        };
        match self.query(request)? {
            ResponsePayload::GetData { value } => Ok(value),
            other => Err(unexpected("get_data", &other)),
        }
    }

    pub fn version(&mut self) -> Result<Version> {
        match self.query(Request::Version {})? {
            ResponsePayload::Version(version) => Ok(version),
            other => Err(unexpected("version", &other)),
        }
    }

    /// Block until the daemon reports that one of `names` stopped or died.
    ///
    /// Returns that container's name. There is no client-side timeout;
    /// configure a receive timeout on the client to bound the wait.
    pub fn wait<N: AsRef<str>>(&mut self, names: &[N]) -> Result<String> {
        let request = Request::Wait {
            names: names.iter().map(|n| n.as_ref().to_string()).collect(),
        };
        match self.query(request)? {
            ResponsePayload::Wait { name } => Ok(name),
            other => Err(unexpected("wait", &other)),
        }
    }

    /// Create a volume. Arguments are passed through unchecked; the daemon
    /// validates them.
    pub fn create_volume(
        &mut self,
        path: &str,
        source: &str,
        quota: &str,
        flags: &str,
    ) -> Result<()> {
        self.execute(Request::CreateVolume {
            path: path.into(),
            source: source.into(),
            quota: quota.into(),
            flags: flags.into(),
        })
    }

    pub fn destroy_volume(&mut self, path: &str) -> Result<()> {
        self.execute(Request::DestroyVolume { path: path.into() })
    }

    pub fn list_volumes(&mut self) -> Result<Vec<VolumeDescription>> {
        match self.query(Request::ListVolumes {})? {
            ResponsePayload::VolumeList { list } => Ok(list),
            other => Err(unexpected("list_volumes", &other)),
        }
    }

    /// Send a request given as JSON text and return the reply as JSON text.
    ///
    /// Text that does not parse into a complete request is rejected before
    /// any connection is attempted.
    pub fn raw(&mut self, message: &str) -> Result<String> {
        let request: Request = serde_json::from_str(message)
            .map_err(|e| CallError::local(format!("Cannot parse request: {}", e)))?;

        let result = self.rpc.call(request)?;
        let response = match result {
            Some(payload) => Response::success(payload),
            None => Response::ok(),
        };
        serde_json::to_string(&response)
            .map_err(|e| CallError::protocol(format!("Cannot render reply: {}", e)))
    }
}

fn unexpected(method: &str, payload: &ResponsePayload) -> CallError {
    CallError::protocol(format!(
        "Unexpected result for {}: {:?}",
        method, payload
    ))
}
