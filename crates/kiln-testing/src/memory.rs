//! In-memory daemon state machine.
//!
//! Containers move between these states:
//!
//! ```text
//! stopped --start--> running --pause--> paused
//!    ^                 |  ^               |
//!    |                 |  +----resume-----+
//!    +------stop-------+ (also from paused and dead)
//!                      |
//!                     kill
//!                      v
//!                    dead
//! ```
//!
//! Nothing is executed; the daemon only tracks what a real one would report.

use crate::dispatch::Dispatch;
use crate::server::{StubDaemon, StubDaemonHandle};
use kiln_core::protocol::{GetEntry, GetKeyValue};
use kiln_core::{Descriptor, ErrorCode, Request, Response, ResponsePayload, Version, VolumeDescription};
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

const PROPERTIES: &[(&str, &str, &str)] = &[
    ("command", "Command executed upon container start", ""),
    ("cwd", "Container working directory", "/"),
    ("memory_limit", "Memory hard limit [bytes]", "0"),
    ("respawn", "Automatically respawn dead container", "false"),
];

const DATA: &[(&str, &str)] = &[
    ("state", "Container state"),
    ("exit_status", "Container exit status"),
    ("root_pid", "Root process id"),
];

const FIRST_PID: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Stopped,
    Running,
    Paused,
    Dead,
}

impl ContainerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerState::Stopped => "stopped",
            ContainerState::Running => "running",
            ContainerState::Paused => "paused",
            ContainerState::Dead => "dead",
        }
    }

    /// States a `wait` call returns on.
    fn is_finished(&self) -> bool {
        matches!(self, ContainerState::Stopped | ContainerState::Dead)
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct Container {
    state: ContainerState,
    properties: BTreeMap<String, String>,
    exit_status: Option<i32>,
    root_pid: Option<u32>,
}

impl Container {
    fn new() -> Self {
        Self {
            state: ContainerState::Stopped,
            properties: PROPERTIES
                .iter()
                .map(|(name, _, default)| (name.to_string(), default.to_string()))
                .collect(),
            exit_status: None,
            root_pid: None,
        }
    }
}

#[derive(Debug, Default)]
struct DaemonState {
    containers: BTreeMap<String, Container>,
    volumes: BTreeMap<String, VolumeDescription>,
    next_pid: u32,
}

/// Daemon failure: a code plus a message, turned into an error reply.
type Failure = (ErrorCode, String);

fn fail<T>(code: ErrorCode, message: impl Into<String>) -> Result<T, Failure> {
    Err((code, message.into()))
}

impl DaemonState {
    fn container(&self, name: &str) -> Result<&Container, Failure> {
        match self.containers.get(name) {
            Some(c) => Ok(c),
            None => fail(
                ErrorCode::ContainerDoesNotExist,
                format!("container {} does not exist", name),
            ),
        }
    }

    fn container_mut(&mut self, name: &str) -> Result<&mut Container, Failure> {
        match self.containers.get_mut(name) {
            Some(c) => Ok(c),
            None => fail(
                ErrorCode::ContainerDoesNotExist,
                format!("container {} does not exist", name),
            ),
        }
    }

    /// Move `name` from one of `from` to `to`.
    fn transition(
        &mut self,
        name: &str,
        from: &[ContainerState],
        to: ContainerState,
    ) -> Result<(), Failure> {
        let pid = self.next_pid.max(FIRST_PID);
        let container = self.container_mut(name)?;
        if !from.contains(&container.state) {
            return fail(
                ErrorCode::InvalidState,
                format!("cannot move container {} from {} to {}", name, container.state, to),
            );
        }

        container.state = to;
        match to {
            ContainerState::Running if container.root_pid.is_none() => {
                container.root_pid = Some(pid);
                container.exit_status = None;
                self.next_pid = pid + 1;
            }
            ContainerState::Stopped => {
                container.root_pid = None;
                container.exit_status = None;
            }
            _ => {}
        }
        Ok(())
    }

    fn property(&self, name: &str, property: &str) -> Result<String, Failure> {
        let container = self.container(name)?;
        match container.properties.get(property) {
            Some(value) => Ok(value.clone()),
            None => fail(
                ErrorCode::InvalidProperty,
                format!("invalid property {}", property),
            ),
        }
    }

    fn data(&self, name: &str, data: &str) -> Result<String, Failure> {
        let container = self.container(name)?;
        match data {
            "state" => Ok(container.state.to_string()),
            "exit_status" => match container.exit_status {
                Some(status) => Ok(status.to_string()),
                None => fail(
                    ErrorCode::InvalidState,
                    format!("container {} is not dead", name),
                ),
            },
            "root_pid" => match container.root_pid {
                Some(pid) => Ok(pid.to_string()),
                None => fail(
                    ErrorCode::InvalidState,
                    format!("container {} is not running", name),
                ),
            },
            _ => fail(ErrorCode::InvalidData, format!("invalid data {}", data)),
        }
    }

    /// Property or data value, whichever `variable` names.
    fn variable(&self, name: &str, variable: &str) -> Result<String, Failure> {
        let container = self.container(name)?;
        if container.properties.contains_key(variable) {
            return self.property(name, variable);
        }
        if DATA.iter().any(|(d, _)| *d == variable) {
            return self.data(name, variable);
        }
        fail(
            ErrorCode::InvalidValue,
            format!("invalid variable {}", variable),
        )
    }

    fn get(&self, names: &[String], variables: &[String]) -> Vec<GetEntry> {
        names
            .iter()
            .map(|name| GetEntry {
                name: name.clone(),
                keyval: variables
                    .iter()
                    .map(|variable| match self.variable(name, variable) {
                        Ok(value) => GetKeyValue {
                            variable: variable.clone(),
                            error: None,
                            error_msg: None,
                            value: Some(value),
                        },
                        Err((code, message)) => GetKeyValue {
                            variable: variable.clone(),
                            error: Some(code.as_raw()),
                            error_msg: Some(message),
                            value: None,
                        },
                    })
                    .collect(),
            })
            .collect()
    }

    /// First of `names` that is already finished, if any.
    fn finished(&self, names: &[String]) -> Result<Option<String>, Failure> {
        for name in names {
            if self.container(name)?.state.is_finished() {
                return Ok(Some(name.clone()));
            }
        }
        Ok(None)
    }
}

/// Parse a quota such as `10G` into bytes. Empty means unlimited (0).
pub fn parse_quota(quota: &str) -> Option<u64> {
    let quota = quota.trim();
    if quota.is_empty() {
        return Some(0);
    }

    let (digits, shift) = match quota.chars().last()? {
        'K' | 'k' => (&quota[..quota.len() - 1], 10),
        'M' | 'm' => (&quota[..quota.len() - 1], 20),
        'G' | 'g' => (&quota[..quota.len() - 1], 30),
        'T' | 't' => (&quota[..quota.len() - 1], 40),
        _ => (quota, 0),
    };
    let value: u64 = digits.parse().ok()?;
    value.checked_mul(1u64 << shift)
}

/// Stub daemon keeping containers and volumes in memory.
#[derive(Debug, Default)]
pub struct MemoryDaemon {
    state: Mutex<DaemonState>,
    changed: Notify,
}

impl MemoryDaemon {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve a fresh daemon on `path` from a background thread.
    pub fn spawn(path: impl Into<PathBuf>) -> io::Result<StubDaemonHandle> {
        StubDaemon::spawn(path, Arc::new(Self::new()))
    }

    fn version() -> Version {
        Version {
            tag: env!("CARGO_PKG_VERSION").to_string(),
            revision: "memory".to_string(),
        }
    }

    async fn handle(&self, request: Request) -> Result<Response, Failure> {
        let payload = match request {
            Request::Create { name } => {
                let mut state = self.state.lock().await;
                if name.is_empty() {
                    return fail(ErrorCode::InvalidValue, "container name is empty");
                }
                if state.containers.contains_key(&name) {
                    return fail(
                        ErrorCode::ContainerAlreadyExists,
                        format!("container {} already exists", name),
                    );
                }
                state.containers.insert(name, Container::new());
                None
            }
            Request::Destroy { name } => {
                let mut state = self.state.lock().await;
                state.container(&name)?;
                state.containers.remove(&name);
                None
            }
            Request::List {} => {
                let state = self.state.lock().await;
                Some(ResponsePayload::List {
                    names: state.containers.keys().cloned().collect(),
                })
            }
            Request::PropertyList {} => Some(ResponsePayload::PropertyList {
                list: PROPERTIES
                    .iter()
                    .map(|(name, desc, _)| Descriptor::new(*name, *desc))
                    .collect(),
            }),
            Request::DataList {} => Some(ResponsePayload::DataList {
                list: DATA
                    .iter()
                    .map(|(name, desc)| Descriptor::new(*name, *desc))
                    .collect(),
            }),
            Request::Get { names, variables } => {
                let state = self.state.lock().await;
                Some(ResponsePayload::Get {
                    list: state.get(&names, &variables),
                })
            }
            Request::GetProperty { name, property } => {
                let state = self.state.lock().await;
                Some(ResponsePayload::GetProperty {
                    value: state.property(&name, &property)?,
                })
            }
            Request::SetProperty {
                name,
                property,
                value,
            } => {
                let mut state = self.state.lock().await;
                let container = state.container_mut(&name)?;
                if !container.properties.contains_key(&property) {
                    return fail(
                        ErrorCode::InvalidProperty,
                        format!("invalid property {}", property),
                    );
                }
                if container.state != ContainerState::Stopped {
                    return fail(
                        ErrorCode::InvalidState,
                        format!("cannot set {} on {} container", property, container.state),
                    );
                }
                container.properties.insert(property, value);
                None
            }
            Request::GetData { name, data } => {
                let state = self.state.lock().await;
                Some(ResponsePayload::GetData {
                    value: state.data(&name, &data)?,
                })
            }
            Request::Start { name } => {
                self.transition(&name, &[ContainerState::Stopped], ContainerState::Running)
                    .await?;
                None
            }
            Request::Stop { name } => {
                self.transition(
                    &name,
                    &[
                        ContainerState::Running,
                        ContainerState::Paused,
                        ContainerState::Dead,
                    ],
                    ContainerState::Stopped,
                )
                .await?;
                None
            }
            Request::Kill { name, signal } => {
                if !(1..=64).contains(&signal) {
                    return fail(ErrorCode::InvalidValue, format!("invalid signal {}", signal));
                }
                let mut state = self.state.lock().await;
                state.transition(&name, &[ContainerState::Running], ContainerState::Dead)?;
                state.container_mut(&name)?.exit_status = Some(signal);
                drop(state);
                self.changed.notify_waiters();
                None
            }
            Request::Pause { name } => {
                self.transition(&name, &[ContainerState::Running], ContainerState::Paused)
                    .await?;
                None
            }
            Request::Resume { name } => {
                self.transition(&name, &[ContainerState::Paused], ContainerState::Running)
                    .await?;
                None
            }
            Request::Wait { names } => Some(ResponsePayload::Wait {
                name: self.wait(&names).await?,
            }),
            Request::CreateVolume {
                path,
                source,
                quota,
                flags,
            } => {
                if !path.starts_with('/') {
                    return fail(
                        ErrorCode::InvalidValue,
                        format!("volume path {} is not absolute", path),
                    );
                }
                let available = match parse_quota(&quota) {
                    Some(bytes) => bytes,
                    None => return fail(ErrorCode::InvalidValue, format!("invalid quota {}", quota)),
                };
                let mut state = self.state.lock().await;
                if state.volumes.contains_key(&path) {
                    return fail(
                        ErrorCode::VolumeAlreadyExists,
                        format!("volume {} already exists", path),
                    );
                }
                let volume = VolumeDescription {
                    path: path.clone(),
                    source,
                    quota,
                    flags,
                    used: 0,
                    available,
                };
                state.volumes.insert(path, volume);
                None
            }
            Request::DestroyVolume { path } => {
                let mut state = self.state.lock().await;
                if state.volumes.remove(&path).is_none() {
                    return fail(
                        ErrorCode::VolumeNotFound,
                        format!("volume {} not found", path),
                    );
                }
                None
            }
            Request::ListVolumes {} => {
                let state = self.state.lock().await;
                Some(ResponsePayload::VolumeList {
                    list: state.volumes.values().cloned().collect(),
                })
            }
            Request::Version {} => Some(ResponsePayload::Version(Self::version())),
        };

        Ok(match payload {
            Some(payload) => Response::success(payload),
            None => Response::ok(),
        })
    }

    async fn transition(
        &self,
        name: &str,
        from: &[ContainerState],
        to: ContainerState,
    ) -> Result<(), Failure> {
        self.state.lock().await.transition(name, from, to)?;
        if to.is_finished() {
            self.changed.notify_waiters();
        }
        Ok(())
    }

    /// Block until one of `names` is stopped or dead.
    async fn wait(&self, names: &[String]) -> Result<String, Failure> {
        if names.is_empty() {
            return fail(ErrorCode::InvalidValue, "no containers to wait for");
        }

        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(name) = self.state.lock().await.finished(names)? {
                return Ok(name);
            }
            notified.await;
        }
    }
}

#[async_trait::async_trait]
impl Dispatch for MemoryDaemon {
    async fn dispatch(&self, request: Request) -> Response {
        match self.handle(request).await {
            Ok(response) => response,
            Err((code, message)) => Response::error(code, message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn create(name: &str) -> Request {
        Request::Create { name: name.into() }
    }

    async fn code_of(daemon: &MemoryDaemon, request: Request) -> ErrorCode {
        daemon.dispatch(request).await.code()
    }

    #[test]
    fn test_parse_quota() {
        assert_eq!(parse_quota(""), Some(0));
        assert_eq!(parse_quota("512"), Some(512));
        assert_eq!(parse_quota("10G"), Some(10 << 30));
        assert_eq!(parse_quota("3k"), Some(3072));
        assert_eq!(parse_quota("lots"), None);
        assert_eq!(parse_quota("G"), None);
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let daemon = MemoryDaemon::new();
        assert_eq!(code_of(&daemon, create("a")).await, ErrorCode::Success);
        assert_eq!(
            code_of(&daemon, create("a")).await,
            ErrorCode::ContainerAlreadyExists
        );
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let daemon = MemoryDaemon::new();
        daemon.dispatch(create("a")).await;

        let pause = || Request::Pause { name: "a".into() };
        assert_eq!(code_of(&daemon, pause()).await, ErrorCode::InvalidState);
        assert_eq!(
            code_of(&daemon, Request::Start { name: "a".into() }).await,
            ErrorCode::Success
        );
        assert_eq!(code_of(&daemon, pause()).await, ErrorCode::Success);
        assert_eq!(
            code_of(&daemon, Request::Resume { name: "a".into() }).await,
            ErrorCode::Success
        );
        assert_eq!(
            code_of(
                &daemon,
                Request::Kill {
                    name: "a".into(),
                    signal: 9
                }
            )
            .await,
            ErrorCode::Success
        );

        let reply = daemon
            .dispatch(Request::GetData {
                name: "a".into(),
                data: "exit_status".into(),
            })
            .await;
        assert_eq!(
            reply.result,
            Some(ResponsePayload::GetData { value: "9".into() })
        );
    }

    #[tokio::test]
    async fn test_set_property_requires_stopped() {
        let daemon = MemoryDaemon::new();
        daemon.dispatch(create("a")).await;

        let set = || Request::SetProperty {
            name: "a".into(),
            property: "command".into(),
            value: "sleep 1".into(),
        };
        assert_eq!(code_of(&daemon, set()).await, ErrorCode::Success);
        daemon.dispatch(Request::Start { name: "a".into() }).await;
        assert_eq!(code_of(&daemon, set()).await, ErrorCode::InvalidState);

        let unknown = Request::SetProperty {
            name: "a".into(),
            property: "colour".into(),
            value: "red".into(),
        };
        assert_eq!(code_of(&daemon, unknown).await, ErrorCode::InvalidProperty);
    }

    #[tokio::test]
    async fn test_wait_wakes_on_kill() {
        let daemon = Arc::new(MemoryDaemon::new());
        daemon.dispatch(create("a")).await;
        daemon.dispatch(Request::Start { name: "a".into() }).await;

        let waiter = {
            let daemon = daemon.clone();
            tokio::spawn(async move {
                daemon
                    .dispatch(Request::Wait {
                        names: vec!["a".into()],
                    })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        daemon
            .dispatch(Request::Kill {
                name: "a".into(),
                signal: 15,
            })
            .await;

        let reply = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            reply.result,
            Some(ResponsePayload::Wait { name: "a".into() })
        );
    }

    #[tokio::test]
    async fn test_wait_on_missing_container() {
        let daemon = MemoryDaemon::new();
        let reply = daemon
            .dispatch(Request::Wait {
                names: vec!["ghost".into()],
            })
            .await;
        assert_eq!(reply.code(), ErrorCode::ContainerDoesNotExist);
    }

    #[tokio::test]
    async fn test_volume_errors() {
        let daemon = MemoryDaemon::new();
        let volume = |path: &str, quota: &str| Request::CreateVolume {
            path: path.into(),
            source: String::new(),
            quota: quota.into(),
            flags: String::new(),
        };

        assert_eq!(code_of(&daemon, volume("relative", "")).await, ErrorCode::InvalidValue);
        assert_eq!(code_of(&daemon, volume("/v", "many")).await, ErrorCode::InvalidValue);
        assert_eq!(code_of(&daemon, volume("/v", "1M")).await, ErrorCode::Success);
        assert_eq!(
            code_of(&daemon, volume("/v", "1M")).await,
            ErrorCode::VolumeAlreadyExists
        );
        assert_eq!(
            code_of(&daemon, Request::DestroyVolume { path: "/w".into() }).await,
            ErrorCode::VolumeNotFound
        );
    }
}
