//! kilnctl - command-line client for the kiln container daemon.
//!
//! Every subcommand maps onto one client call. Output goes to stdout, logs
//! and errors to stderr.

mod commands;

use clap::{Parser, Subcommand};
use kiln_core::config::RpcConfig;
use kiln_core::{Client, ClientOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "kilnctl")]
#[command(about = "Control client for the kiln container daemon")]
struct Args {
    /// Daemon control socket
    #[arg(short, long, global = true, env = RpcConfig::SOCKET_PATH_ENV, default_value = RpcConfig::DEFAULT_SOCKET_PATH)]
    socket: PathBuf,

    /// Extra attempts after a retryable failure
    #[arg(long, global = true, default_value_t = RpcConfig::DEFAULT_RETRIES)]
    retries: u32,

    /// Delay between attempts in milliseconds
    #[arg(long, global = true, default_value_t = RpcConfig::DEFAULT_RETRY_DELAY.as_millis() as u64)]
    retry_delay_ms: u64,

    /// Give up on a reply after this many milliseconds (default: wait forever)
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    fn client_options(&self) -> ClientOptions {
        ClientOptions::new()
            .with_socket_path(&self.socket)
            .with_retries(self.retries)
            .with_retry_delay(Duration::from_millis(self.retry_delay_ms))
            .with_receive_timeout(self.timeout_ms.map(Duration::from_millis))
    }
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// List container names
    List,
    /// Create a stopped container
    Create { name: String },
    /// Destroy a container
    Destroy { name: String },
    /// Start a stopped container
    Start { name: String },
    /// Stop a container
    Stop { name: String },
    /// Send a signal to a running container
    Kill {
        name: String,
        #[arg(long, default_value_t = 15)]
        signal: i32,
    },
    /// Freeze a running container
    Pause { name: String },
    /// Thaw a paused container
    Resume { name: String },
    /// Read variables of several containers at once
    Get {
        #[arg(required = true)]
        names: Vec<String>,
        #[arg(long = "var", required = true, num_args = 1..)]
        variables: Vec<String>,
    },
    /// Read one container property
    GetProperty { name: String, property: String },
    /// Change one property of a stopped container
    SetProperty {
        name: String,
        property: String,
        value: String,
    },
    /// Read one container data value
    GetData { name: String, data: String },
    /// List supported properties
    Properties,
    /// List supported data values
    Data,
    /// Block until one of the containers stops or dies
    Wait {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Show the daemon version
    Version,
    /// Manage volumes
    #[command(subcommand)]
    Volume(VolumeCommand),
    /// Send a request given as JSON and print the JSON reply
    Raw { message: String },
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum VolumeCommand {
    /// Create a volume
    Create {
        path: String,
        #[arg(long, default_value = "")]
        source: String,
        #[arg(long, default_value = "")]
        quota: String,
        #[arg(long, default_value = "")]
        flags: String,
        /// Create the volume directory locally before asking the daemon
        #[arg(long)]
        prepare: bool,
    },
    /// Destroy a volume
    Destroy { path: String },
    /// List volumes
    List,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let log_level = if args.debug { Level::DEBUG } else { Level::WARN };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    debug!("Using socket {}", args.socket.display());
    let mut client = Client::new(args.client_options());
    let mut stdout = std::io::stdout().lock();

    match commands::run(&mut client, &args.command, &mut stdout) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
