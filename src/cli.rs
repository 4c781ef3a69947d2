//! Command line surface of the upload daemon

use clap::{ArgAction, Parser};
use std::path::PathBuf;

use crate::protocol::defaults;

#[derive(Clone, Debug, Parser)]
#[command(
    name = "upteed",
    version,
    about = "Accept uploads and tee each file to local storage and an HTTP webhook"
)]
pub struct DaemonOpts {
    /// The port number to listen on
    #[arg(short, long, default_value_t = defaults::PORT)]
    pub port: u16,

    /// Interface to bind
    #[arg(long, default_value = defaults::HOST)]
    pub host: String,

    /// The root directory uploads are stored under
    #[arg(short, long, default_value = defaults::ROOT)]
    pub root: PathBuf,

    /// The webhook URL every uploaded chunk is POSTed to
    #[arg(short, long)]
    pub webhook: Option<String>,

    /// Per-request webhook timeout in seconds
    #[arg(long, default_value_t = defaults::WEBHOOK_TIMEOUT_SECS)]
    pub webhook_timeout: u64,

    /// Session idle timeout in seconds
    #[arg(long, default_value_t = defaults::IDLE_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Passive data port range (LOW-HIGH)
    #[arg(long, default_value = defaults::PASSIVE_PORTS)]
    pub passive_ports: String,

    /// Append upload events to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}
