use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::error::{ProbeError, ProbeResult};
use crate::session::SessionSpec;

/// Verifies that every port accepts the expected number of connections before
/// the deadline and posts a single verdict to the status collector.
#[derive(Debug, Parser)]
#[command(name = "port-checker", version)]
pub struct Cli {
    /// JSON file with collector and listener settings.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Overrides the configured log level.
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Milliseconds allowed for every port to receive its connections.
    #[arg(value_name = "TIMEOUT")]
    pub timeout_ms: u64,

    /// Connections expected on each port.
    #[arg(value_name = "NUM_CLIENTS")]
    pub num_clients: u32,

    /// One or more ports followed by the correlation id.
    #[arg(value_name = "PORT... UUID", num_args = 2.., required = true, allow_hyphen_values = true)]
    pub ports_and_uuid: Vec<String>,
}

impl Cli {
    pub fn session_spec(&self) -> ProbeResult<SessionSpec> {
        let (uuid, ports) = self
            .ports_and_uuid
            .split_last()
            .ok_or_else(|| ProbeError::Usage("missing uuid".into()))?;
        let ports = ports
            .iter()
            .map(|p| {
                p.parse::<u16>()
                    .map_err(|_| ProbeError::Usage(format!("invalid port: {}", p)))
            })
            .collect::<ProbeResult<Vec<u16>>>()?;
        SessionSpec::new(
            ports,
            self.num_clients,
            Duration::from_millis(self.timeout_ms),
            uuid.as_str(),
        )
    }
}
