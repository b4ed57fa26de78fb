use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::error::{Fault, ProbeError, ProbeResult};

/// Immutable description of one probe run, fixed before any socket is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSpec {
    ports: Vec<u16>,
    clients_per_port: u32,
    deadline: Duration,
    correlation_id: String,
}

impl SessionSpec {
    pub fn new(
        ports: Vec<u16>,
        clients_per_port: u32,
        deadline: Duration,
        correlation_id: impl Into<String>,
    ) -> ProbeResult<Self> {
        if ports.is_empty() {
            return Err(ProbeError::Usage("at least one port is required".into()));
        }
        let mut seen = HashSet::with_capacity(ports.len());
        for &port in &ports {
            if port == 0 {
                return Err(ProbeError::Usage("port 0 cannot be probed".into()));
            }
            if !seen.insert(port) {
                return Err(ProbeError::Usage(format!("port {} given twice", port)));
            }
        }
        Ok(Self {
            ports,
            clients_per_port,
            deadline,
            correlation_id: correlation_id.into(),
        })
    }

    pub fn ports(&self) -> &[u16] {
        &self.ports
    }

    pub fn clients_per_port(&self) -> u32 {
        self.clients_per_port
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn expected_total(&self) -> u64 {
        self.ports.len() as u64 * u64::from(self.clients_per_port)
    }
}

/// Counts left after one accepted connection has been recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub port_remaining: u32,
    pub total_remaining: u64,
}

impl Tally {
    pub fn port_exhausted(&self) -> bool {
        self.port_remaining == 0
    }

    pub fn all_satisfied(&self) -> bool {
        self.total_remaining == 0
    }
}

/// Session counters shared by every port listener.
#[derive(Debug)]
pub struct Session {
    remaining: BTreeMap<u16, u32>,
    remaining_total: u64,
}

pub type SharedSession = Arc<Mutex<Session>>;

impl Session {
    pub fn new(spec: &SessionSpec) -> Self {
        let remaining = spec
            .ports()
            .iter()
            .map(|&port| (port, spec.clients_per_port()))
            .collect();
        Self {
            remaining,
            remaining_total: spec.expected_total(),
        }
    }

    pub fn shared(spec: &SessionSpec) -> SharedSession {
        Arc::new(Mutex::new(Self::new(spec)))
    }

    /// Counts a connection accepted on `port`. A connection on a port with no
    /// quota left is a fault and leaves every counter untouched.
    pub fn record_connection(&mut self, port: u16) -> Result<Tally, Fault> {
        let quota = match self.remaining.get_mut(&port) {
            Some(quota) if *quota > 0 => quota,
            _ => return Err(Fault::UnexpectedConnection { port }),
        };
        if self.remaining_total == 0 {
            return Err(Fault::UnexpectedConnection { port });
        }
        *quota -= 1;
        self.remaining_total -= 1;
        Ok(Tally {
            port_remaining: *quota,
            total_remaining: self.remaining_total,
        })
    }

    pub fn remaining_for(&self, port: u16) -> Option<u32> {
        self.remaining.get(&port).copied()
    }

    pub fn remaining_total(&self) -> u64 {
        self.remaining_total
    }

    pub fn is_satisfied(&self) -> bool {
        self.remaining_total == 0
    }
}
