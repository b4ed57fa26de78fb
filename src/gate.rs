use serde::Serialize;

use crate::error::{Fault, ProbeError, ProbeResult};

pub const SUCCESS_MSG: &str = "all ports listening";
pub const TIMEOUT_MSG: &str = "timeout";

/// What ended the session.
#[derive(Debug)]
pub enum Reason {
    AllSatisfied,
    Timeout,
    Fault(Fault),
}

#[derive(Debug)]
pub struct Verdict {
    reason: Reason,
}

/// Wire body posted to the collector.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct StatusBody {
    pub ok: bool,
    pub msg: String,
}

impl Verdict {
    pub fn satisfied() -> Self {
        Self { reason: Reason::AllSatisfied }
    }

    pub fn timeout() -> Self {
        Self { reason: Reason::Timeout }
    }

    pub fn fault(fault: Fault) -> Self {
        Self { reason: Reason::Fault(fault) }
    }

    pub fn ok(&self) -> bool {
        matches!(self.reason, Reason::AllSatisfied)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.reason, Reason::Timeout)
    }

    pub fn message(&self) -> String {
        match &self.reason {
            Reason::AllSatisfied => SUCCESS_MSG.to_string(),
            Reason::Timeout => TIMEOUT_MSG.to_string(),
            Reason::Fault(fault) => fault.to_string(),
        }
    }

    pub fn body(&self) -> StatusBody {
        StatusBody {
            ok: self.ok(),
            msg: self.message(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Listening,
    Completed { ok: bool },
    /// A second verdict was attempted; terminal.
    Faulted,
}

/// Lets exactly one verdict through per session.
#[derive(Debug)]
pub struct CompletionGate {
    state: GateState,
}

impl Default for CompletionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionGate {
    pub fn new() -> Self {
        Self {
            state: GateState::Listening,
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    /// Passes the first verdict through. Any later attempt is a protocol
    /// violation and moves the gate to `Faulted`.
    pub fn report_once(&mut self, verdict: Verdict) -> ProbeResult<Verdict> {
        match self.state {
            GateState::Listening => {
                self.state = GateState::Completed { ok: verdict.ok() };
                Ok(verdict)
            }
            GateState::Completed { .. } | GateState::Faulted => {
                self.state = GateState::Faulted;
                Err(ProbeError::ProtocolViolation(verdict.message()))
            }
        }
    }
}
