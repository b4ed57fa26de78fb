//! Drives one probe session: binds the listener pool, arms the deadline, and
//! funnels the first trigger through the completion gate to the reporter.

use std::net::IpAddr;

use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info, warn};

use crate::deadline::DeadlineGuard;
use crate::error::ProbeResult;
use crate::gate::{CompletionGate, GateState, Verdict};
use crate::listener::{ListenerEvent, ListenerPool};
use crate::reporter::VerdictSink;
use crate::session::{Session, SessionSpec};

pub struct Prober {
    bind_ip: IpAddr,
    backlog: i32,
}

impl Prober {
    pub fn new(bind_ip: IpAddr, backlog: i32) -> Self {
        Self { bind_ip, backlog }
    }

    /// Runs the session to its verdict and delivers it. Listeners and any
    /// accepted connections are torn down when this returns.
    pub async fn run<S: VerdictSink>(&self, spec: &SessionSpec, sink: &S) -> ProbeResult<Verdict> {
        info!(uuid = spec.correlation_id(), "starting probe session");
        let mut deadline = DeadlineGuard::arm(spec.deadline());
        let mut gate = CompletionGate::new();
        let session = Session::shared(spec);
        let (events_tx, mut events) = mpsc::unbounded_channel();

        let (verdict, _listeners) = match ListenerPool::bind(self.bind_ip, spec.ports(), self.backlog) {
            Err(fault) => {
                warn!(port = fault.port(), error = %fault, "failed to bind");
                (Verdict::fault(fault), None)
            }
            Ok(pool) => {
                info!(ports = ?pool.ports(), "all ports listening");
                let listeners = pool.spawn(session.clone(), events_tx);
                let verdict = if session.lock().await.is_satisfied() {
                    info!("zero clients expected, nothing to wait for");
                    Verdict::satisfied()
                } else {
                    first_trigger(&mut events, &mut deadline).await
                };
                (verdict, Some(listeners))
            }
        };

        if verdict.is_timeout() {
            let session = session.lock().await;
            let pending: Vec<(u16, u32)> = spec
                .ports()
                .iter()
                .filter_map(|&port| {
                    let left = session.remaining_for(port)?;
                    (left > 0).then_some((port, left))
                })
                .collect();
            warn!(
                ?pending,
                remaining = session.remaining_total(),
                "deadline expired before all connections arrived"
            );
        }

        let verdict = gate.report_once(verdict)?;
        if let GateState::Completed { ok } = gate.state() {
            debug!(ok, "verdict accepted");
        }
        sink.deliver(&verdict).await?;
        Ok(verdict)
    }
}

/// Listener events win over the deadline when both are ready.
async fn first_trigger(
    events: &mut UnboundedReceiver<ListenerEvent>,
    deadline: &mut DeadlineGuard,
) -> Verdict {
    tokio::select! {
        biased;
        event = events.recv() => match event {
            Some(ListenerEvent::Satisfied) => Verdict::satisfied(),
            Some(ListenerEvent::Fault(fault)) => {
                warn!(port = fault.port(), error = %fault, "listener fault");
                Verdict::fault(fault)
            }
            None => {
                // Every listener has stopped without settling the session.
                deadline.fired().await;
                Verdict::timeout()
            }
        },
        _ = deadline.fired() => Verdict::timeout(),
    }
}

/// Exit status once a verdict has been delivered.
pub fn exit_code(verdict: &Verdict) -> u8 {
    if verdict.is_timeout() { 1 } else { 0 }
}
