use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinSet;
use tracing::{debug, info, trace, warn};

use crate::error::Fault;
use crate::session::SharedSession;

/// Triggers a listener can raise towards the completion gate.
#[derive(Debug)]
pub enum ListenerEvent {
    /// The session-wide remaining count reached zero.
    Satisfied,
    Fault(Fault),
}

pub struct PortListener {
    port: u16,
    listener: TcpListener,
}

/// Opens a listening socket for `port` on `ip`. Must run inside a tokio runtime.
///
/// An IPv6 address also accepts IPv4 clients. Binding `::` falls back to
/// `0.0.0.0` on hosts without IPv6.
pub fn bind_port(ip: IpAddr, port: u16, backlog: i32) -> Result<PortListener, Fault> {
    let listener = match listen_on(SocketAddr::new(ip, port), backlog) {
        Err(e) if ip == IpAddr::V6(Ipv6Addr::UNSPECIFIED) && ipv6_unavailable(&e) => {
            debug!(port, error = %e, "no IPv6, listening on IPv4 only");
            listen_on(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port), backlog)
        }
        other => other,
    }
    .map_err(|source| Fault::Bind { port, source })?;
    Ok(PortListener { port, listener })
}

fn listen_on(addr: SocketAddr, backlog: i32) -> std::io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    if addr.is_ipv6() {
        socket.set_only_v6(false)?;
    }
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;
    TcpListener::from_std(socket.into())
}

/// Anything but a genuine conflict on `::` means the host has no usable IPv6.
fn ipv6_unavailable(e: &std::io::Error) -> bool {
    !matches!(e.kind(), ErrorKind::AddrInUse | ErrorKind::PermissionDenied)
}

impl PortListener {
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Accepts connections until this port's quota is used up, then closes the
    /// listening socket. Accepted connections stay open until their peers
    /// close them or the task is aborted.
    pub async fn serve(self, session: SharedSession, events: UnboundedSender<ListenerEvent>) {
        let PortListener { port, listener } = self;
        let mut connections = JoinSet::new();

        // `Some(all_satisfied)` once the quota is used, `None` after a fault.
        let exhausted = loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(source) => {
                    let _ = events.send(ListenerEvent::Fault(Fault::Accept { port, source }));
                    break None;
                }
            };
            info!(port, %peer, "incoming connection");

            let tally = session.lock().await.record_connection(port);
            match tally {
                Ok(tally) => {
                    debug!(
                        port,
                        port_remaining = tally.port_remaining,
                        total_remaining = tally.total_remaining,
                        "connection counted"
                    );
                    connections.spawn(watch_connection(port, stream, events.clone()));
                    if tally.port_exhausted() {
                        break Some(tally.all_satisfied());
                    }
                }
                Err(fault) => {
                    warn!(port, %peer, "connection over quota");
                    let _ = events.send(ListenerEvent::Fault(fault));
                    break None;
                }
            }
        };

        drop(listener);
        if let Some(all_satisfied) = exhausted {
            // Logged only once the socket is gone: further connects are refused.
            info!(port, "quota satisfied, listener closed");
            if all_satisfied {
                info!("Done");
                let _ = events.send(ListenerEvent::Satisfied);
            }
        }

        while connections.join_next().await.is_some() {}
    }
}

async fn watch_connection(port: u16, mut stream: TcpStream, events: UnboundedSender<ListenerEvent>) {
    let mut buf = [0u8; 1024];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) => {
                info!(port, "socket closed");
                return;
            }
            Ok(n) => trace!(port, bytes = n, "discarding client data"),
            Err(source) => {
                warn!(port, error = %source, "socket error");
                let _ = events.send(ListenerEvent::Fault(Fault::Socket { port, source }));
                return;
            }
        }
    }
}

/// One listener per probed port.
pub struct ListenerPool {
    listeners: Vec<PortListener>,
}

impl ListenerPool {
    /// Binds every port in order. The first failure aborts the pool; sockets
    /// bound so far are closed when the partial pool is dropped.
    pub fn bind(ip: IpAddr, ports: &[u16], backlog: i32) -> Result<Self, Fault> {
        let mut listeners = Vec::with_capacity(ports.len());
        for &port in ports {
            info!(port, "registering port");
            listeners.push(bind_port(ip, port, backlog)?);
        }
        Ok(Self { listeners })
    }

    pub fn ports(&self) -> Vec<u16> {
        self.listeners.iter().map(PortListener::port).collect()
    }

    /// Starts accepting on every port. Dropping the returned set aborts the
    /// listeners along with any connections they are holding.
    pub fn spawn(
        self,
        session: SharedSession,
        events: UnboundedSender<ListenerEvent>,
    ) -> JoinSet<()> {
        let mut tasks = JoinSet::new();
        for listener in self.listeners {
            tasks.spawn(listener.serve(session.clone(), events.clone()));
        }
        tasks
    }
}
