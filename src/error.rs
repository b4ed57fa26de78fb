use thiserror::Error;

/// Faults that end a session with a failure verdict. The rendered message is
/// what the collector receives in `msg`.
#[derive(Debug, Error)]
pub enum Fault {
    #[error("server for port {port} error: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("server for port {port} error: {source}")]
    Accept {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("socket for port {port} error: {source}")]
    Socket {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("unexpected connection on port {port}")]
    UnexpectedConnection { port: u16 },
}

impl Fault {
    pub fn port(&self) -> u16 {
        match self {
            Fault::Bind { port, .. }
            | Fault::Accept { port, .. }
            | Fault::Socket { port, .. }
            | Fault::UnexpectedConnection { port } => *port,
        }
    }
}

/// Errors that escape the session and terminate the process abnormally.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("usage: port-checker timeout numClients port1 [port2 ... portN] uuid ({0})")]
    Usage(String),

    #[error("http request error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("status already posted, cannot post: {0}")]
    ProtocolViolation(String),
}

impl ProbeError {
    pub fn exit_code(&self) -> u8 {
        match self {
            ProbeError::Usage(_) | ProbeError::Transport(_) => 1,
            ProbeError::ProtocolViolation(_) => 3,
        }
    }
}

pub type ProbeResult<T> = Result<T, ProbeError>;
