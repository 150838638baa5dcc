use thiserror::Error;

/// Errors returned by the content-network daemon client.
#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("daemon HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("daemon returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("unexpected daemon response: {0}")]
    Decode(String),
    #[error("daemon API address unavailable: {0}")]
    ApiAddress(String),
}

/// Errors returned by the ledger-network node client.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger node HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("ledger node RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("ledger node response for {0} carried no result")]
    MissingResult(String),
    #[error("unexpected ledger node response: {0}")]
    Decode(String),
}

/// Failure of a whole observation pass.
#[derive(Error, Debug)]
pub enum ObserveError {
    /// The local service failed its readiness check; the pass is skipped and
    /// retried on the next tick.
    #[error("{service} is not ready")]
    DaemonUnreachable { service: &'static str },
    #[error(transparent)]
    Daemon(#[from] DaemonError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
