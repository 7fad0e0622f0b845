use crate::{Connection, Incoming, Listener, NetError};

/// Serves exactly one connection over the process's stdin and stdout.
///
/// Nothing else may write to stdout while the connection is live; log to
/// stderr instead.
#[derive(Debug, Default)]
pub struct StdioListener {
    handed_out: bool,
}

impl StdioListener {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Listener for StdioListener {
    async fn accept(&mut self) -> Result<Incoming, NetError> {
        if self.handed_out {
            return Err(NetError::Closed);
        }
        self.handed_out = true;
        let conn = Connection::lines("stdio", tokio::io::stdin(), tokio::io::stdout());
        tracing::debug!(id = %conn.id(), "accepted stdio connection");
        Ok(Incoming::ready(conn))
    }

    async fn shutdown(&mut self) -> Result<(), NetError> {
        self.handed_out = true;
        Ok(())
    }
}
