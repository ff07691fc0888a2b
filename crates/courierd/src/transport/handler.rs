//! Connection handling abstractions for the daemon listener.

use std::io::{BufReader, BufWriter};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::pipeline::Pipeline;
use crate::registry::Registry;

use super::TRANSPORT_TARGET;

/// Handles accepted socket connections.
pub(crate) trait ConnectionHandler: Send + Sync + 'static {
    /// Handles a single connection. Implementations should avoid panicking.
    fn handle(&self, stream: UnixStream);
}

/// Runs the authenticated pipeline over each connection.
#[derive(Debug)]
pub(crate) struct PipelineConnectionHandler {
    registry: Arc<Registry>,
}

impl PipelineConnectionHandler {
    pub(crate) const fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

impl ConnectionHandler for PipelineConnectionHandler {
    fn handle(&self, stream: UnixStream) {
        let reader = match stream.try_clone() {
            Ok(read_half) => BufReader::new(read_half),
            Err(error) => {
                warn!(
                    target: TRANSPORT_TARGET,
                    error = %error,
                    "failed to split connection"
                );
                return;
            }
        };
        let mut writer = BufWriter::new(&stream);
        let pipeline = Pipeline::new(&self.registry).with_authentication();
        match pipeline.run(reader, &mut writer) {
            Ok(summary) => debug!(
                target: TRANSPORT_TARGET,
                processed = summary.processed,
                skipped = summary.skipped,
                written = summary.written,
                rejected = summary.rejected,
                "connection closed"
            ),
            Err(error) => warn!(
                target: TRANSPORT_TARGET,
                error = %error,
                "connection aborted"
            ),
        }
        drop(writer);
        if let Err(error) = stream.shutdown(Shutdown::Both) {
            debug!(
                target: TRANSPORT_TARGET,
                error = %error,
                "connection already shut down"
            );
        }
    }
}
