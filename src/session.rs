//! # Session
//!
//! Binds one QUIC bidirectional stream to one [`vm::run_session`]
//! invocation. A session owns its value stack exclusively; nothing here is
//! shared with any other session on the same connection or listener.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::context::SessionContext;
use crate::registry::Registry;
use crate::vm;

/// Run a single session to completion on an already-accepted bidirectional
/// stream, logging how it ended. Errors here are session-scoped: they never
/// propagate to the accept loop or affect other sessions.
pub async fn handle_stream(
    session_id: u64,
    mut send: quinn::SendStream,
    mut recv: quinn::RecvStream,
    registry: Arc<Registry>,
) {
    let ctx = SessionContext::with_id(session_id);
    debug!(session_id, "session started");

    match vm::run_session(&mut recv, &mut send, &registry, &ctx).await {
        Ok(()) => info!(session_id, "session ended cleanly"),
        Err(e) => warn!(session_id, error = %e, "session ended with a transport error"),
    }

    if let Err(e) = send.finish() {
        debug!(session_id, error = %e, "stream finish failed (peer likely already gone)");
    }
}
