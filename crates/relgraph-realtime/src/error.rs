//! Realtime-server-specific error mapping onto the shared taxonomy.

use relgraph_common::RelGraphError;

/// Maps a malformed client frame to `RelGraphError::RealtimeProtocolError`.
/// The session is closed; other sessions are unaffected.
pub fn protocol_error(message: impl Into<String>) -> RelGraphError {
    RelGraphError::RealtimeProtocolError(message.into())
}
