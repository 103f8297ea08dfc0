//! Per-connection invocation id allocation.

/// Invocation id state for one socket lifetime.
///
/// A session is created after each successful handshake and discarded on
/// reconnect, so ids are unique within a connection and restart at 1 on
/// the next one, the way the hubs expect.
#[derive(Debug)]
pub struct HubSession {
    next_id: u64,
}

impl HubSession {
    pub fn new() -> Self {
        Self { next_id: 1 }
    }

    pub fn next_invocation_id(&mut self) -> String {
        let id = self.next_id;
        self.next_id += 1;
        id.to_string()
    }
}

impl Default for HubSession {
    fn default() -> Self {
        Self::new()
    }
}
