//! Hub configuration.

use serde::{Deserialize, Serialize};

/// Tunables for a [`PresenceHub`](crate::PresenceHub).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Longest accepted chat message, in characters. Longer messages are
    /// dropped, not truncated.
    pub max_message_chars: usize,

    /// Capacity of each connection's outbound queue. A queue that fills
    /// up starts dropping frames for that connection only.
    pub outbound_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_message_chars: 300,
            outbound_capacity: 256,
        }
    }
}
