//! Bridge availability states published on the status key.

use serde::{Deserialize, Serialize};

/// Availability of a bridge as seen by downstream consumers.
///
/// Serialized and published as the bare lowercase word (`online` / `offline`),
/// which is what home-automation platforms expect on an availability topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    /// The bridge is connected to the bus and polling.
    Online,
    /// The bridge has shut down.
    Offline,
}

impl Availability {
    /// Payload word for this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Availability::Online => "online",
            Availability::Offline => "offline",
        }
    }
}

impl std::fmt::Display for Availability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
