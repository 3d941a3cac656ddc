//! Surface Events
//!
//! Control messages sent from a voice surface to the Conductor. The surface
//! forwards what its speech-to-text produced and keeps the link alive; it
//! does not interpret anything.

use serde::{Deserialize, Serialize};

/// Events from a voice surface to the Conductor
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SurfaceEvent {
    /// The caller finished an utterance
    Transcript {
        /// Recognized text
        #[serde(default)]
        text: String,
    },

    /// Heartbeat request, answered with `pong`
    Ping,

    /// Any other `type` value
    #[serde(other)]
    Unknown,
}
