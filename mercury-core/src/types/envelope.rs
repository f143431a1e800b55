//! JSON envelopes multiplexed inside a captured frame.

use serde::{Deserialize, Serialize};

use crate::constants::INVOCATION_MESSAGE_TYPE;

/// One JSON sub-message of a frame.
///
/// ```json
/// {"type": 1, "target": "updateLocations", "arguments": [{"locations": ["..."]}]}
/// ```
///
/// Only invocations (`type == 1`) carry locations; pings and completions
/// deserialize with empty defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message type discriminator
    #[serde(rename = "type")]
    pub kind: i64,
    /// Hub method name, informational only
    #[serde(default)]
    pub target: String,
    /// Argument groups of an invocation
    #[serde(default)]
    pub arguments: Vec<ArgumentGroup>,
}

/// One argument of a location invocation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentGroup {
    /// Raw pipe-delimited location records
    #[serde(default)]
    pub locations: Vec<String>,
}

impl Envelope {
    /// Returns true if this envelope is a data-bearing invocation.
    pub fn is_invocation(&self) -> bool {
        self.kind == INVOCATION_MESSAGE_TYPE
    }

    /// Raw records of the first argument group, empty for anything else.
    pub fn raw_locations(&self) -> &[String] {
        if !self.is_invocation() {
            return &[];
        }
        self.arguments
            .first()
            .map(|group| group.locations.as_slice())
            .unwrap_or(&[])
    }
}
