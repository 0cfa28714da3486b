use serde::{Deserialize, Serialize};

/// Configuration for the dispatcher.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Random draws allowed when minting a token that collides with no known token.
    pub token_attempts: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { token_attempts: 32 }
    }
}
