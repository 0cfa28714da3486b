use serde::{Deserialize, Serialize};

/// Configuration for accountable objects.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GaoConfig {
    /// Number of recent targets kept in a dynamic object's history, and
    /// carried in each frame's target vector.
    pub legroom: usize,
    /// Attempts at ingesting a container once its binding was accepted.
    pub container_retries: u32,
}

impl Default for GaoConfig {
    fn default() -> Self {
        Self {
            legroom: 7,
            container_retries: 3,
        }
    }
}

impl GaoConfig {
    /// Legroom actually used: at least one historical target besides the current one.
    pub fn effective_legroom(&self) -> usize {
        self.legroom.max(2)
    }
}
