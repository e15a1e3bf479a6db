//! Audio output backends.
//!
//! The engine never opens a device itself. A backend driver owns the device
//! stream and calls [`Engine::mix`](crate::Engine::mix) from its callback;
//! with [`BackendId::Null`] the caller pulls audio by hand (tests, offline
//! rendering, hosts with their own audio thread).

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[cfg(feature = "cpal")]
pub mod cpal;

/// Which backend drives an engine.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackendId {
    /// No device; the caller invokes `mix` directly.
    #[default]
    Null,
    /// Default output device through cpal.
    Cpal,
}

impl BackendId {
    pub fn name(self) -> &'static str {
        match self {
            BackendId::Null => "null",
            BackendId::Cpal => "cpal",
        }
    }
}

impl std::fmt::Display for BackendId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_is_default() {
        assert_eq!(BackendId::default(), BackendId::Null);
        assert_eq!(BackendId::Cpal.to_string(), "cpal");
    }
}
