//! Maps `Box<dyn Error>` from the transport seam to typed `DispatchError`.
//!
//! `medibox_traits::Transport` returns a boxed error so any link can sit
//! behind it; this module turns that into our error enum, with an optional
//! feature-gated path for `medibox_hardware::HwError` downcasting.

use crate::error::DispatchError;

/// Map a publish failure on `topic` to a typed `DispatchError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_publish_error(topic: &str, e: &(dyn std::error::Error + 'static)) -> DispatchError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<medibox_hardware::error::HwError>() {
            return match hw {
                medibox_hardware::error::HwError::NotConnected => DispatchError::LinkDown {
                    topic: topic.to_owned(),
                },
                other => DispatchError::Publish {
                    topic: topic.to_owned(),
                    reason: other.to_string(),
                },
            };
        }
    }

    let s = e.to_string();
    let lower = s.to_lowercase();
    if lower.contains("not connected") || lower.contains("disconnected") {
        DispatchError::LinkDown {
            topic: topic.to_owned(),
        }
    } else {
        DispatchError::Publish {
            topic: topic.to_owned(),
            reason: s,
        }
    }
}
