//! Event conversion
//!
//! Maps the upstream session event stream onto the closed [`AgentEvent`]
//! union forwarded to the UI.
//!
//! [`AgentEvent`]: crate::types::AgentEvent

mod event;

pub use event::{is_recognized, normalize, normalize_at, now_millis};
