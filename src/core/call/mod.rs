//! Voice call sessions.
//!
//! A [`VoiceCall`] owns the capture device, the live stream and the playback
//! scheduler for one call with one persona.

mod session;
mod stats;

pub use session::{CallSettings, VoiceCall};
pub use stats::{CallStats, CallStatsSnapshot, format_call_duration};
