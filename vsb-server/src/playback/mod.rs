//! Playback: mixing sink, dispatcher, handle tracking and the tone toggle

pub mod dispatcher;
pub mod handles;
pub mod mixer;
pub mod tone;

pub use dispatcher::PlaybackDispatcher;
pub use handles::PlaybackHandle;
pub use mixer::{Mixer, PlaybackEvent};
pub use tone::{ToneState, ToneToggle, ToneUpdate};
