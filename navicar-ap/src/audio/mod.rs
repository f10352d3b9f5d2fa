//! Audio backend
//!
//! Decoding (symphonia), rate conversion (rubato), device output (cpal) and
//! the `StreamingPlayer` that ties them to the playback engine.

pub mod decoder;
pub mod output;
pub mod resampler;
pub mod spill;
pub mod streaming;

pub use decoder::StreamDecoder;
pub use output::AudioOutput;
pub use resampler::StreamResampler;
pub use spill::{Spill, SpillReader};
pub use streaming::StreamingPlayer;
