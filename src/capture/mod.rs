//! Capture subsystem boundary
//!
//! A [`CaptureSource`] opens [`Recorder`]s; a recorder turns the live source
//! into encoded [`MediaChunk`]s on request.

pub mod recorder;
pub mod wav;

pub use recorder::{
    CaptureSource, MediaChunk, Recorder, RecorderSettings, RecorderState, SharedRecorderState,
};
pub use wav::{AudioFile, WavFileRecorder, WavFileSource};
