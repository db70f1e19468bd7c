//! Real-time microphone capture with bounded WAV recording and a live
//! level/spectrum visualization.

pub mod config;
pub mod recording;
