//! Lightshow library - music-synchronized light channel control

pub mod audio;
pub mod channels;
pub mod cli;
pub mod command;
pub mod control;
pub mod engine;
pub mod error;
pub mod params;
pub mod playlist;
pub mod remote;
pub mod scheduler;
pub mod session;
pub mod transport;

pub use error::{LightsError, Result};
