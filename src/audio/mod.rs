pub mod chunk;
pub mod queue;

pub use chunk::{AudioChunk, AudioEncoding, AudioFormat};
pub use queue::AudioFrameQueue;
