//! Image fetch and transcode capabilities.
//!
//! This crate provides:
//! - `Fetcher`: fetch source bytes from a URL (`HttpFetcher` over reqwest)
//! - `Transcoder`: bound and recompress an image buffer (`ImageTranscoder`)
//!
//! Both are traits so the worker pool can be driven by test doubles.

pub mod error;
pub mod fetch;
pub mod transcode;

pub use error::{MediaError, MediaResult};
pub use fetch::{Fetcher, HttpFetcher};
pub use transcode::{ImageTranscoder, OutputFormat, TranscodeConfig, Transcoder};
