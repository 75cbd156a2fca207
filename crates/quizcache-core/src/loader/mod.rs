//! Resource loading for quiz content.
//!
//! `ResourceLoader` fetches the theme index and quiz bodies, validates and
//! enriches them, and keeps `ResourceCache` populated. The two documents have
//! opposite failure policies:
//!
//! - metadata never fails: stale cache, then a configured fallback index
//! - quizzes fail loudly when no cached copy exists, since a substitute body
//!   would corrupt scoring

pub mod audio;
pub mod client;
pub mod error;
pub mod report;

pub use audio::get_audio_path;
pub use client::ResourceLoader;
pub use error::LoadError;
pub use report::{ErrorReporter, TracingReporter};
