//! Download engine boundary
//!
//! The pipeline never moves bytes itself. It hands a [`DownloadRequest`] to a
//! [`DownloadEngine`], keeps the returned [`DownloadTransfer`] in its download
//! registry and polls it without blocking whenever the engine fires the
//! [`CompletionSignal`].
//!
//! - [`HttpDownloadEngine`]: single-connection streaming HTTP(S) fetch

mod http;
mod traits;

pub use http::{HttpDownloadEngine, validate_url};
pub use traits::{
    CompletionSignal, DownloadEngine, DownloadOutcome, DownloadRequest, DownloadTransfer,
};
