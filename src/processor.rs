//! Block retrieval: single round-trip fetchers, the retry/backoff loop, and the
//! stream producers built on top of them.

pub mod backoff;
pub mod fetcher;
pub mod stream;
