//! Shared retry context, logging helpers, and canned message templates used by
//! the stream producers to keep retry instrumentation consistent.

use anyhow::Error;
use std::time::Duration;

macro_rules! log_with_retry_ctx {
    ($level:ident, $ctx:expr, $($rest:tt)*) => {{
        tracing::$level!(
            start_block = $ctx.blocks.start,
            end_block = $ctx.blocks.end,
            $($rest)*
        );
    }};
}

/// Inclusive span of block numbers the retried round trip covers.
#[derive(Clone, Copy)]
struct RetryBlocks {
    start: u64,
    end: u64,
}

impl RetryBlocks {
    /// A zero `count` is treated as a single block.
    fn span(start: u64, count: u64) -> Self {
        Self {
            start,
            end: start.saturating_add(count.saturating_sub(1)),
        }
    }
}

/// Logging labels describing how a particular fetch reports retries, empty
/// answers, and cancellation.
#[derive(Clone, Copy)]
pub(crate) struct RetryMessages {
    pub(crate) retry: &'static str,
    pub(crate) empty: &'static str,
    pub(crate) cancelled: &'static str,
}

#[derive(Clone, Copy)]
pub(crate) struct RetryContext<'a> {
    blocks: RetryBlocks,
    messages: &'a RetryMessages,
}

impl<'a> RetryContext<'a> {
    pub(crate) fn with_blocks(messages: &'a RetryMessages, start: u64, count: u64) -> Self {
        Self {
            blocks: RetryBlocks::span(start, count),
            messages,
        }
    }

    pub(crate) fn log_retry(&self, attempt: usize, backoff: Duration, err: &Error) {
        let backoff_ms = Self::duration_to_millis(backoff);
        log_with_retry_ctx!(
            warn,
            self,
            attempt,
            backoff_ms = backoff_ms,
            error = %err,
            "{}",
            self.messages.retry
        );
    }

    pub(crate) fn log_empty(&self, attempt: usize, backoff: Duration) {
        let backoff_ms = Self::duration_to_millis(backoff);
        log_with_retry_ctx!(
            debug,
            self,
            attempt,
            backoff_ms = backoff_ms,
            "{}",
            self.messages.empty
        );
    }

    pub(crate) fn log_cancelled(&self) {
        log_with_retry_ctx!(debug, self, "{}", self.messages.cancelled);
    }

    fn duration_to_millis(backoff: Duration) -> u64 {
        backoff.as_millis().min(u128::from(u64::MAX)) as u64
    }
}

pub(crate) const GET_BLOCK_RANGE_RETRY: RetryMessages = RetryMessages {
    retry: "get_block_range failed; retrying",
    empty: "get_block_range returned no blocks; retrying",
    cancelled: "get_block_range cancelled while retrying",
};

pub(crate) const STREAM_BLOCK_RETRY: RetryMessages = RetryMessages {
    retry: "get_block failed; retrying",
    empty: "block not produced yet; waiting",
    cancelled: "block stream cancelled while waiting",
};
