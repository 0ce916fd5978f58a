//! Bounded parallel and streaming processing of item sequences.
//!
//! [`BatchProcessor`] handles a known input set in windows of parallel
//! batches; [`StreamProcessor`] accepts items one at a time from any
//! number of producers and flushes them in fixed-size batches.

mod batch_processor;
mod stream_processor;

pub use batch_processor::BatchProcessor;
pub use stream_processor::{StreamProcessor, StreamStats};

/// Split `items` into owned chunks of at most `size` items, keeping order.
pub(crate) fn chunked<T>(items: Vec<T>, size: usize) -> Vec<Vec<T>> {
    let size = size.max(1);
    let mut chunks = Vec::with_capacity(items.len().div_ceil(size));
    let mut iter = items.into_iter().peekable();
    while iter.peek().is_some() {
        chunks.push(iter.by_ref().take(size).collect());
    }
    chunks
}
