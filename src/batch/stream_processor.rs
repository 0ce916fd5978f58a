use crate::config::StreamConfig;
use crate::errors::Error;
use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::Serialize;
use std::sync::Arc;
use tracing::trace;

type FlushFn<T, R, E> = Arc<dyn Fn(Vec<T>) -> Result<Vec<R>, E> + Send + Sync>;
type ResultsFn<R> = Arc<dyn Fn(&[R]) + Send + Sync>;

/// Flush counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    pub items_received: usize,
    /// Flushes triggered by a full buffer, including follow-ups
    pub auto_flushes: usize,
    /// Auto flushes run by a flushing thread on behalf of items that arrived
    /// while it was busy
    pub follow_up_flushes: usize,
    /// Flushes run by [`StreamProcessor::finish`]
    pub drain_flushes: usize,
}

struct StreamState<T, R> {
    buffer: Vec<T>,
    results: Vec<R>,
    flushing: bool,
    stats: StreamStats,
}

/// Buffers items from any number of threads and processes them in batches
/// of `buffer_size`.
///
/// Only one flush runs at a time, including the drain in [`Self::finish`].
/// Items that fill the buffer while a flush is running are picked up by the
/// flushing thread before it releases the busy flag, so no item is left
/// behind.
pub struct StreamProcessor<T, R, E = Error> {
    buffer_size: usize,
    flush: FlushFn<T, R, E>,
    on_results: Option<ResultsFn<R>>,
    state: Mutex<StreamState<T, R>>,
    idle: Condvar,
}

impl<T, R, E> StreamProcessor<T, R, E> {
    pub fn new(
        config: &StreamConfig,
        flush: impl Fn(Vec<T>) -> Result<Vec<R>, E> + Send + Sync + 'static,
    ) -> Self {
        let buffer_size = config.effective_buffer_size();
        Self {
            buffer_size,
            flush: Arc::new(flush),
            on_results: None,
            state: Mutex::new(StreamState {
                buffer: Vec::with_capacity(buffer_size),
                results: Vec::new(),
                flushing: false,
                stats: StreamStats::default(),
            }),
            idle: Condvar::new(),
        }
    }

    /// Called with the results of every flush.
    pub fn on_results(mut self, callback: impl Fn(&[R]) + Send + Sync + 'static) -> Self {
        self.on_results = Some(Arc::new(callback));
        self
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Buffer an item, flushing if the buffer is full and no other flush
    /// is running. Errors come from the flush this call ran, if any.
    pub fn add(&self, item: T) -> Result<(), E> {
        {
            let mut state = self.state.lock();
            state.buffer.push(item);
            state.stats.items_received += 1;
            if state.buffer.len() < self.buffer_size || state.flushing {
                return Ok(());
            }
            state.flushing = true;
        }
        self.run_flushes()
    }

    fn run_flushes(&self) -> Result<(), E> {
        let mut follow_up = false;
        loop {
            let batch: Vec<T> = {
                let mut state = self.state.lock();
                if state.buffer.len() < self.buffer_size {
                    self.release(state);
                    return Ok(());
                }
                state.stats.auto_flushes += 1;
                if follow_up {
                    state.stats.follow_up_flushes += 1;
                }
                state.buffer.drain(..self.buffer_size).collect()
            };

            trace!(items = batch.len(), follow_up, "stream flush");
            let outcome = (self.flush)(batch);
            self.record(outcome)
                .inspect_err(|_| self.release(self.state.lock()))?;
            follow_up = true;
        }
    }

    /// Clear the busy flag and wake a waiting [`Self::finish`].
    fn release(&self, mut state: MutexGuard<'_, StreamState<T, R>>) {
        state.flushing = false;
        drop(state);
        self.idle.notify_all();
    }

    fn record(&self, outcome: Result<Vec<R>, E>) -> Result<(), E> {
        let results = outcome?;
        if let Some(callback) = &self.on_results {
            callback(&results);
        }
        self.state.lock().results.extend(results);
        Ok(())
    }

    /// Wait for any running flush, then process whatever is still
    /// buffered, in order, and return every accumulated result. Call once
    /// producers are done.
    pub fn finish(&self) -> Result<Vec<R>, E> {
        {
            let mut state = self.state.lock();
            while state.flushing {
                self.idle.wait(&mut state);
            }
            state.flushing = true;
        }

        let drained = self.drain();
        let mut state = self.state.lock();
        state.flushing = false;
        let results = drained.map(|()| std::mem::take(&mut state.results));
        drop(state);
        self.idle.notify_all();
        results
    }

    fn drain(&self) -> Result<(), E> {
        loop {
            let batch: Vec<T> = {
                let mut state = self.state.lock();
                if state.buffer.is_empty() {
                    return Ok(());
                }
                state.stats.drain_flushes += 1;
                let n = state.buffer.len().min(self.buffer_size);
                state.buffer.drain(..n).collect()
            };
            trace!(items = batch.len(), "stream drain");
            let outcome = (self.flush)(batch);
            self.record(outcome)?;
        }
    }

    pub fn stats(&self) -> StreamStats {
        self.state.lock().stats
    }

    pub fn buffered(&self) -> usize {
        self.state.lock().buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn doubler(buffer_size: usize) -> StreamProcessor<u32, u32, String> {
        StreamProcessor::new(&StreamConfig { buffer_size }, |batch: Vec<u32>| {
            Ok(batch.into_iter().map(|n| n * 2).collect())
        })
    }

    #[test]
    fn test_auto_flush_count_is_floor() {
        let stream = doubler(4);
        for n in 0..10 {
            stream.add(n).unwrap();
        }
        assert_eq!(stream.stats().auto_flushes, 2);
        assert_eq!(stream.buffered(), 2);

        let results = stream.finish().unwrap();
        assert_eq!(results, (0..10).map(|n| n * 2).collect::<Vec<_>>());
        assert_eq!(stream.stats().drain_flushes, 1);
        assert_eq!(stream.buffered(), 0);
    }

    #[test]
    fn test_callback_sees_each_flush() {
        let flushed = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&flushed);
        let stream = doubler(3).on_results(move |results| {
            seen.fetch_add(results.len(), Ordering::SeqCst);
        });
        for n in 0..7 {
            stream.add(n).unwrap();
        }
        stream.finish().unwrap();
        assert_eq!(flushed.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn test_concurrent_producers_lose_nothing() {
        let stream = Arc::new(doubler(5));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let stream = Arc::clone(&stream);
                std::thread::spawn(move || {
                    for n in 0..50 {
                        stream.add(t * 1000 + n).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut results = stream.finish().unwrap();
        results.sort_unstable();
        let mut expected: Vec<u32> = (0..4)
            .flat_map(|t| (0..50).map(move |n| (t * 1000 + n) * 2))
            .collect();
        expected.sort_unstable();
        assert_eq!(results, expected);
        assert_eq!(stream.stats().items_received, 200);
    }

    #[test]
    fn test_finish_waits_for_running_flush() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (started_tx, started_rx) = crossbeam::channel::bounded::<()>(1);
        let stream: Arc<StreamProcessor<u32, u32, String>> = {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            Arc::new(StreamProcessor::new(
                &StreamConfig { buffer_size: 2 },
                move |batch: Vec<u32>| {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    if batch.contains(&0) {
                        let _ = started_tx.try_send(());
                        std::thread::sleep(std::time::Duration::from_millis(300));
                    }
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(batch)
                },
            ))
        };

        let producer = {
            let stream = Arc::clone(&stream);
            std::thread::spawn(move || {
                stream.add(0).unwrap();
                stream.add(1).unwrap();
            })
        };
        started_rx.recv().unwrap();
        stream.add(2).unwrap();

        let results = stream.finish().unwrap();
        producer.join().unwrap();

        assert_eq!(results, vec![0, 1, 2]);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        let stats = stream.stats();
        assert_eq!((stats.auto_flushes, stats.drain_flushes), (1, 1));
    }

    #[test]
    fn test_flush_error_surfaces_and_releases_busy_flag() {
        let stream: StreamProcessor<u32, u32, String> =
            StreamProcessor::new(&StreamConfig { buffer_size: 2 }, |batch: Vec<u32>| {
                if batch.contains(&1) {
                    Err("rejected".to_string())
                } else {
                    Ok(batch)
                }
            });
        stream.add(0).unwrap();
        assert_eq!(stream.add(1), Err("rejected".to_string()));
        stream.add(2).unwrap();
        stream.add(3).unwrap();
        assert_eq!(stream.finish().unwrap(), vec![2, 3]);
    }
}
