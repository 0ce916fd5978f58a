use super::chunked;
use crate::config::ParallelConfig;
use crate::errors::Error;
use rayon::prelude::*;
use std::sync::Arc;
use tracing::debug;

type BatchFn<T, R, E> = Arc<dyn Fn(Vec<T>) -> Result<Vec<R>, E> + Send + Sync>;
type ProgressFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Processes a known input set in windows of at most `concurrency`
/// simultaneous batches, on its own rayon thread pool.
///
/// Results come back in input order. The first failing batch (in input
/// order) aborts the run with its error.
pub struct BatchProcessor<T, R, E = Error> {
    config: ParallelConfig,
    process_batch: BatchFn<T, R, E>,
    progress: Option<ProgressFn>,
    pool: rayon::ThreadPool,
}

impl<T, R, E> BatchProcessor<T, R, E>
where
    T: Send,
    R: Send,
    E: Send,
{
    pub fn new(
        config: ParallelConfig,
        process_batch: impl Fn(Vec<T>) -> Result<Vec<R>, E> + Send + Sync + 'static,
    ) -> crate::Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.effective_concurrency())
            .thread_name(|i| format!("blockaudit-batch-{i}"))
            .build()
            .map_err(|e| Error::Config(format!("failed to build batch thread pool: {e}")))?;

        Ok(Self {
            config,
            process_batch: Arc::new(process_batch),
            progress: None,
            pool,
        })
    }

    /// Called with `(processed, total)` after every window.
    pub fn with_progress(mut self, progress: impl Fn(usize, usize) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    pub fn process(&self, items: Vec<T>) -> Result<Vec<R>, E> {
        let total = items.len();
        let mut results = Vec::with_capacity(total);
        let mut processed = 0;

        let mut batches = chunked(items, self.config.effective_batch_size())
            .into_iter()
            .peekable();

        while batches.peek().is_some() {
            let window: Vec<Vec<T>> = batches
                .by_ref()
                .take(self.config.effective_concurrency())
                .collect();
            let window_items: usize = window.iter().map(Vec::len).sum();

            let outputs: Vec<Result<Vec<R>, E>> = self.pool.install(|| {
                window
                    .into_par_iter()
                    .map(|batch| (self.process_batch)(batch))
                    .collect()
            });
            for output in outputs {
                results.extend(output?);
            }

            processed += window_items;
            debug!(processed, total, "batch window complete");
            if let Some(progress) = &self.progress {
                progress(processed, total);
            }

            if batches.peek().is_some() {
                std::thread::sleep(self.config.window_delay());
            }
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn config(batch_size: usize, concurrency: usize) -> ParallelConfig {
        ParallelConfig {
            batch_size,
            concurrency,
            window_delay_ms: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_results_in_input_order() {
        let processor = BatchProcessor::new(config(3, 4), |batch: Vec<u32>| {
            // Earlier batches are slower.
            let first = batch[0];
            std::thread::sleep(Duration::from_millis(u64::from(20u32.saturating_sub(first))));
            Ok::<_, String>(batch.into_iter().map(|n| n * 2).collect())
        })
        .unwrap();

        let results = processor.process((0..20).collect()).unwrap();
        assert_eq!(results, (0..20).map(|n| n * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_concurrency_never_exceeded() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (current, max) = (Arc::clone(&in_flight), Arc::clone(&peak));

        let processor = BatchProcessor::new(config(2, 3), move |batch: Vec<u32>| {
            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
            max.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(10));
            current.fetch_sub(1, Ordering::SeqCst);
            Ok::<_, String>(batch)
        })
        .unwrap();

        let results = processor.process((0..30).collect()).unwrap();
        assert_eq!(results.len(), 30);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn test_progress_after_each_window() {
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reports);
        let processor = BatchProcessor::new(config(2, 2), |batch: Vec<u32>| Ok::<_, String>(batch))
            .unwrap()
            .with_progress(move |done, total| sink.lock().push((done, total)));

        processor.process((0..9).collect()).unwrap();
        assert_eq!(*reports.lock(), vec![(4, 9), (8, 9), (9, 9)]);
    }

    #[test]
    fn test_first_failing_batch_aborts() {
        let processor = BatchProcessor::new(config(2, 2), |batch: Vec<u32>| {
            if batch.contains(&5) {
                Err(format!("bad batch starting at {}", batch[0]))
            } else {
                Ok(batch)
            }
        })
        .unwrap();

        let err = processor.process((0..10).collect()).unwrap_err();
        assert_eq!(err, "bad batch starting at 4");
    }

    #[test]
    fn test_empty_input() {
        let processor =
            BatchProcessor::new(config(2, 2), |batch: Vec<u32>| Ok::<_, String>(batch)).unwrap();
        assert!(processor.process(Vec::new()).unwrap().is_empty());
    }
}
