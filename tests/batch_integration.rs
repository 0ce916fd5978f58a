//! Integration tests for windowed batch processing and the stream buffer.

use blockaudit::batch::{BatchProcessor, StreamProcessor};
use blockaudit::config::{ParallelConfig, StreamConfig};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn parallel(batch_size: usize, concurrency: usize) -> ParallelConfig {
    ParallelConfig {
        batch_size,
        concurrency,
        window_delay_ms: 0,
        ..ParallelConfig::default()
    }
}

// ============================================================================
// BatchProcessor
// ============================================================================

#[test]
fn test_batches_never_exceed_concurrency() {
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (running_in, peak_in) = (Arc::clone(&running), Arc::clone(&peak));

    let processor = BatchProcessor::new(parallel(2, 3), move |batch: Vec<u32>| {
        let now = running_in.fetch_add(1, Ordering::SeqCst) + 1;
        peak_in.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(15));
        running_in.fetch_sub(1, Ordering::SeqCst);
        Ok::<_, String>(batch.into_iter().map(|n| n + 1).collect())
    })
    .unwrap();

    let results = processor.process((0..20).collect()).unwrap();

    assert_eq!(results, (1..21).collect::<Vec<_>>());
    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert_eq!(running.load(Ordering::SeqCst), 0);
}

#[test]
fn test_batch_sizes_follow_config() {
    let sizes = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let recorded = Arc::clone(&sizes);
    let processor = BatchProcessor::new(parallel(4, 2), move |batch: Vec<u32>| {
        recorded.lock().push(batch.len());
        Ok::<_, String>(batch)
    })
    .unwrap();

    processor.process((0..10).collect()).unwrap();

    let mut sizes = sizes.lock().clone();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![2, 4, 4]);
}

#[test]
fn test_failing_batch_aborts_the_run() {
    let processor = BatchProcessor::new(parallel(3, 2), |batch: Vec<u32>| {
        if batch.contains(&4) {
            Err(format!("bad batch starting at {}", batch[0]))
        } else {
            Ok(batch)
        }
    })
    .unwrap();

    let err = processor.process((0..9).collect()).unwrap_err();
    assert_eq!(err, "bad batch starting at 3");
}

#[test]
fn test_progress_reaches_total() {
    let last = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&last);
    let processor = BatchProcessor::new(parallel(2, 2), |batch: Vec<u32>| Ok::<_, String>(batch))
        .unwrap()
        .with_progress(move |done, total| {
            assert!(done <= total);
            seen.store(done, Ordering::SeqCst);
        });

    processor.process((0..9).collect()).unwrap();
    assert_eq!(last.load(Ordering::SeqCst), 9);
}

// ============================================================================
// StreamProcessor
// ============================================================================

#[test]
fn test_auto_flush_count_is_floor_of_items_over_buffer() {
    let stream = StreamProcessor::new(&StreamConfig { buffer_size: 10 }, |batch: Vec<u32>| {
        std::thread::sleep(Duration::from_millis(1));
        Ok::<_, String>(batch)
    });

    std::thread::scope(|scope| {
        for producer in 0..4u32 {
            let stream = &stream;
            scope.spawn(move || {
                for i in 0..26u32 {
                    stream.add(producer * 100 + i).unwrap();
                }
            });
        }
    });
    let stats_before_finish = stream.stats();
    let mut results = stream.finish().unwrap();

    assert_eq!(stats_before_finish.items_received, 104);
    assert_eq!(stats_before_finish.auto_flushes, 10);
    assert_eq!(stream.stats().drain_flushes, 1);
    assert_eq!(stream.buffered(), 0);

    results.sort_unstable();
    let mut expected: Vec<u32> = (0..4).flat_map(|p| (0..26).map(move |i| p * 100 + i)).collect();
    expected.sort_unstable();
    assert_eq!(results, expected);
}

#[test]
fn test_single_producer_keeps_order() {
    let stream = StreamProcessor::new(&StreamConfig { buffer_size: 3 }, |batch: Vec<u32>| {
        Ok::<_, String>(batch.into_iter().map(|n| n * 2).collect())
    });

    for n in 0..8 {
        stream.add(n).unwrap();
    }
    assert_eq!(stream.buffered(), 2);

    let results = stream.finish().unwrap();
    assert_eq!(results, vec![0, 2, 4, 6, 8, 10, 12, 14]);
    assert_eq!(stream.stats().auto_flushes, 2);
}

#[test]
fn test_result_callback_sees_every_flush() {
    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&delivered);
    let stream = StreamProcessor::new(&StreamConfig { buffer_size: 4 }, |batch: Vec<u32>| {
        Ok::<_, String>(batch)
    })
    .on_results(move |results| {
        counter.fetch_add(results.len(), Ordering::SeqCst);
    });

    for n in 0..11 {
        stream.add(n).unwrap();
    }
    stream.finish().unwrap();
    assert_eq!(delivered.load(Ordering::SeqCst), 11);
}
