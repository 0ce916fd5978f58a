//! Stage timing and memory profiling.
//!
//! Timings are collected process-wide in a concurrent map, so pool workers
//! and the orchestrator thread can record into it at the same time.
//! Nothing is recorded until [`enable_profiling`] is called.
//!
//! ```ignore
//! use blockaudit::observability::profiling::{enable_profiling, get_profile_report, profile_stage};
//!
//! enable_profiling();
//! let blocks = profile_stage("analyzing_blocks", || analyze(&blocks));
//! println!("{}", get_profile_report().to_summary());
//! ```

use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use sysinfo::{ProcessesToUpdate, System};

static PROFILING_ENABLED: AtomicBool = AtomicBool::new(false);

static COLLECTOR: OnceLock<ProfileCollector> = OnceLock::new();

pub fn enable_profiling() {
    PROFILING_ENABLED.store(true, Ordering::SeqCst);
    let _ = collector();
}

#[inline]
pub fn is_profiling_enabled() -> bool {
    PROFILING_ENABLED.load(Ordering::Relaxed)
}

fn collector() -> &'static ProfileCollector {
    COLLECTOR.get_or_init(ProfileCollector::new)
}

/// Resident memory of this process in bytes, if the platform reports it.
pub fn current_memory_bytes() -> Option<u64> {
    let pid = sysinfo::get_current_pid().ok()?;
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system.process(pid).map(|process| process.memory())
}

/// Run `f` as the named stage, recording its duration and the change in
/// resident memory when profiling is enabled.
pub fn profile_stage<T>(name: &'static str, f: impl FnOnce() -> T) -> T {
    if !is_profiling_enabled() {
        return f();
    }

    let memory_before = current_memory_bytes();
    let start = Instant::now();
    let out = f();
    let duration = start.elapsed();
    let memory_after = current_memory_bytes();

    let delta = match (memory_before, memory_after) {
        (Some(before), Some(after)) => after as i64 - before as i64,
        _ => 0,
    };
    collector().record(name, duration, delta, memory_after.unwrap_or(0));
    out
}

pub fn record_timing(name: &'static str, duration: Duration) {
    if is_profiling_enabled() {
        collector().record(name, duration, 0, 0);
    }
}

#[must_use]
pub fn get_profile_report() -> ProfileReport {
    collector().generate_report()
}

pub fn reset_profile_data() {
    collector().reset();
}

/// RAII guard that records timing when dropped. See [`crate::time_span`].
pub struct TimingSpan {
    name: &'static str,
    start: Instant,
}

impl TimingSpan {
    #[inline]
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            start: Instant::now(),
        }
    }
}

impl Drop for TimingSpan {
    fn drop(&mut self) {
        record_timing(self.name, self.start.elapsed());
    }
}

struct ProfileEntry {
    total_nanos: AtomicU64,
    count: AtomicU64,
    memory_delta: AtomicI64,
    peak_memory: AtomicU64,
}

impl ProfileEntry {
    fn new() -> Self {
        Self {
            total_nanos: AtomicU64::new(0),
            count: AtomicU64::new(0),
            memory_delta: AtomicI64::new(0),
            peak_memory: AtomicU64::new(0),
        }
    }
}

struct ProfileCollector {
    entries: DashMap<&'static str, ProfileEntry>,
    start_time: OnceLock<Instant>,
}

impl ProfileCollector {
    fn new() -> Self {
        Self {
            entries: DashMap::new(),
            start_time: OnceLock::new(),
        }
    }

    fn record(&self, name: &'static str, duration: Duration, memory_delta: i64, memory: u64) {
        let _ = self.start_time.get_or_init(Instant::now);

        let entry = self.entries.entry(name).or_insert_with(ProfileEntry::new);
        entry
            .total_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
        entry.count.fetch_add(1, Ordering::Relaxed);
        entry.memory_delta.fetch_add(memory_delta, Ordering::Relaxed);
        entry.peak_memory.fetch_max(memory, Ordering::Relaxed);
    }

    fn reset(&self) {
        self.entries.clear();
    }

    fn generate_report(&self) -> ProfileReport {
        let total_duration = self
            .start_time
            .get()
            .map(|start| start.elapsed())
            .unwrap_or(Duration::ZERO);

        let mut stages: Vec<StageProfile> = self
            .entries
            .iter()
            .map(|entry| {
                let duration = Duration::from_nanos(entry.total_nanos.load(Ordering::Relaxed));
                let percentage = if total_duration.as_nanos() > 0 {
                    (duration.as_nanos() as f64 / total_duration.as_nanos() as f64) * 100.0
                } else {
                    0.0
                };
                StageProfile {
                    name: entry.key().to_string(),
                    duration,
                    percentage,
                    count: entry.count.load(Ordering::Relaxed),
                    memory_delta_bytes: entry.memory_delta.load(Ordering::Relaxed),
                    peak_memory_bytes: entry.peak_memory.load(Ordering::Relaxed),
                }
            })
            .collect();

        // Slowest first.
        stages.sort_by(|a, b| b.duration.cmp(&a.duration));

        ProfileReport {
            total_duration,
            stages,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileReport {
    pub total_duration: Duration,
    pub stages: Vec<StageProfile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageProfile {
    pub name: String,
    pub duration: Duration,
    /// Share of the time since the first recording
    pub percentage: f64,
    pub count: u64,
    /// Summed change in resident memory across runs of this stage
    pub memory_delta_bytes: i64,
    pub peak_memory_bytes: u64,
}

impl ProfileReport {
    #[must_use]
    pub fn to_summary(&self) -> String {
        let mut output = format!(
            "\n=== Profiling Report ===\nTotal time: {:.2?}\n\n{:<32} {:>12} {:>8} {:>8} {:>12} {:>12}\n",
            self.total_duration, "Stage", "Duration", "%", "Count", "Mem delta", "Peak mem"
        );
        output.push_str(&"-".repeat(90));
        output.push('\n');

        for stage in &self.stages {
            output.push_str(&format!(
                "{:<32} {:>12} {:>7.1}% {:>8} {:>12} {:>12}\n",
                stage.name,
                format_duration(stage.duration),
                stage.percentage,
                stage.count,
                format_signed_bytes(stage.memory_delta_bytes),
                format_bytes(stage.peak_memory_bytes),
            ));
        }
        output
    }

    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

fn format_duration(d: Duration) -> String {
    if d.as_secs() >= 1 {
        format!("{:.2}s", d.as_secs_f64())
    } else if d.as_millis() >= 1 {
        format!("{:.1}ms", d.as_secs_f64() * 1000.0)
    } else {
        format!("{:.0}µs", d.as_secs_f64() * 1_000_000.0)
    }
}

fn format_bytes(bytes: u64) -> String {
    const MIB: f64 = 1024.0 * 1024.0;
    if bytes == 0 {
        "-".to_string()
    } else {
        format!("{:.1}MiB", bytes as f64 / MIB)
    }
}

fn format_signed_bytes(bytes: i64) -> String {
    let sign = if bytes < 0 { "-" } else { "+" };
    match format_bytes(bytes.unsigned_abs()).as_str() {
        "-" => "-".to_string(),
        magnitude => format!("{sign}{magnitude}"),
    }
}

/// Time the rest of the enclosing scope under `$name` when profiling is
/// enabled.
#[macro_export]
macro_rules! time_span {
    ($name:expr) => {
        let _timing_span = if $crate::observability::profiling::is_profiling_enabled() {
            Some($crate::observability::profiling::TimingSpan::new($name))
        } else {
            None
        };
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn count(name: &str) -> u64 {
        get_profile_report()
            .stages
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.count)
            .unwrap_or(0)
    }

    #[test]
    fn test_profile_stage_records_duration() {
        enable_profiling();
        let before = count("test_stage_duration");

        let value = profile_stage("test_stage_duration", || {
            thread::sleep(Duration::from_millis(10));
            42
        });

        assert_eq!(value, 42);
        let report = get_profile_report();
        let stage = report
            .stages
            .iter()
            .find(|s| s.name == "test_stage_duration")
            .expect("stage recorded");
        assert_eq!(stage.count, before + 1);
        assert!(stage.duration >= Duration::from_millis(10));
    }

    #[test]
    fn test_time_span_macro_accumulates() {
        enable_profiling();
        let before = count("test_span_macro");

        fn work() {
            time_span!("test_span_macro");
        }
        for _ in 0..3 {
            work();
        }

        assert_eq!(count("test_span_macro"), before + 3);
    }

    #[test]
    fn test_summary_and_json() {
        enable_profiling();
        profile_stage("test_summary_stage", || ());

        let report = get_profile_report();
        assert!(report.to_summary().contains("test_summary_stage"));
        assert!(report.to_json().contains("\"memory_delta_bytes\""));
    }

    #[test]
    fn test_byte_formatting() {
        assert_eq!(format_bytes(0), "-");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0MiB");
        assert_eq!(format_signed_bytes(-1024 * 1024), "-1.0MiB");
        assert_eq!(format_signed_bytes(0), "-");
    }
}
