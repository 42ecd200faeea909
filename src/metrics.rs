//! Process-wide metrics registry (C4), exposed at `/metrics` in Prometheus
//! text format. Hand-rolled with atomics and a label-keyed `DashMap` rather
//! than pulling in the `prometheus` crate.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

#[derive(Default)]
struct Histogram {
    bucket_counts: Vec<AtomicU64>,
    sum_ms: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    fn new(buckets: &[u64]) -> Self {
        Self {
            bucket_counts: buckets.iter().map(|_| AtomicU64::new(0)).collect(),
            sum_ms: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    fn observe(&self, buckets: &[u64], value_ms: u64) {
        self.sum_ms.fetch_add(value_ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        for (idx, ub) in buckets.iter().enumerate() {
            if value_ms <= *ub {
                self.bucket_counts[idx].fetch_add(1, Ordering::Relaxed);
                break;
            }
        }
    }

    /// `buckets` are millisecond thresholds, matching `observe`'s unit, but
    /// `name` always names a `_seconds` metric. Bucket boundaries and the sum
    /// are converted from milliseconds to seconds here so the exposed text
    /// matches the metric name's unit; only the label text changes, the
    /// underlying bucket counts stay unit-independent.
    fn write(&self, buf: &mut String, name: &str, buckets: &[u64], extra_labels: &str) {
        let mut cumulative = 0u64;
        for (i, ub) in buckets.iter().enumerate() {
            cumulative += self.bucket_counts[i].load(Ordering::Relaxed);
            let le_seconds = *ub as f64 / 1000.0;
            writeln!(buf, "{name}_bucket{{{extra_labels}le=\"{le_seconds}\"}} {cumulative}").ok();
        }
        let count = self.count.load(Ordering::Relaxed);
        writeln!(buf, "{name}_bucket{{{extra_labels}le=\"+Inf\"}} {count}").ok();
        let sum_seconds = self.sum_ms.load(Ordering::Relaxed) as f64 / 1000.0;
        writeln!(buf, "{name}_sum{{{}}} {}", extra_labels.trim_end_matches(','), sum_seconds).ok();
        writeln!(buf, "{name}_count{{{}}} {}", extra_labels.trim_end_matches(','), count).ok();
    }
}

const LATENCY_BUCKETS_MS: &[u64] = &[5, 10, 25, 50, 100, 250, 500, 1000, 2500, 5000, 10000, 30000];

pub struct MetricsRegistry {
    requests_total: DashMap<&'static str, AtomicU64>,
    items_classified_total: DashMap<String, AtomicU64>,
    api_calls_total: DashMap<&'static str, AtomicU64>,
    circuit_breaker_opens_total: AtomicU64,
    request_duration: Histogram,
    api_call_duration: Histogram,
    active_requests: AtomicI64,
    circuit_breaker_state: AtomicI64,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let requests_total = DashMap::new();
        for status in ["ok", "error", "rejected"] {
            requests_total.insert(status, AtomicU64::new(0));
        }
        let api_calls_total = DashMap::new();
        for status in ["ok", "error", "retried", "short_circuited"] {
            api_calls_total.insert(status, AtomicU64::new(0));
        }
        Self {
            requests_total,
            items_classified_total: DashMap::new(),
            api_calls_total,
            circuit_breaker_opens_total: AtomicU64::new(0),
            request_duration: Histogram::new(LATENCY_BUCKETS_MS),
            api_call_duration: Histogram::new(LATENCY_BUCKETS_MS),
            active_requests: AtomicI64::new(0),
            circuit_breaker_state: AtomicI64::new(0),
        }
    }

    pub fn inc_requests_total(&self, status: &'static str) {
        if let Some(counter) = self.requests_total.get(status) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn inc_items_classified(&self, category: &str) {
        self.items_classified_total
            .entry(category.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_api_calls_total(&self, status: &'static str) {
        if let Some(counter) = self.api_calls_total.get(status) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn inc_circuit_breaker_opens(&self) {
        self.circuit_breaker_opens_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn observe_request_duration_ms(&self, ms: u64) {
        self.request_duration.observe(LATENCY_BUCKETS_MS, ms);
    }

    pub fn observe_api_call_duration_ms(&self, ms: u64) {
        self.api_call_duration.observe(LATENCY_BUCKETS_MS, ms);
    }

    pub fn inc_active_requests(&self) {
        self.active_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec_active_requests(&self) {
        self.active_requests.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn active_requests(&self) -> i64 {
        self.active_requests.load(Ordering::Relaxed)
    }

    pub fn set_circuit_breaker_state(&self, value: i64) {
        self.circuit_breaker_state.store(value, Ordering::Relaxed);
    }

    pub fn render(&self) -> String {
        let mut buf = String::new();

        writeln!(buf, "# HELP ai_sorter_requests_total Terminal outcome of /sort requests").ok();
        writeln!(buf, "# TYPE ai_sorter_requests_total counter").ok();
        for entry in self.requests_total.iter() {
            writeln!(
                buf,
                "ai_sorter_requests_total{{status=\"{}\"}} {}",
                entry.key(),
                entry.value().load(Ordering::Relaxed)
            )
            .ok();
        }

        writeln!(buf, "# HELP ai_sorter_items_classified_total Items returned with each category").ok();
        writeln!(buf, "# TYPE ai_sorter_items_classified_total counter").ok();
        for entry in self.items_classified_total.iter() {
            writeln!(
                buf,
                "ai_sorter_items_classified_total{{category=\"{}\"}} {}",
                entry.key(),
                entry.value().load(Ordering::Relaxed)
            )
            .ok();
        }

        writeln!(buf, "# HELP ai_sorter_api_calls_total Outcomes of upstream calls").ok();
        writeln!(buf, "# TYPE ai_sorter_api_calls_total counter").ok();
        for entry in self.api_calls_total.iter() {
            writeln!(
                buf,
                "ai_sorter_api_calls_total{{status=\"{}\"}} {}",
                entry.key(),
                entry.value().load(Ordering::Relaxed)
            )
            .ok();
        }

        writeln!(buf, "# HELP ai_sorter_circuit_breaker_opens_total Closed-to-Open transitions").ok();
        writeln!(buf, "# TYPE ai_sorter_circuit_breaker_opens_total counter").ok();
        writeln!(
            buf,
            "ai_sorter_circuit_breaker_opens_total {}",
            self.circuit_breaker_opens_total.load(Ordering::Relaxed)
        )
        .ok();

        writeln!(buf, "# HELP ai_sorter_request_duration_seconds End-to-end /sort latency").ok();
        writeln!(buf, "# TYPE ai_sorter_request_duration_seconds histogram").ok();
        self.request_duration
            .write(&mut buf, "ai_sorter_request_duration_seconds", LATENCY_BUCKETS_MS, "");

        writeln!(buf, "# HELP ai_sorter_api_call_duration_seconds Upstream call latency").ok();
        writeln!(buf, "# TYPE ai_sorter_api_call_duration_seconds histogram").ok();
        self.api_call_duration
            .write(&mut buf, "ai_sorter_api_call_duration_seconds", LATENCY_BUCKETS_MS, "");

        writeln!(buf, "# HELP ai_sorter_active_requests In-flight /sort handlers").ok();
        writeln!(buf, "# TYPE ai_sorter_active_requests gauge").ok();
        writeln!(buf, "ai_sorter_active_requests {}", self.active_requests.load(Ordering::Relaxed)).ok();

        writeln!(buf, "# HELP ai_sorter_circuit_breaker_state 0=Closed, 1=HalfOpen, 2=Open").ok();
        writeln!(buf, "# TYPE ai_sorter_circuit_breaker_state gauge").ok();
        writeln!(
            buf,
            "ai_sorter_circuit_breaker_state {}",
            self.circuit_breaker_state.load(Ordering::Relaxed)
        )
        .ok();

        buf
    }
}

pub type SharedMetrics = Arc<MetricsRegistry>;
