//! Runtime counters and latency statistics for the prediction service.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for the serving loop
pub struct ServingMetrics {
    /// Batches answered successfully
    pub batches_served: AtomicU64,
    /// Records scored across all batches
    pub records_scored: AtomicU64,
    /// Records classified positive
    pub positives: AtomicU64,
    /// Health probes answered
    pub health_checks: AtomicU64,
    /// Rejected requests by error kind
    rejections: RwLock<HashMap<String, u64>>,
    /// Batch latencies (in microseconds)
    latencies: RwLock<Vec<u64>>,
    /// Positive-class probability distribution buckets
    probability_buckets: RwLock<[u64; 10]>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl ServingMetrics {
    pub fn new() -> Self {
        Self {
            batches_served: AtomicU64::new(0),
            records_scored: AtomicU64::new(0),
            positives: AtomicU64::new(0),
            health_checks: AtomicU64::new(0),
            rejections: RwLock::new(HashMap::new()),
            latencies: RwLock::new(Vec::with_capacity(1000)),
            probability_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a batch that was scored successfully
    pub fn record_batch(&self, latency: Duration, probabilities: &[f64], positives: usize) {
        self.batches_served.fetch_add(1, Ordering::Relaxed);
        self.records_scored
            .fetch_add(probabilities.len() as u64, Ordering::Relaxed);
        self.positives.fetch_add(positives as u64, Ordering::Relaxed);

        if let Ok(mut times) = self.latencies.write() {
            times.push(latency.as_micros() as u64);
            // Keep only the most recent window
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }

        if let Ok(mut buckets) = self.probability_buckets.write() {
            for &p in probabilities {
                buckets[bucket(p)] += 1;
            }
        }
    }

    /// Record a rejected request
    pub fn record_rejection(&self, kind: &str) {
        if let Ok(mut by_kind) = self.rejections.write() {
            *by_kind.entry(kind.to_string()).or_insert(0) += 1;
        }
    }

    pub fn record_health_check(&self) {
        self.health_checks.fetch_add(1, Ordering::Relaxed);
    }

    /// Latency statistics over the retained window
    pub fn get_latency_stats(&self) -> LatencyStats {
        let Ok(times) = self.latencies.read() else {
            return LatencyStats::default();
        };
        if times.is_empty() {
            return LatencyStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();
        let at = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];

        LatencyStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: at(0.50),
            p95_us: at(0.95),
            p99_us: at(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Records scored per second since startup
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.records_scored.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_probability_distribution(&self) -> [u64; 10] {
        self.probability_buckets
            .read()
            .map(|b| *b)
            .unwrap_or_default()
    }

    pub fn get_rejections(&self) -> HashMap<String, u64> {
        self.rejections
            .read()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let batches = self.batches_served.load(Ordering::Relaxed);
        let records = self.records_scored.load(Ordering::Relaxed);
        let positives = self.positives.load(Ordering::Relaxed);
        let positive_rate = if records > 0 {
            (positives as f64 / records as f64) * 100.0
        } else {
            0.0
        };

        let latency = self.get_latency_stats();
        let throughput = self.get_throughput();
        let rejections = self.get_rejections();
        let distribution = self.get_probability_distribution();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║            DEPOSIT PREDICTION SERVICE - METRICS              ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Batches Served: {:>8}  │  Records Scored: {:>8}          ║",
            batches, records
        );
        info!(
            "║ Positives:      {:>8}  │  Positive Rate: {:>6.1}%  {:>6.1} rec/s ║",
            positives, positive_rate, throughput
        );
        info!(
            "║ Health Checks:  {:>8}                                      ║",
            self.health_checks.load(Ordering::Relaxed)
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Batch Latency (μs): mean={:>5} p50={:>5} p95={:>5} p99={:>5}   ║",
            latency.mean_us, latency.p50_us, latency.p95_us, latency.p99_us
        );
        if !rejections.is_empty() {
            info!("╠══════════════════════════════════════════════════════════════╣");
            info!("║ Rejected Requests:                                           ║");
            for (kind, count) in &rejections {
                info!("║   {:12}: {:>6}                                         ║", kind, count);
            }
        }
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Positive-Class Probability Distribution:                     ║");
        let total: u64 = distribution.iter().sum();
        for (i, &count) in distribution.iter().enumerate() {
            let pct = if total > 0 { (count as f64 / total as f64) * 100.0 } else { 0.0 };
            let bar: String = "█".repeat(((pct / 2.0) as usize).min(20));
            info!(
                "║   {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                bar
            );
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

impl Default for ServingMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn bucket(p: f64) -> usize {
    ((p * 10.0).max(0.0) as usize).min(9)
}

/// Batch latency statistics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LatencyStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Periodically logs a metrics summary
pub struct MetricsReporter {
    metrics: Arc<ServingMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<ServingMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        // the first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_recording() {
        let metrics = ServingMetrics::new();

        metrics.record_batch(Duration::from_micros(100), &[0.05, 0.7, 1.0], 2);
        metrics.record_batch(Duration::from_micros(300), &[0.02], 0);
        metrics.record_rejection("validation");
        metrics.record_rejection("validation");
        metrics.record_health_check();

        assert_eq!(metrics.batches_served.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.records_scored.load(Ordering::Relaxed), 4);
        assert_eq!(metrics.positives.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.health_checks.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.get_rejections()["validation"], 2);

        let distribution = metrics.get_probability_distribution();
        assert_eq!(distribution[0], 2);
        assert_eq!(distribution[7], 1);
        // p = 1.0 lands in the top bucket
        assert_eq!(distribution[9], 1);
        assert_eq!(distribution.iter().sum::<u64>(), 4);
    }

    #[test]
    fn test_bucket_edges() {
        assert_eq!(bucket(0.0), 0);
        assert_eq!(bucket(0.1), 1);
        assert_eq!(bucket(0.95), 9);
        assert_eq!(bucket(1.0), 9);
    }

    #[test]
    fn test_latency_stats() {
        let metrics = ServingMetrics::new();
        assert_eq!(metrics.get_latency_stats(), LatencyStats::default());

        for us in 1..=100 {
            metrics.record_batch(Duration::from_micros(us), &[0.5], 0);
        }

        let stats = metrics.get_latency_stats();
        assert_eq!(stats.count, 100);
        assert_eq!(stats.max_us, 100);
        assert_eq!(stats.p50_us, 51);
        assert_eq!(stats.p99_us, 100);
    }
}
