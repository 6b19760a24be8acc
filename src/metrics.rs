//! Running evaluation counters surfaced through the status endpoint, with a
//! health score derived from error rate and average processing time. Backed
//! entirely by counters this process actually accumulates rather than any
//! sampled or simulated system load.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

use crate::decision::Decision;

pub struct EvaluationMetrics {
    started_at: Instant,
    total: AtomicU64,
    allowed: AtomicU64,
    reviewed: AtomicU64,
    blocked: AtomicU64,
    errors: AtomicU64,
    total_processing_ms: AtomicU64,
}

impl Default for EvaluationMetrics {
    fn default() -> Self {
        Self {
            started_at: Instant::now(),
            total: AtomicU64::new(0),
            allowed: AtomicU64::new(0),
            reviewed: AtomicU64::new(0),
            blocked: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            total_processing_ms: AtomicU64::new(0),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_seconds: u64,
    pub total_evaluations: u64,
    pub allowed: u64,
    pub reviewed: u64,
    pub blocked: u64,
    pub errors: u64,
    pub average_processing_time_ms: f64,
    pub health_score: f64,
}

impl EvaluationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, decision: Decision, processing_time_ms: i64) {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.total_processing_ms.fetch_add(processing_time_ms.max(0) as u64, Ordering::Relaxed);
        match decision {
            Decision::Allow => self.allowed.fetch_add(1, Ordering::Relaxed),
            Decision::Review => self.reviewed.fetch_add(1, Ordering::Relaxed),
            Decision::Block => self.blocked.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let total = self.total.load(Ordering::Relaxed);
        let errors = self.errors.load(Ordering::Relaxed);
        let total_processing_ms = self.total_processing_ms.load(Ordering::Relaxed);
        let average_processing_time_ms = if total > 0 {
            total_processing_ms as f64 / total as f64
        } else {
            0.0
        };

        let attempts = total + errors;
        let error_rate = if attempts > 0 { errors as f64 / attempts as f64 * 100.0 } else { 0.0 };
        let mut health_score: f64 = 100.0;
        if error_rate > 5.0 {
            health_score -= 30.0;
        } else if error_rate > 1.0 {
            health_score -= 10.0;
        }
        if average_processing_time_ms > 2000.0 {
            health_score -= 20.0;
        } else if average_processing_time_ms > 500.0 {
            health_score -= 10.0;
        }

        MetricsSnapshot {
            uptime_seconds: self.started_at.elapsed().as_secs(),
            total_evaluations: total,
            allowed: self.allowed.load(Ordering::Relaxed),
            reviewed: self.reviewed.load(Ordering::Relaxed),
            blocked: self.blocked.load(Ordering::Relaxed),
            errors,
            average_processing_time_ms,
            health_score: health_score.clamp(0.0, 100.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_decisions_and_computes_average() {
        let metrics = EvaluationMetrics::new();
        metrics.record(Decision::Allow, 10);
        metrics.record(Decision::Block, 30);
        let snap = metrics.snapshot();
        assert_eq!(snap.total_evaluations, 2);
        assert_eq!(snap.allowed, 1);
        assert_eq!(snap.blocked, 1);
        assert_eq!(snap.average_processing_time_ms, 20.0);
    }

    #[test]
    fn high_error_rate_lowers_health_score() {
        let metrics = EvaluationMetrics::new();
        for _ in 0..10 {
            metrics.record_error();
        }
        metrics.record(Decision::Allow, 5);
        assert!(metrics.snapshot().health_score < 100.0);
    }
}
