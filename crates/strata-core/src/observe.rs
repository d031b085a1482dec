//! Optional metrics instrumentation for Strata.
//!
//! When the `observe` feature is enabled, key operations emit counters and
//! histograms via the [`metrics`] crate. A downstream application must install
//! a metrics recorder (e.g. `metrics-exporter-prometheus`) to collect the data.
//!
//! When the feature is **not** enabled every function in this module is a
//! zero-cost no-op.

/// Record a successful append.
///
/// - `strata.log.appends_total` – counter
#[inline]
pub fn record_append() {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("strata.log.appends_total").increment(1);
    }
}

/// Record entries handed to a group consumer.
///
/// - `strata.group.deliveries_total` – counter with `mode` label (`new` / `history`)
#[inline]
pub fn record_delivery(entries: u64, history: bool) {
    #[cfg(feature = "observe")]
    {
        let mode = if history { "history" } else { "new" };
        metrics::counter!("strata.group.deliveries_total", "mode" => mode).increment(entries);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (entries, history);
    }
}

/// Record acknowledged pending records.
///
/// - `strata.group.acks_total` – counter
#[inline]
pub fn record_ack(count: u64) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("strata.group.acks_total").increment(count);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = count;
    }
}

/// Record pending records moved to a new owner by a claim.
///
/// - `strata.group.claims_total` – counter
#[inline]
pub fn record_claim(count: u64) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("strata.group.claims_total").increment(count);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = count;
    }
}

/// Record pending records dropped because their entry was trimmed.
///
/// A non-zero rate means consumers are slower than retention allows.
///
/// - `strata.pending.orphans_dropped_total` – counter
#[inline]
pub fn record_orphans_dropped(count: u64) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("strata.pending.orphans_dropped_total").increment(count);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = count;
    }
}

/// Record a trim pass (entries removed + duration).
///
/// - `strata.retention.trimmed_total` – counter
/// - `strata.retention.trim_duration_seconds` – histogram
#[inline]
pub fn record_trim(removed: u64, duration: std::time::Duration) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("strata.retention.trimmed_total").increment(removed);
        metrics::histogram!("strata.retention.trim_duration_seconds")
            .record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (removed, duration);
    }
}

/// Record entries a live subscriber skipped because it fell behind.
///
/// - `strata.live.skipped_total` – counter
#[inline]
pub fn record_live_skipped(count: u64) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("strata.live.skipped_total").increment(count);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = count;
    }
}

/// Record how a blocking group read finished.
///
/// - `strata.group.blocking_reads_total` – counter with `outcome` label
/// - `strata.group.blocking_wait_seconds` – histogram
#[inline]
pub fn record_blocking_read(duration: std::time::Duration, outcome: &'static str) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("strata.group.blocking_reads_total", "outcome" => outcome).increment(1);
        metrics::histogram!("strata.group.blocking_wait_seconds").record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (duration, outcome);
    }
}
