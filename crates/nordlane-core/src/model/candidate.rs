// ── Probed candidates ──

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::endpoint::RankedServer;

/// Round-trip summary from one probe run, in whole milliseconds.
///
/// `mdev` is absent when the probe tool only prints three statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencySample {
    pub min: u32,
    pub avg: u32,
    pub max: u32,
    pub mdev: Option<u32>,
}

impl LatencySample {
    /// Number of statistics the probe reported.
    pub fn stat_count(&self) -> usize {
        if self.mdev.is_some() { 4 } else { 3 }
    }
}

/// A load-ranked server annotated with its measured latency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub server: RankedServer,
    pub latency: LatencySample,
}

impl Candidate {
    pub fn identifier(&self) -> &str {
        &self.server.identifier
    }
}

/// Sort candidates into latency order, in place and stable.
///
/// When every sample carries four statistics the key is `(avg, mdev)`;
/// otherwise `avg` alone. Equal keys keep submission order.
pub fn sort_by_latency(candidates: &mut [Candidate]) {
    let full_stats = candidates.iter().all(|c| c.latency.stat_count() >= 4);
    candidates.sort_by(|a, b| compare(&a.latency, &b.latency, full_stats));
}

fn compare(a: &LatencySample, b: &LatencySample, full_stats: bool) -> Ordering {
    let by_avg = a.avg.cmp(&b.avg);
    if full_stats {
        by_avg.then(a.mdev.cmp(&b.mdev))
    } else {
        by_avg
    }
}
