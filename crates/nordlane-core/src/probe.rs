// ── Latency probing ──
//
// Runs the system `ping` against every load-ranked server at once and
// turns the summary lines into typed samples. Probe subprocesses are
// started a few milliseconds apart, awaited together, and reported in
// submission order. A probe that loses packets or prints no summary
// excludes its server; it never fails the batch.

use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use futures_util::future::join_all;
use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::model::candidate::sort_by_latency;
use crate::model::{Candidate, LatencySample, RankedServer};

// ── Summary parsing ──────────────────────────────────────────────────

/// Why a probe's output could not be turned into a sample.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("no packet statistics line")]
    MissingPacketLine,
    #[error("no round-trip summary line")]
    MissingSummary,
    #[error("unreadable value '{0}'")]
    BadNumber(String),
    #[error("expected 3 or 4 round-trip statistics, got {0}")]
    StatCount(usize),
}

/// Parsed tail of one `ping` run.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeSummary {
    pub transmitted: u32,
    pub received: u32,
    pub loss_percent: f64,
    /// Absent when every packet was lost (ping prints no round-trip line).
    pub sample: Option<LatencySample>,
}

impl ProbeSummary {
    pub fn has_loss(&self) -> bool {
        self.loss_percent > 0.0 || self.received < self.transmitted
    }
}

/// Parse iputils, BSD/macOS, and busybox `ping` summaries.
///
/// ```text
/// 5 packets transmitted, 5 received, 0% packet loss, time 803ms
/// rtt min/avg/max/mdev = 10.112/12.500/15.020/1.954 ms
/// ```
pub fn parse(output: &str) -> Result<ProbeSummary, ParseError> {
    let packet_line = output
        .lines()
        .find(|l| l.contains("packets transmitted"))
        .ok_or(ParseError::MissingPacketLine)?;
    let (transmitted, received, loss_percent) = parse_packet_line(packet_line)?;

    let sample = match output.lines().find(|l| l.contains("min/avg/max")) {
        Some(line) => Some(parse_summary_line(line)?),
        None if received == 0 => None,
        None => return Err(ParseError::MissingSummary),
    };

    Ok(ProbeSummary {
        transmitted,
        received,
        loss_percent,
        sample,
    })
}

fn parse_packet_line(line: &str) -> Result<(u32, u32, f64), ParseError> {
    let mut transmitted = None;
    let mut received = None;
    let mut loss = None;

    for field in line.split(',').map(str::trim) {
        let mut words = field.split_whitespace();
        let Some(first) = words.next() else { continue };
        let rest = words.collect::<Vec<_>>().join(" ");

        if rest.starts_with("packets transmitted") {
            transmitted = Some(number::<u32>(first)?);
        } else if rest == "received" || rest == "packets received" {
            received = Some(number::<u32>(first)?);
        } else if rest == "packet loss" {
            let pct = first.trim_end_matches('%');
            loss = Some(number::<f64>(pct)?);
        }
    }

    let transmitted = transmitted.ok_or(ParseError::MissingPacketLine)?;
    let received = received.ok_or(ParseError::MissingPacketLine)?;
    Ok((transmitted, received, loss.unwrap_or(0.0)))
}

fn parse_summary_line(line: &str) -> Result<LatencySample, ParseError> {
    let values = line
        .split_once('=')
        .map(|(_, v)| v.trim())
        .ok_or(ParseError::MissingSummary)?;
    let values = values.split_whitespace().next().unwrap_or_default();

    let stats = values
        .split('/')
        .map(millis)
        .collect::<Result<Vec<_>, _>>()?;

    match stats.as_slice() {
        [min, avg, max] => Ok(LatencySample {
            min: *min,
            avg: *avg,
            max: *max,
            mdev: None,
        }),
        [min, avg, max, mdev] => Ok(LatencySample {
            min: *min,
            avg: *avg,
            max: *max,
            mdev: Some(*mdev),
        }),
        other => Err(ParseError::StatCount(other.len())),
    }
}

fn number<T: std::str::FromStr>(raw: &str) -> Result<T, ParseError> {
    raw.parse()
        .map_err(|_| ParseError::BadNumber(raw.to_owned()))
}

/// Fractional milliseconds, truncated to whole milliseconds. Accepts a
/// decimal comma as printed by localized pings.
fn millis(raw: &str) -> Result<u32, ParseError> {
    let normalized = raw.replace(',', ".");
    let value: f64 = normalized
        .parse()
        .map_err(|_| ParseError::BadNumber(raw.to_owned()))?;
    if !value.is_finite() || value < 0.0 {
        return Err(ParseError::BadNumber(raw.to_owned()));
    }
    let whole = normalized.split('.').next().unwrap_or_default();
    whole
        .parse()
        .map_err(|_| ParseError::BadNumber(raw.to_owned()))
}

/// Turn one probe's raw output into a sample, or the reason it is excluded.
pub fn evaluate(identifier: &str, output: &str) -> Result<LatencySample, CoreError> {
    let degraded = |reason: String| CoreError::ProbeDegraded {
        server: identifier.to_owned(),
        reason,
    };

    let summary = parse(output).map_err(|e| degraded(e.to_string()))?;
    if summary.has_loss() {
        return Err(degraded(format!(
            "{}% packet loss ({}/{} received)",
            summary.loss_percent, summary.received, summary.transmitted
        )));
    }
    summary
        .sample
        .ok_or_else(|| degraded(ParseError::MissingSummary.to_string()))
}

// ── Probe runners ────────────────────────────────────────────────────

/// Executes one probe run against a host and returns its textual output.
pub trait ProbeRunner: Send + Sync {
    fn run(&self, host: &str, count: u32) -> impl Future<Output = Result<String, CoreError>> + Send;
}

/// [`ProbeRunner`] shelling out to the system `ping`.
#[derive(Debug, Clone)]
pub struct PingRunner {
    program: String,
    /// `None` when the local ping lacks `-i`; it then waits 1s per probe.
    interval: Option<Duration>,
    slack: Duration,
}

impl PingRunner {
    pub fn new(interval: Option<Duration>) -> Self {
        Self {
            program: "ping".into(),
            interval,
            slack: Duration::from_secs(3),
        }
    }

    /// Check whether the local ping accepts a sub-second `-i`, falling back
    /// to default spacing when it does not.
    pub async fn detect(interval: Duration) -> Self {
        let probe = Self::new(Some(interval));
        let supported = probe
            .command("127.0.0.1", 1)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .is_ok_and(|s| s.success());

        if supported {
            probe
        } else {
            warn!(
                "ping does not support '-i', falling back to 1s between probes; \
                 probing will be slower"
            );
            Self::new(None)
        }
    }

    /// Ping process for one run. The C locale keeps the summary's decimal
    /// point stable.
    fn command(&self, host: &str, count: u32) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.args(host, count)).env("LC_ALL", "C");
        cmd
    }

    /// Command line for one run, without the program name.
    pub fn args(&self, host: &str, count: u32) -> Vec<String> {
        let mut args = vec!["-n".to_owned()];
        if let Some(interval) = self.interval {
            args.push("-i".into());
            args.push(interval.as_secs_f64().to_string());
        }
        args.push("-c".into());
        args.push(count.to_string());
        args.push(host.to_owned());
        args
    }

    /// Upper bound for one run: every probe plus its spacing, plus slack.
    pub fn timeout(&self, count: u32) -> Duration {
        let spacing = self.interval.unwrap_or(Duration::from_secs(1));
        spacing.saturating_mul(count) + self.slack
    }
}

impl ProbeRunner for PingRunner {
    async fn run(&self, host: &str, count: u32) -> Result<String, CoreError> {
        let limit = self.timeout(count);
        let child = self
            .command(host, count)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(limit, child).await {
            Ok(Ok(output)) => Ok(String::from_utf8_lossy(&output.stdout).into_owned()),
            Ok(Err(e)) => Err(CoreError::ProbeDegraded {
                server: host.to_owned(),
                reason: format!("could not run {}: {e}", self.program),
            }),
            Err(_) => Err(CoreError::ProbeDegraded {
                server: host.to_owned(),
                reason: format!("no answer within {}s", limit.as_secs()),
            }),
        }
    }
}

// ── Prober ───────────────────────────────────────────────────────────

/// Outcome of probing one candidate set.
#[derive(Debug, Clone, Default)]
pub struct ProbeReport {
    /// Latency-ascending.
    pub ranked: Vec<Candidate>,
    /// `(identifier, reason)` for every excluded server, in submission order.
    pub excluded: Vec<(String, String)>,
}

/// Concurrent fan-out over a [`ProbeRunner`].
pub struct LatencyProber<R> {
    runner: R,
    probe_count: u32,
    host_suffix: String,
    stagger: Duration,
}

impl<R: ProbeRunner> LatencyProber<R> {
    pub fn new(runner: R, probe_count: u32, host_suffix: impl Into<String>) -> Self {
        Self {
            runner,
            probe_count,
            host_suffix: host_suffix.into(),
            stagger: Duration::from_millis(20),
        }
    }

    pub fn with_stagger(mut self, stagger: Duration) -> Self {
        self.stagger = stagger;
        self
    }

    fn host(&self, identifier: &str) -> String {
        format!("{identifier}.{}", self.host_suffix)
    }

    /// Probe every server, rank survivors, and report exclusions.
    ///
    /// Cancelling `cancel` drops every in-flight probe (killing its
    /// subprocess) and returns [`CoreError::Interrupted`].
    pub async fn probe(
        &self,
        servers: &[RankedServer],
        cancel: &CancellationToken,
    ) -> Result<ProbeReport, CoreError> {
        let probes = servers.iter().zip(0u32..).map(|(server, position)| {
            let host = self.host(&server.identifier);
            let delay = self.stagger.saturating_mul(position);
            async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                debug!(%host, "probing");
                self.runner.run(&host, self.probe_count).await
            }
        });

        let outputs = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(CoreError::Interrupted),
            outputs = join_all(probes) => outputs,
        };

        let mut report = ProbeReport::default();
        for (server, output) in servers.iter().zip(outputs) {
            let sample = output.and_then(|text| evaluate(&server.identifier, &text));
            match sample {
                Ok(latency) => {
                    info!(
                        server = %server.identifier,
                        min_ms = latency.min,
                        avg_ms = latency.avg,
                        max_ms = latency.max,
                        mdev_ms = ?latency.mdev,
                        "probe ok"
                    );
                    report.ranked.push(Candidate {
                        server: server.clone(),
                        latency,
                    });
                }
                Err(e) => {
                    warn!(server = %server.identifier, "{e}, skipping it");
                    let reason = match e {
                        CoreError::ProbeDegraded { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    report.excluded.push((server.identifier.clone(), reason));
                }
            }
        }

        sort_by_latency(&mut report.ranked);
        Ok(report)
    }
}
