// ── Tunnel driver ──

use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::model::Protocol;

/// Everything needed to bring one tunnel up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelRequest {
    pub server: String,
    pub protocol: Protocol,
    pub profile: PathBuf,
    /// `--auth-user-pass` file; `None` lets OpenVPN prompt or use the profile.
    pub credentials: Option<PathBuf>,
    pub status_file: Option<PathBuf>,
    pub redirect_gateway: bool,
    pub dns_args: Vec<String>,
    /// Pass-through options, appended last.
    pub extra_args: Vec<String>,
}

/// How a tunnel run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelExit {
    /// Clean exit after a deliberate stop (SIGTERM from `kill`).
    Stopped,
    /// Non-zero exit; the next server should be tried.
    Failed { code: Option<i32> },
    /// Our own interrupt ended the run.
    Interrupted,
}

/// Runs a tunnel until it exits or is cancelled.
pub trait TunnelDriver: Send + Sync {
    fn run(
        &self,
        request: &TunnelRequest,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<TunnelExit, CoreError>> + Send;
}

/// [`TunnelDriver`] for the `openvpn` binary.
#[derive(Debug, Clone)]
pub struct OpenVpnDriver {
    program: String,
    grace: Duration,
}

impl Default for OpenVpnDriver {
    fn default() -> Self {
        Self::new("openvpn")
    }
}

impl OpenVpnDriver {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            grace: Duration::from_secs(5),
        }
    }

    pub fn build_args(request: &TunnelRequest) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(status) = &request.status_file {
            args.extend(["--status".to_owned(), status.display().to_string(), "30".to_owned()]);
        }
        args.extend(["--auth-retry".to_owned(), "nointeract".to_owned()]);
        args.extend(["--config".to_owned(), request.profile.display().to_string()]);
        if let Some(credentials) = &request.credentials {
            args.extend(["--auth-user-pass".to_owned(), credentials.display().to_string()]);
        }
        args.extend(request.dns_args.iter().cloned());
        if request.redirect_gateway {
            args.push("--redirect-gateway".into());
        }
        args.extend(request.extra_args.iter().cloned());
        args
    }
}

async fn signal(pid: u32, sig: &str) -> bool {
    Command::new("kill")
        .args([format!("-{sig}"), pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .is_ok_and(|s| s.success())
}

impl TunnelDriver for OpenVpnDriver {
    async fn run(
        &self,
        request: &TunnelRequest,
        cancel: &CancellationToken,
    ) -> Result<TunnelExit, CoreError> {
        let args = Self::build_args(request);
        debug!(program = %self.program, ?args, "starting tunnel");
        info!(server = %request.server, protocol = %request.protocol, "connecting");

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CoreError::Tunnel {
                message: format!("could not start {}: {e}", self.program),
            })?;

        tokio::select! {
            status = child.wait() => {
                let status = status?;
                if status.success() {
                    info!(server = %request.server, "tunnel stopped");
                    Ok(TunnelExit::Stopped)
                } else {
                    warn!(server = %request.server, code = ?status.code(), "tunnel exited with failure");
                    Ok(TunnelExit::Failed { code: status.code() })
                }
            }
            () = cancel.cancelled() => {
                info!("Shutting down safely, please wait until the tunnel exits");
                if let Some(pid) = child.id() {
                    signal(pid, "TERM").await;
                }
                if tokio::time::timeout(self.grace, child.wait()).await.is_err() {
                    warn!("tunnel ignored SIGTERM, killing it");
                    child.kill().await?;
                }
                Ok(TunnelExit::Interrupted)
            }
        }
    }
}

/// Ask every running `openvpn` process to exit. Returns whether any did.
pub async fn terminate_all(program: &str) -> Result<bool, CoreError> {
    let status = Command::new("pkill")
        .args(["-TERM", "-x", program])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await?;
    match status.code() {
        Some(0) => {
            info!("{program} processes terminated");
            Ok(true)
        }
        Some(1) => {
            debug!("no {program} process running");
            Ok(false)
        }
        _ => Err(CoreError::Tunnel {
            message: format!("pkill {program} failed ({status})"),
        }),
    }
}
