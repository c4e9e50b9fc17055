//! Connectivity self-test run from inside a namespace.
//!
//! Probes never change namespace configuration and never fail the caller:
//! every problem, including a missing namespace or a missing tool, comes back
//! as a [`ProbeResult`] with `success: false`.
//!
//! ```ignore
//! use netns_keeper::probe::{ProbeConfig, ProbeKind, Prober};
//!
//! let prober = Prober::new(ProbeConfig::new(vec!["2.2.2.2".parse()?]));
//! let result = prober.probe("ha-test", ProbeKind::Reachability).await;
//! println!("{}", result.detail);
//! ```

use std::net::IpAddr;
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::process::Command;

use crate::netlink::namespace;

/// Which probe to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ProbeKind {
    /// ICMP echo to every configured target.
    Reachability,
    /// A TCP bandwidth test against an iperf server.
    Throughput,
}

/// An iperf server to test against.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct IperfServer {
    pub host: String,
    pub port: u16,
}

/// Probe settings.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Ping targets, in order. Put the gateway first.
    pub targets: Vec<IpAddr>,
    /// Echo requests per target.
    pub count: u32,
    /// Per-reply wait passed to ping, and the base of the command timeout.
    pub timeout: Duration,
    pub iperf: Option<IperfServer>,
    pub iperf_timeout: Duration,
}

impl ProbeConfig {
    /// Defaults: 4 echoes per target, 2 s reply wait, 30 s for iperf.
    pub fn new(targets: Vec<IpAddr>) -> Self {
        Self {
            targets,
            count: 4,
            timeout: Duration::from_secs(2),
            iperf: None,
            iperf_timeout: Duration::from_secs(30),
        }
    }

    /// Set the iperf server for throughput probes.
    pub fn with_iperf(mut self, server: IperfServer) -> Self {
        self.iperf = Some(server);
        self
    }
}

/// Result for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ProbeCheck {
    pub target: String,
    pub success: bool,
    pub detail: String,
}

/// Outcome of a probe.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ProbeResult {
    pub kind: ProbeKind,
    pub success: bool,
    pub detail: String,
    pub checks: Vec<ProbeCheck>,
}

impl ProbeResult {
    fn failed(kind: ProbeKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            success: false,
            detail: detail.into(),
            checks: Vec::new(),
        }
    }

    fn from_checks(kind: ProbeKind, checks: Vec<ProbeCheck>) -> Self {
        let passed = checks.iter().filter(|c| c.success).count();
        let success = !checks.is_empty() && passed == checks.len();
        Self {
            kind,
            success,
            detail: format!("{}/{} targets reachable", passed, checks.len()),
            checks,
        }
    }
}

/// Runs probes inside named namespaces.
#[derive(Debug, Clone)]
pub struct Prober {
    config: ProbeConfig,
}

impl Prober {
    pub fn new(config: ProbeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Run one probe inside `ns`.
    pub async fn probe(&self, ns: &str, kind: ProbeKind) -> ProbeResult {
        if !namespace::exists(ns) {
            return ProbeResult::failed(
                kind,
                format!("namespace '{}' does not exist, run 'add' first", ns),
            );
        }

        match kind {
            ProbeKind::Reachability => self.reachability(ns).await,
            ProbeKind::Throughput => self.throughput(ns).await,
        }
    }

    async fn reachability(&self, ns: &str) -> ProbeResult {
        if self.config.targets.is_empty() {
            return ProbeResult::failed(ProbeKind::Reachability, "no ping targets configured");
        }

        let wait = self.config.timeout.as_secs().max(1);
        // Worst case every echo waits the full reply timeout.
        let limit = Duration::from_secs(wait * u64::from(self.config.count) + 5);

        let mut checks = Vec::with_capacity(self.config.targets.len());
        for target in &self.config.targets {
            let args = [
                "-c".to_string(),
                self.config.count.to_string(),
                "-W".to_string(),
                wait.to_string(),
                target.to_string(),
            ];
            tracing::debug!(namespace = ns, %target, "pinging");

            let check = match run_in(ns, "ping", &args, limit).await {
                Ok(output) => {
                    let stdout = String::from_utf8_lossy(&output.stdout);
                    let detail = match parse_ping_summary(&stdout) {
                        Some((sent, received)) => format!("{}/{} replies", received, sent),
                        None => first_line(&output.stderr).unwrap_or_else(|| "no summary".into()),
                    };
                    ProbeCheck {
                        target: target.to_string(),
                        success: output.status.success(),
                        detail,
                    }
                }
                Err(detail) => ProbeCheck {
                    target: target.to_string(),
                    success: false,
                    detail,
                },
            };
            checks.push(check);
        }

        ProbeResult::from_checks(ProbeKind::Reachability, checks)
    }

    async fn throughput(&self, ns: &str) -> ProbeResult {
        let kind = ProbeKind::Throughput;
        let Some(server) = &self.config.iperf else {
            return ProbeResult::failed(kind, "no iperf server configured");
        };

        let iperf = match which::which("iperf") {
            Ok(path) => path,
            Err(_) => return ProbeResult::failed(kind, IPERF_INSTALL_HINT),
        };

        let args = [
            "-p".to_string(),
            server.port.to_string(),
            "-c".to_string(),
            server.host.clone(),
        ];
        let target = format!("{}:{}", server.host, server.port);

        match run_in(ns, iperf, &args, self.config.iperf_timeout).await {
            Ok(output) if output.status.success() => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let detail = bandwidth_line(&stdout).unwrap_or("completed").to_string();
                ProbeResult {
                    kind,
                    success: true,
                    detail: detail.clone(),
                    checks: vec![ProbeCheck {
                        target,
                        success: true,
                        detail,
                    }],
                }
            }
            Ok(output) => {
                let detail = first_line(&output.stderr)
                    .or_else(|| first_line(&output.stdout))
                    .unwrap_or_else(|| format!("iperf exited with {}", output.status));
                ProbeResult::failed(kind, format!("{}: {}", target, detail))
            }
            Err(detail) => ProbeResult::failed(kind, format!("{}: {}", target, detail)),
        }
    }
}

const IPERF_INSTALL_HINT: &str = "iperf not found. Please install iperf:\n  \
    Debian/Ubuntu: sudo apt install iperf\n  \
    RHEL/CentOS: sudo yum install iperf";

/// Run a program with its network namespace switched to `ns`.
///
/// Errors are returned as display strings: the caller only reports them.
async fn run_in(
    ns: &str,
    program: impl Into<PathBuf>,
    args: &[String],
    limit: Duration,
) -> Result<Output, String> {
    let program = program.into();
    let ns_file = namespace::open(ns).map_err(|e| e.to_string())?;
    let fd = ns_file.as_raw_fd();

    let mut cmd = Command::new(&program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // SAFETY: pre_exec runs in the forked child before exec; setns is
    // async-signal-safe and fd stays open until the child has been spawned.
    unsafe {
        cmd.pre_exec(move || {
            if libc::setns(fd, libc::CLONE_NEWNET) < 0 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let result = tokio::time::timeout(limit, cmd.output()).await;
    drop(ns_file);

    match result {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(format!("failed to run {}: {}", program.display(), e)),
        Err(_) => Err(format!("timed out after {}s", limit.as_secs())),
    }
}

/// Parse `N packets transmitted, M received` from ping output.
fn parse_ping_summary(output: &str) -> Option<(u32, u32)> {
    let line = output.lines().find(|l| l.contains("packets transmitted"))?;
    let mut fields = line.split(',').map(str::trim);

    let sent = fields.next()?.split_whitespace().next()?.parse().ok()?;
    let received = fields.next()?.split_whitespace().next()?.parse().ok()?;
    Some((sent, received))
}

/// The last line carrying a bandwidth figure.
fn bandwidth_line(output: &str) -> Option<&str> {
    output
        .lines()
        .rev()
        .find(|l| l.contains("bits/sec"))
        .map(str::trim)
}

fn first_line(bytes: &[u8]) -> Option<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_owned)
}
