//! Output formatting (JSON/text).

use std::io::{self, Write};

use netns_keeper::probe::ProbeResult;
use netns_keeper::reconcile::{ActionPlan, NamespaceSnapshot, PassReport};
use serde::Serialize;

use crate::config::Config;

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Plain text output.
    #[default]
    Text,
    /// JSON output.
    Json,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputOptions {
    /// Pretty print (for JSON).
    pub pretty: bool,
}

/// Trait for types that can be printed.
pub trait Printable {
    /// Print as plain text.
    fn print_text<W: Write>(&self, w: &mut W) -> io::Result<()>;

    /// Convert to JSON value.
    fn to_json(&self) -> serde_json::Value;

    /// Print in the specified format.
    fn print<W: Write>(&self, w: &mut W, format: OutputFormat, opts: &OutputOptions) -> io::Result<()> {
        match format {
            OutputFormat::Text => self.print_text(w),
            OutputFormat::Json => {
                let json = self.to_json();
                if opts.pretty {
                    serde_json::to_writer_pretty(&mut *w, &json)?;
                } else {
                    serde_json::to_writer(&mut *w, &json)?;
                }
                writeln!(w)?;
                Ok(())
            }
        }
    }
}

/// Print one item to stdout.
pub fn print<T: Printable>(item: &T, format: OutputFormat, opts: &OutputOptions) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    item.print(&mut stdout, format, opts)
}

fn json_of<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }))
}

impl Printable for PassReport {
    fn print_text<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let ns = self.snapshot.namespace();
        if self.was_noop() {
            writeln!(w, "netns {}: already converged, nothing to do", ns)?;
            return Ok(());
        }

        writeln!(w, "netns {}:", ns)?;
        for line in self.report.summary().lines() {
            writeln!(w, "  {}", line)?;
        }

        if self.is_converged() {
            writeln!(
                w,
                "converged ({} applied, {} already done)",
                self.report.applied(),
                self.report.skipped()
            )
        } else {
            writeln!(w, "NOT converged")
        }
    }

    fn to_json(&self) -> serde_json::Value {
        let mut obj = json_of(self);
        if let Some(map) = obj.as_object_mut() {
            map.insert("converged".into(), self.is_converged().into());
        }
        obj
    }
}

impl Printable for ActionPlan {
    fn print_text<W: Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(w, "{}", self.summary())
    }

    fn to_json(&self) -> serde_json::Value {
        json_of(self)
    }
}

impl Printable for NamespaceSnapshot {
    fn print_text<W: Write>(&self, w: &mut W) -> io::Result<()> {
        if !self.namespace_exists() {
            writeln!(w, "netns {}: absent", self.namespace())?;
        } else {
            let lo = match self.loopback_up() {
                Some(true) => "up",
                Some(false) => "down",
                None => "unknown",
            };
            writeln!(w, "netns {}: present (lo {})", self.namespace(), lo)?;
        }

        if self.interfaces().is_empty() {
            writeln!(w, "  link {}: not found", self.interface())?;
        }
        for dev in self.interfaces() {
            write!(
                w,
                "  link {} in {} ifindex {} {}",
                self.interface(),
                dev.location,
                dev.ifindex,
                if dev.up { "UP" } else { "DOWN" }
            )?;
            if let Some(mac) = dev.hw_address {
                write!(w, " {}", mac)?;
            }
            writeln!(w)?;
        }

        for addr in self.addresses() {
            writeln!(w, "  inet {}", addr)?;
        }
        for route in self.default_routes() {
            match route.gateway {
                Some(gw) => writeln!(w, "  default via {}", gw)?,
                None => writeln!(w, "  default (no gateway)")?,
            }
        }
        Ok(())
    }

    fn to_json(&self) -> serde_json::Value {
        json_of(self)
    }
}

impl Printable for ProbeResult {
    fn print_text<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for check in &self.checks {
            let mark = if check.success { "ok" } else { "FAIL" };
            writeln!(w, "  {:<4} {}: {}", mark, check.target, check.detail)?;
        }
        let verdict = if self.success { "passed" } else { "failed" };
        writeln!(w, "{}: {}", verdict, self.detail)
    }

    fn to_json(&self) -> serde_json::Value {
        json_of(self)
    }
}

impl Printable for Config {
    fn print_text<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let yaml = self.to_yaml().map_err(io::Error::other)?;
        write!(w, "{}", yaml)
    }

    fn to_json(&self) -> serde_json::Value {
        json_of(self)
    }
}

/// Log of steps taken by a service command.
#[derive(Debug, Default, Serialize)]
pub struct Steps {
    pub steps: Vec<String>,
    pub warnings: Vec<String>,
}

impl Steps {
    pub fn done(&mut self, step: impl Into<String>) {
        self.steps.push(step.into());
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        tracing::warn!("{}", warning);
        self.warnings.push(warning);
    }
}

impl Printable for Steps {
    fn print_text<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for step in &self.steps {
            writeln!(w, "{}", step)?;
        }
        for warning in &self.warnings {
            writeln!(w, "warning: {}", warning)?;
        }
        Ok(())
    }

    fn to_json(&self) -> serde_json::Value {
        json_of(self)
    }
}
