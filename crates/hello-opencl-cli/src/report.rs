//! Human-readable progress on stdout.
//!
//! Structured diagnostics go through `tracing` on stderr; this module owns
//! only the lines a user of the demo reads.

use console::style;
use hello_opencl::{OpenClError, PipelineEvent, ProgressSink, RunReport, Validation};
use std::io::Write;

/// Prints pipeline progress and the final verdict to `out`.
pub struct ConsoleReporter<W: Write> {
    out: W,
    color: bool,
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self { out, color }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Verdict lines for a run that reached validation.
    pub fn report_run(&mut self, report: &RunReport) {
        match report.validation {
            Validation::Passed { .. } => {
                let line = style("All values were properly squared!").green().force_styling(self.color);
                let _ = writeln!(self.out, "{line}");
            }
            Validation::Mismatch(m) => {
                let head = style(format!("Error: Element {} did not match expected output.", m.index))
                    .red()
                    .force_styling(self.color);
                let _ = writeln!(self.out, "{head}");
                let _ = writeln!(self.out, "Saw {:.4}, expected {:.4}", m.observed, m.expected);
            }
        }
    }

    /// Diagnostic for a failed step, followed by the build log when there
    /// is one.
    pub fn report_error(&mut self, err: &OpenClError) {
        let line = style(err.to_string()).red().force_styling(self.color);
        let _ = writeln!(self.out, "{line}");
        if let Some(log) = err.build_log() {
            let _ = writeln!(self.out, "Build log:\n{log}");
        }
        if let OpenClError::ResourceNotFound { searched, .. } = err {
            for dir in searched {
                let hint = style(format!("  searched {}", dir.display())).dim().force_styling(self.color);
                let _ = writeln!(self.out, "{hint}");
            }
        }
    }
}

impl<W: Write> ProgressSink for ConsoleReporter<W> {
    fn on_event(&mut self, event: &PipelineEvent) {
        match event {
            PipelineEvent::GpuUnavailable => {
                let _ = writeln!(self.out, "No GPU found, trying CPU...");
            }
            PipelineEvent::DeviceSelected(info) => {
                let _ = writeln!(self.out, "Using device: {}", info.name);
            }
            PipelineEvent::SourceLoaded { .. }
            | PipelineEvent::ProgramBuilt { .. }
            | PipelineEvent::KernelDispatched { .. }
            | PipelineEvent::ResultsRead { .. } => {}
        }
    }
}
