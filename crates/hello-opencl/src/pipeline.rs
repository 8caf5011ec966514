//! The square-and-verify run, step by step.
//!
//! Handles are plain locals owned by [`Pipeline::run`]. They are declared in
//! acquisition order, so both the normal return and every early `?` drop them
//! in reverse: buffers (input, then output), kernel, program, queue, context.

use crate::backend::ComputeBackend;
use crate::config::PipelineConfig;
use crate::device::{DeviceInfo, DeviceKind};
use crate::error::{OpenClError, Result};
use crate::resource::{self, KernelSource, ResourceLocator};
use crate::validate::{self, Validation};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Milestones reported while a run progresses.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// No GPU on the platform; a CPU is tried next.
    GpuUnavailable,
    DeviceSelected(DeviceInfo),
    SourceLoaded { path: PathBuf, bytes: usize },
    ProgramBuilt { entry_point: String },
    KernelDispatched { global_size: usize },
    ResultsRead { count: usize },
}

/// Receives [`PipelineEvent`]s in the order they happen.
pub trait ProgressSink {
    fn on_event(&mut self, event: &PipelineEvent);
}

impl ProgressSink for Vec<PipelineEvent> {
    fn on_event(&mut self, event: &PipelineEvent) {
        self.push(event.clone());
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn on_event(&mut self, _event: &PipelineEvent) {}
}

/// Outcome of a run that reached validation.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub backend: &'static str,
    pub device: DeviceInfo,
    pub source_path: PathBuf,
    pub input: Vec<f32>,
    pub output: Vec<f32>,
    pub validation: Validation,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.validation.passed()
    }
}

struct DeviceBuffers<B: ComputeBackend> {
    // Field order is release order.
    input: B::Buffer,
    output: B::Buffer,
}

/// One configured run against a backend.
pub struct Pipeline<'a, B: ComputeBackend> {
    backend: &'a B,
    config: &'a PipelineConfig,
    locator: &'a ResourceLocator,
}

impl<'a, B: ComputeBackend> Pipeline<'a, B> {
    pub fn new(backend: &'a B, config: &'a PipelineConfig, locator: &'a ResourceLocator) -> Self {
        Self { backend, config, locator }
    }

    /// Execute every step and validate the result.
    ///
    /// Infrastructure failures return `Err` from the failing step. A wrong
    /// result is not an error; it comes back as [`Validation::Mismatch`].
    pub fn run(&self, sink: &mut dyn ProgressSink) -> Result<RunReport> {
        self.config.validate()?;
        let started = Instant::now();
        let backend = self.backend;
        let n = self.config.num_values;
        info!(backend = backend.name(), num_values = n, "starting run");

        let platform = backend.first_platform()?;
        let device = self.select_device(&platform, sink)?;
        let device_info = backend.device_info(&device);
        info!(device = %device_info.name, kind = %device_info.kind, "selected device");
        sink.on_event(&PipelineEvent::DeviceSelected(device_info.clone()));

        let context = backend.create_context(&device)?;
        let queue = backend.create_queue(&context, &device)?;

        let source = self.load_source()?;
        sink.on_event(&PipelineEvent::SourceLoaded {
            path: source.path.clone(),
            bytes: source.text.len(),
        });

        let mut program = backend.create_program(&context, &source.text)?;
        if let Err(err) = backend.build_program(&mut program, &device, &self.config.build_options) {
            warn!(code = ?err.code(), "program build failed");
            return Err(err);
        }
        let mut kernel = backend.create_kernel(&program, &self.config.entry_point)?;
        sink.on_event(&PipelineEvent::ProgramBuilt {
            entry_point: self.config.entry_point.clone(),
        });

        let input = validate::sequential_input(n);
        let mut output = vec![0.0f32; n];

        let buffers = DeviceBuffers::<B> {
            input: backend.create_input_buffer(&context, &input)?,
            output: backend.create_output_buffer(&context, n)?,
        };
        debug!(bytes = self.config.buffer_bytes(), "device buffers allocated");

        backend.set_kernel_args(&mut kernel, &buffers.input, &buffers.output)?;
        backend.enqueue_kernel(&queue, &kernel, n)?;
        sink.on_event(&PipelineEvent::KernelDispatched { global_size: n });

        backend.read_buffer(&queue, &buffers.output, &mut output)?;
        sink.on_event(&PipelineEvent::ResultsRead { count: n });

        let validation = validate::validate(&input, &output);
        match validation.mismatch() {
            Some(m) => warn!(index = m.index, observed = m.observed, expected = m.expected, "output mismatch"),
            None => info!(checked = n, "all values squared"),
        }

        Ok(RunReport {
            backend: backend.name(),
            device: device_info,
            source_path: source.path,
            input,
            output,
            validation,
            elapsed: started.elapsed(),
        })
    }

    fn select_device(&self, platform: &B::Platform, sink: &mut dyn ProgressSink) -> Result<B::Device> {
        let order = self.config.device.search_order();
        for (i, &kind) in order.iter().enumerate() {
            if let Some(device) = self.backend.find_device(platform, kind) {
                return Ok(device);
            }
            debug!(%kind, "no device of this kind");
            if kind == DeviceKind::Gpu && i + 1 < order.len() {
                sink.on_event(&PipelineEvent::GpuUnavailable);
            }
        }
        Err(OpenClError::NoDevice)
    }

    fn load_source(&self) -> Result<KernelSource> {
        match &self.config.kernel_path {
            Some(path) => resource::load_path(path),
            None => self.locator.load(&self.config.kernel_file),
        }
    }
}
