//! Host reference backend.
//!
//! Emulates the compute API on the CPU without an OpenCL runtime: sources
//! are checked by [`compiler`], kernel bodies are lowered by [`kernels`] and
//! run work-item by work-item when the queue is flushed, and every handle is
//! recorded in a [`Ledger`]. A [`FaultPlan`] makes any step
//! fail with a chosen status code, which is how the failure paths are
//! exercised in tests.

pub mod compiler;
pub mod kernels;
pub mod ledger;

pub use ledger::{Ledger, LedgerEvent, ResourceKind};

use crate::backend::{BufferRole, ComputeBackend};
use crate::device::{DeviceInfo, DeviceKind};
use crate::error::{codes, OpenClError, Result};
use compiler::CompiledProgram;
use kernels::HostKernel;
use ledger::Tracked;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, warn};

pub const REFERENCE_PLATFORM_NAME: &str = "hello-opencl reference platform";
pub const REFERENCE_DEVICE_NAME: &str = "Host Reference Device";
pub const REFERENCE_VENDOR: &str = "hello-opencl";

/// Steps at which a fault can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    Context,
    Queue,
    Program,
    InputBuffer,
    OutputBuffer,
    InputArg,
    OutputArg,
    Dispatch,
    ReadBack,
}

/// Injected failures and output corruption.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    failures: Vec<(FaultPoint, i32)>,
    corruption: Option<(usize, f32)>,
}

impl FaultPlan {
    fn code_at(&self, point: FaultPoint) -> Option<i32> {
        self.failures.iter().find(|(p, _)| *p == point).map(|(_, code)| *code)
    }

    fn check(&self, point: FaultPoint) -> std::result::Result<(), i32> {
        match self.code_at(point) {
            Some(code) => {
                debug!(?point, code, "injected fault");
                Err(code)
            }
            None => Ok(()),
        }
    }
}

type Storage = Rc<RefCell<Vec<f32>>>;

#[derive(Debug, Clone)]
pub struct ReferencePlatform {
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct ReferenceDevice {
    info: DeviceInfo,
}

#[derive(Debug)]
pub struct ReferenceContext {
    _handle: Tracked,
}

struct PendingLaunch {
    kernel: Rc<HostKernel>,
    input: Storage,
    output: Storage,
    global_size: usize,
}

pub struct ReferenceQueue {
    pending: RefCell<Vec<PendingLaunch>>,
    _handle: Tracked,
}

impl ReferenceQueue {
    /// Run every enqueued launch in submission order.
    fn finish(&self) {
        for launch in self.pending.borrow_mut().drain(..) {
            // A buffer bound to both arguments reads its pre-launch contents.
            let input: Vec<f32> = launch.input.borrow().clone();
            let mut output = launch.output.borrow_mut();
            for idx in 0..launch.global_size {
                launch.kernel.run(idx, &input, &mut output);
            }
        }
    }
}

#[derive(Debug)]
pub struct ReferenceProgram {
    source: String,
    built: Option<CompiledProgram>,
    _handle: Tracked,
}

impl ReferenceProgram {
    /// Exported kernels after a successful build.
    pub fn compiled(&self) -> Option<&CompiledProgram> {
        self.built.as_ref()
    }
}

pub struct ReferenceKernel {
    host: Rc<HostKernel>,
    args: [Option<Storage>; 2],
    _handle: Tracked,
}

pub struct ReferenceBuffer {
    storage: Storage,
    role: BufferRole,
    _handle: Tracked,
}

impl ReferenceBuffer {
    pub fn role(&self) -> BufferRole {
        self.role
    }

    pub fn len(&self) -> usize {
        self.storage.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// CPU emulation of the compute API.
#[derive(Debug, Clone)]
pub struct ReferenceBackend {
    platform: Option<String>,
    devices: Vec<DeviceInfo>,
    faults: FaultPlan,
    ledger: Ledger,
}

impl Default for ReferenceBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceBackend {
    /// One platform exposing a single CPU device.
    pub fn new() -> Self {
        Self {
            platform: Some(REFERENCE_PLATFORM_NAME.to_string()),
            devices: vec![DeviceInfo {
                name: REFERENCE_DEVICE_NAME.to_string(),
                vendor: REFERENCE_VENDOR.to_string(),
                kind: DeviceKind::Cpu,
            }],
            faults: FaultPlan::default(),
            ledger: Ledger::new(),
        }
    }

    /// Replace the device list.
    pub fn with_devices(mut self, devices: Vec<DeviceInfo>) -> Self {
        self.devices = devices;
        self
    }

    /// Report no platform at all.
    pub fn without_platform(mut self) -> Self {
        self.platform = None;
        self
    }

    /// Make `point` fail with status `code`.
    pub fn fail_at(mut self, point: FaultPoint, code: i32) -> Self {
        self.faults.failures.push((point, code));
        self
    }

    /// Overwrite `output[index]` with `value` after read-back.
    pub fn corrupt_output(mut self, index: usize, value: f32) -> Self {
        self.faults.corruption = Some((index, value));
        self
    }

    /// Shared view of the handle ledger.
    pub fn ledger(&self) -> Ledger {
        self.ledger.clone()
    }

    fn new_buffer(&self, data: Vec<f32>, role: BufferRole) -> ReferenceBuffer {
        debug!(%role, len = data.len(), "reference buffer allocated");
        ReferenceBuffer {
            storage: Rc::new(RefCell::new(data)),
            role,
            _handle: self.ledger.acquire(ResourceKind::Buffer),
        }
    }
}

impl ComputeBackend for ReferenceBackend {
    type Platform = ReferencePlatform;
    type Device = ReferenceDevice;
    type Context = ReferenceContext;
    type Queue = ReferenceQueue;
    type Program = ReferenceProgram;
    type Kernel = ReferenceKernel;
    type Buffer = ReferenceBuffer;

    fn name(&self) -> &'static str {
        "reference"
    }

    fn first_platform(&self) -> Result<ReferencePlatform> {
        match &self.platform {
            Some(name) => Ok(ReferencePlatform { name: name.clone() }),
            None => Err(OpenClError::NoPlatform { code: codes::PLATFORM_NOT_FOUND_KHR }),
        }
    }

    fn find_device(&self, _platform: &ReferencePlatform, kind: DeviceKind) -> Option<ReferenceDevice> {
        self.devices
            .iter()
            .find(|d| d.kind == kind)
            .map(|info| ReferenceDevice { info: info.clone() })
    }

    fn device_info(&self, device: &ReferenceDevice) -> DeviceInfo {
        device.info.clone()
    }

    fn create_context(&self, device: &ReferenceDevice) -> Result<ReferenceContext> {
        self.faults
            .check(FaultPoint::Context)
            .map_err(|code| OpenClError::ContextCreation { code })?;
        debug!(device = %device.info.name, "reference context created");
        Ok(ReferenceContext { _handle: self.ledger.acquire(ResourceKind::Context) })
    }

    fn create_queue(&self, _context: &ReferenceContext, _device: &ReferenceDevice) -> Result<ReferenceQueue> {
        self.faults
            .check(FaultPoint::Queue)
            .map_err(|code| OpenClError::QueueCreation { code })?;
        Ok(ReferenceQueue {
            pending: RefCell::new(Vec::new()),
            _handle: self.ledger.acquire(ResourceKind::Queue),
        })
    }

    fn create_program(&self, _context: &ReferenceContext, source: &str) -> Result<ReferenceProgram> {
        self.faults
            .check(FaultPoint::Program)
            .map_err(|code| OpenClError::ProgramCreation { code })?;
        if source.is_empty() {
            return Err(OpenClError::ProgramCreation { code: codes::INVALID_VALUE });
        }
        Ok(ReferenceProgram {
            source: source.to_string(),
            built: None,
            _handle: self.ledger.acquire(ResourceKind::Program),
        })
    }

    fn build_program(
        &self,
        program: &mut ReferenceProgram,
        _device: &ReferenceDevice,
        options: &str,
    ) -> Result<()> {
        match compiler::compile(&program.source, options) {
            Ok(compiled) => {
                if !compiled.log.is_empty() {
                    debug!(log = %compiled.log, "reference build warnings");
                }
                program.built = Some(compiled);
                Ok(())
            }
            Err(failure) => Err(OpenClError::ProgramBuild { code: failure.code, log: failure.log }),
        }
    }

    fn create_kernel(&self, program: &ReferenceProgram, entry_point: &str) -> Result<ReferenceKernel> {
        let kernel_error = |code| OpenClError::KernelCreation { name: entry_point.to_string(), code };

        let compiled = program
            .built
            .as_ref()
            .ok_or_else(|| kernel_error(codes::INVALID_PROGRAM_EXECUTABLE))?;
        let signature = compiled
            .kernel(entry_point)
            .ok_or_else(|| kernel_error(codes::INVALID_KERNEL_NAME))?;
        let host = HostKernel::lower(signature).map_err(|reason| {
            warn!(entry_point, %reason, "kernel body cannot run on the host");
            kernel_error(codes::INVALID_KERNEL_DEFINITION)
        })?;

        Ok(ReferenceKernel {
            host: Rc::new(host),
            args: [None, None],
            _handle: self.ledger.acquire(ResourceKind::Kernel),
        })
    }

    fn create_input_buffer(&self, _context: &ReferenceContext, data: &[f32]) -> Result<ReferenceBuffer> {
        let bytes = std::mem::size_of_val(data);
        let alloc_error = |code| OpenClError::BufferAllocation { role: BufferRole::Input, bytes, code };
        self.faults.check(FaultPoint::InputBuffer).map_err(alloc_error)?;
        if data.is_empty() {
            return Err(alloc_error(codes::INVALID_BUFFER_SIZE));
        }
        Ok(self.new_buffer(data.to_vec(), BufferRole::Input))
    }

    fn create_output_buffer(&self, _context: &ReferenceContext, len: usize) -> Result<ReferenceBuffer> {
        let bytes = len * std::mem::size_of::<f32>();
        let alloc_error = |code| OpenClError::BufferAllocation { role: BufferRole::Output, bytes, code };
        self.faults.check(FaultPoint::OutputBuffer).map_err(alloc_error)?;
        if len == 0 {
            return Err(alloc_error(codes::INVALID_BUFFER_SIZE));
        }
        // Device memory has no defined contents until the kernel writes it.
        Ok(self.new_buffer(vec![f32::NAN; len], BufferRole::Output))
    }

    fn set_kernel_args(
        &self,
        kernel: &mut ReferenceKernel,
        input: &ReferenceBuffer,
        output: &ReferenceBuffer,
    ) -> Result<()> {
        let mut bind = |index: usize, point: FaultPoint, buffer: &ReferenceBuffer| {
            self.faults.check(point)?;
            let slot = kernel.args.get_mut(index).ok_or(codes::INVALID_ARG_INDEX)?;
            *slot = Some(Rc::clone(&buffer.storage));
            Ok::<(), i32>(())
        };
        let first = bind(0, FaultPoint::InputArg, input);
        let second = bind(1, FaultPoint::OutputArg, output);
        first.and(second).map_err(|code| OpenClError::KernelArguments { code })
    }

    fn enqueue_kernel(
        &self,
        queue: &ReferenceQueue,
        kernel: &ReferenceKernel,
        global_size: usize,
    ) -> Result<()> {
        self.faults
            .check(FaultPoint::Dispatch)
            .map_err(|code| OpenClError::KernelLaunch { code })?;
        let (Some(input), Some(output)) = (&kernel.args[0], &kernel.args[1]) else {
            return Err(OpenClError::KernelLaunch { code: codes::INVALID_KERNEL_ARGS });
        };
        let capacity = input.borrow().len().min(output.borrow().len());
        if global_size == 0 || global_size > capacity {
            return Err(OpenClError::KernelLaunch { code: codes::INVALID_GLOBAL_WORK_SIZE });
        }
        queue.pending.borrow_mut().push(PendingLaunch {
            kernel: Rc::clone(&kernel.host),
            input: Rc::clone(input),
            output: Rc::clone(output),
            global_size,
        });
        debug!(kernel = %kernel.host.name, global_size, "reference launch enqueued");
        Ok(())
    }

    fn read_buffer(&self, queue: &ReferenceQueue, buffer: &ReferenceBuffer, dst: &mut [f32]) -> Result<()> {
        self.faults
            .check(FaultPoint::ReadBack)
            .map_err(|code| OpenClError::ReadBack { code })?;
        if dst.len() > buffer.len() {
            return Err(OpenClError::ReadBack { code: codes::INVALID_VALUE });
        }
        queue.finish();
        dst.copy_from_slice(&buffer.storage.borrow()[..dst.len()]);

        if let Some((index, value)) = self.faults.corruption {
            if let Some(slot) = dst.get_mut(index) {
                debug!(index, value, "corrupting read-back element");
                *slot = value;
            }
        }
        Ok(())
    }
}
