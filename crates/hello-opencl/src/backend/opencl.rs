//! OpenCL backend over the system ICD loader via the `opencl3` crate.
//!
//! `opencl3` handle types release their CL objects on drop, so ownership
//! alone gives the pipeline its teardown order.

use crate::backend::{BufferRole, ComputeBackend};
use crate::device::{DeviceInfo, DeviceKind};
use crate::error::{codes, OpenClError, Result};
use opencl3::command_queue::CommandQueue;
use opencl3::context::Context;
use opencl3::device::{
    Device, CL_DEVICE_TYPE_ACCELERATOR, CL_DEVICE_TYPE_ALL, CL_DEVICE_TYPE_CPU, CL_DEVICE_TYPE_GPU,
};
use opencl3::kernel::Kernel;
use opencl3::memory::{Buffer, ClMem, CL_MEM_COPY_HOST_PTR, CL_MEM_READ_ONLY, CL_MEM_WRITE_ONLY};
use opencl3::platform::{get_platforms, Platform};
use opencl3::program::Program;
use opencl3::types::{cl_device_type, cl_float, CL_BLOCKING};
use std::ptr;
use tracing::{debug, info};

/// Real OpenCL device access through the first available platform.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenClBackend;

impl OpenClBackend {
    pub fn new() -> Self {
        Self
    }
}

fn device_type_bits(kind: DeviceKind) -> cl_device_type {
    match kind {
        DeviceKind::Gpu => CL_DEVICE_TYPE_GPU,
        DeviceKind::Cpu => CL_DEVICE_TYPE_CPU,
        DeviceKind::Accelerator => CL_DEVICE_TYPE_ACCELERATOR,
        DeviceKind::Other => CL_DEVICE_TYPE_ALL,
    }
}

fn classify(bits: cl_device_type) -> DeviceKind {
    if bits & CL_DEVICE_TYPE_GPU != 0 {
        DeviceKind::Gpu
    } else if bits & CL_DEVICE_TYPE_CPU != 0 {
        DeviceKind::Cpu
    } else if bits & CL_DEVICE_TYPE_ACCELERATOR != 0 {
        DeviceKind::Accelerator
    } else {
        DeviceKind::Other
    }
}

impl ComputeBackend for OpenClBackend {
    type Platform = Platform;
    type Device = Device;
    type Context = Context;
    type Queue = CommandQueue;
    type Program = Program;
    type Kernel = Kernel;
    type Buffer = Buffer<cl_float>;

    fn name(&self) -> &'static str {
        "opencl"
    }

    fn first_platform(&self) -> Result<Platform> {
        let platforms = get_platforms().map_err(|e| OpenClError::NoPlatform { code: e.0 })?;
        let platform = platforms
            .into_iter()
            .next()
            .ok_or(OpenClError::NoPlatform { code: codes::PLATFORM_NOT_FOUND_KHR })?;
        debug!(platform = %platform.name().unwrap_or_default(), "using OpenCL platform");
        Ok(platform)
    }

    fn find_device(&self, platform: &Platform, kind: DeviceKind) -> Option<Device> {
        match platform.get_devices(device_type_bits(kind)) {
            Ok(ids) => ids.first().map(|id| Device::new(*id)),
            Err(e) => {
                debug!(%kind, code = e.0, "device query failed");
                None
            }
        }
    }

    fn device_info(&self, device: &Device) -> DeviceInfo {
        DeviceInfo {
            name: device.name().unwrap_or_default(),
            vendor: device.vendor().unwrap_or_default(),
            kind: device.dev_type().map(classify).unwrap_or(DeviceKind::Other),
        }
    }

    fn create_context(&self, device: &Device) -> Result<Context> {
        Context::from_device(device).map_err(|e| OpenClError::ContextCreation { code: e.0 })
    }

    // `create_default` maps to clCreateCommandQueue, the only queue entry
    // point OpenCL 1.2 runtimes provide.
    #[allow(deprecated)]
    fn create_queue(&self, context: &Context, _device: &Device) -> Result<CommandQueue> {
        // The context holds exactly one device, which the default queue binds to.
        CommandQueue::create_default(context, 0).map_err(|e| OpenClError::QueueCreation { code: e.0 })
    }

    fn create_program(&self, context: &Context, source: &str) -> Result<Program> {
        Program::create_from_source(context, source)
            .map_err(|e| OpenClError::ProgramCreation { code: e.0 })
    }

    fn build_program(&self, program: &mut Program, device: &Device, options: &str) -> Result<()> {
        if let Err(e) = program.build(&[device.id()], options) {
            let log = program.get_build_log(device.id()).unwrap_or_default();
            return Err(OpenClError::ProgramBuild { code: e.0, log });
        }
        info!("compiled OpenCL program from source");
        Ok(())
    }

    fn create_kernel(&self, program: &Program, entry_point: &str) -> Result<Kernel> {
        Kernel::create(program, entry_point).map_err(|e| OpenClError::KernelCreation {
            name: entry_point.to_string(),
            code: e.0,
        })
    }

    fn create_input_buffer(&self, context: &Context, data: &[f32]) -> Result<Buffer<cl_float>> {
        // SAFETY: with CL_MEM_COPY_HOST_PTR the runtime copies `data.len()`
        // floats out of `data` during the call and never writes through the
        // pointer.
        unsafe {
            Buffer::<cl_float>::create(
                context,
                CL_MEM_READ_ONLY | CL_MEM_COPY_HOST_PTR,
                data.len(),
                data.as_ptr().cast_mut().cast(),
            )
        }
        .map_err(|e| OpenClError::BufferAllocation {
            role: BufferRole::Input,
            bytes: std::mem::size_of_val(data),
            code: e.0,
        })
    }

    fn create_output_buffer(&self, context: &Context, len: usize) -> Result<Buffer<cl_float>> {
        // SAFETY: no host pointer is passed.
        unsafe { Buffer::<cl_float>::create(context, CL_MEM_WRITE_ONLY, len, ptr::null_mut()) }
            .map_err(|e| OpenClError::BufferAllocation {
                role: BufferRole::Output,
                bytes: len * std::mem::size_of::<cl_float>(),
                code: e.0,
            })
    }

    fn set_kernel_args(
        &self,
        kernel: &mut Kernel,
        input: &Buffer<cl_float>,
        output: &Buffer<cl_float>,
    ) -> Result<()> {
        // SAFETY: both arguments are `__global float*` in the kernel signature
        // and the buffers outlive every launch of `kernel`.
        let first = unsafe { kernel.set_arg(0, &input.get()) };
        let second = unsafe { kernel.set_arg(1, &output.get()) };
        first.and(second).map_err(|e| OpenClError::KernelArguments { code: e.0 })
    }

    fn enqueue_kernel(&self, queue: &CommandQueue, kernel: &Kernel, global_size: usize) -> Result<()> {
        let global = [global_size];
        // SAFETY: one dimension, `global` outlives the call, no offset and no
        // explicit local size.
        let event = unsafe {
            queue.enqueue_nd_range_kernel(
                kernel.get(),
                1,
                ptr::null(),
                global.as_ptr(),
                ptr::null(),
                &[],
            )
        }
        .map_err(|e| OpenClError::KernelLaunch { code: e.0 })?;
        debug!(global_size, "kernel enqueued");
        drop(event);
        Ok(())
    }

    fn read_buffer(&self, queue: &CommandQueue, buffer: &Buffer<cl_float>, dst: &mut [f32]) -> Result<()> {
        // SAFETY: blocking read into a live slice no longer than the buffer.
        unsafe { queue.enqueue_read_buffer(buffer, CL_BLOCKING, 0, dst, &[]) }
            .map_err(|e| OpenClError::ReadBack { code: e.0 })?;
        Ok(())
    }
}
