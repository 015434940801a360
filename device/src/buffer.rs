use std::ffi::c_void;

use kernlink_dtype::{DType, DeviceSpec, HasDType};

use crate::error::Result;
use crate::spec::DeviceSpecExt;

/// Memory a kernel can read or write through a raw pointer.
///
/// Implementors promise that `data_ptr` stays valid for as long as the implementor is
/// borrowed, and that it addresses elements of `dtype` on `device`.
pub trait DeviceBuffer {
    fn data_ptr(&self) -> *const c_void;

    /// Pointer usable for writes. `None` when the buffer is read-only.
    fn data_ptr_mut(&mut self) -> Option<*mut c_void> {
        None
    }

    fn device(&self) -> DeviceSpec;

    fn dtype(&self) -> DType;
}

impl<T: HasDType> DeviceBuffer for [T] {
    fn data_ptr(&self) -> *const c_void {
        self.as_ptr().cast()
    }

    fn data_ptr_mut(&mut self) -> Option<*mut c_void> {
        Some(self.as_mut_ptr().cast())
    }

    fn device(&self) -> DeviceSpec {
        DeviceSpec::Cpu
    }

    fn dtype(&self) -> DType {
        T::DTYPE
    }
}

impl<T: HasDType> DeviceBuffer for Vec<T> {
    fn data_ptr(&self) -> *const c_void {
        self.as_slice().data_ptr()
    }

    fn data_ptr_mut(&mut self) -> Option<*mut c_void> {
        self.as_mut_slice().data_ptr_mut()
    }

    fn device(&self) -> DeviceSpec {
        DeviceSpec::Cpu
    }

    fn dtype(&self) -> DType {
        T::DTYPE
    }
}

/// A pointer into memory owned elsewhere, typically a foreign tensor or device allocation.
#[derive(Debug, Clone, Copy)]
pub struct RawBuffer {
    ptr: *mut c_void,
    device: DeviceSpec,
    dtype: DType,
    writable: bool,
}

impl RawBuffer {
    /// Wrap a writable pointer.
    ///
    /// # Safety
    ///
    /// `ptr` must address memory of `dtype` elements on `device` and remain valid (and
    /// unaliased by other writers) for every kernel call the buffer is passed to.
    pub unsafe fn new(ptr: *mut c_void, device: DeviceSpec, dtype: DType) -> Self {
        Self { ptr, device, dtype, writable: true }
    }

    /// Wrap a pointer kernels may only read.
    ///
    /// # Safety
    ///
    /// Same contract as [`RawBuffer::new`], minus the aliasing requirement.
    pub unsafe fn read_only(ptr: *const c_void, device: DeviceSpec, dtype: DType) -> Self {
        Self { ptr: ptr.cast_mut(), device, dtype, writable: false }
    }

    /// Wrap memory of a foreign tensor that reports its placement as a device string
    /// such as `cuda:0` or `cpu`.
    ///
    /// # Safety
    ///
    /// Same contract as [`RawBuffer::new`]; read-only buffers skip the aliasing requirement.
    pub unsafe fn foreign(ptr: *mut c_void, device: &str, dtype: DType, writable: bool) -> Result<Self> {
        let device = <DeviceSpec as DeviceSpecExt>::parse(device)?;
        Ok(Self { ptr, device, dtype, writable })
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }
}

impl DeviceBuffer for RawBuffer {
    fn data_ptr(&self) -> *const c_void {
        self.ptr
    }

    fn data_ptr_mut(&mut self) -> Option<*mut c_void> {
        self.writable.then_some(self.ptr)
    }

    fn device(&self) -> DeviceSpec {
        self.device
    }

    fn dtype(&self) -> DType {
        self.dtype
    }
}
