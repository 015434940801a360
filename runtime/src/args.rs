//! Argument marshaling.
//!
//! Callers describe each argument as an [`ArgValue`]; the binder validates it against the
//! declared parameter and lowers it to an [`ArgSlot`] whose address is passed through the
//! invoke trampoline's `void** args`.

use std::ffi::c_void;
use std::marker::PhantomData;

use kernlink_device::{DeviceBuffer, RawBuffer};
use kernlink_dtype::{DType, DeviceSpec, HasDType};

/// A buffer argument: a raw pointer plus what the binder needs to validate it.
#[derive(Debug, Clone, Copy)]
pub struct BufferArg<'a> {
    ptr: *mut c_void,
    device: DeviceSpec,
    dtype: DType,
    writable: bool,
    _borrow: PhantomData<&'a mut ()>,
}

impl BufferArg<'_> {
    pub fn ptr(&self) -> *mut c_void {
        self.ptr
    }

    pub fn device(&self) -> DeviceSpec {
        self.device
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }
}

/// One argument of a kernel call.
#[derive(Debug, Clone, Copy)]
pub enum ArgValue<'a> {
    Int(i32),
    Float(f32),
    Buffer(BufferArg<'a>),
}

impl<'a> ArgValue<'a> {
    /// Read-only view of `buffer`, accepted by `IN` parameters.
    pub fn input<B: DeviceBuffer + ?Sized>(buffer: &'a B) -> Self {
        Self::Buffer(BufferArg {
            ptr: buffer.data_ptr().cast_mut(),
            device: buffer.device(),
            dtype: buffer.dtype(),
            writable: false,
            _borrow: PhantomData,
        })
    }

    /// Writable view of `buffer`, accepted by `IN` and `OUT` parameters.
    ///
    /// Falls back to a read-only view when the buffer does not hand out a mutable pointer.
    pub fn output<B: DeviceBuffer + ?Sized>(buffer: &'a mut B) -> Self {
        let device = buffer.device();
        let dtype = buffer.dtype();
        let (ptr, writable) = match buffer.data_ptr_mut() {
            Some(ptr) => (ptr, true),
            None => (buffer.data_ptr().cast_mut(), false),
        };
        Self::Buffer(BufferArg { ptr, device, dtype, writable, _borrow: PhantomData })
    }

    /// Short description used in type mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Buffer(b) if b.writable => "writable buffer",
            Self::Buffer(_) => "read-only buffer",
        }
    }

    pub fn as_buffer(&self) -> Option<&BufferArg<'a>> {
        match self {
            Self::Buffer(b) => Some(b),
            _ => None,
        }
    }
}

impl From<i32> for ArgValue<'_> {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<f32> for ArgValue<'_> {
    fn from(value: f32) -> Self {
        Self::Float(value)
    }
}

impl<'a, T: HasDType> From<&'a [T]> for ArgValue<'a> {
    fn from(buffer: &'a [T]) -> Self {
        Self::input(buffer)
    }
}

impl<'a, T: HasDType> From<&'a mut [T]> for ArgValue<'a> {
    fn from(buffer: &'a mut [T]) -> Self {
        Self::output(buffer)
    }
}

impl<'a, T: HasDType> From<&'a Vec<T>> for ArgValue<'a> {
    fn from(buffer: &'a Vec<T>) -> Self {
        Self::input(buffer)
    }
}

impl<'a, T: HasDType> From<&'a mut Vec<T>> for ArgValue<'a> {
    fn from(buffer: &'a mut Vec<T>) -> Self {
        Self::output(buffer)
    }
}

impl From<RawBuffer> for ArgValue<'_> {
    fn from(buffer: RawBuffer) -> Self {
        Self::Buffer(BufferArg {
            ptr: buffer.data_ptr().cast_mut(),
            device: buffer.device(),
            dtype: buffer.dtype(),
            writable: buffer.is_writable(),
            _borrow: PhantomData,
        })
    }
}

/// Value returned by a non-void kernel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarValue {
    Int(i32),
    Float(f32),
}

impl ScalarValue {
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(_) => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(_) => None,
        }
    }
}

/// Storage for one marshaled argument or the return value.
///
/// The trampoline reads `*static_cast<T*>(args[i])`, so each slot must hold the value at
/// offset zero with C layout.
#[repr(C)]
#[derive(Clone, Copy)]
pub(crate) union ArgSlot {
    pub int: i32,
    pub float: f32,
    pub ptr: *mut c_void,
}

impl ArgSlot {
    pub(crate) fn zeroed() -> Self {
        Self { ptr: std::ptr::null_mut() }
    }
}

impl From<&ArgValue<'_>> for ArgSlot {
    fn from(value: &ArgValue<'_>) -> Self {
        match value {
            ArgValue::Int(v) => Self { int: *v },
            ArgValue::Float(v) => Self { float: *v },
            ArgValue::Buffer(b) => Self { ptr: b.ptr },
        }
    }
}
