//! Binder validation and dispatch tests.
//!
//! Bindings are built over Rust trampolines with the same ABI as the generated ones, so
//! no compiler or GPU is needed.

use std::ffi::{c_int, c_void};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

use kernlink_codegen::{KernelDeclaration, scan};
use kernlink_device::RawBuffer;
use kernlink_dtype::{Backend, DType, DeviceSpec, ParamType};

use crate::args::{ArgValue, ScalarValue};
use crate::binder::{FunctionBinding, FunctionTable, InvokeFn, KernelFunction, SetDeviceFn, validate};
use crate::Error;

fn decl(src: &str) -> KernelDeclaration {
    scan(src).unwrap().declarations.remove(0)
}

fn add_decl() -> KernelDeclaration {
    decl("KERNLINK_KERNEL void add_forward_kernel(const int n, IN a, IN b, OUT out) {}")
}

unsafe extern "C" fn add_invoke(args: *const *mut c_void, _ret: *mut c_void) {
    unsafe {
        let n = *(*args.add(0) as *const i32);
        let a = *(*args.add(1) as *const *const f32);
        let b = *(*args.add(2) as *const *const f32);
        let out = *(*args.add(3) as *const *mut f32);
        for i in 0..n as usize {
            *out.add(i) = *a.add(i) + *b.add(i);
        }
    }
}

unsafe extern "C" fn sum_invoke(args: *const *mut c_void, ret: *mut c_void) {
    unsafe {
        let n = *(*args.add(0) as *const i32);
        let x = *(*args.add(1) as *const *const f32);
        let sum: f32 = (0..n as usize).map(|i| *x.add(i)).sum();
        *(ret as *mut f32) = sum;
    }
}

unsafe extern "C" fn twice_invoke(args: *const *mut c_void, ret: *mut c_void) {
    unsafe {
        let n = *(*args.add(0) as *const i32);
        *(ret as *mut i32) = 2 * n;
    }
}

fn host(declaration: KernelDeclaration, invoke: InvokeFn) -> FunctionBinding {
    unsafe { FunctionBinding::from_raw(declaration, Backend::Cpu, invoke, None) }
}

fn fake_device_buffer(device_id: usize, writable: bool) -> RawBuffer {
    let ptr = NonNull::<f32>::dangling().as_ptr().cast::<c_void>();
    let device = DeviceSpec::Cuda { device_id };
    unsafe {
        if writable {
            RawBuffer::new(ptr, device, DType::Float32)
        } else {
            RawBuffer::read_only(ptr, device, DType::Float32)
        }
    }
}

#[test]
fn test_host_call() {
    let binding = host(add_decl(), add_invoke);
    let a = vec![1.0f32, 2.0, 3.0];
    let b = vec![4.0f32, 5.0, 6.0];
    let mut out = vec![0.0f32; 3];

    let ret = unsafe { binding.call(&[3.into(), (&a).into(), (&b).into(), (&mut out).into()]) }.unwrap();

    assert_eq!(ret, None);
    assert_eq!(out, vec![5.0, 7.0, 9.0]);
}

#[test]
fn test_scalar_returns() {
    let sum = host(decl("KERNLINK_KERNEL float sum_kernel(const int n, IN x) {}"), sum_invoke);
    let x = vec![0.5f32, 1.5, 2.0];
    let ret = unsafe { sum.call(&[3.into(), (&x).into()]) }.unwrap();
    assert_eq!(ret, Some(ScalarValue::Float(4.0)));

    let twice = host(decl("KERNLINK_KERNEL int twice_kernel(const int n) {}"), twice_invoke);
    let ret = unsafe { twice.call(&[21.into()]) }.unwrap();
    assert_eq!(ret, Some(ScalarValue::Int(42)));
}

#[test]
fn test_arity_mismatch() {
    let binding = host(add_decl(), add_invoke);
    let a = vec![1.0f32];
    let err = unsafe { binding.call(&[1.into(), (&a).into()]) }.unwrap_err();
    assert!(matches!(err, Error::ArityMismatch { expected: 4, actual: 2, .. }), "unexpected error: {err}");
}

#[test]
fn test_no_scalar_coercion() {
    let binding = host(add_decl(), add_invoke);
    let (a, b, mut out) = (vec![1.0f32], vec![1.0f32], vec![0.0f32]);

    let err = unsafe { binding.call(&[1.0f32.into(), (&a).into(), (&b).into(), (&mut out).into()]) }.unwrap_err();

    match err {
        Error::TypeMismatch { index, expected, actual, .. } => {
            assert_eq!(index, 0);
            assert_eq!(expected, ParamType::Int);
            assert_eq!(actual, "float");
        }
        other => panic!("expected type mismatch, got {other}"),
    }
    assert_eq!(out, vec![0.0]);
}

#[test]
fn test_out_requires_writable_buffer() {
    let binding = host(add_decl(), add_invoke);
    let (a, b, out) = (vec![1.0f32], vec![1.0f32], vec![0.0f32]);

    let err = unsafe { binding.call(&[1.into(), (&a).into(), (&b).into(), (&out).into()]) }.unwrap_err();

    assert!(
        matches!(err, Error::TypeMismatch { index: 3, expected: ParamType::Out, actual: "read-only buffer", .. }),
        "unexpected error: {err}"
    );
}

#[test]
fn test_in_accepts_writable_buffer() {
    let binding = host(add_decl(), add_invoke);
    let (mut a, mut b, mut out) = (vec![1.0f32], vec![2.0f32], vec![0.0f32]);
    unsafe { binding.call(&[1.into(), (&mut a).into(), (&mut b).into(), (&mut out).into()]) }.unwrap();
    assert_eq!(out, vec![3.0]);
}

#[test]
fn test_buffer_for_scalar_parameter() {
    let binding = host(add_decl(), add_invoke);
    let (a, b, mut out) = (vec![1.0f32], vec![1.0f32], vec![0.0f32]);
    let err = unsafe { binding.call(&[(&a).into(), (&a).into(), (&b).into(), (&mut out).into()]) }.unwrap_err();
    assert!(matches!(err, Error::TypeMismatch { index: 0, .. }), "unexpected error: {err}");
}

#[test]
fn test_unsupported_element() {
    let binding = host(add_decl(), add_invoke);
    let a = vec![1.0f64];
    let (b, mut out) = (vec![1.0f32], vec![0.0f32]);

    let err = unsafe { binding.call(&[1.into(), (&a).into(), (&b).into(), (&mut out).into()]) }.unwrap_err();

    assert!(
        matches!(err, Error::UnsupportedElement { index: 1, dtype: DType::Float64, supported: DType::Float32, .. }),
        "unexpected error: {err}"
    );
}

#[test]
fn test_mixed_devices_rejected_before_call() {
    let binding = host(add_decl(), add_invoke);
    let a = vec![1.0f32];
    let b = fake_device_buffer(0, false);
    let mut out = vec![0.0f32];

    let err = unsafe { binding.call(&[1.into(), (&a).into(), b.into(), (&mut out).into()]) }.unwrap_err();

    match &err {
        Error::DeviceMismatch { first_param, first, param, device, .. } => {
            assert_eq!(first_param, "a");
            assert_eq!(*first, DeviceSpec::Cpu);
            assert_eq!(param, "b");
            assert_eq!(*device, DeviceSpec::Cuda { device_id: 0 });
        }
        other => panic!("expected device mismatch, got {other}"),
    }
    assert!(err.to_string().contains("CUDA:0"), "{err}");
    assert_eq!(out, vec![0.0]);
}

#[test]
fn test_different_accelerator_ordinals_rejected() {
    let args: [ArgValue; 4] = [
        1.into(),
        fake_device_buffer(0, false).into(),
        fake_device_buffer(1, false).into(),
        fake_device_buffer(0, true).into(),
    ];
    let err = validate(&add_decl(), &args).unwrap_err();
    assert!(matches!(err, Error::DeviceMismatch { .. }), "unexpected error: {err}");
}

#[test]
fn test_common_device() {
    let (a, b, mut out) = (vec![1.0f32], vec![1.0f32], vec![0.0f32]);
    let device = validate(&add_decl(), &[1.into(), (&a).into(), (&b).into(), (&mut out).into()]).unwrap();
    assert_eq!(device, Some(DeviceSpec::Cpu));

    let twice = decl("KERNLINK_KERNEL int twice_kernel(const int n) {}");
    assert_eq!(validate(&twice, &[ArgValue::Int(1)]).unwrap(), None);
}

#[test]
fn test_binding_rejects_other_backend() {
    let binding = host(add_decl(), add_invoke);
    let args: [ArgValue; 4] = [
        1.into(),
        fake_device_buffer(0, false).into(),
        fake_device_buffer(0, false).into(),
        fake_device_buffer(0, true).into(),
    ];
    let err = unsafe { binding.call(&args) }.unwrap_err();
    assert!(matches!(err, Error::BackendMismatch { backend: Backend::Cpu, .. }), "unexpected error: {err}");
}

static CUDA_CALLS: AtomicUsize = AtomicUsize::new(0);
static CUDA_DEVICE: AtomicI32 = AtomicI32::new(-1);

unsafe extern "C" fn cuda_add_invoke(_args: *const *mut c_void, _ret: *mut c_void) {
    CUDA_CALLS.fetch_add(1, Ordering::SeqCst);
}

unsafe extern "C" fn record_device(device_id: c_int) {
    CUDA_DEVICE.store(device_id, Ordering::SeqCst);
}

fn add_function() -> KernelFunction {
    let mut function = KernelFunction::new(add_decl());
    function.insert(host(add_decl(), add_invoke));
    let set_device: SetDeviceFn = record_device;
    function.insert(unsafe { FunctionBinding::from_raw(add_decl(), Backend::Cuda, cuda_add_invoke, Some(set_device)) });
    function
}

#[test]
fn test_dispatch_follows_buffer_device() {
    let function = add_function();
    assert_eq!(function.backends().collect::<Vec<_>>(), vec![Backend::Cpu, Backend::Cuda]);

    let args: [ArgValue; 4] = [
        4.into(),
        fake_device_buffer(1, false).into(),
        fake_device_buffer(1, false).into(),
        fake_device_buffer(1, true).into(),
    ];
    let ret = unsafe { function.call(&args) }.unwrap();

    assert_eq!(ret, None);
    assert_eq!(CUDA_CALLS.load(Ordering::SeqCst), 1);
    assert_eq!(CUDA_DEVICE.load(Ordering::SeqCst), 1);

    let (a, b, mut out) = (vec![1.0f32], vec![2.0f32], vec![0.0f32]);
    unsafe { function.call(&[1.into(), (&a).into(), (&b).into(), (&mut out).into()]) }.unwrap();
    assert_eq!(out, vec![3.0]);
    assert_eq!(CUDA_CALLS.load(Ordering::SeqCst), 1);
}

static WIDE_CALLS: AtomicUsize = AtomicUsize::new(0);

unsafe extern "C" fn wide_invoke(_args: *const *mut c_void, _ret: *mut c_void) {
    WIDE_CALLS.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn test_device_ordinal_must_fit_c_int() {
    let set_device: SetDeviceFn = record_device;
    let binding = unsafe { FunctionBinding::from_raw(add_decl(), Backend::Cuda, wide_invoke, Some(set_device)) };
    let device = format!("cuda:{}", i64::from(c_int::MAX) + 1);
    let ptr = NonNull::<f32>::dangling().as_ptr().cast::<c_void>();
    let buffer = |writable| unsafe { RawBuffer::foreign(ptr, &device, DType::Float32, writable) }.unwrap();
    let args: [ArgValue; 4] = [1.into(), buffer(false).into(), buffer(false).into(), buffer(true).into()];

    let err = unsafe { binding.call(&args) }.unwrap_err();

    assert!(matches!(err, Error::DeviceOrdinal { .. }), "unexpected error: {err}");
    assert!(err.to_string().contains("CUDA:2147483648"), "{err}");
    assert_eq!(WIDE_CALLS.load(Ordering::SeqCst), 0);
}

#[test]
fn test_dispatch_to_missing_backend() {
    let mut function = KernelFunction::new(add_decl());
    function.insert(host(add_decl(), add_invoke));
    let args: [ArgValue; 4] = [
        1.into(),
        fake_device_buffer(0, false).into(),
        fake_device_buffer(0, false).into(),
        fake_device_buffer(0, true).into(),
    ];

    let err = unsafe { function.call(&args) }.unwrap_err();

    assert!(matches!(err, Error::BackendNotBuilt { backend: Backend::Cuda, .. }), "unexpected error: {err}");
}

#[test]
fn test_no_buffers_prefer_host() {
    let twice = decl("KERNLINK_KERNEL int twice_kernel(const int n) {}");
    let mut function = KernelFunction::new(twice.clone());
    function.insert(host(twice, twice_invoke));
    assert_eq!(function.select(None).unwrap().backend(), Backend::Cpu);
    assert!(function.select(Some(DeviceSpec::Cuda { device_id: 0 })).is_err());
}

#[test]
fn test_function_table() {
    let mut table = FunctionTable::new();
    table.insert(host(add_decl(), add_invoke));
    table.insert(host(decl("KERNLINK_KERNEL float sum_kernel(const int n, IN x) {}"), sum_invoke));

    assert_eq!(table.len(), 2);
    assert_eq!(table.names().collect::<Vec<_>>(), vec!["add_forward", "sum"]);
    assert_eq!(table.get("add_forward").unwrap().declaration().parameters.len(), 4);

    let x = vec![1.0f32, 1.0];
    let ret = unsafe { table.call("sum", &[2.into(), (&x).into()]) }.unwrap();
    assert_eq!(ret, Some(ScalarValue::Float(2.0)));

    let err = unsafe { table.call("mul_forward", &[]) }.unwrap_err();
    assert!(matches!(err, Error::FunctionNotBound { .. }), "unexpected error: {err}");
    assert!(err.to_string().contains("add_forward, sum"), "{err}");
}

#[test]
fn test_bindings_are_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<FunctionBinding>();
    assert_send_sync::<KernelFunction>();
    assert_send_sync::<FunctionTable>();
}

#[test]
fn test_bindings_are_reentrant() {
    let binding = std::sync::Arc::new(host(add_decl(), add_invoke));
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let binding = binding.clone();
            std::thread::spawn(move || {
                let a = vec![t as f32; 8];
                let b = vec![1.0f32; 8];
                let mut out = vec![0.0f32; 8];
                unsafe { binding.call(&[8.into(), (&a).into(), (&b).into(), (&mut out).into()]) }.unwrap();
                out
            })
        })
        .collect();

    for (t, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.join().unwrap(), vec![t as f32 + 1.0; 8]);
    }
}
