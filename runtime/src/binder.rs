//! Dynamic binding of built artifacts.
//!
//! Every declaration is bound through its generated trampoline
//! `void kernlink_invoke_<name>(void** args, void* ret)`, so a single Rust function pointer
//! type can call any kernel signature. The public forwarding symbol is resolved too, so a
//! library that lost it is reported rather than silently half-bound.
//!
//! # Safety
//!
//! Calls pass raw pointers straight to native code. The binder checks arity, parameter
//! types, element dtype and device placement before the call; lifetimes and extents of the
//! buffers remain the caller's responsibility, hence the `unsafe fn call`.

use std::collections::BTreeMap;
use std::ffi::{c_int, c_void};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kernlink_codegen::KernelDeclaration;
use kernlink_dtype::{Backend, DeviceSpec, KERNEL_ELEMENT, ParamType, ReturnType};
use libloading::Library;
use snafu::{OptionExt, ResultExt, ensure};

use crate::args::{ArgSlot, ArgValue, ScalarValue};
use crate::builder::BuildArtifact;
use crate::error::*;
use crate::library_cache::LibraryCache;
use crate::support::SET_DEVICE_SYMBOL;

/// Signature of every generated trampoline.
pub type InvokeFn = unsafe extern "C" fn(args: *const *mut c_void, ret: *mut c_void);

/// Signature of `kernlink_set_device` from the support sources.
pub type SetDeviceFn = unsafe extern "C" fn(device_id: c_int);

/// Check `args` against `decl` and return the device shared by all buffer arguments.
///
/// `None` means the call passes no buffers and carries no device constraint.
pub fn validate(decl: &KernelDeclaration, args: &[ArgValue<'_>]) -> Result<Option<DeviceSpec>> {
    let function = &decl.name;
    ensure!(
        args.len() == decl.parameters.len(),
        ArityMismatchSnafu { function, expected: decl.parameters.len(), actual: args.len() }
    );

    let mut first: Option<(&str, DeviceSpec)> = None;
    for (index, (param, arg)) in decl.parameters.iter().zip(args).enumerate() {
        let accepted = match (param.ty, arg) {
            (ParamType::Int, ArgValue::Int(_))
            | (ParamType::Float, ArgValue::Float(_))
            | (ParamType::In, ArgValue::Buffer(_)) => true,
            (ParamType::Out, ArgValue::Buffer(buffer)) => buffer.is_writable(),
            _ => false,
        };
        ensure!(
            accepted,
            TypeMismatchSnafu { function, index, param: &param.name, expected: param.ty, actual: arg.kind() }
        );

        let Some(buffer) = arg.as_buffer() else { continue };
        ensure!(
            buffer.dtype() == KERNEL_ELEMENT,
            UnsupportedElementSnafu {
                function,
                index,
                param: &param.name,
                dtype: buffer.dtype(),
                supported: KERNEL_ELEMENT
            }
        );

        match first {
            None => first = Some((param.name.as_str(), buffer.device())),
            Some((first_param, device)) => ensure!(
                device == buffer.device(),
                DeviceMismatchSnafu {
                    function,
                    first_param,
                    first: device,
                    param: &param.name,
                    device: buffer.device()
                }
            ),
        }
    }

    Ok(first.map(|(_, device)| device))
}

/// A kernel bound to one artifact.
#[derive(Debug, Clone)]
pub struct FunctionBinding {
    declaration: KernelDeclaration,
    backend: Backend,
    invoke: InvokeFn,
    set_device: Option<SetDeviceFn>,
    _library: Option<Arc<Library>>,
}

impl FunctionBinding {
    /// Bind a trampoline that is not backed by a loaded library.
    ///
    /// # Safety
    ///
    /// `invoke` must behave like a generated trampoline for `declaration`: read
    /// `args[i]` as a pointer to a value of parameter `i`'s type and, for non-void
    /// returns, write the result through `ret`.
    pub unsafe fn from_raw(
        declaration: KernelDeclaration,
        backend: Backend,
        invoke: InvokeFn,
        set_device: Option<SetDeviceFn>,
    ) -> Self {
        Self { declaration, backend, invoke, set_device, _library: None }
    }

    fn resolve(
        library: &Arc<Library>,
        path: &Path,
        declaration: &KernelDeclaration,
        backend: Backend,
        set_device: Option<SetDeviceFn>,
    ) -> Result<Self> {
        let name = &declaration.name;
        // SAFETY: the forwarding symbol is only checked for presence, never called.
        unsafe { library.get::<unsafe extern "C" fn()>(name.as_bytes()) }
            .context(SymbolNotFoundSnafu { name, path })?;

        let symbol = declaration.invoke_symbol();
        // SAFETY: the wrapper defines every trampoline with exactly the `InvokeFn` signature.
        let invoke = unsafe { library.get::<InvokeFn>(symbol.as_bytes()) }
            .context(SymbolNotFoundSnafu { name: &symbol, path })?;

        Ok(Self {
            declaration: declaration.clone(),
            backend,
            invoke: *invoke,
            set_device,
            _library: Some(Arc::clone(library)),
        })
    }

    pub fn name(&self) -> &str {
        &self.declaration.name
    }

    pub fn declaration(&self) -> &KernelDeclaration {
        &self.declaration
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Validate `args` and run the kernel.
    ///
    /// # Safety
    ///
    /// Every buffer must be valid for the extent the kernel accesses, which is usually the
    /// launch size passed as the first argument, and writable buffers must not alias
    /// anything the caller reads concurrently.
    pub unsafe fn call(&self, args: &[ArgValue<'_>]) -> Result<Option<ScalarValue>> {
        let device = validate(&self.declaration, args)?;
        if let Some(device) = device {
            ensure!(
                device.backend() == self.backend,
                BackendMismatchSnafu { function: self.name(), backend: self.backend, device }
            );
        }
        unsafe { self.invoke_validated(device, args) }
    }

    /// # Safety
    ///
    /// `args` must have passed [`validate`] and `device` must be its result.
    unsafe fn invoke_validated(&self, device: Option<DeviceSpec>, args: &[ArgValue<'_>]) -> Result<Option<ScalarValue>> {
        let ordinal = match (device, device.and_then(|d| d.device_id())) {
            (Some(device), Some(device_id)) => Some(
                c_int::try_from(device_id)
                    .ok()
                    .context(DeviceOrdinalSnafu { function: self.name(), device })?,
            ),
            _ => None,
        };

        let mut slots: Vec<ArgSlot> = args.iter().map(ArgSlot::from).collect();
        let ptrs: Vec<*mut c_void> = slots.iter_mut().map(|slot| (slot as *mut ArgSlot).cast()).collect();
        let mut ret = ArgSlot::zeroed();

        if let (Some(ordinal), Some(set_device)) = (ordinal, self.set_device) {
            unsafe { set_device(ordinal) };
        }

        tracing::trace!(
            kernel.name = %self.declaration.name,
            kernel.backend = %self.backend,
            kernel.num_args = args.len(),
            "invoking kernel"
        );

        unsafe { (self.invoke)(ptrs.as_ptr(), (&mut ret as *mut ArgSlot).cast()) };

        // SAFETY: the trampoline wrote a value of the declared return type into `ret`.
        Ok(match self.declaration.return_type {
            ReturnType::Void => None,
            ReturnType::Int => Some(ScalarValue::Int(unsafe { ret.int })),
            ReturnType::Float => Some(ScalarValue::Float(unsafe { ret.float })),
        })
    }
}

/// Every backend binding of one public kernel name.
#[derive(Debug, Clone)]
pub struct KernelFunction {
    declaration: KernelDeclaration,
    bindings: BTreeMap<Backend, FunctionBinding>,
}

impl KernelFunction {
    pub fn new(declaration: KernelDeclaration) -> Self {
        Self { declaration, bindings: BTreeMap::new() }
    }

    /// Add the binding for its backend, returning the one it replaces.
    pub fn insert(&mut self, binding: FunctionBinding) -> Option<FunctionBinding> {
        self.bindings.insert(binding.backend, binding)
    }

    pub fn name(&self) -> &str {
        &self.declaration.name
    }

    pub fn declaration(&self) -> &KernelDeclaration {
        &self.declaration
    }

    pub fn backends(&self) -> impl Iterator<Item = Backend> + '_ {
        self.bindings.keys().copied()
    }

    pub fn binding(&self, backend: Backend) -> Option<&FunctionBinding> {
        self.bindings.get(&backend)
    }

    /// Binding that serves buffers on `device`. Calls without buffers prefer the host.
    pub fn select(&self, device: Option<DeviceSpec>) -> Result<&FunctionBinding> {
        match device {
            Some(device) => self
                .bindings
                .get(&device.backend())
                .context(BackendNotBuiltSnafu { function: self.name(), backend: device.backend(), device }),
            None => self.bindings.get(&Backend::Cpu).or_else(|| self.bindings.values().next()).context(
                BackendNotBuiltSnafu { function: self.name(), backend: Backend::Cpu, device: DeviceSpec::Cpu },
            ),
        }
    }

    /// Validate `args`, pick the backend their buffers live on, and run the kernel.
    ///
    /// # Safety
    ///
    /// Same contract as [`FunctionBinding::call`].
    pub unsafe fn call(&self, args: &[ArgValue<'_>]) -> Result<Option<ScalarValue>> {
        let device = validate(&self.declaration, args)?;
        let binding = self.select(device)?;
        unsafe { binding.invoke_validated(device, args) }
    }
}

/// Name to callable table produced by one import.
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    functions: BTreeMap<String, KernelFunction>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `binding` under its public name.
    pub fn insert(&mut self, binding: FunctionBinding) {
        self.functions
            .entry(binding.name().to_string())
            .or_insert_with(|| KernelFunction::new(binding.declaration.clone()))
            .insert(binding);
    }

    pub fn get(&self, name: &str) -> Option<&KernelFunction> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.functions.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &KernelFunction)> + '_ {
        self.functions.iter().map(|(name, f)| (name.as_str(), f))
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Look up `name` and call it.
    ///
    /// # Safety
    ///
    /// Same contract as [`FunctionBinding::call`].
    pub unsafe fn call(&self, name: &str, args: &[ArgValue<'_>]) -> Result<Option<ScalarValue>> {
        let function = self.get(name).with_context(|| FunctionNotBoundSnafu {
            name,
            available: self.names().collect::<Vec<_>>().join(", "),
        })?;
        unsafe { function.call(args) }
    }
}

/// A declaration whose symbols could not be resolved from one artifact.
#[derive(Debug)]
pub struct UnboundFunction {
    pub name: String,
    pub backend: Backend,
    pub error: Error,
}

/// Bindings resolved from one artifact.
#[derive(Debug)]
pub struct BoundLibrary {
    pub path: PathBuf,
    pub backend: Backend,
    pub bindings: Vec<FunctionBinding>,
    /// Per-function resolution failures. Other bindings are unaffected.
    pub errors: Vec<UnboundFunction>,
}

/// Loads artifacts through a [`LibraryCache`] and resolves their kernels.
#[derive(Clone, Copy)]
pub struct Binder<'c> {
    cache: &'c LibraryCache,
}

impl<'c> Binder<'c> {
    pub fn new(cache: &'c LibraryCache) -> Self {
        Self { cache }
    }

    /// Load `artifact` and bind every declaration it was built from.
    ///
    /// The artifact's content-addressed image is what gets loaded. Failing to load it is
    /// fatal; a missing symbol only fails that function.
    pub fn bind(&self, artifact: &BuildArtifact, declarations: &[KernelDeclaration]) -> Result<BoundLibrary> {
        let path = &artifact.image;
        let library = self.cache.get_or_load(path)?;

        // SAFETY: the support sources define `kernlink_set_device` with this signature.
        let set_device = unsafe { library.get::<SetDeviceFn>(SET_DEVICE_SYMBOL.as_bytes()) }.ok().map(|f| *f);

        let mut bound =
            BoundLibrary { path: path.clone(), backend: artifact.backend, bindings: Vec::new(), errors: Vec::new() };

        for decl in declarations {
            match FunctionBinding::resolve(&library, path, decl, artifact.backend, set_device) {
                Ok(binding) => {
                    tracing::debug!(
                        kernel.name = %decl.name,
                        kernel.backend = %artifact.backend,
                        signature = %decl.signature(),
                        "bound kernel"
                    );
                    bound.bindings.push(binding);
                }
                Err(e) => {
                    tracing::warn!(kernel.name = %decl.name, error = %e, "failed to bind kernel");
                    bound.errors.push(UnboundFunction {
                        name: decl.name.clone(),
                        backend: artifact.backend,
                        error: e,
                    });
                }
            }
        }

        Ok(bound)
    }
}
