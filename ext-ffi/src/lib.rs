//! C ABI shared by the twinsh host and its native extension modules.
//!
//! An extension is a shared library exporting [`ENTRY_SYMBOL`] with the
//! [`EntryFn`] signature. The host calls it once per load with a pointer to
//! its [`HostApi`] table and an opaque registration context; the module calls
//! back through [`HostApi::register`] (or the [`Registrar`] wrapper) for every
//! function it wants visible in the script global scope.
//!
//! ```ignore
//! use twinsh_ext_ffi::{CValue, ContextHandle, EngineHandle, Registrar, TWINSH_OK};
//!
//! unsafe extern "C-unwind" fn answer(
//!     _args: *const CValue,
//!     _argc: usize,
//!     out: *mut CValue,
//!     _user_data: *mut std::ffi::c_void,
//! ) -> i32 {
//!     *out = CValue::int(42);
//!     TWINSH_OK
//! }
//!
//! #[no_mangle]
//! pub unsafe extern "C-unwind" fn RegisterFunctions(engine: EngineHandle, ctx: ContextHandle) {
//!     if let Some(registrar) = Registrar::new(engine, ctx) {
//!         let _ = registrar.function("answer", 0, answer);
//!     }
//! }
//! ```

#![allow(missing_docs)]
#![allow(clippy::missing_safety_doc)]

use libc::{c_char, c_void, size_t};
use std::ptr;
use std::slice;

pub const TWINSH_ABI_VERSION: u32 = 1;

/// Name of the symbol every extension module must export.
pub const ENTRY_SYMBOL: &str = "RegisterFunctions";

/// Upper bound on the arity a native function may declare.
pub const MAX_ARITY: u32 = 16;

pub const TWINSH_OK: i32 = 0;
pub const TWINSH_ERR_NULL_CONTEXT: i32 = -1;
pub const TWINSH_ERR_INVALID_NAME: i32 = -2;
pub const TWINSH_ERR_INVALID_ARITY: i32 = -3;
pub const TWINSH_ERR_INVALID_ARGUMENT: i32 = -4;
pub const TWINSH_ERR_INTERNAL: i32 = -5;

pub const VALUE_UNIT: u8 = 0;
pub const VALUE_BOOL: u8 = 1;
pub const VALUE_INT: u8 = 2;
pub const VALUE_FLOAT: u8 = 3;
pub const VALUE_STRING: u8 = 4;

/// Releases the storage behind a [`CValue`] string. Set by whichever side
/// allocated it.
pub type ReleaseFn = unsafe extern "C" fn(value: *mut CValue);

/// A script value crossing the ABI.
///
/// Strings are `data`/`len` UTF-8 bytes. Values handed to a native function
/// by the host are borrowed (`release` is `None`) and only valid for the
/// duration of the call. Strings a module returns carry the `release` hook of
/// the allocator that produced them; the host calls it once it has copied the
/// bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CValue {
    pub tag: u8,
    pub boolean: u8,
    pub int: i64,
    pub float: f64,
    pub data: *const c_char,
    pub len: size_t,
    pub cap: size_t,
    pub release: Option<ReleaseFn>,
}

impl Default for CValue {
    fn default() -> Self {
        Self::unit()
    }
}

impl CValue {
    #[must_use]
    pub const fn unit() -> Self {
        Self {
            tag: VALUE_UNIT,
            boolean: 0,
            int: 0,
            float: 0.0,
            data: ptr::null(),
            len: 0,
            cap: 0,
            release: None,
        }
    }

    #[must_use]
    pub const fn bool(value: bool) -> Self {
        let mut v = Self::unit();
        v.tag = VALUE_BOOL;
        v.boolean = value as u8;
        v
    }

    #[must_use]
    pub const fn int(value: i64) -> Self {
        let mut v = Self::unit();
        v.tag = VALUE_INT;
        v.int = value;
        v
    }

    #[must_use]
    pub const fn float(value: f64) -> Self {
        let mut v = Self::unit();
        v.tag = VALUE_FLOAT;
        v.float = value;
        v
    }

    /// Borrows `s` without taking ownership. The caller keeps `s` alive for
    /// as long as the value is in use.
    #[must_use]
    pub fn borrowed_str(s: &str) -> Self {
        let mut v = Self::unit();
        v.tag = VALUE_STRING;
        v.data = s.as_ptr().cast::<c_char>();
        v.len = s.len();
        v
    }

    /// Moves `s` into a value whose storage is released by
    /// [`twinsh_value_free`].
    #[must_use]
    pub fn owned_string(s: String) -> Self {
        let bytes = s.into_bytes();
        let len = bytes.len();
        let cap = bytes.capacity();
        let data = bytes.leak().as_ptr();
        let mut v = Self::unit();
        v.tag = VALUE_STRING;
        v.data = data.cast::<c_char>();
        v.len = len;
        v.cap = cap;
        v.release = Some(release_rust_string);
        v
    }

    #[must_use]
    pub const fn is_unit(&self) -> bool {
        self.tag == VALUE_UNIT
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        if self.tag == VALUE_BOOL {
            Some(self.boolean != 0)
        } else {
            None
        }
    }

    /// Integers, with floats truncated toward zero.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_int(&self) -> Option<i64> {
        match self.tag {
            VALUE_INT => Some(self.int),
            VALUE_FLOAT => Some(self.float as i64),
            _ => None,
        }
    }

    /// Floats, with integers widened.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_float(&self) -> Option<f64> {
        match self.tag {
            VALUE_FLOAT => Some(self.float),
            VALUE_INT => Some(self.int as f64),
            _ => None,
        }
    }

    /// # Safety
    ///
    /// `data`/`len` must describe live memory when the tag is
    /// [`VALUE_STRING`].
    #[must_use]
    pub unsafe fn as_str(&self) -> Option<&str> {
        if self.tag != VALUE_STRING {
            return None;
        }
        if self.data.is_null() || self.len == 0 {
            return Some("");
        }
        let bytes = slice::from_raw_parts(self.data.cast::<u8>(), self.len);
        std::str::from_utf8(bytes).ok()
    }
}

unsafe extern "C" fn release_rust_string(value: *mut CValue) {
    if value.is_null() {
        return;
    }
    let value = &mut *value;
    if !value.data.is_null() && value.cap > 0 {
        drop(Vec::from_raw_parts(
            value.data.cast_mut().cast::<u8>(),
            value.len,
            value.cap,
        ));
    }
}

/// Releases any storage owned by `value` and resets it to unit.
#[no_mangle]
pub unsafe extern "C" fn twinsh_value_free(value: *mut CValue) {
    if value.is_null() {
        return;
    }
    if let Some(release) = (*value).release {
        release(value);
    }
    *value = CValue::unit();
}

/// A function implemented by an extension module.
///
/// `args` points at `argc` borrowed values. The function writes its result
/// into `out` and returns [`TWINSH_OK`]; on failure it returns a negative
/// code and may leave a string message in `out`.
pub type NativeFn = unsafe extern "C-unwind" fn(
    args: *const CValue,
    argc: size_t,
    out: *mut CValue,
    user_data: *mut c_void,
) -> i32;

/// Host callback used by modules to register a function.
pub type RegisterFn = unsafe extern "C" fn(
    ctx: ContextHandle,
    name: *const c_char,
    name_len: size_t,
    arity: u32,
    func: NativeFn,
    user_data: *mut c_void,
) -> i32;

#[repr(C)]
pub struct HostApi {
    pub abi_version: u32,
    pub register: RegisterFn,
}

pub type EngineHandle = *const HostApi;
pub type ContextHandle = *mut c_void;

/// Signature of the [`ENTRY_SYMBOL`] export.
pub type EntryFn = unsafe extern "C-unwind" fn(engine: EngineHandle, ctx: ContextHandle);

/// Views the argument array passed to a [`NativeFn`].
///
/// # Safety
///
/// `args` must point at `argc` initialized values, or be null with `argc == 0`.
#[must_use]
pub unsafe fn args<'a>(args: *const CValue, argc: size_t) -> &'a [CValue] {
    if args.is_null() || argc == 0 {
        &[]
    } else {
        slice::from_raw_parts(args, argc)
    }
}

/// Safe-ish view over the handles passed to an extension's entry point.
pub struct Registrar {
    api: &'static HostApi,
    ctx: ContextHandle,
}

impl Registrar {
    /// # Safety
    ///
    /// Both handles must be the ones the host passed to the entry point, and
    /// the registrar must not outlive that call.
    #[must_use]
    pub unsafe fn new(engine: EngineHandle, ctx: ContextHandle) -> Option<Self> {
        if engine.is_null() || ctx.is_null() {
            return None;
        }
        let api = &*engine;
        if api.abi_version != TWINSH_ABI_VERSION {
            return None;
        }
        Some(Self { api, ctx })
    }

    /// Registers `func` under `name` with no user data.
    ///
    /// # Errors
    ///
    /// Returns the host's error code when the registration is rejected.
    pub fn function(&self, name: &str, arity: u32, func: NativeFn) -> Result<(), i32> {
        self.function_with_data(name, arity, func, ptr::null_mut())
    }

    /// # Errors
    ///
    /// Returns the host's error code when the registration is rejected.
    pub fn function_with_data(
        &self,
        name: &str,
        arity: u32,
        func: NativeFn,
        user_data: *mut c_void,
    ) -> Result<(), i32> {
        let code = unsafe {
            (self.api.register)(
                self.ctx,
                name.as_ptr().cast::<c_char>(),
                name.len(),
                arity,
                func,
                user_data,
            )
        };
        if code == TWINSH_OK {
            Ok(())
        } else {
            Err(code)
        }
    }
}

#[no_mangle]
pub extern "C" fn twinsh_abi_version() -> u32 {
    TWINSH_ABI_VERSION
}
