//! Native extension modules.
//!
//! An extension is a shared library (.so on Linux, .dylib on macOS, .dll on
//! Windows) exporting `RegisterFunctions` with the
//! [`twinsh_ext_ffi::EntryFn`] signature. Loading calls that entry once; every
//! function the module registers is first staged and only committed to the
//! script runtime when the entry returns normally.
//!
//! Functions stay bound after their module is unloaded. Calling one then
//! fails with a runtime error instead of jumping into unmapped code.

use std::collections::BTreeMap;
use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::slice;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use libc::{c_char, size_t};
use libloading::Library;
use tracing::{debug, info, warn};
use twinsh_ext_ffi::{
    twinsh_value_free, CValue, ContextHandle, EntryFn, HostApi, NativeFn, ENTRY_SYMBOL, MAX_ARITY,
    TWINSH_ABI_VERSION, TWINSH_ERR_INVALID_ARITY, TWINSH_ERR_INVALID_NAME,
    TWINSH_ERR_NULL_CONTEXT, TWINSH_OK, VALUE_BOOL, VALUE_FLOAT, VALUE_INT, VALUE_STRING,
};

use crate::script::{is_identifier, FunctionRegistry, NativeFunction, ScriptValue};

#[derive(Debug, thiserror::Error)]
pub enum ExtensionError {
    #[error("extension already loaded: {}", .0.display())]
    AlreadyLoaded(PathBuf),

    #[error("extension not loaded: {}", .0.display())]
    NotLoaded(PathBuf),

    #[error("failed to load library {}: {reason}", path.display())]
    Open { path: PathBuf, reason: String },

    #[error("symbol `{symbol}` not found in {}", path.display())]
    MissingEntry { path: PathBuf, symbol: &'static str },

    #[error("registration failed for {}: {reason}", path.display())]
    RegistrationFailed { path: PathBuf, reason: String },
}

/// A loaded module and what it contributed.
pub struct ExtensionModule {
    path: PathBuf,
    loaded_at: SystemTime,
    functions: Vec<String>,
    alive: Arc<AtomicBool>,
    // Closed after `alive` is cleared in `Drop`.
    library: Option<Library>,
}

impl ExtensionModule {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub const fn loaded_at(&self) -> SystemTime {
        self.loaded_at
    }

    /// Names registered by the module, in registration order.
    #[must_use]
    pub fn functions(&self) -> &[String] {
        &self.functions
    }
}

impl Drop for ExtensionModule {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for ExtensionModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionModule")
            .field("path", &self.path)
            .field("functions", &self.functions)
            .field("dynamic", &self.library.is_some())
            .finish_non_exhaustive()
    }
}

/// Tracks loaded modules by normalized path.
#[derive(Debug, Default)]
pub struct ExtensionLoader {
    modules: BTreeMap<PathBuf, ExtensionModule>,
}

impl ExtensionLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the library at `path`, runs its entry point and commits the
    /// functions it registered into `registry`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A module with the same normalized path is already loaded
    /// - The library cannot be opened
    /// - The entry symbol is missing
    /// - The entry panics, or the runtime refuses a registered name
    ///
    /// On error nothing stays loaded and no function is callable.
    pub fn load<R>(&mut self, path: &Path, registry: &mut R) -> Result<&ExtensionModule, ExtensionError>
    where
        R: FunctionRegistry + ?Sized,
    {
        let key = normalize(path);
        if self.modules.contains_key(&key) {
            return Err(ExtensionError::AlreadyLoaded(key));
        }

        debug!(path = ?key, "Loading extension");

        // SAFETY: running a library's initializers is inherent to loading
        // native code; the user asked for this file.
        #[allow(unsafe_code)]
        let library = unsafe { Library::new(&key) }.map_err(|e| ExtensionError::Open {
            path: key.clone(),
            reason: e.to_string(),
        })?;

        #[allow(unsafe_code)]
        let entry: EntryFn = match unsafe { library.get::<EntryFn>(ENTRY_SYMBOL.as_bytes()) } {
            Ok(symbol) => *symbol,
            Err(_) => {
                return Err(ExtensionError::MissingEntry {
                    path: key,
                    symbol: ENTRY_SYMBOL,
                })
            }
        };

        self.attach(key, entry, Some(library), registry)
    }

    /// Registers a module linked into the host binary under `name`.
    ///
    /// # Errors
    ///
    /// Same as [`ExtensionLoader::load`], minus the library errors.
    pub fn attach_static<R>(
        &mut self,
        name: &str,
        entry: EntryFn,
        registry: &mut R,
    ) -> Result<&ExtensionModule, ExtensionError>
    where
        R: FunctionRegistry + ?Sized,
    {
        let key = PathBuf::from(name);
        if self.modules.contains_key(&key) {
            return Err(ExtensionError::AlreadyLoaded(key));
        }
        self.attach(key, entry, None, registry)
    }

    fn attach<R>(
        &mut self,
        key: PathBuf,
        entry: EntryFn,
        library: Option<Library>,
        registry: &mut R,
    ) -> Result<&ExtensionModule, ExtensionError>
    where
        R: FunctionRegistry + ?Sized,
    {
        let mut staging = Staging::default();
        let ctx: ContextHandle = std::ptr::addr_of_mut!(staging).cast::<c_void>();

        #[allow(unsafe_code)]
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| unsafe { entry(&HOST_API, ctx) }));
        if let Err(payload) = outcome {
            let reason = format!("entry point panicked: {}", panic_message(payload.as_ref()));
            warn!(path = ?key, %reason, "Extension registration aborted");
            return Err(ExtensionError::RegistrationFailed { path: key, reason });
        }

        for name in &staging.rejected {
            warn!(path = ?key, name = %name, "Extension registration rejected");
        }

        let alive = Arc::new(AtomicBool::new(true));
        let mut functions = Vec::with_capacity(staging.functions.len());
        for staged in staging.functions {
            let name = staged.name.clone();
            let native = staged.into_native(&key, &alive);
            if let Err(e) = registry.register_function(native) {
                alive.store(false, Ordering::Release);
                return Err(ExtensionError::RegistrationFailed {
                    path: key,
                    reason: e.to_string(),
                });
            }
            functions.push(name);
        }

        info!(path = ?key, functions = functions.len(), "Extension loaded");

        let module = ExtensionModule {
            path: key.clone(),
            loaded_at: SystemTime::now(),
            functions,
            alive,
            library,
        };
        Ok(self.modules.entry(key).or_insert(module))
    }

    /// Releases the module at `path`.
    ///
    /// The functions it registered stay bound in the script engine, which
    /// has no way to retract them. Instead of jumping into unmapped code,
    /// calling one afterwards fails with a script error naming the unloaded
    /// module; a later load of the same path registers fresh bindings.
    ///
    /// # Errors
    ///
    /// Returns [`ExtensionError::NotLoaded`] when no module matches.
    pub fn unload(&mut self, path: &Path) -> Result<(), ExtensionError> {
        let key = self.lookup(path).ok_or_else(|| ExtensionError::NotLoaded(normalize(path)))?;
        if let Some(module) = self.modules.remove(&key) {
            debug!(path = ?key, functions = module.functions.len(), "Unloading extension");
            drop(module);
        }
        Ok(())
    }

    /// Unloads `path` if loaded, then loads it again.
    ///
    /// # Errors
    ///
    /// See [`ExtensionLoader::load`].
    pub fn reload<R>(&mut self, path: &Path, registry: &mut R) -> Result<&ExtensionModule, ExtensionError>
    where
        R: FunctionRegistry + ?Sized,
    {
        let _ = self.unload(path);
        self.load(path, registry)
    }

    /// Loads every shared library directly inside `dir`. Returns how many
    /// loaded; failures are logged and skipped.
    pub fn load_directory<R>(&mut self, dir: &Path, registry: &mut R) -> usize
    where
        R: FunctionRegistry + ?Sized,
    {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = ?dir, error = %e, "Extension directory not readable");
                return 0;
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| is_library(path))
            .collect();
        paths.sort();

        let mut loaded = 0;
        for path in paths {
            match self.load(&path, registry) {
                Ok(_) => loaded += 1,
                Err(e) => warn!(path = ?path, error = %e, "Failed to load extension"),
            }
        }
        loaded
    }

    /// Loaded modules ordered by path.
    pub fn list_loaded(&self) -> impl Iterator<Item = &ExtensionModule> {
        self.modules.values()
    }

    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&ExtensionModule> {
        self.lookup(path).and_then(|key| self.modules.get(&key))
    }

    #[must_use]
    pub fn is_loaded(&self, path: &Path) -> bool {
        self.lookup(path).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    fn lookup(&self, path: &Path) -> Option<PathBuf> {
        [normalize(path), path.to_path_buf()]
            .into_iter()
            .find(|key| self.modules.contains_key(key))
    }
}

/// Canonical form of `path`, falling back to an absolute one when the file
/// no longer exists.
fn normalize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
        }
    })
}

fn is_library(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| matches!(ext, "so" | "dylib" | "dll"))
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[derive(Clone, Copy)]
struct UserData(*mut c_void);

// SAFETY: the module that registered the pointer owns its thread-safety.
#[allow(unsafe_code)]
unsafe impl Send for UserData {}
#[allow(unsafe_code)]
unsafe impl Sync for UserData {}

struct StagedFunction {
    name: String,
    arity: usize,
    func: NativeFn,
    user_data: UserData,
}

impl StagedFunction {
    fn into_native(self, origin: &Path, alive: &Arc<AtomicBool>) -> NativeFunction {
        let Self {
            name,
            arity,
            func,
            user_data,
        } = self;
        let bound = ExternFunction {
            name: name.clone(),
            origin: origin.to_path_buf(),
            func,
            user_data,
            alive: Arc::clone(alive),
        };
        NativeFunction::new(name, arity, move |args| bound.invoke(args))
    }
}

#[derive(Default)]
struct Staging {
    functions: Vec<StagedFunction>,
    rejected: Vec<String>,
}

static HOST_API: HostApi = HostApi {
    abi_version: TWINSH_ABI_VERSION,
    register: register_callback,
};

#[allow(unsafe_code)]
unsafe extern "C" fn register_callback(
    ctx: ContextHandle,
    name: *const c_char,
    name_len: size_t,
    arity: u32,
    func: NativeFn,
    user_data: *mut c_void,
) -> i32 {
    if ctx.is_null() {
        return TWINSH_ERR_NULL_CONTEXT;
    }
    let staging = &mut *ctx.cast::<Staging>();

    let bytes: &[u8] = if name.is_null() {
        &[]
    } else {
        slice::from_raw_parts(name.cast::<u8>(), name_len)
    };
    let name = match std::str::from_utf8(bytes) {
        Ok(name) if is_identifier(name) => name,
        _ => {
            staging.rejected.push(String::from_utf8_lossy(bytes).into_owned());
            return TWINSH_ERR_INVALID_NAME;
        }
    };
    if arity > MAX_ARITY {
        staging.rejected.push(name.to_string());
        return TWINSH_ERR_INVALID_ARITY;
    }

    staging.functions.push(StagedFunction {
        name: name.to_string(),
        arity: arity as usize,
        func,
        user_data: UserData(user_data),
    });
    TWINSH_OK
}

/// A registered extension function as the script runtime sees it.
struct ExternFunction {
    name: String,
    origin: PathBuf,
    func: NativeFn,
    user_data: UserData,
    alive: Arc<AtomicBool>,
}

impl ExternFunction {
    fn invoke(&self, args: &[ScriptValue]) -> Result<ScriptValue, String> {
        if !self.alive.load(Ordering::Acquire) {
            return Err(format!(
                "`{}` belongs to {}, which has been unloaded",
                self.name,
                self.origin.display()
            ));
        }

        let cargs: Vec<CValue> = args.iter().map(to_cvalue).collect();
        let mut out = CValue::unit();
        let (func, user_data) = (self.func, self.user_data);

        #[allow(unsafe_code)]
        let code = panic::catch_unwind(AssertUnwindSafe(|| unsafe {
            func(cargs.as_ptr(), cargs.len(), &mut out, user_data.0)
        }))
        .map_err(|payload| format!("native function panicked: {}", panic_message(payload.as_ref())))?;

        #[allow(unsafe_code)]
        let value = unsafe {
            let value = from_cvalue(&out);
            twinsh_value_free(&mut out);
            value
        };

        if code == TWINSH_OK {
            Ok(value)
        } else {
            match value {
                ScriptValue::Str(message) if !message.is_empty() => Err(message),
                _ => Err(format!("native function failed with code {code}")),
            }
        }
    }
}

fn to_cvalue(value: &ScriptValue) -> CValue {
    match value {
        ScriptValue::Unit => CValue::unit(),
        ScriptValue::Bool(b) => CValue::bool(*b),
        ScriptValue::Int(i) => CValue::int(*i),
        ScriptValue::Float(x) => CValue::float(*x),
        ScriptValue::Str(s) => CValue::borrowed_str(s),
    }
}

#[allow(unsafe_code)]
unsafe fn from_cvalue(value: &CValue) -> ScriptValue {
    match value.tag {
        VALUE_BOOL => ScriptValue::Bool(value.boolean != 0),
        VALUE_INT => ScriptValue::Int(value.int),
        VALUE_FLOAT => ScriptValue::Float(value.float),
        VALUE_STRING => {
            let bytes: &[u8] = if value.data.is_null() {
                &[]
            } else {
                slice::from_raw_parts(value.data.cast::<u8>(), value.len)
            };
            ScriptValue::Str(String::from_utf8_lossy(bytes).into_owned())
        }
        _ => ScriptValue::Unit,
    }
}
