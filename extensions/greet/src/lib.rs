//! Demo extension module: registers `greet`, `add`, `shout` and `tally`.
//!
//! Build with `cargo build -p twinsh-ext-greet`, then inside twinsh:
//!
//! ```text
//! dll target/debug/libtwinsh_ext_greet.so
//! js
//! greet("world")
//! ```

#![allow(clippy::missing_safety_doc)]

use std::sync::atomic::{AtomicI64, Ordering};

use libc::{c_void, size_t};
use twinsh_ext_ffi::{
    args, CValue, ContextHandle, EngineHandle, Registrar, TWINSH_ERR_INVALID_ARGUMENT, TWINSH_OK,
    VALUE_INT,
};

const DEFAULT_GREETING: &str = "Hello";

static TALLY: AtomicI64 = AtomicI64::new(0);

fn greeting() -> String {
    std::env::var("TWINSH_GREETING").unwrap_or_else(|_| DEFAULT_GREETING.to_string())
}

fn fail(out: *mut CValue, message: &str) -> i32 {
    unsafe { *out = CValue::owned_string(message.to_string()) };
    TWINSH_ERR_INVALID_ARGUMENT
}

unsafe extern "C-unwind" fn greet(
    argv: *const CValue,
    argc: size_t,
    out: *mut CValue,
    _user_data: *mut c_void,
) -> i32 {
    let argv = args(argv, argc);
    let name = match argv.first() {
        Some(v) => match v.as_str() {
            Some(s) => s.to_string(),
            None => match v.as_int() {
                Some(n) => n.to_string(),
                None => return fail(out, "greet expects a name"),
            },
        },
        None => return fail(out, "greet expects a name"),
    };
    *out = CValue::owned_string(format!("{}, {}!", greeting(), name));
    TWINSH_OK
}

unsafe extern "C-unwind" fn add(
    argv: *const CValue,
    argc: size_t,
    out: *mut CValue,
    _user_data: *mut c_void,
) -> i32 {
    let argv = args(argv, argc);
    let (Some(a), Some(b)) = (argv.first(), argv.get(1)) else {
        return fail(out, "add expects two numbers");
    };
    *out = if a.tag == VALUE_INT && b.tag == VALUE_INT {
        CValue::int(a.int.wrapping_add(b.int))
    } else {
        match (a.as_float(), b.as_float()) {
            (Some(x), Some(y)) => CValue::float(x + y),
            _ => return fail(out, "add expects two numbers"),
        }
    };
    TWINSH_OK
}

unsafe extern "C-unwind" fn shout(
    argv: *const CValue,
    argc: size_t,
    out: *mut CValue,
    _user_data: *mut c_void,
) -> i32 {
    match args(argv, argc).first().and_then(|v| v.as_str()) {
        Some(text) => {
            *out = CValue::owned_string(text.to_uppercase());
            TWINSH_OK
        }
        None => fail(out, "shout expects a string"),
    }
}

/// Adds its argument to a counter passed in as user data.
unsafe extern "C-unwind" fn tally(
    argv: *const CValue,
    argc: size_t,
    out: *mut CValue,
    user_data: *mut c_void,
) -> i32 {
    let Some(step) = args(argv, argc).first().and_then(CValue::as_int) else {
        return fail(out, "tally expects an integer");
    };
    let counter = &*user_data.cast::<AtomicI64>();
    *out = CValue::int(counter.fetch_add(step, Ordering::SeqCst) + step);
    TWINSH_OK
}

#[no_mangle]
#[allow(non_snake_case)]
pub unsafe extern "C-unwind" fn RegisterFunctions(engine: EngineHandle, ctx: ContextHandle) {
    let Some(registrar) = Registrar::new(engine, ctx) else {
        return;
    };
    let _ = registrar.function("greet", 1, greet);
    let _ = registrar.function("add", 2, add);
    let _ = registrar.function("shout", 1, shout);
    let counter = std::ptr::addr_of!(TALLY).cast_mut().cast::<c_void>();
    let _ = registrar.function_with_data("tally", 1, tally, counter);
}
