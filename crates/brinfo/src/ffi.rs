//! C ABI exports of the runtime tracer.
//!
//! Instrumented C/C++ translation units link this crate as a staticlib and
//! call these symbols; `include/brinfo/runtime.h` carries the matching
//! declarations. Every entry tolerates null pointers (treated as empty
//! strings) and never unwinds across the boundary.

#![allow(unsafe_code, clippy::missing_safety_doc, clippy::too_many_arguments)]

use std::borrow::Cow;
use std::ffi::CStr;
use std::os::raw::{c_char, c_uint};
use std::path::Path;

use crate::runtime;

/// Borrow a C string as UTF-8 text; null or invalid bytes degrade gracefully.
unsafe fn text<'a>(ptr: *const c_char) -> Cow<'a, str> {
    if ptr.is_null() {
        Cow::Borrowed("")
    } else {
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy()
    }
}

/// Initialize the trace sink; null selects the environment/default path.
#[no_mangle]
pub unsafe extern "C" fn brinfo_init(path: *const c_char) {
    let path = unsafe { text(path) };
    if path.is_empty() {
        runtime::init(None);
    } else {
        runtime::init(Some(Path::new(path.as_ref())));
    }
}

/// Begin a test context. See [`runtime::begin_test`].
#[no_mangle]
pub unsafe extern "C" fn brinfo_begin_test(
    suite: *const c_char,
    name: *const c_char,
    file: *const c_char,
    line: c_uint,
) {
    let (suite, name, file) = unsafe { (text(suite), text(name), text(file)) };
    runtime::begin_test(&suite, &name, &file, line);
}

/// End the current test; null status is reported as `UNKNOWN`.
#[no_mangle]
pub unsafe extern "C" fn brinfo_end_test(status: *const c_char) {
    let status = unsafe { text(status) };
    runtime::end_test(if status.is_empty() {
        "UNKNOWN"
    } else {
        status.as_ref()
    });
}

/// Mark entry into an assertion site. See [`runtime::assertion_begin`].
#[no_mangle]
pub unsafe extern "C" fn brinfo_assertion_begin(
    macro_name: *const c_char,
    file: *const c_char,
    line: c_uint,
    raw_text: *const c_char,
) {
    let (macro_name, file, raw) = unsafe { (text(macro_name), text(file), text(raw_text)) };
    let raw = if raw.is_empty() { None } else { Some(raw.as_ref()) };
    runtime::assertion_begin(&macro_name, &file, line, raw);
}

/// Mark exit from the current assertion site.
#[no_mangle]
pub extern "C" fn brinfo_assertion_end() {
    runtime::assertion_end();
}

/// Begin a top-level invocation; `target_func_hash` of 0 means unknown.
#[no_mangle]
pub unsafe extern "C" fn brinfo_begin_invocation(
    call_file: *const c_char,
    call_line: c_uint,
    call_expr: *const c_char,
    target_func_hash: u64,
) {
    let (call_file, call_expr) = unsafe { (text(call_file), text(call_expr)) };
    runtime::begin_invocation(&call_file, call_line, &call_expr, target_func_hash);
}

/// End the current invocation; null status is reported as `OK`.
#[no_mangle]
pub unsafe extern "C" fn brinfo_end_invocation(status: *const c_char) {
    let status = unsafe { text(status) };
    runtime::end_invocation(if status.is_empty() {
        "OK"
    } else {
        status.as_ref()
    });
}

/// Log one condition evaluation and return the logged value, so the call can
/// substitute for the original boolean subexpression.
#[no_mangle]
pub unsafe extern "C" fn brinfo_log_cond(
    func_hash: u64,
    file: *const c_char,
    line: c_uint,
    value: bool,
    cond_norm: *const c_char,
    cond_hash: u64,
    norm_flip: bool,
    cond_kind: *const c_char,
) -> bool {
    let (file, cond_norm, cond_kind) = unsafe { (text(file), text(cond_norm), text(cond_kind)) };
    runtime::log_cond(
        func_hash, &file, line, value, &cond_norm, cond_hash, norm_flip, &cond_kind,
    )
}
