//! Abstract test-framework adapter.
//!
//! The runtime does not know any test framework. An adapter observes the
//! hosting framework and drives the tracer lifecycle: `begin_test`/`end_test`
//! around each test, `assertion_begin`/`assertion_end` around each assertion
//! evaluation, and optionally `begin_invocation`/`end_invocation` around
//! individual call sites.
//!
//! Two assertion-wrapping strategies are supported and may coexist:
//!
//! 1. **Macro redefinition** (precise): the framework's assertion forms are
//!    re-expressed so evaluation happens between begin/end. The guards and
//!    macros here provide that shape for Rust-hosted harnesses; C++ hosts
//!    get the same from `include/brinfo/autowrap.h`.
//! 2. **Post-hoc listener**: a [`TestObserver`] fed from the framework's
//!    result callbacks. It captures failures and skips without any macro
//!    rewriting, but cannot mark in-oracle during evaluation — a post-hoc
//!    assertion is reported as an empty begin/end pair.

use crate::runtime;

/// Ends the current invocation when dropped, exception-safe.
#[derive(Debug)]
pub struct InvocationScopeGuard;

impl InvocationScopeGuard {
    /// Arm a guard; pair with a preceding `begin_invocation`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Default for InvocationScopeGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InvocationScopeGuard {
    fn drop(&mut self) {
        runtime::end_invocation("OK");
    }
}

/// Ends the current assertion scope when dropped.
#[derive(Debug)]
pub struct AssertionScopeGuard;

impl AssertionScopeGuard {
    /// Arm a guard; pair with a preceding `assertion_begin`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Default for AssertionScopeGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AssertionScopeGuard {
    fn drop(&mut self) {
        runtime::assertion_end();
    }
}

/// Wrap a call expression in an invocation scope.
///
/// The value of the expression is the value of the macro, so it can replace
/// the original call in place:
///
/// ```
/// # fn target(x: i32) -> i32 { x }
/// # let dir = tempfile::tempdir().unwrap();
/// # brinfo::runtime::init(Some(&dir.path().join("trace.ndjson")));
/// brinfo::runtime::begin_test("Suite", "Case", file!(), line!());
/// let v = brinfo::brinfo_call!(target(5));
/// brinfo::runtime::end_test("PASSED");
/// # assert_eq!(v, 5);
/// ```
///
/// A second form carries a precomputed target-function hash.
#[macro_export]
macro_rules! brinfo_call {
    ($call:expr) => {
        $crate::brinfo_call!($call, 0u64)
    };
    ($call:expr, $func_hash:expr) => {{
        $crate::runtime::begin_invocation(file!(), line!(), stringify!($call), $func_hash);
        let _brinfo_scope_guard = $crate::adapter::InvocationScopeGuard::new();
        $call
    }};
}

/// Evaluate an assertion body inside an oracle scope.
///
/// Invocations begun while the body runs are tagged in-oracle.
#[macro_export]
macro_rules! brinfo_assertion {
    ($label:expr, $body:expr) => {{
        $crate::runtime::assertion_begin($label, file!(), line!(), Some(stringify!($body)));
        let _brinfo_assert_guard = $crate::adapter::AssertionScopeGuard::new();
        $body
    }};
}

/// Framework-agnostic observer of test lifecycle callbacks.
pub trait TestObserver {
    /// A test is about to run
    fn on_test_start(&mut self, suite: &str, name: &str, file: &str, line: u32);
    /// The test finished
    fn on_test_end(&mut self, passed: bool);
    /// The framework reported an assertion result (post-hoc)
    fn on_assertion_part(&mut self, label: &str, file: &str, line: u32, summary: &str);
}

/// Observer that forwards framework callbacks into the tracer.
///
/// The post-hoc strategy: assertion parts arrive after evaluation, so the
/// begin/end pair is emitted back-to-back and in-oracle tagging does not
/// apply to them.
#[derive(Debug, Default)]
pub struct TraceForwarder;

impl TraceForwarder {
    /// Create a forwarder
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl TestObserver for TraceForwarder {
    fn on_test_start(&mut self, suite: &str, name: &str, file: &str, line: u32) {
        runtime::begin_test(suite, name, file, line);
    }

    fn on_test_end(&mut self, passed: bool) {
        runtime::end_test(if passed { "PASSED" } else { "FAILED" });
    }

    fn on_assertion_part(&mut self, label: &str, file: &str, line: u32, summary: &str) {
        runtime::assertion_begin(label, file, line, Some(summary));
        runtime::assertion_end();
    }
}
