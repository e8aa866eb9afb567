//! Runtime tracer.
//!
//! A single long-lived sink behind a narrow facade: one process-wide
//! append-only NDJSON log guarded by a mutex, plus per-thread test and
//! invocation state. Every public entry point runs the once-guarded
//! initialization first, emits at most one line under the lock, and flushes
//! before unlocking, so a crash never leaves a torn line behind.
//!
//! Mis-nesting never panics and never corrupts the log: a lifecycle call
//! outside its required state is a silent no-op, matching the principle that
//! losing a trace beats aborting the test process.

mod events;

use std::cell::RefCell;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

use events::TraceEvent;

use crate::hash;

/// Environment variable overriding the trace path
pub const TRACE_PATH_ENV: &str = "BRINFO_TRACE_PATH";

/// Default trace path, relative to the working directory
pub const DEFAULT_TRACE_PATH: &str = "llm_reqs/runtime.ndjson";

static TRACER: OnceLock<Tracer> = OnceLock::new();
static NEXT_TEST_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_INVOCATION_ID: AtomicU64 = AtomicU64::new(1);

struct Tracer {
    sink: Mutex<Option<File>>,
}

impl Tracer {
    fn open(explicit: Option<&Path>) -> Self {
        let path = resolve_trace_path(explicit, std::env::var_os(TRACE_PATH_ENV).as_deref());
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                let _ = fs::create_dir_all(parent);
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path).ok();
        Self {
            sink: Mutex::new(file),
        }
    }

    fn emit(&self, event: &TraceEvent<'_>) {
        let Ok(line) = serde_json::to_string(event) else {
            return;
        };
        let mut guard = match self.sink.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(file) = guard.as_mut() {
            let _ = writeln!(file, "{line}");
            let _ = file.flush();
        }
    }
}

/// Trace path resolution: explicit argument, then environment, then default.
fn resolve_trace_path(explicit: Option<&Path>, env: Option<&std::ffi::OsStr>) -> PathBuf {
    if let Some(p) = explicit {
        if !p.as_os_str().is_empty() {
            return p.to_path_buf();
        }
    }
    if let Some(e) = env {
        if !e.is_empty() {
            return PathBuf::from(e);
        }
    }
    PathBuf::from(DEFAULT_TRACE_PATH)
}

fn tracer() -> &'static Tracer {
    TRACER.get_or_init(|| Tracer::open(None))
}

struct TestCtx {
    id: u64,
    next_assert_id: u64,
    next_invocation_index: u64,
}

struct InvocationFrame {
    id: u64,
    test_id: u64,
    depth: u32,
    segment_id: u64,
    start: Instant,
}

#[derive(Default)]
struct ThreadState {
    test: Option<TestCtx>,
    frames: Vec<InvocationFrame>,
    in_assertion: bool,
    segment_id: u64,
}

thread_local! {
    static STATE: RefCell<ThreadState> = RefCell::new(ThreadState::default());
}

fn now_iso8601() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Initialize the trace sink.
///
/// Idempotent: the first call (or the first other entry point, whichever
/// happens first) wins. Resolution order: `path` argument, then
/// [`TRACE_PATH_ENV`], then [`DEFAULT_TRACE_PATH`]. Parent directories are
/// created and the file is opened in append mode.
pub fn init(path: Option<&Path>) {
    TRACER.get_or_init(|| Tracer::open(path));
}

/// Begin a test context on this thread.
///
/// Resets the per-test counters and the segment counter. A second
/// `begin_test` without an intervening [`end_test`] is ignored.
pub fn begin_test(suite: &str, name: &str, file: &str, line: u32) {
    let tracer = tracer();
    STATE.with(|s| {
        let mut st = s.borrow_mut();
        if st.test.is_some() {
            return;
        }
        let id = NEXT_TEST_ID.fetch_add(1, Ordering::Relaxed);
        let full = format!("{suite}.{name}");
        tracer.emit(&TraceEvent::TestStart {
            ts: now_iso8601(),
            test_id: id,
            suite,
            name,
            full: &full,
            file,
            line,
            hash: hash::hash64(&full),
        });
        st.segment_id = 0;
        st.in_assertion = false;
        st.frames.clear();
        st.test = Some(TestCtx {
            id,
            next_assert_id: 0,
            next_invocation_index: 0,
        });
    });
}

/// End the current test and clear all per-test state.
///
/// Frames still on the invocation stack are discarded without emitting
/// their end events. No-op without an active test.
pub fn end_test(status: &str) {
    let tracer = tracer();
    STATE.with(|s| {
        let mut st = s.borrow_mut();
        let Some(ctx) = st.test.take() else { return };
        tracer.emit(&TraceEvent::TestEnd {
            ts: now_iso8601(),
            test_id: ctx.id,
            status,
        });
        st.frames.clear();
        st.in_assertion = false;
        st.segment_id = 0;
    });
}

/// Mark entry into an assertion site.
///
/// Invocations begun before the matching [`assertion_end`] are tagged
/// in-oracle. No-op without an active test.
pub fn assertion_begin(macro_name: &str, file: &str, line: u32, raw_text: Option<&str>) {
    let tracer = tracer();
    STATE.with(|s| {
        let mut st = s.borrow_mut();
        let st = &mut *st;
        let Some(ctx) = st.test.as_mut() else { return };
        st.in_assertion = true;
        let assert_id = ctx.next_assert_id;
        ctx.next_assert_id += 1;
        let test_id = ctx.id;
        tracer.emit(&TraceEvent::Assertion {
            ts: now_iso8601(),
            test_id,
            assert_id,
            r#macro: macro_name,
            file,
            line,
            raw: raw_text.filter(|t| !t.is_empty()),
        });
    });
}

/// Mark exit from the current assertion site.
///
/// Advances this thread's segment counter by one. No-op without an active
/// test.
pub fn assertion_end() {
    let _ = tracer();
    STATE.with(|s| {
        let mut st = s.borrow_mut();
        if st.test.is_none() {
            return;
        }
        st.in_assertion = false;
        st.segment_id += 1;
    });
}

/// Begin a top-level invocation of a target function.
///
/// Depth-aware: only the outermost begin/end pair emits events; deeper
/// pairs increment a nesting counter on the top frame. The outermost frame
/// samples `segment_id` and the in-oracle flag at begin. Pass `0` for an
/// unknown `target_func_hash`. No-op without an active test.
pub fn begin_invocation(call_file: &str, call_line: u32, call_expr: &str, target_func_hash: u64) {
    let tracer = tracer();
    STATE.with(|s| {
        let mut st = s.borrow_mut();
        if st.test.is_none() {
            return;
        }
        if let Some(top) = st.frames.last_mut() {
            top.depth += 1;
            return;
        }
        let segment_id = st.segment_id;
        let in_oracle = st.in_assertion;
        let Some(ctx) = st.test.as_mut() else { return };
        let id = NEXT_INVOCATION_ID.fetch_add(1, Ordering::Relaxed);
        let index = ctx.next_invocation_index;
        ctx.next_invocation_index += 1;
        let test_id = ctx.id;
        tracer.emit(&TraceEvent::InvocationStart {
            ts: now_iso8601(),
            test_id,
            invocation_id: id,
            index,
            segment_id,
            in_oracle: u8::from(in_oracle),
            call_file: Some(call_file).filter(|f| !f.is_empty()),
            call_line: (call_line > 0).then_some(call_line),
            call_expr: Some(call_expr).filter(|e| !e.is_empty()),
            target_func: (target_func_hash != 0).then_some(target_func_hash),
        });
        st.frames.push(InvocationFrame {
            id,
            test_id,
            depth: 1,
            segment_id,
            start: Instant::now(),
        });
    });
}

/// End the current invocation.
///
/// With nested begins outstanding, decrements the nesting counter; at depth
/// one, emits the end event and pops the frame. No-op with an empty stack.
pub fn end_invocation(status: &str) {
    let tracer = tracer();
    STATE.with(|s| {
        let mut st = s.borrow_mut();
        let Some(top) = st.frames.last_mut() else { return };
        if top.depth > 1 {
            top.depth -= 1;
            return;
        }
        let Some(frame) = st.frames.pop() else { return };
        let duration_ms = u64::try_from(frame.start.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracer.emit(&TraceEvent::InvocationEnd {
            ts: now_iso8601(),
            test_id: frame.test_id,
            invocation_id: frame.id,
            segment_id: frame.segment_id,
            status,
            duration_ms,
        });
    });
}

/// Log one condition evaluation and return the logged value.
///
/// Returning `value` lets a probe substitute for the original boolean
/// subexpression. The event is attributed to the current test and, when one
/// is active, the current invocation. Never calls back into user code, so
/// re-entry under the sink mutex cannot occur.
#[allow(clippy::too_many_arguments)]
pub fn log_cond(
    func_hash: u64,
    file: &str,
    line: u32,
    value: bool,
    cond_norm: &str,
    cond_hash: u64,
    norm_flip: bool,
    cond_kind: &str,
) -> bool {
    let tracer = tracer();
    STATE.with(|s| {
        let st = s.borrow();
        tracer.emit(&TraceEvent::Cond {
            ts: now_iso8601(),
            test_id: st.test.as_ref().map(|t| t.id),
            invocation_id: st.frames.last().map(|f| f.id),
            func: func_hash,
            cond_hash,
            file,
            line,
            cond_norm,
            cond_kind,
            val: u8::from(value),
            norm_flip: u8::from(norm_flip),
        });
    });
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    // The stateful lifecycle is exercised in tests/runtime_trace.rs in its
    // own process; only the pure pieces are covered here.

    #[test]
    fn explicit_path_wins_over_environment() {
        let p = resolve_trace_path(Some(Path::new("/tmp/x.ndjson")), Some("env.ndjson".as_ref()));
        assert_eq!(p, PathBuf::from("/tmp/x.ndjson"));
    }

    #[test]
    fn environment_wins_over_default() {
        let p = resolve_trace_path(None, Some("env.ndjson".as_ref()));
        assert_eq!(p, PathBuf::from("env.ndjson"));
    }

    #[test]
    fn empty_inputs_fall_through_to_default() {
        let p = resolve_trace_path(Some(Path::new("")), Some("".as_ref()));
        assert_eq!(p, PathBuf::from(DEFAULT_TRACE_PATH));
    }
}
