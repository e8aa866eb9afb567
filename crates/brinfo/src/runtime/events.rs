//! NDJSON event models.
//!
//! One JSON object per line, LF-terminated. Every event carries an ISO-8601
//! UTC timestamp; 64-bit hashes are rendered as quoted `0x` + 16 lowercase
//! hex digits; booleans that downstream tools aggregate (`val`, `in_oracle`,
//! `norm_flip`) are emitted as `0`/`1` integers.

use serde::Serialize;

use crate::hash::{serialize_hex64, serialize_hex64_opt};

/// One trace event, tagged by `type`.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceEvent<'a> {
    /// A test began on this thread
    TestStart {
        /// Timestamp
        ts: String,
        /// Process-wide test id
        test_id: u64,
        /// Suite name
        suite: &'a str,
        /// Test name
        name: &'a str,
        /// `suite.name`
        full: &'a str,
        /// Declaring file
        file: &'a str,
        /// Declaring line
        line: u32,
        /// `H(full)`
        #[serde(serialize_with = "serialize_hex64")]
        hash: u64,
    },
    /// The current test ended
    TestEnd {
        /// Timestamp
        ts: String,
        /// Process-wide test id
        test_id: u64,
        /// Terminal status, e.g. `PASSED`/`FAILED`/`ABORTED`
        status: &'a str,
    },
    /// An assertion site was entered
    Assertion {
        /// Timestamp
        ts: String,
        /// Owning test id
        test_id: u64,
        /// Per-test assertion ordinal
        assert_id: u64,
        /// Assertion macro label
        r#macro: &'a str,
        /// Assertion site file
        file: &'a str,
        /// Assertion site line
        line: u32,
        /// Raw argument text when captured
        #[serde(skip_serializing_if = "Option::is_none")]
        raw: Option<&'a str>,
    },
    /// An outermost target-function invocation began
    InvocationStart {
        /// Timestamp
        ts: String,
        /// Owning test id
        test_id: u64,
        /// Process-wide invocation id
        invocation_id: u64,
        /// Ordinal within the owning test
        index: u64,
        /// Segment counter sampled at begin
        segment_id: u64,
        /// 1 when begun between `AssertionBegin`/`AssertionEnd`
        in_oracle: u8,
        /// Call site file
        #[serde(skip_serializing_if = "Option::is_none")]
        call_file: Option<&'a str>,
        /// Call site line
        #[serde(skip_serializing_if = "Option::is_none")]
        call_line: Option<u32>,
        /// Short presentation of the call expression
        #[serde(skip_serializing_if = "Option::is_none")]
        call_expr: Option<&'a str>,
        /// Target function hash when known
        #[serde(
            serialize_with = "serialize_hex64_opt",
            skip_serializing_if = "Option::is_none"
        )]
        target_func: Option<u64>,
    },
    /// The outermost invocation ended
    InvocationEnd {
        /// Timestamp
        ts: String,
        /// Owning test id
        test_id: u64,
        /// Process-wide invocation id
        invocation_id: u64,
        /// Segment counter sampled at begin
        segment_id: u64,
        /// Terminal status, e.g. `OK`/`EXCEPTION`
        status: &'a str,
        /// Wall time between begin and end
        duration_ms: u64,
    },
    /// A condition probe fired
    Cond {
        /// Timestamp
        ts: String,
        /// Owning test id when a test is active
        #[serde(skip_serializing_if = "Option::is_none")]
        test_id: Option<u64>,
        /// Owning invocation id when one is active
        #[serde(skip_serializing_if = "Option::is_none")]
        invocation_id: Option<u64>,
        /// Enclosing function hash
        #[serde(serialize_with = "serialize_hex64")]
        func: u64,
        /// Condition identity hash
        #[serde(serialize_with = "serialize_hex64")]
        cond_hash: u64,
        /// Spelling file
        file: &'a str,
        /// Spelling line
        line: u32,
        /// Normalized condition text
        cond_norm: &'a str,
        /// Structural kind
        cond_kind: &'a str,
        /// Evaluated boolean, as written in the source
        val: u8,
        /// 1 when normalization inverted the expression's polarity
        norm_flip: u8,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_serializes_tag_and_hex_hash() {
        let e = TraceEvent::TestStart {
            ts: "2026-01-01T00:00:00Z".into(),
            test_id: 1,
            suite: "Suite",
            name: "Case",
            full: "Suite.Case",
            file: "t.cpp",
            line: 10,
            hash: 0xabc,
        };
        let v: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&e).expect("json")).expect("parse");
        assert_eq!(v["type"], "test_start");
        assert_eq!(v["hash"], "0x0000000000000abc");
        assert_eq!(v["line"], 10);
    }

    #[test]
    fn absent_optional_fields_are_omitted() {
        let e = TraceEvent::Cond {
            ts: "2026-01-01T00:00:00Z".into(),
            test_id: None,
            invocation_id: None,
            func: 0,
            cond_hash: 1,
            file: "t.cpp",
            line: 2,
            cond_norm: "x > 0",
            cond_kind: "IF",
            val: 1,
            norm_flip: 0,
        };
        let text = serde_json::to_string(&e).expect("json");
        assert!(!text.contains("test_id"));
        assert!(!text.contains("invocation_id"));
        let v: serde_json::Value = serde_json::from_str(&text).expect("parse");
        assert_eq!(v["val"], 1);
        assert_eq!(v["norm_flip"], 0);
    }

    #[test]
    fn invocation_start_carries_oracle_flag_as_int() {
        let e = TraceEvent::InvocationStart {
            ts: "2026-01-01T00:00:00Z".into(),
            test_id: 3,
            invocation_id: 9,
            index: 0,
            segment_id: 2,
            in_oracle: 1,
            call_file: Some("t.cpp"),
            call_line: Some(42),
            call_expr: Some("f(5)"),
            target_func: Some(0xdead),
        };
        let v: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&e).expect("json")).expect("parse");
        assert_eq!(v["in_oracle"], 1);
        assert_eq!(v["target_func"], "0x000000000000dead");
    }
}
