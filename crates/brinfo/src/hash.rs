//! Hash primitives shared by the static and dynamic sides.
//!
//! Everything that names a condition, a function, or a chain does so through
//! the hashes defined here. The instrumenter bakes these values into probe
//! call sites and the meta collector writes the same values into the meta
//! documents, so both sides must agree bit-for-bit.

use serde::Serializer;

/// FNV-1a 64-bit offset basis
pub const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;

/// FNV-1a 64-bit prime
pub const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a-64 over raw bytes
#[must_use]
pub fn fnv1a64(data: &[u8]) -> u64 {
    let mut h = FNV_OFFSET;
    for &b in data {
        h ^= u64::from(b);
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

/// FNV-1a-64 over the UTF-8 bytes of a string
#[must_use]
pub fn hash64(s: &str) -> u64 {
    fnv1a64(s.as_bytes())
}

/// Render a 64-bit value as `0x` + 16 lowercase hex digits
#[must_use]
pub fn hex64(v: u64) -> String {
    format!("{v:#018x}")
}

/// Identity hash of a condition: `H(file ":" line ":" cond_norm)`
#[must_use]
pub fn condition_hash(file: &str, line: u32, cond_norm: &str) -> u64 {
    hash64(&format!("{file}:{line}:{cond_norm}"))
}

/// Encode one chain element for the rolling signature
#[must_use]
pub const fn chain_encode(cond_id: u32, value: bool) -> u64 {
    ((cond_id as u64) << 1) | (value as u64)
}

/// Mix one encoded element into a rolling chain signature
#[must_use]
pub const fn chain_mix(h: u64, encoded: u64) -> u64 {
    (h ^ encoded).wrapping_mul(FNV_PRIME)
}

/// Rolling signature of a chain sequence
///
/// FNV-1a-64 where each element contributes one 64-bit unit
/// `(cond_id << 1) | value`, not its individual bytes.
#[must_use]
pub fn chain_signature(seq: &[(u32, bool)]) -> u64 {
    seq.iter().fold(FNV_OFFSET, |h, &(id, val)| {
        chain_mix(h, chain_encode(id, val))
    })
}

/// Serde helper: emit a `u64` as a quoted hex-64 string
pub fn serialize_hex64<S: Serializer>(v: &u64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&hex64(*v))
}

/// Serde helper: emit an optional `u64` as a quoted hex-64 string
///
/// Pair with `skip_serializing_if = "Option::is_none"`; `None` never reaches
/// the serializer.
pub fn serialize_hex64_opt<S: Serializer>(v: &Option<u64>, s: S) -> Result<S::Ok, S::Error> {
    match v {
        Some(v) => s.serialize_str(&hex64(*v)),
        None => s.serialize_none(),
    }
}
