//! Text edits over an immutable source buffer.
//!
//! The rewriting passes never mutate source in place. They register edits
//! against the original byte offsets and the buffer is materialized once at
//! the end. Replacements may swallow edits that landed strictly inside their
//! range; this is what lets the call wrapper rebuild an outer call from its
//! already-wrapped inner text and substitute the whole thing in one step.

use crate::result::{BrinfoError, BrinfoResult};

#[derive(Debug, Clone)]
struct Edit {
    start: usize,
    end: usize, // == start for insertions
    text: String,
    seq: u64,
    dead: bool,
}

impl Edit {
    const fn is_insert(&self) -> bool {
        self.start == self.end
    }
}

/// Edit buffer over one translation unit's source.
#[derive(Debug)]
pub struct Rewriter {
    source: String,
    edits: Vec<Edit>,
    next_seq: u64,
    prefix: String,
}

impl Rewriter {
    /// Create a rewriter over an immutable source buffer
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            edits: Vec::new(),
            next_seq: 0,
            prefix: String::new(),
        }
    }

    /// The untouched original buffer
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Queue text to insert at `offset`, before the original byte there.
    ///
    /// Insertions at the same offset apply in registration order.
    pub fn insert(&mut self, offset: usize, text: impl Into<String>) -> BrinfoResult<()> {
        self.check_boundary(offset, offset)?;
        let seq = self.bump();
        self.edits.push(Edit {
            start: offset,
            end: offset,
            text: text.into(),
            seq,
            dead: false,
        });
        Ok(())
    }

    /// Replace `start..end`, superseding any edits strictly inside the range.
    ///
    /// Callers that need the inner edits preserved read them first through
    /// [`Self::rewritten_text`] and fold them into `text`. A replacement that
    /// partially overlaps an existing replacement is refused.
    pub fn replace(
        &mut self,
        start: usize,
        end: usize,
        text: impl Into<String>,
    ) -> BrinfoResult<()> {
        if start > end {
            return Err(BrinfoError::SpanOutOfBounds {
                start,
                end,
                len: self.source.len(),
            });
        }
        self.check_boundary(start, end)?;
        for edit in &self.edits {
            if edit.dead {
                continue;
            }
            let contained = start <= edit.start && edit.end <= end;
            let disjoint = edit.end <= start || end <= edit.start;
            if !contained && !disjoint {
                return Err(BrinfoError::EditConflict { start, end });
            }
        }
        for edit in &mut self.edits {
            if edit.dead {
                continue;
            }
            // Insertions sitting exactly on the boundaries stay alive; they
            // belong to the text around the range, not inside it.
            let swallowed = if edit.is_insert() {
                start < edit.start && edit.start < end
            } else {
                start <= edit.start && edit.end <= end
            };
            if swallowed {
                edit.dead = true;
            }
        }
        let seq = self.bump();
        self.edits.push(Edit {
            start,
            end,
            text: text.into(),
            seq,
            dead: false,
        });
        Ok(())
    }

    /// Current text of `start..end` with the live edits inside it applied.
    ///
    /// Boundary insertions are excluded: they belong to the text around the
    /// range and survive a subsequent [`Self::replace`] of it, so counting
    /// them here would duplicate them.
    pub fn rewritten_text(&self, start: usize, end: usize) -> BrinfoResult<String> {
        self.check_boundary(start, end)?;
        let mut inside: Vec<&Edit> = self
            .edits
            .iter()
            .filter(|e| {
                !e.dead
                    && if e.is_insert() {
                        start < e.start && e.start < end
                    } else {
                        start <= e.start && e.end <= end
                    }
            })
            .collect();
        inside.sort_by_key(|e| (e.start, e.seq));
        let mut out = String::with_capacity(end - start);
        let mut cursor = start;
        for edit in inside {
            if edit.start > cursor {
                out.push_str(&self.source[cursor..edit.start]);
                cursor = edit.start;
            }
            out.push_str(&edit.text);
            cursor = cursor.max(edit.end);
        }
        if cursor < end {
            out.push_str(&self.source[cursor..end]);
        }
        Ok(out)
    }

    /// Set text emitted once before everything else (header injection)
    pub fn set_prefix(&mut self, text: impl Into<String>) {
        self.prefix = text.into();
    }

    /// Materialize the rewritten buffer
    #[must_use]
    pub fn into_string(self) -> String {
        let mut live: Vec<&Edit> = self.edits.iter().filter(|e| !e.dead).collect();
        live.sort_by_key(|e| (e.start, e.seq));
        let mut out = String::with_capacity(self.source.len() + self.prefix.len() + 256);
        out.push_str(&self.prefix);
        let mut cursor = 0usize;
        for edit in live {
            if edit.start > cursor {
                out.push_str(&self.source[cursor..edit.start]);
                cursor = edit.start;
            }
            out.push_str(&edit.text);
            cursor = cursor.max(edit.end);
        }
        out.push_str(&self.source[cursor..]);
        out
    }

    fn bump(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn check_boundary(&self, start: usize, end: usize) -> BrinfoResult<()> {
        let len = self.source.len();
        if start > len || end > len || start > end {
            return Err(BrinfoError::SpanOutOfBounds { start, end, len });
        }
        if !self.source.is_char_boundary(start) || !self.source.is_char_boundary(end) {
            return Err(BrinfoError::SpanNotOnCharBoundary { start, end });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserts_apply_in_registration_order() {
        let mut rw = Rewriter::new("abc");
        rw.insert(1, "X").expect("insert");
        rw.insert(1, "Y").expect("insert");
        assert_eq!(rw.into_string(), "aXYbc");
    }

    #[test]
    fn wrap_via_paired_inserts() {
        let src = "if (x > 0) return 1;";
        let start = src.find("x > 0").expect("cond");
        let end = start + "x > 0".len();
        let mut rw = Rewriter::new(src);
        rw.insert(start, "probe((bool)(").expect("insert");
        rw.insert(end, "))").expect("insert");
        assert_eq!(rw.into_string(), "if (probe((bool)(x > 0))) return 1;");
    }

    #[test]
    fn replace_supersedes_contained_edits() {
        let src = "outer(inner(x))";
        let inner_start = src.find("inner").expect("inner");
        let mut rw = Rewriter::new(src);
        rw.replace(inner_start, src.len() - 1, "WRAP(inner(x))")
            .expect("inner wrap");
        let outer = rw.rewritten_text(0, src.len()).expect("text");
        assert_eq!(outer, "outer(WRAP(inner(x)))");
        rw.replace(0, src.len(), format!("WRAP({outer})"))
            .expect("outer wrap");
        assert_eq!(rw.into_string(), "WRAP(outer(WRAP(inner(x))))");
    }

    #[test]
    fn boundary_inserts_survive_replacement() {
        let mut rw = Rewriter::new("abcd");
        rw.insert(1, "<").expect("insert");
        rw.insert(3, ">").expect("insert");
        rw.replace(1, 3, "X").expect("replace");
        assert_eq!(rw.into_string(), "a<X>d");
    }

    #[test]
    fn partially_overlapping_replacements_are_refused() {
        let mut rw = Rewriter::new("abcdef");
        rw.replace(1, 4, "X").expect("replace");
        let err = rw.replace(2, 6, "Y").expect_err("overlap");
        assert!(matches!(err, BrinfoError::EditConflict { .. }));
    }

    #[test]
    fn out_of_bounds_span_is_refused() {
        let mut rw = Rewriter::new("ab");
        assert!(matches!(
            rw.insert(5, "x"),
            Err(BrinfoError::SpanOutOfBounds { .. })
        ));
    }

    #[test]
    fn non_char_boundary_is_refused() {
        let mut rw = Rewriter::new("é");
        assert!(matches!(
            rw.insert(1, "x"),
            Err(BrinfoError::SpanNotOnCharBoundary { .. })
        ));
    }

    #[test]
    fn prefix_lands_before_offset_zero_inserts() {
        let mut rw = Rewriter::new("body");
        rw.insert(0, "first ").expect("insert");
        rw.set_prefix("#include <h>\n");
        assert_eq!(rw.into_string(), "#include <h>\nfirst body");
    }

    #[test]
    fn rewritten_text_of_untouched_range_is_identity() {
        let rw = Rewriter::new("hello world");
        assert_eq!(rw.rewritten_text(0, 5).expect("text"), "hello");
    }
}
