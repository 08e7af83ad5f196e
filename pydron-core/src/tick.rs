//! Hierarchical execution timestamps (spec §4.1).
//!
//! A `Tick` is a non-empty sequence of non-negative integers paired with an
//! equal-length boolean *loop mask* marking which positions were introduced
//! by a loop-iteration refinement. Two reserved ticks bound every graph:
//! `start = ((0,0),(F,F))` and `final = ((1,0),(F,F))`; no created task tick
//! may be `<= start` or `>= final`.
//!
//! Ordering is lexicographic on the integer tuple alone — the mask never
//! participates in comparison or equality, only in `nonloop_elements` /
//! `loop_elements` and in how `shift_into` composes ticks during subgraph
//! splicing.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A hierarchical timestamp: an integer path plus a same-length loop mask.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tick {
    elements: Vec<i64>,
    loop_mask: Vec<bool>,
}

impl Tick {
    /// Build a tick from raw elements, with no positions marked as loop
    /// iterations.
    pub fn new(elements: Vec<i64>) -> Self {
        let len = elements.len();
        Self { elements, loop_mask: vec![false; len] }
    }

    /// Build a tick from elements and an explicit loop mask. Panics if the
    /// lengths disagree — this is a programming error in the caller, not a
    /// runtime condition.
    pub fn with_mask(elements: Vec<i64>, loop_mask: Vec<bool>) -> Self {
        assert_eq!(elements.len(), loop_mask.len(), "tick elements/mask length mismatch");
        Self { elements, loop_mask }
    }

    /// The reserved tick every graph begins at: `((0,0),(F,F))`.
    pub fn start() -> Self {
        Self::new(vec![0, 0])
    }

    /// The reserved sentinel tick whose gathered inputs are the program's
    /// outputs: `((1,0),(F,F))`.
    pub fn final_tick() -> Self {
        Self::new(vec![1, 0])
    }

    pub fn is_start(&self) -> bool {
        *self == Tick::start()
    }

    pub fn is_final(&self) -> bool {
        *self == Tick::final_tick()
    }

    pub fn elements(&self) -> &[i64] {
        &self.elements
    }

    pub fn loop_mask(&self) -> &[bool] {
        &self.loop_mask
    }

    /// Add `n` to the last element; the mask is preserved.
    pub fn incremented(&self, n: i64) -> Self {
        let mut elements = self.elements.clone();
        *elements.last_mut().expect("tick is never empty") += n;
        Self { elements, loop_mask: self.loop_mask.clone() }
    }

    /// Shift `self` into `other`: concatenate `self`'s tail (elements
    /// `1..`) onto `other`'s full vector, and likewise for the masks. Used
    /// by the splicer to re-home an interior subgraph tick under the tick
    /// of the task it replaces.
    pub fn shift_into(&self, other: &Tick) -> Self {
        let mut elements = other.elements.clone();
        elements.extend_from_slice(&self.elements[1..]);
        let mut loop_mask = other.loop_mask.clone();
        loop_mask.extend_from_slice(&self.loop_mask[1..]);
        Self { elements, loop_mask }
    }

    /// Drop the trailing `k` positions (elements and mask bits alike).
    pub fn right_shift(&self, k: usize) -> Self {
        let new_len = self.elements.len().saturating_sub(k);
        Self {
            elements: self.elements[..new_len].to_vec(),
            loop_mask: self.loop_mask[..new_len].to_vec(),
        }
    }

    /// Return a copy with the last mask position set to true, marking this
    /// tick as one loop iteration among siblings.
    pub fn mark_loop_iteration(&self) -> Self {
        let mut loop_mask = self.loop_mask.clone();
        *loop_mask.last_mut().expect("tick is never empty") = true;
        Self { elements: self.elements.clone(), loop_mask }
    }

    /// Elements at positions *not* marked as loop iterations.
    pub fn nonloop_elements(&self) -> Vec<i64> {
        self.elements
            .iter()
            .zip(self.loop_mask.iter())
            .filter(|(_, m)| !**m)
            .map(|(e, _)| *e)
            .collect()
    }

    /// Elements at positions marked as loop iterations.
    pub fn loop_elements(&self) -> Vec<i64> {
        self.elements
            .iter()
            .zip(self.loop_mask.iter())
            .filter(|(_, m)| **m)
            .map(|(e, _)| *e)
            .collect()
    }

    /// Parse the textual forms described in spec §4.1: the literal words
    /// `start`/`final`, a bare integer (`start + n`), a parenthesized
    /// integer tuple (`(0, 5)`), or a comma-separated list with an
    /// optional `*` prefix marking loop positions (`0,*3,5`).
    pub fn parse(s: &str) -> std::result::Result<Self, ParseTickError> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("start") {
            return Ok(Tick::start());
        }
        if s.eq_ignore_ascii_case("final") {
            return Ok(Tick::final_tick());
        }
        if let Ok(n) = s.parse::<i64>() {
            return Ok(Tick::start().incremented(n));
        }
        let inner = s.strip_prefix('(').and_then(|s| s.strip_suffix(')')).unwrap_or(s);
        if inner.is_empty() {
            return Err(ParseTickError(format!("empty tick literal: {s:?}")));
        }
        let mut elements = Vec::new();
        let mut loop_mask = Vec::new();
        for part in inner.split(',') {
            let part = part.trim();
            let (is_loop, digits) = match part.strip_prefix('*') {
                Some(rest) => (true, rest.trim()),
                None => (false, part),
            };
            let value: i64 = digits
                .parse()
                .map_err(|_| ParseTickError(format!("invalid tick component {digits:?} in {s:?}")))?;
            elements.push(value);
            loop_mask.push(is_loop);
        }
        Ok(Tick::with_mask(elements, loop_mask))
    }
}

impl PartialEq for Tick {
    fn eq(&self, other: &Self) -> bool {
        self.elements == other.elements
    }
}
impl Eq for Tick {}

impl PartialOrd for Tick {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tick {
    fn cmp(&self, other: &Self) -> Ordering {
        self.elements.cmp(&other.elements)
    }
}

impl std::hash::Hash for Tick {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.elements.hash(state);
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_start() {
            return write!(f, "start");
        }
        if self.is_final() {
            return write!(f, "final");
        }
        write!(f, "(")?;
        for (i, (e, m)) in self.elements.iter().zip(self.loop_mask.iter()).enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            if *m {
                write!(f, "*")?;
            }
            write!(f, "{e}")?;
        }
        write!(f, ")")
    }
}

/// Error returned by [`Tick::parse`] for malformed tick literals.
#[derive(Debug, Error)]
#[error("invalid tick literal: {0}")]
pub struct ParseTickError(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_and_final_are_reserved() {
        assert_eq!(Tick::start().elements(), &[0, 0]);
        assert_eq!(Tick::final_tick().elements(), &[1, 0]);
        assert!(Tick::start() < Tick::final_tick());
    }

    #[test]
    fn increment_grows_last_element_only() {
        let t = Tick::start().incremented(5);
        assert_eq!(t.elements(), &[0, 5]);
        assert!(Tick::start() < t);
        assert!(t < Tick::final_tick());
    }

    #[test]
    fn shift_into_concatenates_tail_onto_target() {
        let inner = Tick::new(vec![0, 3, 1]);
        let outer = Tick::new(vec![0, 7]);
        let shifted = inner.shift_into(&outer);
        assert_eq!(shifted.elements(), &[0, 7, 3, 1]);
    }

    #[test]
    fn right_shift_drops_trailing_positions() {
        let t = Tick::new(vec![0, 7, 3, 1]);
        assert_eq!(t.right_shift(2).elements(), &[0, 7]);
    }

    #[test]
    fn mark_loop_iteration_sets_last_mask_bit() {
        let t = Tick::new(vec![0, 7, 3]).mark_loop_iteration();
        assert_eq!(t.loop_mask(), &[false, false, true]);
        assert_eq!(t.nonloop_elements(), vec![0, 7]);
        assert_eq!(t.loop_elements(), vec![3]);
    }

    #[test]
    fn equality_and_ordering_ignore_the_mask() {
        let a = Tick::with_mask(vec![0, 5], vec![false, false]);
        let b = Tick::with_mask(vec![0, 5], vec![true, true]);
        assert_eq!(a, b);
        assert_eq!(a.cmp(&b), Ordering::Equal);
    }

    #[test]
    fn parse_accepts_all_documented_forms() {
        assert_eq!(Tick::parse("start").unwrap(), Tick::start());
        assert_eq!(Tick::parse("final").unwrap(), Tick::final_tick());
        assert_eq!(Tick::parse("5").unwrap(), Tick::start().incremented(5));
        assert_eq!(Tick::parse("(0,5)").unwrap(), Tick::new(vec![0, 5]));
        let loopy = Tick::parse("0,*3,5").unwrap();
        assert_eq!(loopy.elements(), &[0, 3, 5]);
        assert_eq!(loopy.loop_mask(), &[false, true, false]);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Tick::parse("").is_err());
        assert!(Tick::parse("(a,b)").is_err());
    }

    #[test]
    fn display_round_trips_through_parse() {
        let t = Tick::with_mask(vec![0, 3, 1], vec![false, true, false]);
        let rendered = t.to_string();
        assert_eq!(Tick::parse(&rendered).unwrap(), t);
        assert_eq!(Tick::parse(&rendered).unwrap().loop_mask(), t.loop_mask());
    }
}
