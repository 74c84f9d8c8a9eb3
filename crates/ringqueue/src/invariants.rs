//! Debug assertion macros for ring counter invariants.
//!
//! Active only with `debug_assertions`, so release builds pay nothing.
//! Used by the SPSC byte and typed rings.

/// Assert that count does not exceed the usable capacity.
///
/// **Invariant**: `0 ≤ (tail - head) ≤ capacity - 1`
macro_rules! debug_assert_bounded_count {
    ($count:expr, $usable:expr) => {
        debug_assert!(
            $count <= $usable,
            "bounded count violated: {} items in a ring of {} usable slots",
            $count,
            $usable
        )
    };
}

/// Assert that head does not advance past tail.
///
/// **Invariant**: `head ≤ tail` (after advance)
macro_rules! debug_assert_head_not_past_tail {
    ($new_head:expr, $tail:expr) => {
        debug_assert!(
            $new_head <= $tail,
            "advancing head {} beyond tail {}",
            $new_head,
            $tail
        )
    };
}

/// Assert that a sequence number only increases.
macro_rules! debug_assert_monotonic {
    ($name:literal, $old:expr, $new:expr) => {
        debug_assert!(
            $new >= $old,
            "{} decreased from {} to {}",
            $name,
            $old,
            $new
        )
    };
}

/// Assert that a read targets a published slot.
///
/// **Invariant**: `slot(seq) is initialized ⟺ head ≤ seq < tail`
macro_rules! debug_assert_initialized_read {
    ($pos:expr, $head:expr, $tail:expr) => {
        debug_assert!(
            $pos >= $head && $pos < $tail,
            "reading slot at seq {} outside initialized range [{}, {})",
            $pos,
            $head,
            $tail
        )
    };
}

pub(crate) use debug_assert_bounded_count;
pub(crate) use debug_assert_head_not_past_tail;
pub(crate) use debug_assert_initialized_read;
pub(crate) use debug_assert_monotonic;
