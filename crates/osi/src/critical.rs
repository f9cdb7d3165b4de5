//! Short critical sections.
//!
//! A critical section bounds the shortest possible data-structure update: a
//! handful of memory accesses, never a blocking call. Entry captures the
//! pre-call state in a token; exit restores it, so sections nest freely.

use critical_section::RestoreState;

/// Token returned by [`enter`]. Passing it to [`exit`] restores the state
/// captured at entry.
#[must_use = "dropping the token without calling exit leaves the critical section open"]
pub struct CriticalToken {
    state: RestoreState,
}

/// Enters a critical section and returns the restore token.
pub fn enter() -> CriticalToken {
    CriticalToken {
        state: unsafe { critical_section::acquire() },
    }
}

/// Leaves a critical section, restoring the state captured by [`enter`].
pub fn exit(token: CriticalToken) {
    unsafe { critical_section::release(token.state) }
}

/// Runs `f` inside a critical section.
pub fn with<R>(f: impl FnOnce() -> R) -> R {
    critical_section::with(|_| f())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_nest() {
        let outer = enter();
        let inner = enter();
        exit(inner);
        exit(outer);
    }

    #[test]
    fn with_returns_value() {
        let value = with(|| with(|| 7));
        assert_eq!(value, 7);
    }
}
