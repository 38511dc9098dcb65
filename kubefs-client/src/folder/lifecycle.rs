use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Populated,
    Dirty,
}

impl Phase {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Phase::Populated,
            2 => Phase::Dirty,
            _ => Phase::Uninitialized,
        }
    }
}

/// `Uninitialized → Populated → Dirty → Populated → ...`
///
/// Only [`Lifecycle::mark_dirty`] and [`Lifecycle::begin_populate`] move the
/// phase; callers hold the folder's snapshot lock around `begin_populate`.
#[derive(Debug, Default)]
pub struct Lifecycle {
    phase: AtomicU8,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// `Populated → Dirty`. A folder never read stays uninitialized.
    pub fn mark_dirty(&self) -> bool {
        self.phase
            .compare_exchange(
                Phase::Populated as u8,
                Phase::Dirty as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Moves to `Populated` when the caller must populate. The returned
    /// guard restores the earlier phase unless [`Populating::commit`] is
    /// called, so a failed or abandoned population is retried on the next
    /// read. A `mark_dirty` racing with the population lands after the swap
    /// and is never lost.
    pub fn begin_populate(&self) -> Option<Populating<'_>> {
        let prior = Phase::from_u8(self.phase.swap(Phase::Populated as u8, Ordering::AcqRel));
        if prior == Phase::Populated {
            return None;
        }
        Some(Populating {
            lifecycle: self,
            prior,
            committed: false,
        })
    }
}

/// A population in flight.
#[derive(Debug)]
pub struct Populating<'a> {
    lifecycle: &'a Lifecycle,
    prior: Phase,
    committed: bool,
}

impl Populating<'_> {
    /// Phase the folder was in before this population.
    pub fn prior(&self) -> Phase {
        self.prior
    }

    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for Populating<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        // a dirty mark taken meanwhile already forces the next read
        let _ = self.lifecycle.phase.compare_exchange(
            Phase::Populated as u8,
            self.prior as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        let lc = Lifecycle::new();
        assert_eq!(lc.phase(), Phase::Uninitialized);
        assert!(!lc.mark_dirty());
        assert_eq!(lc.phase(), Phase::Uninitialized);

        let populating = lc.begin_populate().unwrap();
        assert_eq!(populating.prior(), Phase::Uninitialized);
        populating.commit();
        assert_eq!(lc.phase(), Phase::Populated);
        assert!(lc.begin_populate().is_none());

        assert!(lc.mark_dirty());
        assert!(!lc.mark_dirty());
        assert_eq!(lc.phase(), Phase::Dirty);
        lc.begin_populate().unwrap().commit();
        assert_eq!(lc.phase(), Phase::Populated);
    }

    #[test]
    fn test_abandoned_population_restores_prior_phase() {
        let lc = Lifecycle::new();
        drop(lc.begin_populate());
        assert_eq!(lc.phase(), Phase::Uninitialized);

        lc.begin_populate().unwrap().commit();
        lc.mark_dirty();
        drop(lc.begin_populate());
        assert_eq!(lc.phase(), Phase::Dirty);
    }

    #[test]
    fn test_dirty_mark_during_population_survives_abandon() {
        let lc = Lifecycle::new();
        let populating = lc.begin_populate().unwrap();
        // first population still running: nothing to invalidate yet
        assert!(lc.mark_dirty());
        drop(populating);
        assert_eq!(lc.phase(), Phase::Dirty);
    }
}
