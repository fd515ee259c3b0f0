use log::debug;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Where the receiver currently is in handling a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionPhase {
    Idle = 0,
    Admitting = 1,
    Reviewing = 2,
    Writing = 3,
    Denied = 4,
    Failed = 5,
}

impl SessionPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SessionPhase::Admitting,
            2 => SessionPhase::Reviewing,
            3 => SessionPhase::Writing,
            4 => SessionPhase::Denied,
            5 => SessionPhase::Failed,
            _ => SessionPhase::Idle,
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Lets at most one transfer session past admission at a time.
///
/// Admission is a single compare-and-swap from `Idle`, and the returned guard puts
/// the gate back to `Idle` when dropped, whatever path the session took.
#[derive(Debug, Clone, Default)]
pub struct AdmissionGate {
    phase: Arc<AtomicU8>,
}

impl AdmissionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the gate, or `None` when another session holds it
    pub fn try_acquire(&self) -> Option<AdmissionGuard> {
        self.phase
            .compare_exchange(
                SessionPhase::Idle as u8,
                SessionPhase::Admitting as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .ok()
            .map(|_| AdmissionGuard {
                phase: self.phase.clone(),
            })
    }

    pub fn phase(&self) -> SessionPhase {
        SessionPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn is_busy(&self) -> bool {
        self.phase() != SessionPhase::Idle
    }
}

/// Proof of admission. Releases the gate on drop.
#[derive(Debug)]
pub struct AdmissionGuard {
    phase: Arc<AtomicU8>,
}

impl AdmissionGuard {
    /// Record the session's progress. Moving back to `Idle` is only done by dropping.
    pub fn advance(&self, next: SessionPhase) {
        if next == SessionPhase::Idle {
            return;
        }
        let previous = self.phase.swap(next as u8, Ordering::AcqRel);
        debug!("Session phase {} -> {}", SessionPhase::from_u8(previous), next);
    }

    pub fn phase(&self) -> SessionPhase {
        SessionPhase::from_u8(self.phase.load(Ordering::Acquire))
    }
}

impl Drop for AdmissionGuard {
    fn drop(&mut self) {
        self.phase.store(SessionPhase::Idle as u8, Ordering::Release);
        debug!("Session released, receiver idle");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn test_single_admission() {
        let gate = AdmissionGate::new();
        assert_eq!(gate.phase(), SessionPhase::Idle);

        let guard = gate.try_acquire().expect("idle gate admits");
        assert!(gate.is_busy());
        assert!(gate.try_acquire().is_none());

        guard.advance(SessionPhase::Reviewing);
        assert_eq!(gate.phase(), SessionPhase::Reviewing);
        assert!(gate.try_acquire().is_none());

        drop(guard);
        assert!(!gate.is_busy());
        assert!(gate.try_acquire().is_some());
    }

    #[test]
    fn test_advance_cannot_release() {
        let gate = AdmissionGate::new();
        let guard = gate.try_acquire().unwrap();
        guard.advance(SessionPhase::Idle);
        assert_eq!(guard.phase(), SessionPhase::Admitting);
        assert!(gate.try_acquire().is_none());
    }

    #[test]
    fn test_released_after_every_terminal_phase() {
        let gate = AdmissionGate::new();
        for terminal in [SessionPhase::Writing, SessionPhase::Denied, SessionPhase::Failed] {
            let guard = gate.try_acquire().unwrap();
            guard.advance(terminal);
            drop(guard);
            assert_eq!(gate.phase(), SessionPhase::Idle);
        }
    }

    #[test]
    fn test_concurrent_claims_admit_exactly_one() {
        let gate = AdmissionGate::new();
        let threads = 16;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let gate = gate.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    // Hold the guard until every thread has tried
                    let guard = gate.try_acquire();
                    let admitted = guard.is_some();
                    barrier.wait();
                    admitted
                })
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|admitted| *admitted)
            .count();
        assert_eq!(admitted, 1);
        assert!(!gate.is_busy());
    }
}
