//! Timer Queue
//!
//! The narrator's suspension points, expressed as deadlines. There is one
//! slot per [`TimerKind`]; setting a slot replaces whatever was there, which
//! is what keeps the ambient timer unique.

use std::time::Instant;

/// Named timer slots
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Next ambient cycle
    Ambient,
    /// Grace flush of a deferred mind request
    DeferredFlush,
    /// Periodic emotion decay and drift
    EmotionTick,
}

impl TimerKind {
    const ALL: [TimerKind; 3] = [
        TimerKind::Ambient,
        TimerKind::DeferredFlush,
        TimerKind::EmotionTick,
    ];

    const fn slot(self) -> usize {
        match self {
            Self::Ambient => 0,
            Self::DeferredFlush => 1,
            Self::EmotionTick => 2,
        }
    }
}

/// Fixed set of deadline slots
#[derive(Clone, Debug, Default)]
pub struct TimerQueue {
    slots: [Option<Instant>; 3],
}

impl TimerQueue {
    /// All slots empty
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `kind`, replacing any earlier deadline
    pub fn set(&mut self, kind: TimerKind, deadline: Instant) {
        self.slots[kind.slot()] = Some(deadline);
    }

    /// Disarm `kind`; returns whether it was armed
    pub fn clear(&mut self, kind: TimerKind) -> bool {
        self.slots[kind.slot()].take().is_some()
    }

    /// Deadline of `kind`
    #[must_use]
    pub fn deadline(&self, kind: TimerKind) -> Option<Instant> {
        self.slots[kind.slot()]
    }

    /// Earliest armed deadline
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.slots.iter().flatten().min().copied()
    }

    /// Disarm and return every slot due at `now`, earliest first
    pub fn take_due(&mut self, now: Instant) -> Vec<TimerKind> {
        let mut due: Vec<(Instant, TimerKind)> = TimerKind::ALL
            .into_iter()
            .filter_map(|kind| {
                let deadline = self.slots[kind.slot()]?;
                (deadline <= now).then_some((deadline, kind))
            })
            .collect();
        due.sort_by_key(|(deadline, _)| *deadline);
        for (_, kind) in &due {
            self.slots[kind.slot()] = None;
        }
        due.into_iter().map(|(_, kind)| kind).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_set_replaces() {
        let now = Instant::now();
        let mut timers = TimerQueue::new();
        timers.set(TimerKind::Ambient, now + Duration::from_secs(5));
        timers.set(TimerKind::Ambient, now + Duration::from_secs(9));
        assert_eq!(
            timers.deadline(TimerKind::Ambient),
            Some(now + Duration::from_secs(9))
        );
        assert_eq!(timers.take_due(now + Duration::from_secs(6)), vec![]);
    }

    #[test]
    fn test_take_due_in_deadline_order() {
        let now = Instant::now();
        let mut timers = TimerQueue::new();
        timers.set(TimerKind::EmotionTick, now + Duration::from_secs(1));
        timers.set(TimerKind::Ambient, now + Duration::from_millis(500));
        timers.set(TimerKind::DeferredFlush, now + Duration::from_secs(30));

        assert_eq!(timers.next_deadline(), Some(now + Duration::from_millis(500)));
        assert_eq!(
            timers.take_due(now + Duration::from_secs(2)),
            vec![TimerKind::Ambient, TimerKind::EmotionTick]
        );
        assert_eq!(timers.deadline(TimerKind::Ambient), None);
        assert_eq!(
            timers.deadline(TimerKind::DeferredFlush),
            Some(now + Duration::from_secs(30))
        );
    }

    #[test]
    fn test_clear_reports_armed() {
        let mut timers = TimerQueue::new();
        assert!(!timers.clear(TimerKind::Ambient));
        timers.set(TimerKind::Ambient, Instant::now());
        assert!(timers.clear(TimerKind::Ambient));
    }
}
