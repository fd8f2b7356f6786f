//! Per-model event queues.

use std::cmp::Ordering;
use std::collections::VecDeque;

use super::event::Event;
use super::time::SimTime;

/// An ordered event buffer.
///
/// Events are kept in delivery order: by time, then by the priority rule,
/// then by submission order for events of the same type. Every atomic model
/// owns one as its inbox, drained one event per external transition.
#[derive(Debug, Clone, Default)]
pub struct Mailbox {
    queue: VecDeque<(Event, u64)>,
    next_seq: u64,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers `event` at its delivery position.
    pub fn push(&mut self, event: Event) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let idx = self.queue.partition_point(|(queued, queued_seq)| {
            match queued.dispatch_order(&event) {
                Ordering::Less => true,
                Ordering::Equal => *queued_seq < seq,
                Ordering::Greater => false,
            }
        });
        self.queue.insert(idx, (event, seq));
    }

    /// Removes the next event if it is due at or before `now`.
    pub fn pop_due(&mut self, now: SimTime) -> Option<Event> {
        match self.queue.front() {
            Some((event, _)) if event.time() <= now => self.queue.pop_front().map(|(e, _)| e),
            _ => None,
        }
    }

    /// Time of the next buffered event.
    pub fn next_time(&self) -> Option<SimTime> {
        self.queue.front().map(|(e, _)| e.time())
    }

    /// Returns `true` when an event is due at or before `now`.
    pub fn has_due(&self, now: SimTime) -> bool {
        self.next_time().is_some_and(|t| t <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::event::{EventKind, EventType};

    fn due_events(mbox: &mut Mailbox, now: SimTime) -> Vec<Event> {
        std::iter::from_fn(|| mbox.pop_due(now)).collect()
    }

    #[test]
    fn priority_holder_is_delivered_last_regardless_of_submission() {
        let t = SimTime::from_hours(1.0);
        let mut a = Mailbox::new();
        a.push(Event::new(t, EventKind::SwitchOff));
        a.push(Event::new(t, EventKind::SetPower { power_w: 100.0 }));

        let mut b = Mailbox::new();
        b.push(Event::new(t, EventKind::SetPower { power_w: 100.0 }));
        b.push(Event::new(t, EventKind::SwitchOff));

        for mut mbox in [a, b] {
            let order: Vec<EventType> = due_events(&mut mbox, t).iter().map(Event::event_type).collect();
            assert_eq!(order, vec![EventType::SetPower, EventType::SwitchOff]);
        }
    }

    #[test]
    fn same_type_keeps_submission_order() {
        let t = SimTime::from_hours(1.0);
        let mut mbox = Mailbox::new();
        mbox.push(Event::new(t, EventKind::SetPower { power_w: 1.0 }));
        mbox.push(Event::new(t, EventKind::SetPower { power_w: 2.0 }));
        let kinds: Vec<EventKind> = due_events(&mut mbox, t).iter().map(Event::kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::SetPower { power_w: 1.0 },
                EventKind::SetPower { power_w: 2.0 }
            ]
        );
    }

    #[test]
    fn pop_due_respects_time() {
        let mut mbox = Mailbox::new();
        mbox.push(Event::new(SimTime::from_hours(2.0), EventKind::SwitchOn));
        assert!(mbox.pop_due(SimTime::from_hours(1.0)).is_none());
        assert!(!mbox.has_due(SimTime::from_hours(1.0)));
        assert_eq!(mbox.next_time(), Some(SimTime::from_hours(2.0)));
        assert!(mbox.pop_due(SimTime::from_hours(2.0)).is_some());
        assert_eq!(mbox.next_time(), None);
    }
}
