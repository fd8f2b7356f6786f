//! Heater events exchanged between models.

use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;

use super::time::SimTime;

/// Type tag of an event, used as the key of routing tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    SwitchOn,
    SwitchOff,
    Heat,
    DoNotHeat,
    SetPower,
}

impl EventType {
    /// Every heater event type, in declaration order.
    pub const ALL: [EventType; 5] = [
        EventType::SwitchOn,
        EventType::SwitchOff,
        EventType::Heat,
        EventType::DoNotHeat,
        EventType::SetPower,
    ];

    /// Rank among simultaneous events; higher ranks are applied later and prevail.
    fn precedence(self) -> u8 {
        match self {
            EventType::SwitchOn => 0,
            EventType::Heat => 1,
            EventType::SetPower => 2,
            EventType::DoNotHeat => 3,
            EventType::SwitchOff => 4,
        }
    }

    /// Returns `true` when `self` must be applied after `other` if both are
    /// due at the same simulated instant.
    ///
    /// A switch-off claims precedence over every other heater event, so a
    /// concurrent set-power can never leave the heater drawing power.
    ///
    /// # Examples
    ///
    /// ```
    /// use appliance_sil::sim::event::EventType;
    ///
    /// assert!(EventType::SwitchOff.has_priority_over(EventType::SetPower));
    /// assert!(!EventType::SetPower.has_priority_over(EventType::SwitchOff));
    /// ```
    pub fn has_priority_over(self, other: EventType) -> bool {
        self.precedence() > other.precedence()
    }

    /// Returns `true` for types whose events carry a payload.
    pub fn carries_payload(self) -> bool {
        matches!(self, EventType::SetPower)
    }

    /// Returns `true` when events of type `self` can be delivered as `to`.
    pub fn can_retag_as(self, to: EventType) -> bool {
        self == to || (!self.carries_payload() && !to.carries_payload())
    }

    /// Parses a name produced by [`EventType::name`].
    pub fn from_name(name: &str) -> Option<EventType> {
        EventType::ALL.into_iter().find(|t| t.name() == name)
    }

    /// Stable name used in logs and configuration.
    pub fn name(self) -> &'static str {
        match self {
            EventType::SwitchOn => "switch_on",
            EventType::SwitchOff => "switch_off",
            EventType::Heat => "heat",
            EventType::DoNotHeat => "do_not_heat",
            EventType::SetPower => "set_power",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Event payload: what happened to the heater.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    SwitchOn,
    SwitchOff,
    Heat,
    DoNotHeat,
    SetPower { power_w: f64 },
}

impl EventKind {
    /// Returns the routing tag of this payload.
    pub fn event_type(&self) -> EventType {
        match self {
            EventKind::SwitchOn => EventType::SwitchOn,
            EventKind::SwitchOff => EventType::SwitchOff,
            EventKind::Heat => EventType::Heat,
            EventKind::DoNotHeat => EventType::DoNotHeat,
            EventKind::SetPower { .. } => EventType::SetPower,
        }
    }

    /// Re-expresses this payload as an event of type `to`, as a routing
    /// table entry with differing source and sink types requires.
    ///
    /// Returns `None` when the payload cannot be carried over.
    pub fn retag(self, to: EventType) -> Option<EventKind> {
        if self.event_type() == to {
            return Some(self);
        }
        if !self.event_type().can_retag_as(to) {
            return None;
        }
        match to {
            EventType::SwitchOn => Some(EventKind::SwitchOn),
            EventType::SwitchOff => Some(EventKind::SwitchOff),
            EventType::Heat => Some(EventKind::Heat),
            EventType::DoNotHeat => Some(EventKind::DoNotHeat),
            EventType::SetPower => None,
        }
    }
}

/// An immutable, timestamped event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Event {
    time: SimTime,
    kind: EventKind,
}

impl Event {
    /// Creates an event occurring at `time`.
    pub fn new(time: SimTime, kind: EventKind) -> Self {
        Self { time, kind }
    }

    /// Time of occurrence.
    pub fn time(&self) -> SimTime {
        self.time
    }

    /// Payload.
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Routing tag.
    pub fn event_type(&self) -> EventType {
        self.kind.event_type()
    }

    /// Returns the same occurrence re-expressed as type `to`.
    pub fn retagged(&self, to: EventType) -> Option<Event> {
        self.kind.retag(to).map(|kind| Event::new(self.time, kind))
    }

    /// Orders two events for delivery: earlier first, then by the priority
    /// rule. Events of the same type at the same instant compare equal and
    /// are left to the submission order of the receiving mailbox.
    pub fn dispatch_order(&self, other: &Event) -> Ordering {
        self.time.cmp(&other.time).then_with(|| {
            self.event_type()
                .precedence()
                .cmp(&other.event_type().precedence())
        })
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            EventKind::SetPower { power_w } => {
                write!(f, "{}({power_w} W) @ {}", self.event_type(), self.time)
            }
            _ => write!(f, "{} @ {}", self.event_type(), self.time),
        }
    }
}
