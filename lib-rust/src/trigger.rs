use crate::events::{EventType, GameEvent};
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

/// The event types that should save a replay or mark a highlight.
///
/// `EventType::None` is never a member; it is what unknown names map to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TriggerSet {
    types: BTreeSet<EventType>,
}

impl TriggerSet {
    pub fn new<I: IntoIterator<Item = EventType>>(types: I) -> Self {
        Self {
            types: types
                .into_iter()
                .filter(|t| *t != EventType::None)
                .collect(),
        }
    }

    /// Build from user-facing names, skipping (and logging) unknown ones.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut types = BTreeSet::new();
        for name in names {
            match EventType::from_name(name.as_ref()) {
                EventType::None => log::warn!("ignoring unknown trigger {:?}", name.as_ref()),
                event_type => {
                    types.insert(event_type);
                }
            }
        }
        Self { types }
    }

    pub fn contains(&self, event_type: EventType) -> bool {
        self.types.contains(&event_type)
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// The first event whose type is in the set, if any.
    pub fn first_match<'a>(&self, events: &'a [GameEvent]) -> Option<&'a GameEvent> {
        events.iter().find(|e| self.contains(e.event_type))
    }
}

impl Display for TriggerSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.types.iter().map(|t| t.name()).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_names_are_dropped() {
        let triggers = TriggerSet::from_names(["knock", "squad-wipe", "bogus"]);
        assert!(triggers.contains(EventType::Knock));
        assert!(triggers.contains(EventType::SquadWipe));
        assert!(!triggers.contains(EventType::None));
        assert_eq!(triggers.to_string(), "[knock, squad-wipe]");
    }

    #[test]
    fn none_is_never_a_member() {
        let triggers = TriggerSet::new([EventType::None]);
        assert!(triggers.is_empty());
    }

    #[test]
    fn first_match_checks_every_event() {
        let triggers = TriggerSet::new([EventType::Victory]);
        let events = vec![
            GameEvent::new(EventType::Assist, "ASSIST"),
            GameEvent::new(EventType::Victory, "CHAMPION"),
        ];
        assert_eq!(triggers.first_match(&events).unwrap().text, "CHAMPION");
        assert!(TriggerSet::default().first_match(&events).is_none());
    }
}
