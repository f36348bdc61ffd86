use std::fmt::{Display, Formatter};

/// Everything the classifier knows how to recognize in the game's HUD text.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventType {
    None,
    Assist,
    Knock,
    SquadWipe,
    GameStart,
    GameEnd,
    Victory,
}

impl EventType {
    pub const ALL: [EventType; 7] = [
        EventType::None,
        EventType::Assist,
        EventType::Knock,
        EventType::SquadWipe,
        EventType::GameStart,
        EventType::GameEnd,
        EventType::Victory,
    ];

    /// Map a user-facing name (CLI flag, config file) to an event type.
    ///
    /// Accepts both `kebab-case` and `snake_case`, ignoring ASCII case.
    /// Anything outside the known set maps to [`EventType::None`].
    pub fn from_name(name: &str) -> EventType {
        match name.trim().to_ascii_lowercase().as_str() {
            "assist" => EventType::Assist,
            "knock" => EventType::Knock,
            "squad-wipe" | "squad_wipe" => EventType::SquadWipe,
            "game-start" | "game_start" => EventType::GameStart,
            "game-end" | "game_end" => EventType::GameEnd,
            "victory" => EventType::Victory,
            _ => EventType::None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EventType::None => "none",
            EventType::Assist => "assist",
            EventType::Knock => "knock",
            EventType::SquadWipe => "squad-wipe",
            EventType::GameStart => "game-start",
            EventType::GameEnd => "game-end",
            EventType::Victory => "victory",
        }
    }
}

impl Display for EventType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One classified piece of on-screen text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameEvent {
    pub event_type: EventType,
    pub text: String,
}

impl GameEvent {
    pub fn new(event_type: EventType, text: impl Into<String>) -> Self {
        Self {
            event_type,
            text: text.into(),
        }
    }
}

impl Display for GameEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:?})", self.event_type, self.text)
    }
}

/// Substring rules, checked in order. Some HUD lines contain more than one
/// keyword, so the first rule to match decides the type.
const RULES: &[(&[&str], EventType)] = &[
    (&["ASSIST"], EventType::Assist),
    (&["KNOCKED DOWN", "RE-KNOCKED"], EventType::Knock),
    (&["SQUAD WIPE"], EventType::SquadWipe),
    (&["YOUR SQUAD"], EventType::GameStart),
    (&["SUMMARY"], EventType::GameEnd),
    (&["CHAMPION"], EventType::Victory),
];

/// Classify a single recognized fragment.
pub fn classify_fragment(text: &str) -> Option<GameEvent> {
    RULES
        .iter()
        .find(|(needles, _)| needles.iter().any(|needle| text.contains(needle)))
        .map(|(_, event_type)| GameEvent::new(*event_type, text))
}

/// Classify every fragment independently, keeping fragment order. Fragments
/// that match no rule produce nothing.
pub fn classify<S: AsRef<str>>(fragments: &[S]) -> Vec<GameEvent> {
    fragments
        .iter()
        .filter_map(|fragment| classify_fragment(fragment.as_ref()))
        .collect()
}
