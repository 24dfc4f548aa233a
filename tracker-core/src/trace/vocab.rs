//! Known xAPI vocabulary
//!
//! Lookups are case-sensitive on the lowercase term; callers lowercase known
//! verbs on construction. Anything not listed here is passed through as the
//! literal string (or rejected under strict mode by the JSON/xAPI writers).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Verbs with a canonical xAPI URI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Initialized,
    Progressed,
    Completed,
    Accessed,
    Skipped,
    Selected,
    Unlocked,
    Interacted,
    Used,
}

impl Verb {
    pub const ALL: [Verb; 9] = [
        Verb::Initialized,
        Verb::Progressed,
        Verb::Completed,
        Verb::Accessed,
        Verb::Skipped,
        Verb::Selected,
        Verb::Unlocked,
        Verb::Interacted,
        Verb::Used,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Initialized => "initialized",
            Verb::Progressed => "progressed",
            Verb::Completed => "completed",
            Verb::Accessed => "accessed",
            Verb::Skipped => "skipped",
            Verb::Selected => "selected",
            Verb::Unlocked => "unlocked",
            Verb::Interacted => "interacted",
            Verb::Used => "used",
        }
    }

    pub fn uri(&self) -> &'static str {
        match self {
            Verb::Initialized => "http://adlnet.gov/expapi/verbs/initialized",
            Verb::Progressed => "http://adlnet.gov/expapi/verbs/progressed",
            Verb::Completed => "http://adlnet.gov/expapi/verbs/completed",
            Verb::Accessed => "https://w3id.org/xapi/seriousgames/verbs/accessed",
            Verb::Skipped => "http://id.tincanapi.com/verb/skipped",
            Verb::Selected => "https://w3id.org/xapi/adb/verbs/selected",
            Verb::Unlocked => "https://w3id.org/xapi/seriousgames/verbs/unlocked",
            Verb::Interacted => "http://adlnet.gov/expapi/verbs/interacted",
            Verb::Used => "https://w3id.org/xapi/seriousgames/verbs/used",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = ();

    /// Case-insensitive parse
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Verb::ALL
            .iter()
            .copied()
            .find(|v| v.as_str().eq_ignore_ascii_case(s))
            .ok_or(())
    }
}

/// Target types grouped by the sub-tracker that emits them
const TARGET_TYPES: &[(&str, &str)] = &[
    // completable
    ("game", "https://w3id.org/xapi/seriousgames/activity-types/serious-game"),
    ("session", "https://w3id.org/xapi/seriousgames/activity-types/session"),
    ("level", "https://w3id.org/xapi/seriousgames/activity-types/level"),
    ("quest", "https://w3id.org/xapi/seriousgames/activity-types/quest"),
    ("stage", "https://w3id.org/xapi/seriousgames/activity-types/stage"),
    ("combat", "https://w3id.org/xapi/seriousgames/activity-types/combat"),
    ("storynode", "https://w3id.org/xapi/seriousgames/activity-types/story-node"),
    ("race", "https://w3id.org/xapi/seriousgames/activity-types/race"),
    ("completable", "https://w3id.org/xapi/seriousgames/activity-types/completable"),
    // accessible
    ("screen", "https://w3id.org/xapi/seriousgames/activity-types/screen"),
    ("area", "https://w3id.org/xapi/seriousgames/activity-types/area"),
    ("zone", "https://w3id.org/xapi/seriousgames/activity-types/zone"),
    ("cutscene", "https://w3id.org/xapi/seriousgames/activity-types/cutscene"),
    ("accessible", "https://w3id.org/xapi/seriousgames/activity-types/accessible"),
    // alternative
    ("question", "http://adlnet.gov/expapi/activities/question"),
    ("menu", "https://w3id.org/xapi/seriousgames/activity-types/menu"),
    ("dialog", "https://w3id.org/xapi/seriousgames/activity-types/dialog-tree"),
    ("path", "https://w3id.org/xapi/seriousgames/activity-types/path"),
    ("arena", "https://w3id.org/xapi/seriousgames/activity-types/arena"),
    ("alternative", "https://w3id.org/xapi/seriousgames/activity-types/alternative"),
    // game objects
    ("enemy", "https://w3id.org/xapi/seriousgames/activity-types/enemy"),
    ("npc", "https://w3id.org/xapi/seriousgames/activity-types/non-player-character"),
    ("item", "https://w3id.org/xapi/seriousgames/activity-types/item"),
    ("gameobject", "https://w3id.org/xapi/seriousgames/activity-types/game-object"),
];

const EXTENSIONS: &[(&str, &str)] = &[
    ("health", "https://w3id.org/xapi/seriousgames/extensions/health"),
    ("position", "https://w3id.org/xapi/seriousgames/extensions/position"),
    ("progress", "https://w3id.org/xapi/seriousgames/extensions/progress"),
];

/// Canonical URI for a target type, if known
pub fn target_type_uri(kind: &str) -> Option<&'static str> {
    lookup(TARGET_TYPES, kind)
}

/// Canonical URI for an extension key, if known
pub fn extension_uri(key: &str) -> Option<&'static str> {
    lookup(EXTENSIONS, key)
}

/// Canonical URI for a verb string, if known
pub fn verb_uri(verb: &str) -> Option<&'static str> {
    verb.parse::<Verb>().ok().map(|v| v.uri())
}

fn lookup(table: &[(&str, &'static str)], key: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, uri)| *uri)
}

/// Extension keys that map onto dedicated result fields
pub mod keys {
    pub const SCORE: &str = "score";
    pub const SUCCESS: &str = "success";
    pub const RESPONSE: &str = "response";
    pub const COMPLETION: &str = "completion";
    pub const HEALTH: &str = "health";
    pub const POSITION: &str = "position";
    pub const PROGRESS: &str = "progress";
}
