// Slot addressing: teams, slot indices, selections and position keys.

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use super::{DraftError, SLOTS_PER_LIST};

// ---------------------------------------------------------------------------
// Team
// ---------------------------------------------------------------------------

/// One of the two sides of a draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Team {
    Blue,
    Red,
}

impl Team {
    pub const ALL: [Team; 2] = [Team::Blue, Team::Red];

    /// The name used as the prefix of every position key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Team::Blue => "Blue",
            Team::Red => "Red",
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Slot index / kind
// ---------------------------------------------------------------------------

/// Zero-based slot index, guaranteed to lie in `0..SLOTS_PER_LIST`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct SlotIndex(u8);

impl SlotIndex {
    pub fn new(index: usize) -> Result<Self, DraftError> {
        if index < SLOTS_PER_LIST {
            Ok(SlotIndex(index as u8))
        } else {
            Err(DraftError::SlotOutOfRange { index })
        }
    }

    /// Every valid index in slot order.
    pub fn all() -> impl Iterator<Item = SlotIndex> {
        (0..SLOTS_PER_LIST as u8).map(SlotIndex)
    }

    pub fn get(&self) -> usize {
        self.0 as usize
    }

    /// One-based index as it appears in position keys (`1..=5`).
    pub fn server_index(&self) -> u8 {
        self.0 + 1
    }
}

impl TryFrom<usize> for SlotIndex {
    type Error = DraftError;

    fn try_from(index: usize) -> Result<Self, Self::Error> {
        SlotIndex::new(index)
    }
}

impl From<SlotIndex> for usize {
    fn from(index: SlotIndex) -> Self {
        index.get()
    }
}

/// Whether a slot belongs to the pick list or the ban list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotKind {
    Pick,
    Ban,
}

impl SlotKind {
    pub fn from_is_ban(is_ban: bool) -> Self {
        if is_ban {
            SlotKind::Ban
        } else {
            SlotKind::Pick
        }
    }

    pub fn is_ban(&self) -> bool {
        matches!(self, SlotKind::Ban)
    }
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Locator for the slot a participant is acting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selection {
    pub team: Team,
    #[serde(default)]
    pub is_ban: bool,
    pub index: SlotIndex,
}

impl Selection {
    pub fn new(team: Team, is_ban: bool, index: usize) -> Result<Self, DraftError> {
        Ok(Selection {
            team,
            is_ban,
            index: SlotIndex::new(index)?,
        })
    }

    pub fn kind(&self) -> SlotKind {
        SlotKind::from_is_ban(self.is_ban)
    }

    pub fn position_key(&self) -> PositionKey {
        PositionKey {
            team: self.team,
            kind: self.kind(),
            slot: self.index,
        }
    }
}

// ---------------------------------------------------------------------------
// Position key
// ---------------------------------------------------------------------------

/// Canonical identifier of one of the twenty draft slots.
///
/// Renders as the team name, then `Ban` for ban slots, then the one-based
/// slot number: `Blue1`, `Red5`, `BlueBan3`, `RedBan1`. On the wire it is
/// always that string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PositionKey {
    team: Team,
    kind: SlotKind,
    slot: SlotIndex,
}

impl PositionKey {
    /// Derive the key for `(team, index, is_ban)`. `index` is zero-based and
    /// must be below [`SLOTS_PER_LIST`].
    pub fn derive(team: Team, index: usize, is_ban: bool) -> Result<Self, DraftError> {
        Ok(PositionKey {
            team,
            kind: SlotKind::from_is_ban(is_ban),
            slot: SlotIndex::new(index)?,
        })
    }

    /// Key of a pick slot (`is_ban` defaulted to false).
    pub fn pick(team: Team, index: usize) -> Result<Self, DraftError> {
        Self::derive(team, index, false)
    }

    pub fn ban(team: Team, index: usize) -> Result<Self, DraftError> {
        Self::derive(team, index, true)
    }

    /// All twenty keys: blue picks, red picks, blue bans, red bans.
    pub fn all() -> impl Iterator<Item = PositionKey> {
        [SlotKind::Pick, SlotKind::Ban].into_iter().flat_map(|kind| {
            Team::ALL.into_iter().flat_map(move |team| {
                SlotIndex::all().map(move |slot| PositionKey { team, kind, slot })
            })
        })
    }

    pub fn team(&self) -> Team {
        self.team
    }

    pub fn kind(&self) -> SlotKind {
        self.kind
    }

    pub fn slot(&self) -> SlotIndex {
        self.slot
    }

    pub fn is_ban(&self) -> bool {
        self.kind.is_ban()
    }

    pub fn selection(&self) -> Selection {
        Selection {
            team: self.team,
            is_ban: self.is_ban(),
            index: self.slot,
        }
    }
}

/// String form of [`PositionKey::derive`].
pub fn derive_position_key(team: Team, index: usize, is_ban: bool) -> Result<String, DraftError> {
    PositionKey::derive(team, index, is_ban).map(|key| key.to_string())
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fragment = if self.is_ban() { "Ban" } else { "" };
        write!(f, "{}{}{}", self.team, fragment, self.slot.server_index())
    }
}

impl FromStr for PositionKey {
    type Err = DraftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DraftError::InvalidPositionKey(s.to_string());

        let (team, rest) = Team::ALL
            .into_iter()
            .find_map(|team| s.strip_prefix(team.as_str()).map(|rest| (team, rest)))
            .ok_or_else(invalid)?;

        let (is_ban, digits) = match rest.strip_prefix("Ban") {
            Some(digits) => (true, digits),
            None => (false, rest),
        };

        let server_index = match digits.as_bytes() {
            [d @ b'1'..=b'9'] => (d - b'0') as usize,
            _ => return Err(invalid()),
        };

        PositionKey::derive(team, server_index - 1, is_ban).map_err(|_| invalid())
    }
}

impl Serialize for PositionKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PositionKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}
