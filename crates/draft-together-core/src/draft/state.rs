// Draft state: the four slot lists of a pick/ban session and the updates
// applied to them.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::position::{PositionKey, Selection, SlotKind, Team};
use super::{DraftError, SLOTS_PER_LIST};
use crate::champion::{ChampionId, ChampionIdsList};

/// Identifier of a shared draft, chosen by the client that opens it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DraftId(pub Uuid);

impl DraftId {
    pub fn new_random() -> Self {
        DraftId(Uuid::new_v4())
    }
}

impl fmt::Display for DraftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for DraftId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(DraftId)
    }
}

/// A participant placing a champion in a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftUpdate {
    pub champion_id: ChampionId,
    pub position: PositionKey,
}

impl DraftUpdate {
    pub fn new(champion_id: ChampionId, position: PositionKey) -> Self {
        DraftUpdate {
            champion_id,
            position,
        }
    }
}

/// Picks and bans of both teams. Each list has exactly five slots, in pick
/// order.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    pub blue_champions: ChampionIdsList,
    pub red_champions: ChampionIdsList,
    pub blue_bans: ChampionIdsList,
    pub red_bans: ChampionIdsList,
}

impl Draft {
    pub fn slots(&self, team: Team, kind: SlotKind) -> &ChampionIdsList {
        match (team, kind) {
            (Team::Blue, SlotKind::Pick) => &self.blue_champions,
            (Team::Red, SlotKind::Pick) => &self.red_champions,
            (Team::Blue, SlotKind::Ban) => &self.blue_bans,
            (Team::Red, SlotKind::Ban) => &self.red_bans,
        }
    }

    fn slots_mut(&mut self, team: Team, kind: SlotKind) -> &mut ChampionIdsList {
        match (team, kind) {
            (Team::Blue, SlotKind::Pick) => &mut self.blue_champions,
            (Team::Red, SlotKind::Pick) => &mut self.red_champions,
            (Team::Blue, SlotKind::Ban) => &mut self.blue_bans,
            (Team::Red, SlotKind::Ban) => &mut self.red_bans,
        }
    }

    pub fn slot(&self, selection: Selection) -> Option<ChampionId> {
        self.slots(selection.team, selection.kind())[selection.index.get()]
    }

    pub fn get(&self, position: PositionKey) -> Option<ChampionId> {
        self.slot(position.selection())
    }

    /// Every filled slot with its key, in [`PositionKey::all`] order.
    pub fn filled(&self) -> impl Iterator<Item = (PositionKey, ChampionId)> + '_ {
        PositionKey::all().filter_map(move |key| self.get(key).map(|id| (key, id)))
    }

    pub fn position_of(&self, champion_id: ChampionId) -> Option<PositionKey> {
        self.filled()
            .find(|(_, id)| *id == champion_id)
            .map(|(key, _)| key)
    }

    pub fn contains(&self, champion_id: ChampionId) -> bool {
        self.position_of(champion_id).is_some()
    }

    pub fn filled_count(&self) -> usize {
        self.filled().count()
    }

    /// True once all ten picks and ten bans are filled.
    pub fn is_complete(&self) -> bool {
        self.filled_count() == 4 * SLOTS_PER_LIST
    }

    /// Place a champion in the addressed slot, replacing whatever was there.
    ///
    /// A champion may appear at most once per draft: placing one that already
    /// sits in a different slot fails with [`DraftError::ChampionAlreadyUsed`].
    /// Re-placing it in its current slot is a no-op.
    pub fn apply(&mut self, update: &DraftUpdate) -> Result<(), DraftError> {
        if let Some(existing) = self.position_of(update.champion_id) {
            if existing != update.position {
                return Err(DraftError::ChampionAlreadyUsed {
                    champion_id: update.champion_id,
                    position: existing,
                });
            }
            return Ok(());
        }

        let position = update.position;
        self.slots_mut(position.team(), position.kind())[position.slot().get()] =
            Some(update.champion_id);
        Ok(())
    }

    /// Empty a slot, returning the champion it held.
    pub fn clear(&mut self, selection: Selection) -> Option<ChampionId> {
        self.slots_mut(selection.team, selection.kind())[selection.index.get()].take()
    }

    /// Champions that occupy more than one slot. Always empty for drafts
    /// built through [`Draft::apply`]; used to sanity-check restored data.
    pub fn duplicate_champions(&self) -> Vec<ChampionId> {
        let mut seen: HashMap<ChampionId, usize> = HashMap::new();
        for (_, id) in self.filled() {
            *seen.entry(id).or_default() += 1;
        }
        let mut duplicates: Vec<ChampionId> = seen
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(id, _)| id)
            .collect();
        duplicates.sort();
        duplicates
    }

    pub fn display(&self) -> String {
        format!(
            "Blue bans: {}\nRed bans: {}\nBlue picks: {}\nRed picks: {}",
            format_list(&self.blue_bans),
            format_list(&self.red_bans),
            format_list(&self.blue_champions),
            format_list(&self.red_champions),
        )
    }
}

fn format_list(list: &ChampionIdsList) -> String {
    list.iter()
        .map(|slot| match slot {
            Some(id) => id.to_string(),
            None => "-".to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
