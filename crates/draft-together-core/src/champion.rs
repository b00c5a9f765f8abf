// Champion catalog model: champion records, fixed-size slot lists, and the
// in-memory lookup table used to validate and resolve draft slots.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::draft::SLOTS_PER_LIST;

/// Riot's numeric champion key (e.g. 266 for Aatrox). Stable across game
/// patches, so it is safe to persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChampionId(pub i32);

impl fmt::Display for ChampionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for ChampionId {
    fn from(value: i32) -> Self {
        ChampionId(value)
    }
}

/// Lane a champion is commonly played in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChampionRole {
    Top,
    Jungle,
    Mid,
    Bot,
    Support,
}

impl ChampionRole {
    pub const ALL: [ChampionRole; 5] = [
        ChampionRole::Top,
        ChampionRole::Jungle,
        ChampionRole::Mid,
        ChampionRole::Bot,
        ChampionRole::Support,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChampionRole::Top => "TOP",
            ChampionRole::Jungle => "JUNGLE",
            ChampionRole::Mid => "MID",
            ChampionRole::Bot => "BOT",
            ChampionRole::Support => "SUPPORT",
        }
    }
}

impl fmt::Display for ChampionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A selectable champion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Champion {
    pub id: ChampionId,
    /// Data Dragon identifier (e.g. "MonkeyKing" for Wukong).
    pub riot_id: String,
    pub name: String,
    pub default_skin_image_path: String,
    pub centered_default_skin_image_path: String,
    /// Eligible roles, in TOP, JUNGLE, MID, BOT, SUPPORT order.
    #[serde(default)]
    pub positions: Vec<ChampionRole>,
}

/// Five slots of champion ids; `None` is an empty slot.
pub type ChampionIdsList = [Option<ChampionId>; SLOTS_PER_LIST];

/// Five slots of resolved champions; `None` is an empty slot.
pub type ChampionsList = [Option<Champion>; SLOTS_PER_LIST];

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Every champion known to the server, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    champions: HashMap<ChampionId, Champion>,
    version: Option<String>,
}

impl Catalog {
    pub fn new(champions: Vec<Champion>) -> Self {
        Catalog {
            champions: champions.into_iter().map(|c| (c.id, c)).collect(),
            version: None,
        }
    }

    /// Tag the catalog with the game data version it was built from.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn len(&self) -> usize {
        self.champions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.champions.is_empty()
    }

    pub fn get(&self, id: ChampionId) -> Option<&Champion> {
        self.champions.get(&id)
    }

    pub fn contains(&self, id: ChampionId) -> bool {
        self.champions.contains_key(&id)
    }

    pub fn by_riot_id(&self, riot_id: &str) -> Option<&Champion> {
        self.champions.values().find(|c| c.riot_id == riot_id)
    }

    /// All champions sorted by display name, the order the picker shows them.
    pub fn champions(&self) -> Vec<Champion> {
        let mut champions: Vec<Champion> = self.champions.values().cloned().collect();
        champions.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        champions
    }

    /// Resolve a list of ids into full champion records, slot for slot.
    /// Ids missing from the catalog resolve to an empty slot.
    pub fn resolve(&self, ids: &ChampionIdsList) -> ChampionsList {
        ids.map(|slot| slot.and_then(|id| self.get(id).cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn champion(id: i32, riot_id: &str, name: &str) -> Champion {
        Champion {
            id: ChampionId(id),
            riot_id: riot_id.to_string(),
            name: name.to_string(),
            default_skin_image_path: format!("{riot_id}.png"),
            centered_default_skin_image_path: format!("{riot_id}_0.jpg"),
            positions: vec![ChampionRole::Top],
        }
    }

    fn sample_catalog() -> Catalog {
        Catalog::new(vec![
            champion(266, "Aatrox", "Aatrox"),
            champion(62, "MonkeyKing", "Wukong"),
            champion(103, "Ahri", "Ahri"),
        ])
    }

    #[test]
    fn champion_json_shape() {
        let aatrox = champion(266, "Aatrox", "Aatrox");
        let value = serde_json::to_value(&aatrox).unwrap();
        assert_eq!(value["id"], 266);
        assert_eq!(value["riot_id"], "Aatrox");
        assert_eq!(value["positions"], serde_json::json!(["TOP"]));
    }

    #[test]
    fn roles_serialize_uppercase() {
        let json = serde_json::to_string(&ChampionRole::ALL).unwrap();
        assert_eq!(json, r#"["TOP","JUNGLE","MID","BOT","SUPPORT"]"#);
    }

    #[test]
    fn missing_positions_default_to_empty() {
        let json = r#"{
            "id": 1,
            "riot_id": "Annie",
            "name": "Annie",
            "default_skin_image_path": "Annie.png",
            "centered_default_skin_image_path": "Annie_0.jpg"
        }"#;
        let annie: Champion = serde_json::from_str(json).unwrap();
        assert!(annie.positions.is_empty());
    }

    #[test]
    fn all_absent_id_list_keeps_five_slots() {
        let list: ChampionIdsList = [None; SLOTS_PER_LIST];
        let json = serde_json::to_string(&list).unwrap();
        assert_eq!(json, "[null,null,null,null,null]");
        let back: ChampionIdsList = serde_json::from_str(&json).unwrap();
        assert_eq!(back, list);
    }

    #[test]
    fn all_present_id_list_keeps_order() {
        let list: ChampionIdsList = [1, 2, 3, 4, 5].map(|id| Some(ChampionId(id)));
        let json = serde_json::to_string(&list).unwrap();
        assert_eq!(json, "[1,2,3,4,5]");
        let back: ChampionIdsList = serde_json::from_str(&json).unwrap();
        assert_eq!(back, list);
    }

    #[test]
    fn id_list_with_wrong_arity_is_rejected() {
        assert!(serde_json::from_str::<ChampionIdsList>("[1,2,3,4]").is_err());
        assert!(serde_json::from_str::<ChampionIdsList>("[1,2,3,4,5,6]").is_err());
    }

    #[test]
    fn champions_list_round_trip() {
        let catalog = sample_catalog();
        let list: ChampionsList = [
            catalog.get(ChampionId(266)).cloned(),
            None,
            catalog.get(ChampionId(62)).cloned(),
            None,
            catalog.get(ChampionId(103)).cloned(),
        ];
        let json = serde_json::to_string(&list).unwrap();
        let back: ChampionsList = serde_json::from_str(&json).unwrap();
        assert_eq!(back, list);
    }

    #[test]
    fn catalog_lookups() {
        let catalog = sample_catalog();
        assert_eq!(catalog.len(), 3);
        assert!(catalog.contains(ChampionId(62)));
        assert!(!catalog.contains(ChampionId(999)));
        assert_eq!(catalog.by_riot_id("MonkeyKing").unwrap().name, "Wukong");
        assert!(catalog.by_riot_id("Wukong").is_none());
    }

    #[test]
    fn champions_sorted_by_name() {
        let names: Vec<String> = sample_catalog()
            .champions()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Aatrox", "Ahri", "Wukong"]);
    }

    #[test]
    fn resolve_keeps_slot_positions() {
        let catalog = sample_catalog();
        let ids = [
            None,
            Some(ChampionId(103)),
            Some(ChampionId(999)),
            None,
            Some(ChampionId(266)),
        ];
        let resolved = catalog.resolve(&ids);
        assert!(resolved[0].is_none());
        assert_eq!(resolved[1].as_ref().unwrap().riot_id, "Ahri");
        assert!(resolved[2].is_none(), "unknown ids resolve to an empty slot");
        assert!(resolved[3].is_none());
        assert_eq!(resolved[4].as_ref().unwrap().riot_id, "Aatrox");
    }

    #[test]
    fn version_tag() {
        let catalog = sample_catalog().with_version("14.20.1");
        assert_eq!(catalog.version(), Some("14.20.1"));
        assert!(Catalog::default().version().is_none());
    }
}
