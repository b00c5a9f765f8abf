// Draft model: slot addressing, position keys, and the pick/ban state.

pub mod position;
pub mod state;

use thiserror::Error;

use crate::champion::ChampionId;

pub use position::{derive_position_key, PositionKey, Selection, SlotIndex, SlotKind, Team};
pub use state::{Draft, DraftId, DraftUpdate};

/// Number of slots in every pick or ban list.
pub const SLOTS_PER_LIST: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DraftError {
    #[error("slot index {index} is out of range, expected 0..{SLOTS_PER_LIST}")]
    SlotOutOfRange { index: usize },

    #[error("invalid position key: {0:?}")]
    InvalidPositionKey(String),

    #[error("champion {champion_id} is already placed at {position}")]
    ChampionAlreadyUsed {
        champion_id: ChampionId,
        position: PositionKey,
    },

    #[error("unknown champion id {0}")]
    UnknownChampion(ChampionId),
}
