// The three roster views mirrored from the game client.
//
// Each view is one `RosterKind`: it names the identity field, the fields
// whose change counts as an update, and how members map onto grid slots.

use serde::{Deserialize, Serialize};

use crate::member::MemberId;
use crate::roster::RosterKind;

/// Lane/role preference or assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Position {
    Top,
    Jungle,
    Middle,
    Bottom,
    Utility,
    Fill,
    #[default]
    Unselected,
}

impl Position {
    /// Grid column for an assigned lane. `Fill` and `Unselected` have none.
    pub fn lane_index(self) -> Option<usize> {
        match self {
            Position::Top => Some(0),
            Position::Jungle => Some(1),
            Position::Middle => Some(2),
            Position::Bottom => Some(3),
            Position::Utility => Some(4),
            Position::Fill | Position::Unselected => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Position::Top => "TOP",
            Position::Jungle => "JUNGLE",
            Position::Middle => "MIDDLE",
            Position::Bottom => "BOTTOM",
            Position::Utility => "UTILITY",
            Position::Fill => "FILL",
            Position::Unselected => "UNSELECTED",
        }
    }
}

impl From<String> for Position {
    fn from(raw: String) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "TOP" => Position::Top,
            "JUNGLE" => Position::Jungle,
            "MIDDLE" | "MID" => Position::Middle,
            "BOTTOM" | "BOT" | "ADC" => Position::Bottom,
            "UTILITY" | "SUPPORT" => Position::Utility,
            "FILL" => Position::Fill,
            _ => Position::Unselected,
        }
    }
}

impl From<Position> for String {
    fn from(position: Position) -> Self {
        position.as_str().to_string()
    }
}

// ---------------------------------------------------------------------------
// Lobby
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyMember {
    pub summoner_id: MemberId,
    /// Seat in the lobby grid. The game client reports members in seat
    /// order; the adapter fills this from the list index.
    #[serde(default)]
    pub slot: usize,
    #[serde(default)]
    pub first_position_preference: Position,
    #[serde(default)]
    pub second_position_preference: Position,
    #[serde(default)]
    pub is_leader: bool,
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub allowed_invite_others: bool,
}

/// The pre-queue party lobby (five seats).
pub struct Lobby;

impl RosterKind for Lobby {
    type Fields = LobbyMember;
    const LABEL: &'static str = "lobby";

    fn member_id(fields: &LobbyMember) -> MemberId {
        fields.summoner_id
    }

    fn is_updated(stored: &LobbyMember, observed: &LobbyMember) -> bool {
        stored.first_position_preference != observed.first_position_preference
            || stored.second_position_preference != observed.second_position_preference
            || stored.ready != observed.ready
            || stored.is_leader != observed.is_leader
            || stored.allowed_invite_others != observed.allowed_invite_others
    }

    fn slot(fields: &LobbyMember) -> Option<usize> {
        Some(fields.slot)
    }
}

// ---------------------------------------------------------------------------
// Champion select
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChampSelectMember {
    pub summoner_id: MemberId,
    /// Pick-order cell. Own team uses 0..=4 or 5..=9 depending on side.
    pub cell_id: u32,
    #[serde(default)]
    pub assigned_position: Position,
    /// Locked or hovered champion, 0 when none.
    #[serde(default)]
    pub champion_id: u32,
    #[serde(default)]
    pub champion_pick_intent: u32,
}

/// The own-team half of champion select.
pub struct ChampSelect;

impl RosterKind for ChampSelect {
    type Fields = ChampSelectMember;
    const LABEL: &'static str = "champ-select";

    fn member_id(fields: &ChampSelectMember) -> MemberId {
        fields.summoner_id
    }

    fn is_updated(stored: &ChampSelectMember, observed: &ChampSelectMember) -> bool {
        stored.champion_id != observed.champion_id
            || stored.champion_pick_intent != observed.champion_pick_intent
            || stored.assigned_position != observed.assigned_position
    }

    fn slot(fields: &ChampSelectMember) -> Option<usize> {
        Some(fields.cell_id as usize % 5)
    }
}

// ---------------------------------------------------------------------------
// Pre-game (loading screen, both teams)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Team {
    #[serde(alias = "ORDER", alias = "BLUE")]
    Blue,
    #[serde(alias = "CHAOS", alias = "RED")]
    Red,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreGameMember {
    pub summoner_id: MemberId,
    pub team: Team,
    /// Seat within the team, 0..=4.
    pub team_slot: usize,
    #[serde(default)]
    pub champion_id: u32,
    #[serde(default)]
    pub selected_position: Position,
}

/// All ten players once the game has been found.
pub struct PreGame;

impl RosterKind for PreGame {
    type Fields = PreGameMember;
    const LABEL: &'static str = "pre-game";

    fn member_id(fields: &PreGameMember) -> MemberId {
        fields.summoner_id
    }

    fn is_updated(stored: &PreGameMember, observed: &PreGameMember) -> bool {
        stored.champion_id != observed.champion_id
            || stored.team != observed.team
            || stored.team_slot != observed.team_slot
    }

    fn slot(fields: &PreGameMember) -> Option<usize> {
        if fields.team_slot >= 5 {
            return None;
        }
        let offset = match fields.team {
            Team::Blue => 0,
            Team::Red => 5,
        };
        Some(offset + fields.team_slot)
    }
}
