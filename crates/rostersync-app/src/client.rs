// HTTP adapter for the game client's local API.
//
// Implements every source trait the engine consumes. Raw responses are
// decoded into small wire structs and mapped onto the core types, so the
// engine never sees the client's JSON shapes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use rostersync_core::config::Config;
use rostersync_core::kinds::{ChampSelectMember, LobbyMember, PreGameMember, Team};
use rostersync_core::member::{MatchHistory, MatchSummary, MemberId, Profile, RankedStats};
use rostersync_core::source::{
    MatchHistorySource, ProfileSource, RosterSource, SessionSource, StatsSource,
};
use rostersync_core::SourceError;

// ---------------------------------------------------------------------------
// Endpoints
// ---------------------------------------------------------------------------

const GAMEFLOW_PHASE: &str = "/lol-gameflow/v1/gameflow-phase";
const GAMEFLOW_SESSION: &str = "/lol-gameflow/v1/session";
const LOBBY_MEMBERS: &str = "/lol-lobby/v2/lobby/members";
const CHAMP_SELECT_SESSION: &str = "/lol-champ-select/v1/session";
const SOLO_QUEUE: &str = "RANKED_SOLO_5x5";
const HISTORY_GAMES: usize = 10;

/// Basic-auth user name the client expects alongside its token.
const AUTH_USER: &str = "riot";

// ---------------------------------------------------------------------------
// GameClient
// ---------------------------------------------------------------------------

pub struct GameClient {
    http: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
    timeout: Duration,
}

impl GameClient {
    pub fn new(
        base_url: impl Into<String>,
        auth_token: Option<String>,
        timeout: Duration,
        accept_invalid_certs: bool,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token,
            timeout,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        Self::new(
            config.client.base_url.clone(),
            config.credentials.auth_token.clone(),
            config.request_timeout(),
            config.client.accept_invalid_certs,
        )
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SourceError> {
        let mut request = self.http.get(self.url(path));
        if let Some(token) = &self.auth_token {
            request = request.basic_auth(AUTH_USER, Some(token));
        }

        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            return Err(SourceError::InvalidResponse(format!(
                "{path} returned status {status}"
            )));
        }

        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        serde_json::from_str(&body)
            .map_err(|e| SourceError::InvalidResponse(format!("{path}: {e}")))
    }

    /// Roster endpoints answer 404 when the session has ended; that is an
    /// empty roster, not a failure.
    async fn get_roster<T: DeserializeOwned + Default>(&self, path: &str) -> Result<T, SourceError> {
        match self.get_json(path).await {
            Err(SourceError::NotFound(_)) => {
                debug!(path, "no active session");
                Ok(T::default())
            }
            other => other,
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> SourceError {
        if e.is_timeout() {
            SourceError::Timeout(self.timeout)
        } else if e.is_connect() {
            SourceError::Unreachable(e.to_string())
        } else {
            SourceError::InvalidResponse(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChampSelectSession {
    #[serde(default)]
    pub my_team: Vec<ChampSelectMember>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GameflowSession {
    #[serde(default)]
    pub game_data: GameData,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GameData {
    #[serde(default)]
    pub team_one: Vec<GameflowPlayer>,
    #[serde(default)]
    pub team_two: Vec<GameflowPlayer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GameflowPlayer {
    /// Bots and hidden players come through without one.
    #[serde(default)]
    pub summoner_id: Option<MemberId>,
    #[serde(default)]
    pub champion_id: u32,
    #[serde(default)]
    pub selected_position: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SummonerDto {
    pub puuid: String,
    #[serde(default)]
    pub game_name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub summoner_level: u32,
    #[serde(default)]
    pub profile_icon_id: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RankedStatsDto {
    #[serde(default)]
    pub queue_map: std::collections::HashMap<String, QueueEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QueueEntry {
    #[serde(default)]
    pub tier: String,
    #[serde(default)]
    pub division: String,
    #[serde(default)]
    pub league_points: u32,
    #[serde(default)]
    pub wins: u32,
    #[serde(default)]
    pub losses: u32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MatchHistoryDto {
    #[serde(default)]
    pub games: GamesPage,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct GamesPage {
    #[serde(default)]
    pub games: Vec<GameDto>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GameDto {
    #[serde(default)]
    pub participants: Vec<ParticipantDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ParticipantDto {
    pub champion_id: u32,
    pub stats: ParticipantStats,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ParticipantStats {
    pub win: bool,
    #[serde(default)]
    pub kills: u32,
    #[serde(default)]
    pub deaths: u32,
    #[serde(default)]
    pub assists: u32,
}

// ---------------------------------------------------------------------------
// Mapping
// ---------------------------------------------------------------------------

/// Lobby members arrive in seat order; the seat is their list index.
pub(crate) fn lobby_roster(mut members: Vec<LobbyMember>) -> Vec<LobbyMember> {
    for (slot, member) in members.iter_mut().enumerate() {
        member.slot = slot;
    }
    members
}

pub(crate) fn pre_game_roster(session: GameflowSession) -> Vec<PreGameMember> {
    let GameData { team_one, team_two } = session.game_data;
    let seat = |team: Team| {
        move |(team_slot, player): (usize, GameflowPlayer)| {
            player.summoner_id.map(|summoner_id| PreGameMember {
                summoner_id,
                team,
                team_slot,
                champion_id: player.champion_id,
                selected_position: player.selected_position.unwrap_or_default().into(),
            })
        }
    };
    team_one
        .into_iter()
        .enumerate()
        .filter_map(seat(Team::Blue))
        .chain(team_two.into_iter().enumerate().filter_map(seat(Team::Red)))
        .collect()
}

pub(crate) fn profile_from(dto: SummonerDto) -> Profile {
    let display_name = if dto.game_name.is_empty() {
        dto.display_name
    } else {
        dto.game_name
    };
    Profile {
        player_key: dto.puuid,
        display_name,
        level: dto.summoner_level,
        profile_icon_id: dto.profile_icon_id,
    }
}

/// Solo-queue standing; an unranked player has an `UNRANKED` tier.
pub(crate) fn ranked_from(mut dto: RankedStatsDto) -> RankedStats {
    match dto.queue_map.remove(SOLO_QUEUE) {
        Some(entry) if !entry.tier.is_empty() => RankedStats {
            tier: entry.tier,
            division: entry.division,
            league_points: entry.league_points,
            wins: entry.wins,
            losses: entry.losses,
        },
        _ => RankedStats {
            tier: "UNRANKED".into(),
            division: String::new(),
            league_points: 0,
            wins: 0,
            losses: 0,
        },
    }
}

/// The history endpoint only includes the requested player as participant.
pub(crate) fn history_from(dto: MatchHistoryDto) -> MatchHistory {
    let games = dto
        .games
        .games
        .into_iter()
        .filter_map(|game| game.participants.into_iter().next())
        .map(|p| MatchSummary {
            champion_id: p.champion_id,
            win: p.stats.win,
            kills: p.stats.kills,
            deaths: p.stats.deaths,
            assists: p.stats.assists,
        })
        .collect();
    MatchHistory { games }
}

// ---------------------------------------------------------------------------
// Source implementations
// ---------------------------------------------------------------------------

#[async_trait]
impl SessionSource for GameClient {
    async fn check_live(&self) -> Result<bool, SourceError> {
        match self.get_json::<String>(GAMEFLOW_PHASE).await {
            Ok(phase) => {
                debug!(phase = %phase, "gameflow phase");
                Ok(true)
            }
            // Answering at all means the client is up.
            Err(SourceError::NotFound(_)) | Err(SourceError::InvalidResponse(_)) => Ok(true),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl RosterSource<LobbyMember> for GameClient {
    async fn fetch_roster(&self) -> Result<Vec<LobbyMember>, SourceError> {
        let members: Vec<LobbyMember> = self.get_roster(LOBBY_MEMBERS).await?;
        Ok(lobby_roster(members))
    }
}

#[async_trait]
impl RosterSource<ChampSelectMember> for GameClient {
    async fn fetch_roster(&self) -> Result<Vec<ChampSelectMember>, SourceError> {
        let session: ChampSelectSession = self.get_roster(CHAMP_SELECT_SESSION).await?;
        Ok(session.my_team)
    }
}

#[async_trait]
impl RosterSource<PreGameMember> for GameClient {
    async fn fetch_roster(&self) -> Result<Vec<PreGameMember>, SourceError> {
        let session: GameflowSession = self.get_roster(GAMEFLOW_SESSION).await?;
        Ok(pre_game_roster(session))
    }
}

#[async_trait]
impl ProfileSource for GameClient {
    async fn fetch_profile(&self, member_id: MemberId) -> Result<Profile, SourceError> {
        let dto: SummonerDto = self
            .get_json(&format!("/lol-summoner/v1/summoners/{member_id}"))
            .await?;
        Ok(profile_from(dto))
    }
}

#[async_trait]
impl StatsSource for GameClient {
    async fn fetch_stats(&self, player_key: &str) -> Result<RankedStats, SourceError> {
        let dto: RankedStatsDto = self
            .get_json(&format!("/lol-ranked/v1/ranked-stats/{player_key}"))
            .await?;
        Ok(ranked_from(dto))
    }
}

#[async_trait]
impl MatchHistorySource for GameClient {
    async fn fetch_history(&self, player_key: &str) -> Result<MatchHistory, SourceError> {
        let path = format!(
            "/lol-match-history/v1/products/lol/{player_key}/matches?begIndex=0&endIndex={}",
            HISTORY_GAMES - 1
        );
        let dto: MatchHistoryDto = self.get_json(&path).await?;
        Ok(history_from(dto))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
