//! Protocol Messages
//!
//! Wire format for client-server communication: one UTF-8 line per message,
//! fields separated by `;`, lists by `,`. Decoding happens once at the
//! connection boundary; everything past it works with these enums.

use std::fmt;
use std::str::FromStr;

use crate::game::arena::{ArenaBounds, ShrinkPattern};
use crate::game::events::{BlastSegment, GameEventData, MatchOutcome};
use crate::game::grid::{GridPos, TileGrid};
use crate::game::input::Direction;
use crate::game::state::{ItemKind, PlayerId, StateSnapshot};

/// Lines longer than this are dropped unread.
pub const MAX_LINE_BYTES: usize = 4096;

// =============================================================================
// ERRORS
// =============================================================================

/// Why an inbound line could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Blank line.
    #[error("empty message")]
    Empty,

    /// First field is not a known command.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// A required field is absent or blank.
    #[error("{command}: missing field {field}")]
    MissingField {
        /// Command being decoded.
        command: &'static str,
        /// Field name.
        field: &'static str,
    },

    /// A field is present but malformed.
    #[error("{command}: invalid {field}: {value}")]
    InvalidField {
        /// Command being decoded.
        command: &'static str,
        /// Field name.
        field: &'static str,
        /// Raw value.
        value: String,
    },
}

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// `CREATE_ROOM;name;isPrivate;password`
    CreateRoom {
        /// Room name.
        name: String,
        /// Private flag as sent.
        private: bool,
        /// Password, empty if none.
        password: String,
    },

    /// `JOIN_ROOM;name;password`
    JoinRoom {
        /// Room name.
        name: String,
        /// Password, empty if none.
        password: String,
    },

    /// `LEAVE_ROOM`
    LeaveRoom,

    /// `START_GAME`
    StartGame,

    /// `VOTE_REMATCH`
    VoteRematch,

    /// `KICK_PLAYER;targetId`
    KickPlayer {
        /// Player to remove.
        target: PlayerId,
    },

    /// `INPUT;DIR;TRUE|FALSE`
    Input {
        /// Key.
        key: Direction,
        /// Pressed or released.
        pressed: bool,
    },

    /// `ACTION;PLACE_BOMB`
    PlaceBomb,
}

struct Fields<'a> {
    command: &'static str,
    parts: std::str::Split<'a, char>,
}

impl<'a> Fields<'a> {
    fn required(&mut self, field: &'static str) -> Result<&'a str, ProtocolError> {
        match self.parts.next() {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(ProtocolError::MissingField {
                command: self.command,
                field,
            }),
        }
    }

    fn optional(&mut self) -> &'a str {
        self.parts.next().unwrap_or("")
    }

    fn invalid(&self, field: &'static str, value: &str) -> ProtocolError {
        ProtocolError::InvalidField {
            command: self.command,
            field,
            value: value.to_string(),
        }
    }

    fn room_name(&mut self) -> Result<String, ProtocolError> {
        let name = self.required("name")?;
        // Would corrupt ROOM_LIST entries
        if name.contains([':', ',']) {
            return Err(self.invalid("name", name));
        }
        Ok(name.to_string())
    }

    fn boolean(&mut self, field: &'static str) -> Result<bool, ProtocolError> {
        let raw = self.required(field)?;
        if raw.eq_ignore_ascii_case("true") {
            Ok(true)
        } else if raw.eq_ignore_ascii_case("false") {
            Ok(false)
        } else {
            Err(self.invalid(field, raw))
        }
    }
}

impl FromStr for ClientMessage {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Err(ProtocolError::Empty);
        }

        let mut parts = line.split(';');
        let command = parts.next().unwrap_or_default();
        let fields = |command: &'static str| Fields { command, parts: parts.clone() };

        match command {
            "CREATE_ROOM" => {
                let mut f = fields("CREATE_ROOM");
                let name = f.room_name()?;
                let private = f.boolean("isPrivate")?;
                let password = f.optional().to_string();
                Ok(ClientMessage::CreateRoom { name, private, password })
            }
            "JOIN_ROOM" => {
                let mut f = fields("JOIN_ROOM");
                let name = f.room_name()?;
                let password = f.optional().to_string();
                Ok(ClientMessage::JoinRoom { name, password })
            }
            "LEAVE_ROOM" => Ok(ClientMessage::LeaveRoom),
            "START_GAME" => Ok(ClientMessage::StartGame),
            "VOTE_REMATCH" => Ok(ClientMessage::VoteRematch),
            "KICK_PLAYER" => {
                let mut f = fields("KICK_PLAYER");
                let raw = f.required("targetId")?;
                let id = raw.trim().parse::<u32>().map_err(|_| f.invalid("targetId", raw))?;
                Ok(ClientMessage::KickPlayer { target: PlayerId(id) })
            }
            "INPUT" => {
                let mut f = fields("INPUT");
                let raw = f.required("key")?;
                let key = raw.parse::<Direction>().map_err(|_| f.invalid("key", raw))?;
                let pressed = f.boolean("pressed")?;
                Ok(ClientMessage::Input { key, pressed })
            }
            "ACTION" => {
                let mut f = fields("ACTION");
                match f.required("action")? {
                    "PLACE_BOMB" => Ok(ClientMessage::PlaceBomb),
                    other => Err(f.invalid("action", other)),
                }
            }
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }
}

impl fmt::Display for ClientMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientMessage::CreateRoom { name, private, password } => {
                write!(f, "CREATE_ROOM;{};{};{}", name, private, password)
            }
            ClientMessage::JoinRoom { name, password } => write!(f, "JOIN_ROOM;{};{}", name, password),
            ClientMessage::LeaveRoom => f.write_str("LEAVE_ROOM"),
            ClientMessage::StartGame => f.write_str("START_GAME"),
            ClientMessage::VoteRematch => f.write_str("VOTE_REMATCH"),
            ClientMessage::KickPlayer { target } => write!(f, "KICK_PLAYER;{}", target),
            ClientMessage::Input { key, pressed } => {
                write!(f, "INPUT;{};{}", key, if *pressed { "TRUE" } else { "FALSE" })
            }
            ClientMessage::PlaceBomb => f.write_str("ACTION;PLACE_BOMB"),
        }
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// One `ROOM_LIST` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomListing {
    /// Room name.
    pub name: String,
    /// Password protected.
    pub private: bool,
}

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Joinable rooms.
    RoomList(Vec<RoomListing>),
    /// Id assigned on join.
    YourId(PlayerId),
    /// Host and roster in join order.
    RoomUpdate {
        /// Current host.
        host: Option<PlayerId>,
        /// Members.
        members: Vec<PlayerId>,
    },
    /// A match started.
    GameStarted,
    /// Clients should drop all match state before the next `GAME_STARTED`.
    ResetGameState,
    /// Full grid at match start.
    Map {
        /// Grid height.
        rows: usize,
        /// Grid width.
        cols: usize,
        /// Encoded tiles.
        tiles: String,
    },
    /// Full grid after a shrink.
    MapUpdate {
        /// Grid height.
        rows: usize,
        /// Grid width.
        cols: usize,
        /// Encoded tiles.
        tiles: String,
    },
    /// Per-tick snapshot.
    State(StateSnapshot),
    /// A bomb was placed.
    BombPlaced {
        /// Tile.
        pos: GridPos,
        /// Owner.
        owner: PlayerId,
    },
    /// A bomb went off.
    Explosion {
        /// Bomb tile.
        center: GridPos,
        /// Covered tiles, centre first.
        segments: Vec<BlastSegment>,
    },
    /// A crate was destroyed.
    BreakTile(GridPos),
    /// An item dropped.
    SpawnItem {
        /// Tile.
        pos: GridPos,
        /// Kind.
        kind: ItemKind,
    },
    /// An item was collected.
    ItemPicked {
        /// Collector.
        player: PlayerId,
        /// Tile.
        pos: GridPos,
        /// Kind.
        kind: ItemKind,
    },
    /// A player was eliminated.
    PlayerDied(PlayerId),
    /// A shrink step is coming.
    ArenaWarning {
        /// Sides that close.
        pattern: ShrinkPattern,
        /// Bounds after the step.
        bounds: ArenaBounds,
    },
    /// Match result.
    GameOver(MatchOutcome),
    /// Rematch vote tally.
    RematchUpdate {
        /// Votes cast.
        votes: usize,
        /// Room members.
        total: usize,
    },
    /// You were removed by the host.
    Kicked,
    /// Request rejected.
    Error(String),
}

impl ServerMessage {
    /// `MAP` line for a grid.
    pub fn map(grid: &TileGrid) -> Self {
        ServerMessage::Map {
            rows: grid.rows(),
            cols: grid.cols(),
            tiles: grid.encode(),
        }
    }

    /// `MAP_UPDATE` line for a grid.
    pub fn map_update(grid: &TileGrid) -> Self {
        ServerMessage::MapUpdate {
            rows: grid.rows(),
            cols: grid.cols(),
            tiles: grid.encode(),
        }
    }

    /// Translate a simulation event. `MatchEnded` has no direct line: the
    /// room announces the outcome after its game-over delay.
    pub fn from_event(data: &GameEventData, grid: &TileGrid) -> Option<Self> {
        Some(match data {
            GameEventData::BombPlaced { pos, owner } => ServerMessage::BombPlaced {
                pos: *pos,
                owner: *owner,
            },
            GameEventData::Explosion { center, segments } => ServerMessage::Explosion {
                center: *center,
                segments: segments.clone(),
            },
            GameEventData::TileBroken { pos } => ServerMessage::BreakTile(*pos),
            GameEventData::ItemSpawned { pos, kind } => ServerMessage::SpawnItem {
                pos: *pos,
                kind: *kind,
            },
            GameEventData::ItemPicked { player, pos, kind } => ServerMessage::ItemPicked {
                player: *player,
                pos: *pos,
                kind: *kind,
            },
            GameEventData::PlayerDied { player } => ServerMessage::PlayerDied(*player),
            GameEventData::ArenaWarning { pattern, bounds } => ServerMessage::ArenaWarning {
                pattern: *pattern,
                bounds: *bounds,
            },
            GameEventData::ArenaShrunk { .. } => ServerMessage::map_update(grid),
            GameEventData::MatchEnded { .. } => return None,
        })
    }
}

fn join<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::RoomList(rooms) => {
                f.write_str("ROOM_LIST;")?;
                for room in rooms {
                    let kind = if room.private { "Private" } else { "Public" };
                    write!(f, "{}:{},", room.name, kind)?;
                }
                Ok(())
            }
            ServerMessage::YourId(id) => write!(f, "YOUR_ID;{}", id),
            ServerMessage::RoomUpdate { host, members } => {
                match host {
                    Some(h) => write!(f, "ROOM_UPDATE;{};", h)?,
                    None => f.write_str("ROOM_UPDATE;-1;")?,
                }
                join(f, members, ",")
            }
            ServerMessage::GameStarted => f.write_str("GAME_STARTED"),
            ServerMessage::ResetGameState => f.write_str("RESET_GAME_STATE"),
            ServerMessage::Map { rows, cols, tiles } => write!(f, "MAP;{};{};{}", rows, cols, tiles),
            ServerMessage::MapUpdate { rows, cols, tiles } => {
                write!(f, "MAP_UPDATE;{};{};{}", rows, cols, tiles)
            }
            ServerMessage::State(snapshot) => {
                write!(f, "STATE;{};", snapshot.clock_secs)?;
                for (i, p) in snapshot.players.iter().enumerate() {
                    if i > 0 {
                        f.write_str("#")?;
                    }
                    write!(f, "{},{},{},{},{}", p.id, p.x, p.y, p.anim.as_str(), p.facing)?;
                }
                f.write_str("|||")
            }
            ServerMessage::BombPlaced { pos, owner } => write!(f, "BOMB_PLACED;{};{}", pos, owner),
            ServerMessage::Explosion { center, segments } => {
                write!(f, "EXPLOSION;{}", center)?;
                for seg in segments {
                    write!(f, ";{},{}", seg.pos, seg.vertical)?;
                }
                Ok(())
            }
            ServerMessage::BreakTile(pos) => write!(f, "BREAK_TILE;{}", pos),
            ServerMessage::SpawnItem { pos, kind } => write!(f, "SPAWN_ITEM;{},{}", pos, kind.as_str()),
            ServerMessage::ItemPicked { player, pos, kind } => {
                write!(f, "ITEM_PICKED;{},{},{}", player, pos, kind.as_str())
            }
            ServerMessage::PlayerDied(id) => write!(f, "PLAYER_DIED;{}", id),
            ServerMessage::ArenaWarning { pattern, bounds } => write!(
                f,
                "ARENA_WARNING;{};{};{};{};{}",
                pattern, bounds.left, bounds.right, bounds.top, bounds.bottom
            ),
            ServerMessage::GameOver(outcome) => match outcome {
                MatchOutcome::TimeUp => f.write_str("GAME_OVER;TIME_UP"),
                MatchOutcome::Winner(id) => write!(f, "GAME_OVER;WINNER;{}", id),
                MatchOutcome::Survivors(ids) => {
                    f.write_str("GAME_OVER;SURVIVORS;")?;
                    join(f, ids, ",")
                }
                MatchOutcome::Draw => f.write_str("GAME_OVER;DRAW"),
            },
            ServerMessage::RematchUpdate { votes, total } => {
                write!(f, "REMATCH_UPDATE;{};{}", votes, total)
            }
            ServerMessage::Kicked => f.write_str("KICKED"),
            ServerMessage::Error(message) => write!(f, "ERROR;{}", message),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::{AnimState, PlayerSnapshot};

    #[test]
    fn test_parse_create_room() {
        let msg: ClientMessage = "CREATE_ROOM;Arena;true;hunter2".parse().unwrap();
        assert_eq!(
            msg,
            ClientMessage::CreateRoom {
                name: "Arena".into(),
                private: true,
                password: "hunter2".into(),
            }
        );

        let msg: ClientMessage = "CREATE_ROOM;A;FALSE".parse().unwrap();
        assert_eq!(
            msg,
            ClientMessage::CreateRoom {
                name: "A".into(),
                private: false,
                password: String::new(),
            }
        );
    }

    #[test]
    fn test_parse_tolerates_carriage_return() {
        let msg: ClientMessage = "START_GAME\r".parse().unwrap();
        assert_eq!(msg, ClientMessage::StartGame);
    }

    #[test]
    fn test_parse_join_without_password() {
        let msg: ClientMessage = "JOIN_ROOM;A".parse().unwrap();
        assert_eq!(msg, ClientMessage::JoinRoom { name: "A".into(), password: String::new() });
    }

    #[test]
    fn test_parse_input() {
        let msg: ClientMessage = "INPUT;RIGHT;TRUE".parse().unwrap();
        assert_eq!(msg, ClientMessage::Input { key: Direction::Right, pressed: true });

        let msg: ClientMessage = "INPUT;UP;false".parse().unwrap();
        assert_eq!(msg, ClientMessage::Input { key: Direction::Up, pressed: false });
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<ClientMessage>(), Err(ProtocolError::Empty));
        assert!(matches!(
            "DANCE".parse::<ClientMessage>(),
            Err(ProtocolError::UnknownCommand(_))
        ));
        assert!(matches!(
            "INPUT;SIDEWAYS;TRUE".parse::<ClientMessage>(),
            Err(ProtocolError::InvalidField { field: "key", .. })
        ));
        assert!(matches!(
            "INPUT;UP".parse::<ClientMessage>(),
            Err(ProtocolError::MissingField { field: "pressed", .. })
        ));
        assert!(matches!(
            "INPUT;UP;maybe".parse::<ClientMessage>(),
            Err(ProtocolError::InvalidField { field: "pressed", .. })
        ));
        assert!(matches!(
            "CREATE_ROOM;;true".parse::<ClientMessage>(),
            Err(ProtocolError::MissingField { field: "name", .. })
        ));
        assert!(matches!(
            "CREATE_ROOM;a,b;false".parse::<ClientMessage>(),
            Err(ProtocolError::InvalidField { field: "name", .. })
        ));
        assert!(matches!(
            "KICK_PLAYER;abc".parse::<ClientMessage>(),
            Err(ProtocolError::InvalidField { field: "targetId", .. })
        ));
        assert!(matches!(
            "ACTION;DANCE".parse::<ClientMessage>(),
            Err(ProtocolError::InvalidField { field: "action", .. })
        ));
    }

    #[test]
    fn test_client_display_parses_back() {
        let messages = [
            ClientMessage::KickPlayer { target: PlayerId(2) },
            ClientMessage::Input { key: Direction::Left, pressed: false },
            ClientMessage::PlaceBomb,
            ClientMessage::CreateRoom { name: "R".into(), private: true, password: "pw".into() },
        ];
        for msg in messages {
            assert_eq!(msg.to_string().parse::<ClientMessage>(), Ok(msg));
        }
    }

    #[test]
    fn test_encode_room_messages() {
        let list = ServerMessage::RoomList(vec![
            RoomListing { name: "A".into(), private: false },
            RoomListing { name: "B".into(), private: true },
        ]);
        assert_eq!(list.to_string(), "ROOM_LIST;A:Public,B:Private,");
        assert_eq!(ServerMessage::RoomList(vec![]).to_string(), "ROOM_LIST;");

        let update = ServerMessage::RoomUpdate {
            host: Some(PlayerId(0)),
            members: vec![PlayerId(0), PlayerId(1)],
        };
        assert_eq!(update.to_string(), "ROOM_UPDATE;0;0,1");
        let empty = ServerMessage::RoomUpdate { host: None, members: vec![] };
        assert_eq!(empty.to_string(), "ROOM_UPDATE;-1;");
    }

    #[test]
    fn test_encode_state() {
        let snap = StateSnapshot {
            clock_secs: 179,
            players: vec![
                PlayerSnapshot { id: PlayerId(0), x: 34, y: 32, anim: AnimState::Walk, facing: Direction::Right },
                PlayerSnapshot { id: PlayerId(1), x: 352, y: 352, anim: AnimState::Idle, facing: Direction::Down },
            ],
        };
        assert_eq!(
            ServerMessage::State(snap).to_string(),
            "STATE;179;0,34,32,WALK,RIGHT#1,352,352,IDLE,DOWN|||"
        );
    }

    #[test]
    fn test_encode_explosion() {
        let msg = ServerMessage::Explosion {
            center: GridPos::new(3, 3),
            segments: vec![
                BlastSegment { pos: GridPos::new(3, 3), vertical: false },
                BlastSegment { pos: GridPos::new(4, 3), vertical: false },
                BlastSegment { pos: GridPos::new(3, 4), vertical: true },
            ],
        };
        assert_eq!(msg.to_string(), "EXPLOSION;3,3;3,3,false;4,3,false;3,4,true");
    }

    #[test]
    fn test_encode_game_over() {
        assert_eq!(ServerMessage::GameOver(MatchOutcome::TimeUp).to_string(), "GAME_OVER;TIME_UP");
        assert_eq!(
            ServerMessage::GameOver(MatchOutcome::Winner(PlayerId(2))).to_string(),
            "GAME_OVER;WINNER;2"
        );
        assert_eq!(
            ServerMessage::GameOver(MatchOutcome::Survivors(vec![PlayerId(0), PlayerId(3)])).to_string(),
            "GAME_OVER;SURVIVORS;0,3"
        );
        assert_eq!(ServerMessage::GameOver(MatchOutcome::Draw).to_string(), "GAME_OVER;DRAW");
    }

    #[test]
    fn test_encode_misc() {
        let pos = GridPos::new(5, 7);
        assert_eq!(ServerMessage::BombPlaced { pos, owner: PlayerId(1) }.to_string(), "BOMB_PLACED;5,7;1");
        assert_eq!(ServerMessage::BreakTile(pos).to_string(), "BREAK_TILE;5,7");
        assert_eq!(
            ServerMessage::SpawnItem { pos, kind: ItemKind::FireUp }.to_string(),
            "SPAWN_ITEM;5,7,FIRE_UP"
        );
        assert_eq!(
            ServerMessage::ItemPicked { player: PlayerId(0), pos, kind: ItemKind::BombUp }.to_string(),
            "ITEM_PICKED;0,5,7,BOMB_UP"
        );
        assert_eq!(
            ServerMessage::ArenaWarning {
                pattern: ShrinkPattern::TopBottom,
                bounds: ArenaBounds { left: 2, right: 10, top: 2, bottom: 10 },
            }
            .to_string(),
            "ARENA_WARNING;TB;2;10;2;10"
        );
        assert_eq!(ServerMessage::RematchUpdate { votes: 1, total: 2 }.to_string(), "REMATCH_UPDATE;1;2");
        assert_eq!(ServerMessage::Error("Room Full".into()).to_string(), "ERROR;Room Full");
    }

    #[test]
    fn test_encode_map() {
        let grid = TileGrid::new(13, 13);
        let line = ServerMessage::map(&grid).to_string();
        let payload = line.strip_prefix("MAP;13;13;").unwrap();
        assert_eq!(payload.split(',').count(), 169);
    }

    #[test]
    fn test_match_ended_has_no_direct_line() {
        let grid = TileGrid::new(3, 3);
        let data = GameEventData::MatchEnded { outcome: MatchOutcome::Draw };
        assert_eq!(ServerMessage::from_event(&data, &grid), None);

        let shrunk = GameEventData::ArenaShrunk {
            pattern: ShrinkPattern::LeftRight,
            bounds: ArenaBounds::initial(3, 3),
        };
        assert!(matches!(
            ServerMessage::from_event(&shrunk, &grid),
            Some(ServerMessage::MapUpdate { rows: 3, cols: 3, .. })
        ));
    }
}
