use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CellKind {
    Dummy,
    Unclaimed,
    Claimed,
    Live,
}

impl CellKind {
    /// One-character wire encoding used by tile rows in snapshots.
    pub fn glyph(self) -> char {
        match self {
            CellKind::Dummy => '#',
            CellKind::Unclaimed => '.',
            CellKind::Claimed => '=',
            CellKind::Live => '+',
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Player,
    Patroller,
    Roamer,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// Maps a key name to a movement direction. Accepts the plain words,
    /// DOM key-event names and WASD, case-insensitively. Anything else is
    /// not a movement key and returns None.
    pub fn parse_key(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "left" | "arrowleft" | "a" => Some(Self::Left),
            "up" | "arrowup" | "w" => Some(Self::Up),
            "right" | "arrowright" | "d" => Some(Self::Right),
            "down" | "arrowdown" | "s" => Some(Self::Down),
            _ => None,
        }
    }

    pub fn velocity(self) -> Vec2 {
        match self {
            Self::Up => Vec2 { x: 0, y: -1 },
            Self::Down => Vec2 { x: 0, y: 1 },
            Self::Left => Vec2 { x: -1, y: 0 },
            Self::Right => Vec2 { x: 1, y: 0 },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Vec2 {
    pub x: i32,
    pub y: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelState {
    Running,
    Won,
    Lost,
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct GameConfig {
    pub columns: i32,
    pub rows: i32,
    #[serde(rename = "roamerCount")]
    pub roamer_count: usize,
    #[serde(rename = "patrollerCount")]
    pub patroller_count: usize,
    #[serde(rename = "winRatio")]
    pub win_ratio: f32,
    pub lives: i32,
    #[serde(rename = "frameRate")]
    pub frame_rate: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            columns: crate::constants::DEFAULT_COLUMNS,
            rows: crate::constants::DEFAULT_ROWS,
            roamer_count: crate::constants::DEFAULT_ROAMER_COUNT,
            patroller_count: crate::constants::DEFAULT_PATROLLER_COUNT,
            win_ratio: crate::constants::DEFAULT_WIN_RATIO,
            lives: crate::constants::DEFAULT_LIVES,
            frame_rate: crate::constants::FRAME_RATE,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct EntityView {
    pub kind: EntityKind,
    pub x: i32,
    pub y: i32,
}

#[derive(Clone, Debug, Serialize)]
pub struct BoardInit {
    pub columns: i32,
    pub rows: i32,
    pub tiles: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeEvent {
    ClaimStarted {
        x: i32,
        y: i32,
    },
    ClaimCompleted {
        converted: i32,
        enclosed: bool,
    },
    ClaimBroken {
        x: i32,
        y: i32,
    },
    LifeLost {
        remaining: i32,
    },
    CellRepaired {
        x: i32,
        y: i32,
        kind: CellKind,
    },
    LevelWon,
    LevelLost,
}

#[derive(Clone, Debug, Serialize)]
pub struct Snapshot {
    pub tick: u64,
    pub state: LevelState,
    pub lives: i32,
    #[serde(rename = "claimedRatio")]
    pub claimed_ratio: f32,
    #[serde(rename = "winRatio")]
    pub win_ratio: f32,
    pub claiming: bool,
    pub tiles: Vec<String>,
    pub entities: Vec<EntityView>,
    pub events: Vec<RuntimeEvent>,
}
