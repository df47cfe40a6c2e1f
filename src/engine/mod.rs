use crate::board::Board;
use crate::constants::SAFE_MARGIN;
use crate::entity::Entity;
use crate::rng::Rng;
use crate::types::{
    BoardInit, CellKind, Direction, EntityKind, GameConfig, LevelState, RuntimeEvent, Snapshot,
    Vec2,
};

mod claim_system;
mod spawn_system;
mod utils;

use self::utils::{chebyshev, spread_across};

/// One running level: the board, its entities and the claim lifecycle,
/// advanced one synchronous tick at a time. Input only ever writes the
/// player's velocity between ticks; everything else happens inside
/// `step`.
#[derive(Clone, Debug)]
pub struct Level {
    config: GameConfig,
    board: Board,
    entities: Vec<Entity>,
    rng: Rng,
    lives: i32,
    claimed_ratio: f32,
    claiming: bool,
    claim_min: Vec2,
    claim_max: Vec2,
    claim_start_velocity: Vec2,
    state: LevelState,
    tick_counter: u64,
    events: Vec<RuntimeEvent>,
}

impl Level {
    /// Builds a fresh level. The config must already be validated (see
    /// `Game::new`); entity placement and the roamer starting velocities
    /// come from the seeded rng, so equal seeds replay equal games.
    pub fn new(config: GameConfig, seed: u32) -> Self {
        let board = Board::generate(config.columns, config.rows);
        let claimed_ratio = board.claimed_ratio();
        let mut level = Self {
            config,
            board,
            entities: Vec::new(),
            rng: Rng::new(seed),
            lives: config.lives,
            claimed_ratio,
            claiming: false,
            claim_min: Vec2 { x: 0, y: 0 },
            claim_max: Vec2 { x: 0, y: 0 },
            claim_start_velocity: Vec2 { x: 0, y: 0 },
            state: LevelState::Running,
            tick_counter: 0,
            events: Vec::new(),
        };
        level.spawn_entities();
        level
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn state(&self) -> LevelState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LevelState::Running
    }

    pub fn lives(&self) -> i32 {
        self.lives
    }

    pub fn claimed_ratio(&self) -> f32 {
        self.claimed_ratio
    }

    pub fn tick_counter(&self) -> u64 {
        self.tick_counter
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn player(&self) -> &Entity {
        &self.entities[0]
    }

    /// Input hook: the next tick reads whatever direction was written
    /// last. Ignored once the level has stopped.
    pub fn set_player_direction(&mut self, direction: Direction) {
        if self.state != LevelState::Running {
            return;
        }
        self.entities[0].velocity = direction.velocity();
    }

    /// One tick. Inert unless running, so a timer callback that fires
    /// after a win or loss does nothing. Order matters: movement first,
    /// then roamer breaks, then patroller contact, then the player's own
    /// claim transition (a break this tick supersedes a completion this
    /// tick), then the repair pass and the ratio recount.
    pub fn step(&mut self) {
        if self.state != LevelState::Running {
            return;
        }
        self.tick_counter += 1;

        self.move_entities();
        self.check_roamer_breaks();
        if self.state == LevelState::Running {
            self.check_patroller_contact();
        }
        if self.state == LevelState::Running {
            self.update_claim();
        }
        self.repair_cell_conflicts();
        self.claimed_ratio = self.board.claimed_ratio();
    }

    fn move_entities(&mut self) {
        for entity in &mut self.entities {
            entity.step(&self.board);
        }
    }

    /// An entity that finished the tick on a cell kind it may not occupy
    /// has that cell reclassified to the entity's home kind. Recoverable
    /// by construction; the event is the anomaly record.
    fn repair_cell_conflicts(&mut self) {
        for index in 0..self.entities.len() {
            let coords = self.entities[index].coords;
            let kind = self.entities[index].kind;
            if !self.board.in_bounds(coords.x, coords.y) {
                continue;
            }
            if self
                .board
                .can_enter(coords.x, coords.y, kind.allowed_cells())
            {
                continue;
            }
            let repaired = kind.home_cell();
            let _ = self.board.set_kind(coords.x, coords.y, repaired);
            self.events.push(RuntimeEvent::CellRepaired {
                x: coords.x,
                y: coords.y,
                kind: repaired,
            });
        }
    }

    pub fn build_board_init(&self) -> BoardInit {
        BoardInit {
            columns: self.board.columns(),
            rows: self.board.rows(),
            tiles: self.board.tile_rows(),
        }
    }

    /// Read-only projection of the current state for renderers and stat
    /// panels. Passing `include_events` drains the pending event queue
    /// into the snapshot.
    pub fn build_snapshot(&mut self, include_events: bool) -> Snapshot {
        let snapshot = Snapshot {
            tick: self.tick_counter,
            state: self.state,
            lives: self.lives,
            claimed_ratio: self.claimed_ratio,
            win_ratio: self.config.win_ratio,
            claiming: self.claiming,
            tiles: self.board.tile_rows(),
            entities: self.entities.iter().map(Entity::view).collect(),
            events: if include_events {
                self.events.clone()
            } else {
                Vec::new()
            },
        };
        if include_events {
            self.events.clear();
        }
        snapshot
    }
}
