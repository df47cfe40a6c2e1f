use crate::board::Board;
use crate::rng::Rng;
use crate::types::{CellKind, EntityKind, EntityView, Vec2};

impl EntityKind {
    /// Cell kinds this entity may stand on.
    pub fn allowed_cells(self) -> &'static [CellKind] {
        match self {
            EntityKind::Player => &[CellKind::Unclaimed, CellKind::Claimed, CellKind::Live],
            EntityKind::Patroller => &[CellKind::Claimed],
            EntityKind::Roamer => &[CellKind::Unclaimed, CellKind::Live],
        }
    }

    /// Repair target when an entity is caught standing on a cell kind it
    /// may not enter: the cell is reclassified to this kind.
    pub fn home_cell(self) -> CellKind {
        match self {
            EntityKind::Player | EntityKind::Patroller => CellKind::Claimed,
            EntityKind::Roamer => CellKind::Unclaimed,
        }
    }
}

/// One moving object on the board. The variants share this record; all
/// per-kind behavior hangs off `EntityKind`.
#[derive(Clone, Debug)]
pub struct Entity {
    pub kind: EntityKind,
    pub coords: Vec2,
    pub velocity: Vec2,
    origin: Vec2,
}

impl Entity {
    pub fn new(kind: EntityKind, coords: Vec2, rng: &mut Rng) -> Self {
        let mut entity = Self {
            kind,
            coords,
            velocity: Vec2 { x: 0, y: 0 },
            origin: coords,
        };
        entity.velocity = entity.reset_velocity(rng);
        entity
    }

    fn reset_velocity(&self, rng: &mut Rng) -> Vec2 {
        match self.kind {
            EntityKind::Player => Vec2 { x: 0, y: 0 },
            EntityKind::Patroller => Vec2 { x: 1, y: 1 },
            EntityKind::Roamer => Vec2 {
                x: rng.sign(),
                y: rng.sign(),
            },
        }
    }

    /// Puts the entity back on its construction-time cell with its
    /// kind-specific starting velocity.
    pub fn reset(&mut self, rng: &mut Rng) {
        self.coords = self.origin;
        self.velocity = self.reset_velocity(rng);
    }

    pub fn origin(&self) -> Vec2 {
        self.origin
    }

    pub fn target(&self) -> Vec2 {
        Vec2 {
            x: self.coords.x + self.velocity.x,
            y: self.coords.y + self.velocity.y,
        }
    }

    pub fn view(&self) -> EntityView {
        EntityView {
            kind: self.kind,
            x: self.coords.x,
            y: self.coords.y,
        }
    }

    /// Advances one tick. A free target cell is taken as-is; a blocked
    /// one stops the player or bounces everything else. Velocity is
    /// re-derived from the actual displacement so a forced stay zeroes it.
    pub fn step(&mut self, board: &Board) {
        let target = self.target();
        if board.can_enter(target.x, target.y, self.kind.allowed_cells()) {
            self.move_to(target);
            return;
        }

        if self.kind == EntityKind::Player {
            self.move_to(self.coords);
            return;
        }

        self.resolve_bounce(board);
        let next = self.target();
        if board.in_bounds(next.x, next.y) {
            self.move_to(next);
        } else {
            self.move_to(self.coords);
        }
    }

    /// Picks the bounce velocity for a blocked move. Candidates are the
    /// two single-axis flips; the winner between two viable flips is the
    /// axis whose adjacent cell is actually blocking, and any ambiguity
    /// falls back to a full reversal.
    fn resolve_bounce(&mut self, board: &Board) {
        let allowed = self.kind.allowed_cells();
        let Vec2 { x, y } = self.coords;
        let Vec2 { x: vx, y: vy } = self.velocity;

        let flip_x_free = board.can_enter(x - vx, y + vy, allowed);
        let flip_y_free = board.can_enter(x + vx, y - vy, allowed);
        let adjacent_x_free = board.can_enter(x + vx, y, allowed);
        let adjacent_y_free = board.can_enter(x, y + vy, allowed);

        match (flip_x_free, flip_y_free) {
            (false, false) => {
                self.velocity = Vec2 { x: -vx, y: -vy };
            }
            (true, false) => {
                self.velocity = Vec2 { x: -vx, y: vy };
            }
            (false, true) => {
                self.velocity = Vec2 { x: vx, y: -vy };
            }
            (true, true) => {
                if !adjacent_x_free && adjacent_y_free {
                    self.velocity = Vec2 { x: -vx, y: vy };
                } else if adjacent_x_free && !adjacent_y_free {
                    self.velocity = Vec2 { x: vx, y: -vy };
                } else {
                    self.velocity = Vec2 { x: -vx, y: -vy };
                }
            }
        }
    }

    fn move_to(&mut self, next: Vec2) {
        self.velocity = Vec2 {
            x: next.x - self.coords.x,
            y: next.y - self.coords.y,
        };
        self.coords = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_board() -> Board {
        Board::generate(10, 8)
    }

    #[test]
    fn reset_restores_origin_and_kind_velocity() {
        let mut rng = Rng::new(11);
        let mut patroller = Entity::new(EntityKind::Patroller, Vec2 { x: 1, y: 1 }, &mut rng);
        let mut roamer = Entity::new(EntityKind::Roamer, Vec2 { x: 5, y: 4 }, &mut rng);
        let mut player = Entity::new(EntityKind::Player, Vec2 { x: 5, y: 1 }, &mut rng);

        let board = open_board();
        for _ in 0..5 {
            patroller.step(&board);
            roamer.step(&board);
        }
        player.velocity = Vec2 { x: 1, y: 0 };
        player.step(&board);

        patroller.reset(&mut rng);
        roamer.reset(&mut rng);
        player.reset(&mut rng);

        assert_eq!(patroller.coords, Vec2 { x: 1, y: 1 });
        assert_eq!(patroller.velocity, Vec2 { x: 1, y: 1 });
        assert_eq!(roamer.coords, Vec2 { x: 5, y: 4 });
        assert_eq!(roamer.velocity.x.abs(), 1);
        assert_eq!(roamer.velocity.y.abs(), 1);
        assert_eq!(player.coords, Vec2 { x: 5, y: 1 });
        assert_eq!(player.velocity, Vec2 { x: 0, y: 0 });
    }

    #[test]
    fn player_stops_on_blocked_target() {
        let board = open_board();
        let mut rng = Rng::new(1);
        let mut player = Entity::new(EntityKind::Player, Vec2 { x: 0, y: 3 }, &mut rng);
        player.velocity = Vec2 { x: -1, y: 0 };

        player.step(&board);

        assert_eq!(player.coords, Vec2 { x: 0, y: 3 });
        assert_eq!(player.velocity, Vec2 { x: 0, y: 0 });
    }

    #[test]
    fn patroller_flips_the_blocked_axis_and_keeps_the_free_one() {
        // Heading (1,1) from the left claimed band into the unclaimed
        // interior: the x-adjacent cell blocks, the y-adjacent one does
        // not, so only the x velocity inverts.
        let board = open_board();
        let mut rng = Rng::new(2);
        let mut patroller = Entity::new(EntityKind::Patroller, Vec2 { x: 1, y: 2 }, &mut rng);
        assert_eq!(patroller.velocity, Vec2 { x: 1, y: 1 });

        patroller.step(&board);

        assert_eq!(patroller.velocity, Vec2 { x: -1, y: 1 });
        assert_eq!(patroller.coords, Vec2 { x: 0, y: 3 });
    }

    #[test]
    fn ambiguous_corner_reverses_both_axes() {
        // Both flip targets are free and both adjacent cells are blocked:
        // the tie-break reverses both axes.
        let mut board = open_board();
        board.set_kind(6, 5, CellKind::Claimed);
        board.set_kind(6, 4, CellKind::Claimed);
        board.set_kind(5, 5, CellKind::Claimed);

        let mut rng = Rng::new(3);
        let mut roamer = Entity::new(EntityKind::Roamer, Vec2 { x: 5, y: 4 }, &mut rng);
        roamer.velocity = Vec2 { x: 1, y: 1 };

        roamer.step(&board);

        assert_eq!(roamer.velocity, Vec2 { x: -1, y: -1 });
        assert_eq!(roamer.coords, Vec2 { x: 4, y: 3 });
    }

    #[test]
    fn dead_end_with_no_flip_reverses_both_axes() {
        let mut board = open_board();
        board.set_kind(5, 5, CellKind::Claimed);
        board.set_kind(3, 5, CellKind::Claimed);
        board.set_kind(5, 3, CellKind::Claimed);

        let mut rng = Rng::new(4);
        let mut roamer = Entity::new(EntityKind::Roamer, Vec2 { x: 4, y: 4 }, &mut rng);
        roamer.velocity = Vec2 { x: 1, y: 1 };

        roamer.step(&board);

        assert_eq!(roamer.velocity, Vec2 { x: -1, y: -1 });
        assert_eq!(roamer.coords, Vec2 { x: 3, y: 3 });
    }

    #[test]
    fn free_target_keeps_velocity() {
        let board = open_board();
        let mut rng = Rng::new(5);
        let mut roamer = Entity::new(EntityKind::Roamer, Vec2 { x: 4, y: 4 }, &mut rng);
        roamer.velocity = Vec2 { x: 1, y: -1 };

        roamer.step(&board);

        assert_eq!(roamer.coords, Vec2 { x: 5, y: 3 });
        assert_eq!(roamer.velocity, Vec2 { x: 1, y: -1 });
    }

    #[test]
    fn entities_never_leave_the_grid() {
        let board = open_board();
        let mut rng = Rng::new(6);
        let mut patroller = Entity::new(EntityKind::Patroller, Vec2 { x: 0, y: 0 }, &mut rng);
        let mut roamer = Entity::new(EntityKind::Roamer, Vec2 { x: 4, y: 4 }, &mut rng);
        for _ in 0..200 {
            patroller.step(&board);
            roamer.step(&board);
            assert!(board.in_bounds(patroller.coords.x, patroller.coords.y));
            assert!(board.in_bounds(roamer.coords.x, roamer.coords.y));
            assert!(patroller.velocity.x.abs() <= 1 && patroller.velocity.y.abs() <= 1);
            assert!(roamer.velocity.x.abs() <= 1 && roamer.velocity.y.abs() <= 1);
        }
    }
}
