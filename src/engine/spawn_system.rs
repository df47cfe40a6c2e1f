use super::*;

impl Level {
    pub(super) fn spawn_entities(&mut self) {
        let columns = self.config.columns;
        let rows = self.config.rows;

        // Player starts mid-way along the top claimed band.
        let player_spawn = Vec2 {
            x: columns / 2,
            y: 1,
        };
        self.entities
            .push(Entity::new(EntityKind::Player, player_spawn, &mut self.rng));

        // Patrollers spread along the bottom band, as far from the player
        // spawn as the margin allows.
        for index in 0..self.config.patroller_count {
            let spawn = Vec2 {
                x: spread_across(columns, index, self.config.patroller_count),
                y: rows - 2,
            };
            self.entities
                .push(Entity::new(EntityKind::Patroller, spawn, &mut self.rng));
        }

        for _ in 0..self.config.roamer_count {
            let spawn = self.pick_roamer_spawn();
            self.entities
                .push(Entity::new(EntityKind::Roamer, spawn, &mut self.rng));
        }
    }

    /// Random unclaimed interior cell, retrying a bounded number of times
    /// to avoid stacking roamers on one cell.
    fn pick_roamer_spawn(&mut self) -> Vec2 {
        let x0 = SAFE_MARGIN;
        let x1 = self.config.columns - SAFE_MARGIN - 1;
        let y0 = SAFE_MARGIN;
        let y1 = self.config.rows - SAFE_MARGIN - 1;

        for _ in 0..32 {
            let candidate = Vec2 {
                x: self.rng.int(x0, x1),
                y: self.rng.int(y0, y1),
            };
            if self.board.kind_at(candidate.x, candidate.y) != CellKind::Unclaimed {
                continue;
            }
            if self
                .entities
                .iter()
                .any(|entity| entity.coords == candidate)
            {
                continue;
            }
            return candidate;
        }

        Vec2 {
            x: (x0 + x1) / 2,
            y: (y0 + y1) / 2,
        }
    }
}
