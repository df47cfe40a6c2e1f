use super::*;

impl Level {
    /// A roamer standing on a live path cell breaks the claim in
    /// progress: the path reverts to unclaimed and a life is lost.
    pub(super) fn check_roamer_breaks(&mut self) {
        if !self.claiming {
            return;
        }
        let hit = self.entities.iter().find(|entity| {
            entity.kind == EntityKind::Roamer
                && self.board.kind_at(entity.coords.x, entity.coords.y) == CellKind::Live
        });
        let Some(at) = hit.map(|entity| entity.coords) else {
            return;
        };

        let _ = self.board.replace_all(CellKind::Live, CellKind::Unclaimed);
        self.claiming = false;
        self.events
            .push(RuntimeEvent::ClaimBroken { x: at.x, y: at.y });
        self.lose_life();
    }

    /// Patrollers kill on 8-neighborhood contact, claim or no claim.
    pub(super) fn check_patroller_contact(&mut self) {
        let player = self.entities[0].coords;
        let contact = self.entities.iter().any(|entity| {
            entity.kind == EntityKind::Patroller
                && chebyshev(entity.coords.x, entity.coords.y, player.x, player.y) <= 1
        });
        if contact {
            self.lose_life();
        }
    }

    /// Drives the claim state machine from the player's current cell:
    /// unclaimed ground becomes live path, stepping onto live ground
    /// opens a claim, returning to claimed ground completes it.
    pub(super) fn update_claim(&mut self) {
        let player = self.entities[0].coords;
        if self.board.kind_at(player.x, player.y) == CellKind::Unclaimed {
            self.board.set_kind(player.x, player.y, CellKind::Live);
        }

        match self.board.kind_at(player.x, player.y) {
            CellKind::Live => {
                if self.claiming {
                    self.expand_claim_bounds(player);
                } else {
                    self.start_claim(player);
                }
            }
            CellKind::Claimed if self.claiming => self.complete_claim(),
            _ => {}
        }
    }

    fn start_claim(&mut self, at: Vec2) {
        self.claiming = true;
        self.claim_start_velocity = self.entities[0].velocity;
        self.claim_min = at;
        self.claim_max = at;
        self.events
            .push(RuntimeEvent::ClaimStarted { x: at.x, y: at.y });
    }

    fn expand_claim_bounds(&mut self, at: Vec2) {
        self.claim_min.x = self.claim_min.x.min(at.x);
        self.claim_min.y = self.claim_min.y.min(at.y);
        self.claim_max.x = self.claim_max.x.max(at.x);
        self.claim_max.y = self.claim_max.y.max(at.y);
    }

    /// Converts the traced path to claimed ground. A direction change
    /// since the claim opened means the path plus the old border encloses
    /// area, so everything unclaimed inside the accumulated bounding box
    /// is converted too. The box, not a flood fill, is the rule: a
    /// non-convex path that re-enters the border elsewhere claims the
    /// whole box, and renderers depend on that.
    fn complete_claim(&mut self) {
        self.claiming = false;
        let velocity = self.entities[0].velocity;
        let enclosed = velocity.x != self.claim_start_velocity.x
            || velocity.y != self.claim_start_velocity.y;

        if enclosed {
            let _ = self.board.fill_region(
                self.claim_min,
                self.claim_max,
                CellKind::Unclaimed,
                CellKind::Live,
            );
        }
        let converted = self.board.replace_all(CellKind::Live, CellKind::Claimed);
        self.events.push(RuntimeEvent::ClaimCompleted {
            converted: converted as i32,
            enclosed,
        });

        self.claimed_ratio = self.board.claimed_ratio();
        if self.claimed_ratio >= self.config.win_ratio {
            self.state = LevelState::Won;
            self.events.push(RuntimeEvent::LevelWon);
        }
    }

    /// Takes one life. Any claim in progress is abandoned first so no
    /// live cells outlive their claimer. On the last life the level
    /// stops where it stands; otherwise the player and the patrollers
    /// return to their starting cells.
    pub(super) fn lose_life(&mut self) {
        if self.state != LevelState::Running {
            return;
        }
        if self.claiming {
            let _ = self.board.replace_all(CellKind::Live, CellKind::Unclaimed);
            self.claiming = false;
        }

        self.lives -= 1;
        self.events.push(RuntimeEvent::LifeLost {
            remaining: self.lives,
        });

        if self.lives <= 0 {
            self.state = LevelState::Lost;
            self.events.push(RuntimeEvent::LevelLost);
            return;
        }

        for entity in &mut self.entities {
            if matches!(entity.kind, EntityKind::Player | EntityKind::Patroller) {
                entity.reset(&mut self.rng);
            }
        }
    }
}
