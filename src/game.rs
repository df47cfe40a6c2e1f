use thiserror::Error;

use crate::constants::{tick_interval_ms, SAFE_MARGIN};
use crate::engine::Level;
use crate::types::GameConfig;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("board dimensions must be positive, got {columns}x{rows}")]
    NonPositiveDimensions { columns: i32, rows: i32 },
    #[error("board {columns}x{rows} has no unclaimed interior inside the {margin}-cell margin")]
    BoardTooSmall {
        columns: i32,
        rows: i32,
        margin: i32,
    },
    #[error("win ratio must be in (0, 1], got {0}")]
    WinRatioOutOfRange(f32),
    #[error("starting lives must be positive, got {0}")]
    NonPositiveLives(i32),
}

/// Holds the validated configuration and constructs levels from it. A
/// game owns at most one level at a time; starting a new one discards
/// the old.
#[derive(Debug, Default)]
pub struct Game {
    config: GameConfig,
    level: Option<Level>,
}

impl Game {
    /// Validation happens here, once, so a constructed game can hand out
    /// levels without a fallible path per level.
    pub fn new(config: GameConfig) -> Result<Self, ConfigError> {
        validate_config(&config)?;
        Ok(Self {
            config,
            level: None,
        })
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn tick_ms(&self) -> u64 {
        tick_interval_ms(self.config.frame_rate)
    }

    pub fn start_level(&mut self, seed: u32) -> &mut Level {
        self.level = Some(Level::new(self.config, seed));
        self.level.as_mut().expect("level was just created")
    }

    pub fn level(&self) -> Option<&Level> {
        self.level.as_ref()
    }

    pub fn level_mut(&mut self) -> Option<&mut Level> {
        self.level.as_mut()
    }
}

fn validate_config(config: &GameConfig) -> Result<(), ConfigError> {
    if config.columns <= 0 || config.rows <= 0 {
        return Err(ConfigError::NonPositiveDimensions {
            columns: config.columns,
            rows: config.rows,
        });
    }
    if config.columns <= 2 * SAFE_MARGIN || config.rows <= 2 * SAFE_MARGIN {
        return Err(ConfigError::BoardTooSmall {
            columns: config.columns,
            rows: config.rows,
            margin: SAFE_MARGIN,
        });
    }
    if !(config.win_ratio > 0.0 && config.win_ratio <= 1.0) {
        return Err(ConfigError::WinRatioOutOfRange(config.win_ratio));
    }
    if config.lives <= 0 {
        return Err(ConfigError::NonPositiveLives(config.lives));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LevelState;

    #[test]
    fn default_config_is_valid() {
        let game = Game::new(GameConfig::default()).expect("default config should validate");
        assert_eq!(game.tick_ms(), 66);
        assert!(game.level().is_none());
    }

    #[test]
    fn non_positive_dimensions_are_rejected() {
        let config = GameConfig {
            columns: 0,
            ..GameConfig::default()
        };
        assert_eq!(
            Game::new(config).err(),
            Some(ConfigError::NonPositiveDimensions {
                columns: 0,
                rows: 25
            })
        );
    }

    #[test]
    fn board_without_interior_is_rejected() {
        let config = GameConfig {
            columns: 4,
            rows: 4,
            ..GameConfig::default()
        };
        assert!(matches!(
            Game::new(config).err(),
            Some(ConfigError::BoardTooSmall { .. })
        ));
    }

    #[test]
    fn win_ratio_must_be_in_unit_interval() {
        for win_ratio in [0.0, -0.5, 1.5, f32::NAN] {
            let config = GameConfig {
                win_ratio,
                ..GameConfig::default()
            };
            assert!(matches!(
                Game::new(config).err(),
                Some(ConfigError::WinRatioOutOfRange(_))
            ));
        }
        let config = GameConfig {
            win_ratio: 1.0,
            ..GameConfig::default()
        };
        assert!(Game::new(config).is_ok());
    }

    #[test]
    fn starting_a_level_replaces_the_previous_one() {
        let mut game = Game::new(GameConfig::default()).expect("valid config");
        game.start_level(1).step();
        assert_eq!(game.level().expect("level running").tick_counter(), 1);

        game.start_level(2);
        let level = game.level().expect("fresh level");
        assert_eq!(level.tick_counter(), 0);
        assert_eq!(level.state(), LevelState::Running);
    }
}
