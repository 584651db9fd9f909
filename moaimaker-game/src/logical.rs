use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const GRID_HEIGHT: usize = 14;
pub const GRID_WIDTH: usize = 32;
pub const HALF_WIDTH: usize = GRID_WIDTH / 2;
pub const MAX_TILE_ID: u8 = 0x0F;
pub const STATUE_TILE: u8 = 0x0F;
// A run of statues this long collides with the game's end-of-data handling.
pub const MAX_STATUE_RUN: usize = 15;
pub const MAX_ENEMIES_PER_LEVEL: usize = 8;

const ENEMY_SCREEN_BIT: u8 = 0x80;
const ENEMY_FACING_BIT: u8 = 0x40;
const ENEMY_CHARACTER_MASK: u8 = 0x0F;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: u8,
    pub y: u8,
}

/// A placed enemy. `x` is global across both half-screens; the half-screen
/// bit inside `raw_id` is rewritten from `x` when the enemy is encoded.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enemy {
    pub raw_id: u8,
    pub x: u8,
    pub y: u8,
}

impl Enemy {
    pub fn new(raw_id: u8, x: u8, y: u8) -> Self {
        Enemy { raw_id, x, y }
    }

    /// Character type, 0-15.
    pub fn character(&self) -> u8 {
        self.raw_id & ENEMY_CHARACTER_MASK
    }

    pub fn screen_index(&self) -> usize {
        screen_index(self.raw_id)
    }

    pub fn faces_right(&self) -> bool {
        self.raw_id & ENEMY_FACING_BIT == 0
    }

    pub fn reverse_facing(&mut self) {
        self.raw_id ^= ENEMY_FACING_BIT;
    }
}

pub fn screen_index(raw_id: u8) -> usize {
    if raw_id & ENEMY_SCREEN_BIT != 0 {
        1
    } else {
        0
    }
}

pub(crate) fn with_screen_bit(raw_id: u8, second_screen: bool) -> u8 {
    if second_screen {
        raw_id | ENEMY_SCREEN_BIT
    } else {
        raw_id & !ENEMY_SCREEN_BIT
    }
}

/// Row-major tile ids, always `GRID_HEIGHT` rows of equal width.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TileGrid {
    rows: Vec<Vec<u8>>,
}

impl TileGrid {
    pub fn new(wide: bool) -> Self {
        let width = if wide { GRID_WIDTH } else { HALF_WIDTH };
        TileGrid {
            rows: vec![vec![0; width]; GRID_HEIGHT],
        }
    }

    pub fn from_rows(rows: Vec<Vec<u8>>) -> Result<Self> {
        let grid = TileGrid { rows };
        grid.check_shape()?;
        Ok(grid)
    }

    pub fn width(&self) -> usize {
        self.rows.first().map_or(0, |r| r.len())
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn is_wide(&self) -> bool {
        self.width() == GRID_WIDTH
    }

    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.rows[y][x]
    }

    pub fn set(&mut self, x: usize, y: usize, tile: u8) {
        self.rows[y][x] = tile;
    }

    pub fn rows(&self) -> &[Vec<u8>] {
        &self.rows
    }

    pub fn cells(&self) -> impl Iterator<Item = u8> + '_ {
        self.rows.iter().flat_map(|r| r.iter().copied())
    }

    fn check_shape(&self) -> Result<()> {
        let width = self.width();
        if self.rows.len() != GRID_HEIGHT {
            return Err(Error::Validation(format!(
                "grid has {} rows, expected {GRID_HEIGHT}",
                self.rows.len()
            )));
        }
        if width != GRID_WIDTH && width != HALF_WIDTH {
            return Err(Error::Validation(format!("grid width {width} is not supported")));
        }
        if let Some(y) = self.rows.iter().position(|r| r.len() != width) {
            return Err(Error::Validation(format!("grid row {y} is ragged")));
        }
        Ok(())
    }
}

/// Editor-facing view of one level, produced and consumed by the codec.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalLevel {
    pub background: u8,
    pub wide_screen: bool,
    // Stray bits 5-7 of the header byte found in some original levels. Kept
    // verbatim so those levels round-trip; never set by new edits.
    #[serde(default)]
    pub bug_bits: u8,
    pub tiles: TileGrid,
    pub player: Option<Position>,
    pub door: Option<Position>,
    pub enemies: Vec<Enemy>,
}

impl LogicalLevel {
    pub fn new(background: u8, wide_screen: bool) -> Self {
        LogicalLevel {
            background,
            wide_screen,
            bug_bits: 0,
            tiles: TileGrid::new(wide_screen),
            player: None,
            door: None,
            enemies: vec![],
        }
    }

    pub fn is_bug_screen(&self) -> bool {
        self.bug_bits != 0
    }

    /// Columns the grid has for this level's header flags.
    pub fn grid_width(&self) -> usize {
        if self.wide_screen || self.is_bug_screen() {
            GRID_WIDTH
        } else {
            HALF_WIDTH
        }
    }

    /// Checks the placement rules the game relies on but the byte format
    /// cannot express.
    pub fn validate(&self) -> Result<()> {
        self.tiles.check_shape()?;
        let width = self.grid_width();
        if self.background > MAX_TILE_ID {
            return Err(Error::Validation(format!(
                "background {} does not fit in 4 bits",
                self.background
            )));
        }
        if self.bug_bits > 0x07 {
            return Err(Error::Validation(format!(
                "bug-screen bits {:#x} do not fit in 3 bits",
                self.bug_bits
            )));
        }
        if self.tiles.width() != width {
            return Err(Error::Validation(format!(
                "grid is {} columns wide but the header calls for {width}",
                self.tiles.width()
            )));
        }
        if let Some(t) = self.tiles.cells().find(|&t| t > MAX_TILE_ID) {
            return Err(Error::Validation(format!("tile id {t} does not fit in 4 bits")));
        }
        if self.tiles.rows()[0].iter().any(|&t| t != 0) {
            return Err(Error::Validation("row 0 must stay empty".to_string()));
        }

        let mut statue_run = 0;
        for t in self.tiles.cells() {
            if t == STATUE_TILE {
                statue_run += 1;
                if statue_run >= MAX_STATUE_RUN {
                    return Err(Error::Validation(format!(
                        "{MAX_STATUE_RUN} or more consecutive statue tiles"
                    )));
                }
            } else {
                statue_run = 0;
            }
        }

        if let Some(p) = self.player {
            if p.x as usize >= HALF_WIDTH || p.y as usize >= GRID_HEIGHT || (p.x == 0 && p.y == 0)
            {
                return Err(Error::Validation(format!(
                    "player position ({}, {}) cannot be encoded",
                    p.x, p.y
                )));
            }
        }
        if let Some(d) = self.door {
            // The door covers 2x2 cells starting at its position.
            if d.x as usize + 1 >= width || d.y as usize + 1 >= GRID_HEIGHT || (d.x == 0 && d.y == 0)
            {
                return Err(Error::Validation(format!(
                    "door position ({}, {}) is out of bounds",
                    d.x, d.y
                )));
            }
        }

        if self.enemies.len() > MAX_ENEMIES_PER_LEVEL {
            return Err(Error::Validation(format!(
                "{} enemies placed, at most {MAX_ENEMIES_PER_LEVEL} per level",
                self.enemies.len()
            )));
        }
        for e in &self.enemies {
            if e.x as usize >= width || e.y as usize >= GRID_HEIGHT {
                return Err(Error::Validation(format!(
                    "enemy at ({}, {}) is outside the grid",
                    e.x, e.y
                )));
            }
        }
        Ok(())
    }
}
