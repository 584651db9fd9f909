// Level byte formats.
//
// Map data: 4-byte header followed by a run-length tile stream. Each stream
// byte is `(run_length - 1) << 4 | tile_id`; runs fill the grid row-major and
// the stream simply stops, leaving the remaining cells at tile 0.
//
// Enemy data: a length byte (`2 * count + 1`, or 0x01 for no enemies)
// followed by `(id, x << 4 | y)` pairs, x being local to the half-screen
// selected by bit 7 of the id.

use log::warn;

use crate::layout::LEVEL_HEADER_LEN;
use crate::level::Level;
use crate::logical::{
    screen_index, with_screen_bit, Enemy, LogicalLevel, Position, TileGrid, GRID_HEIGHT,
    GRID_WIDTH, HALF_WIDTH,
};
use crate::{Error, Result};

const MAX_RUN: usize = 16;
const WIDE_FLAG: u8 = 0x10;
const BACKGROUND_MASK: u8 = 0x0F;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LevelHeader {
    pub background: u8,
    pub wide_screen: bool,
    pub bug_bits: u8,
    pub player: Option<Position>,
    pub door: Option<Position>,
}

pub fn decode_header(bytes: &[u8]) -> Result<LevelHeader> {
    if bytes.len() < LEVEL_HEADER_LEN {
        return Err(Error::Validation(format!(
            "level header needs {LEVEL_HEADER_LEN} bytes, got {}",
            bytes.len()
        )));
    }
    let flags = bytes[0];
    let player = match bytes[1] {
        0 => None,
        b => Some(Position { x: b / 16, y: b % 16 }),
    };
    let door = match (bytes[2], bytes[3]) {
        (0, 0) => None,
        (x, y) => Some(Position { x, y }),
    };
    Ok(LevelHeader {
        background: flags & BACKGROUND_MASK,
        wide_screen: flags & WIDE_FLAG != 0,
        bug_bits: flags >> 5,
        player,
        door,
    })
}

/// Writes the header. Byte 0 is taken as given: wide-screen and bug bits are
/// the caller's business.
pub fn encode_header(
    background_byte: u8,
    player: Option<Position>,
    door: Option<Position>,
) -> [u8; LEVEL_HEADER_LEN] {
    let player_byte = player.map_or(0, |p| p.x * 16 + p.y);
    let (door_x, door_y) = door.map_or((0, 0), |d| (d.x, d.y));
    [background_byte, player_byte, door_x, door_y]
}

fn header_byte(level: &LogicalLevel) -> u8 {
    let wide = if level.wide_screen { WIDE_FLAG } else { 0 };
    (level.bug_bits << 5) | wide | (level.background & BACKGROUND_MASK)
}

pub fn grid_width(wide_screen: bool, bug_screen: bool) -> usize {
    if wide_screen || bug_screen {
        GRID_WIDTH
    } else {
        HALF_WIDTH
    }
}

pub fn decode_tile_grid(bytes: &[u8], wide_screen: bool, bug_screen: bool) -> TileGrid {
    let width = grid_width(wide_screen, bug_screen);
    let mut grid = TileGrid::new(width == GRID_WIDTH);
    let mut pos = 0;
    for &b in bytes {
        let count = (b >> 4) as usize + 1;
        let tile = b & 0x0F;
        for _ in 0..count {
            let (x, y) = (pos % width, pos / width);
            if y < GRID_HEIGHT {
                grid.set(x, y, tile);
            }
            pos += 1;
        }
    }
    if pos > width * GRID_HEIGHT {
        warn!(
            "tile stream covers {pos} cells, grid only has {}",
            width * GRID_HEIGHT
        );
    }
    grid
}

/// Run-length encodes the grid at its own width. Runs of tile 0 are held back
/// until a non-zero run follows; whatever background is left at the end of
/// the grid is dropped, since the decoder zero-fills it anyway.
pub fn encode_tile_grid(grid: &TileGrid) -> Vec<u8> {
    let cells: Vec<u8> = grid.cells().collect();
    let mut out: Vec<u8> = Vec::new();
    let mut pending_zeros: Vec<u8> = Vec::new();
    let mut i = 0;
    while i < cells.len() {
        let tile = cells[i];
        let mut count = 1;
        while i + count < cells.len() && cells[i + count] == tile && count < MAX_RUN {
            count += 1;
        }
        let encoded = ((count - 1) << 4) as u8 | (tile & 0x0F);
        if tile == 0 {
            pending_zeros.push(encoded);
        } else {
            out.append(&mut pending_zeros);
            out.push(encoded);
        }
        i += count;
    }
    out
}

/// Decodes an enemy record. The returned `x` values are global: the
/// half-screen from bit 7 of each id is already applied.
pub fn decode_enemies(bytes: &[u8]) -> Result<Vec<Enemy>> {
    let Some(&len_byte) = bytes.first() else {
        return Err(Error::Validation("enemy record is empty".to_string()));
    };
    if len_byte <= 0x01 {
        return Ok(vec![]);
    }
    check_enemy_record(bytes)?;
    Ok(bytes[1..]
        .chunks_exact(2)
        .map(|pair| {
            let (id, pos) = (pair[0], pair[1]);
            let x = pos / 16 + (HALF_WIDTH * screen_index(id)) as u8;
            Enemy::new(id, x, pos % 16)
        })
        .collect())
}

/// Checks an enemy record's length byte against its payload.
pub fn check_enemy_record(bytes: &[u8]) -> Result<()> {
    let Some(&len_byte) = bytes.first() else {
        return Err(Error::Validation("enemy record is empty".to_string()));
    };
    if len_byte == 0x00 && bytes.len() == 1 {
        return Ok(());
    }
    if len_byte % 2 == 0 {
        return Err(Error::Validation(format!(
            "enemy length byte {len_byte:#04X} is even"
        )));
    }
    if len_byte as usize != bytes.len() {
        return Err(Error::Validation(format!(
            "enemy length byte says {len_byte} bytes but the record has {}",
            bytes.len()
        )));
    }
    Ok(())
}

/// Number of enemies an enemy record declares, from its length byte alone.
pub fn enemy_count(bytes: &[u8]) -> usize {
    match bytes.first() {
        Some(&b) if b > 0x01 => (b as usize - 1) / 2,
        _ => 0,
    }
}

pub fn encode_enemies(enemies: &[Enemy]) -> Vec<u8> {
    if enemies.is_empty() {
        return vec![0x01];
    }
    let mut out = vec![(enemies.len() * 2 + 1) as u8];
    for e in enemies {
        let second_screen = e.x as usize >= HALF_WIDTH;
        let x = if second_screen {
            e.x - HALF_WIDTH as u8
        } else {
            e.x
        };
        out.push(with_screen_bit(e.raw_id, second_screen));
        out.push(x * 16 + e.y);
    }
    out
}

pub fn to_logical(level: &Level) -> Result<LogicalLevel> {
    let data = level.data();
    let header = decode_header(data)?;
    if header.bug_bits != 0 && !header.wide_screen {
        warn!(
            "level {} has bug-screen header byte {:#04X}",
            level.index + 1,
            data[0]
        );
    }
    let tiles = decode_tile_grid(
        &data[LEVEL_HEADER_LEN..],
        header.wide_screen,
        header.bug_bits != 0,
    );
    Ok(LogicalLevel {
        background: header.background,
        wide_screen: header.wide_screen,
        bug_bits: header.bug_bits,
        tiles,
        player: header.player,
        door: header.door,
        enemies: decode_enemies(level.enemy_data())?,
    })
}

/// Returns `(map_bytes, enemy_bytes)`. The level must pass
/// [`LogicalLevel::validate`]; positions outside the grid have no byte form.
pub fn from_logical(level: &LogicalLevel) -> Result<(Vec<u8>, Vec<u8>)> {
    level.validate()?;
    let mut map_bytes = encode_header(header_byte(level), level.player, level.door).to_vec();
    map_bytes.extend(encode_tile_grid(&level.tiles));
    Ok((map_bytes, encode_enemies(&level.enemies)))
}
