// Synthesised images. The commercial ROM cannot be distributed, so tests
// build an original-layout image with the same table, pointer and region
// positions and fill it with levels made through the codec.

#![allow(dead_code)]

use moaimaker::Rom;
use moaimaker_game::codec::from_logical;
use moaimaker_game::layout::{
    ENEMY_POINTER_OFFSET, HEADER_SIZE, LEVEL_COUNT_OFFSET, LEVEL_TERMINATOR,
};
use moaimaker_game::{Enemy, LogicalLevel, Position, RomLayout};

pub const LEVEL_BASE: usize = 0x5A3D;
pub const ENEMY_BASE: usize = 0x5500;

/// CPU address of a file offset in the fixed upper bank of an original image.
pub fn upper_bank_cpu(offset: usize) -> u16 {
    (offset - HEADER_SIZE - 0x4000 + 0xC000) as u16
}

pub fn sample_level(seed: u8) -> LogicalLevel {
    let wide = seed % 2 == 1;
    let mut level = LogicalLevel::new(seed % 12, wide);
    let width = level.grid_width();
    for x in 0..width {
        level.tiles.set(x, 13, 0x01);
    }
    for y in 3..(6 + seed as usize % 5) {
        level.tiles.set((seed as usize * 3) % width, y, 0x02);
    }
    level.tiles.set(5, 10, 0x0F);
    level.player = Some(Position { x: 2, y: 12 });
    level.door = Some(Position {
        x: (width - 3) as u8,
        y: 11,
    });
    let enemies = (seed % 4) as usize;
    for i in 0..enemies {
        level
            .enemies
            .push(Enemy::new(0x01 + i as u8, 4 + 4 * i as u8, 12));
    }
    level
}

pub fn sample_levels(n: u8) -> Vec<(Vec<u8>, Vec<u8>)> {
    (0..n)
        .map(|seed| from_logical(&sample_level(seed)).unwrap())
        .collect()
}

pub fn original_image(levels: &[(Vec<u8>, Vec<u8>)]) -> Vec<u8> {
    let layout = RomLayout::Original;
    let mut rom = Rom::new((0..layout.image_size()).map(|i| (i * 7 % 253) as u8).collect());
    rom.write_n(0, b"NES\x1A\x02\x04\x31\x00").unwrap();
    // Empty regions, as the real image has them.
    rom.fill(layout.level_table(), 0).unwrap();
    rom.fill(layout.level_data(), 0).unwrap();
    rom.fill(
        moaimaker_game::Region::new(ENEMY_BASE, ENEMY_BASE + layout.enemy_data_len()),
        0,
    )
    .unwrap();
    rom.fill(moaimaker_game::Region::new(0x8C50, 0x8C50 + 0x3A0), 0)
        .unwrap();

    rom.write_u8(LEVEL_COUNT_OFFSET, levels.len() as u8 + 1).unwrap();
    rom.write_u16(ENEMY_POINTER_OFFSET, upper_bank_cpu(ENEMY_BASE))
        .unwrap();
    let table = layout.level_table().start;
    let (mut at, mut enemy_at) = (LEVEL_BASE, ENEMY_BASE);
    for (i, (data, enemies)) in levels.iter().enumerate() {
        rom.write_u16(table + 2 * i, upper_bank_cpu(at)).unwrap();
        rom.write_n(at, data).unwrap();
        rom.write_u8(at + data.len(), LEVEL_TERMINATOR).unwrap();
        at += data.len() + 1;
        rom.write_n(enemy_at, enemies).unwrap();
        enemy_at += enemies.len();
    }
    rom.data
}
