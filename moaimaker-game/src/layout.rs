use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString, VariantNames};

pub type FileOffset = usize; // byte offset into the iNES image, header included
pub type CpuAddr = usize; // 16-bit address as seen by the 6502 ($8000-$FFFF for PRG)

pub const HEADER_SIZE: usize = 0x10;
pub const BANK_SIZE: usize = 0x4000;
pub const CPU_PRG_BASE: CpuAddr = 0x8000;
pub const CPU_PRG_END: CpuAddr = 0x10000;

pub const LAYOUT_DETECT_OFFSET: FileOffset = 6;
pub const EXPANDED_MAPPER_BYTE: u8 = 0x21;
pub const EXPANDED_HEADER_BYTES: [u8; 4] = [0x08, 0x00, 0x21, 0x00]; // header bytes 4..8

pub const LEVEL_COUNT_OFFSET: FileOffset = 0x0BD3;
pub const ENEMY_POINTER_OFFSET: FileOffset = 0x33D9;

// CHR data occupies the same file range in both layouts: expansion moves it
// into PRG banks 2-3, which start exactly where the CHR-ROM used to.
pub const CHR_START: FileOffset = 0x8010;
pub const CHR_END: FileOffset = 0x10010;

pub const MAX_LEVEL_COUNT: usize = 127;
pub const MAX_TOTAL_ENEMIES: usize = 78;
pub const LEVEL_HEADER_LEN: usize = 4;
pub const LEVEL_TERMINATOR: u8 = 0xFF;
pub const DEFAULT_LEVEL_TIMER: u8 = 0x50;

/// Levels 7 and 8 are played by the attract-mode demo, so slots below this
/// count must always resolve to valid data.
pub const DEMO_LEVEL_SLOTS: usize = 8;

const ORIGINAL_IMAGE_SIZE: usize = HEADER_SIZE + 2 * BANK_SIZE + (CHR_END - CHR_START);
const EXPANDED_IMAGE_SIZE: usize = HEADER_SIZE + 8 * BANK_SIZE;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Region {
    pub start: FileOffset,
    pub end: FileOffset,
}

impl Region {
    pub const fn new(start: FileOffset, end: FileOffset) -> Self {
        Region { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn contains(&self, offset: FileOffset) -> bool {
        (self.start..self.end).contains(&offset)
    }
}

/// Which cartridge variant a loaded image is. Detected once from the header
/// and fixed for the lifetime of the image.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    VariantNames,
    Serialize,
    Deserialize,
)]
pub enum RomLayout {
    Original,
    Expanded,
}

impl RomLayout {
    pub fn detect(header: &[u8]) -> RomLayout {
        match header.get(LAYOUT_DETECT_OFFSET) {
            Some(&EXPANDED_MAPPER_BYTE) => RomLayout::Expanded,
            _ => RomLayout::Original,
        }
    }

    pub fn image_size(self) -> usize {
        match self {
            RomLayout::Original => ORIGINAL_IMAGE_SIZE,
            RomLayout::Expanded => EXPANDED_IMAGE_SIZE,
        }
    }

    pub fn prg_bank_count(self) -> usize {
        match self {
            RomLayout::Original => 2,
            RomLayout::Expanded => 8,
        }
    }

    /// Bank mapped at $8000 by default.
    pub fn part1_bank(self) -> usize {
        0
    }

    /// Bank seen at $C000. In the expanded image this is the appended last
    /// bank that carries the original second bank's code.
    pub fn part2_bank(self) -> usize {
        match self {
            RomLayout::Original => 1,
            RomLayout::Expanded => 7,
        }
    }

    /// Distance the original second bank moved when the image was expanded.
    pub fn legacy_displacement(self) -> usize {
        match self {
            RomLayout::Original => 0,
            RomLayout::Expanded => (self.part2_bank() - 1) * BANK_SIZE,
        }
    }

    pub fn max_level_count(self) -> usize {
        match self {
            RomLayout::Original => MAX_LEVEL_COUNT.min(self.level_table().len() / 2),
            RomLayout::Expanded => MAX_LEVEL_COUNT,
        }
    }

    pub fn level_table(self) -> Region {
        match self {
            RomLayout::Original => Region::new(0x5841, 0x59B0),
            RomLayout::Expanded => Region::new(0x4010, 0x4110),
        }
    }

    pub fn level_data(self) -> Region {
        match self {
            RomLayout::Original => Region::new(0x5A3D, 0x7F93),
            RomLayout::Expanded => Region::new(0x10010, 0x14010),
        }
    }

    /// Bank the level data is read from at runtime.
    pub fn level_data_bank(self) -> usize {
        match self {
            RomLayout::Original => 1,
            RomLayout::Expanded => 4,
        }
    }

    /// Length of the enemy-data region. The original image locates its start
    /// through the enemy-base pointer; the expanded one has a fixed region.
    pub fn enemy_data_len(self) -> usize {
        match self {
            RomLayout::Original => 0x11C,
            RomLayout::Expanded => 0x7F10 - 0x4410,
        }
    }

    /// Fixed enemy-data region, if the layout has one.
    pub fn enemy_data(self) -> Option<Region> {
        match self {
            RomLayout::Original => None,
            RomLayout::Expanded => Some(Region::new(0x4410, 0x7F10)),
        }
    }

    pub fn enemy_data_bank(self) -> usize {
        1
    }

    pub fn enemy_table(self) -> Option<Region> {
        match self {
            RomLayout::Original => None,
            RomLayout::Expanded => Some(Region::new(0x4310, 0x4410)),
        }
    }

    pub fn timer_table(self) -> Option<Region> {
        match self {
            RomLayout::Original => None,
            RomLayout::Expanded => Some(Region::new(0x7F10, 0x7F90)),
        }
    }

    /// Bytes a level occupies in the level-data region besides its own data:
    /// the 0xFF terminator. The relocated tile loader in an expanded image
    /// still stops on it, so both layouts carry one.
    pub fn level_overhead(self) -> usize {
        1
    }

    /// Upper bound on a level's stored size, header included. One RLE byte
    /// per cell of a wide grid is the worst case the encoder can produce.
    pub fn max_level_len(self) -> usize {
        match self {
            RomLayout::Original => self.level_data().len() - self.level_overhead(),
            RomLayout::Expanded => LEVEL_HEADER_LEN + crate::GRID_HEIGHT * crate::GRID_WIDTH,
        }
    }

    /// Free ROM space the capacity-expansion routines are placed into.
    pub fn fragment_space(self) -> Option<Region> {
        match self {
            RomLayout::Original => None,
            RomLayout::Expanded => Some(Region::new(0x1EF90, 0x1FF93)),
        }
    }
}
