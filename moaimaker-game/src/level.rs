use crate::codec::check_enemy_record;
use crate::hex::{from_hex, to_hex};
use crate::layout::{CpuAddr, FileOffset, RomLayout, LEVEL_HEADER_LEN, LEVEL_TERMINATOR};
use crate::{Error, Result};

pub const DEFAULT_MAP_DATA: [u8; 4] = [0x00, 0x88, 0x08, 0x08];
pub const DEFAULT_ENEMY_DATA: [u8; 1] = [0x01];

/// Where a level's bytes were put by the most recent layout pass.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Placement {
    pub cpu_address: CpuAddr,
    pub rom_address: FileOffset,
    pub enemy_cpu_address: CpuAddr,
    pub enemy_rom_address: FileOffset,
}

/// One stage as stored in the ROM: packed map bytes (header + tile stream)
/// and a self-length-prefixed enemy record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Level {
    /// Current position in the level order, 0-based.
    pub index: usize,
    original_index: usize,
    data: Vec<u8>,
    enemy_data: Vec<u8>,
    pub timer: u8,
    placement: Option<Placement>,
    pub modified: bool,
    /// Set when the level count drops below this level's position. The bytes
    /// are kept so raising the count again brings the level back.
    pub is_deleted: bool,
}

impl Level {
    pub fn new(index: usize, data: Vec<u8>, enemy_data: Vec<u8>) -> Self {
        Level {
            index,
            original_index: index,
            data,
            enemy_data,
            timer: crate::layout::DEFAULT_LEVEL_TIMER,
            placement: None,
            modified: false,
            is_deleted: false,
        }
    }

    /// Empty level used when the level count grows past every known level.
    pub fn default_empty(index: usize) -> Self {
        Level::new(index, DEFAULT_MAP_DATA.to_vec(), DEFAULT_ENEMY_DATA.to_vec())
    }

    pub fn original_index(&self) -> usize {
        self.original_index
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn enemy_data(&self) -> &[u8] {
        &self.enemy_data
    }

    /// Bytes this level takes up in the level-data region.
    pub fn stored_size(&self, layout: RomLayout) -> usize {
        self.data.len() + layout.level_overhead()
    }

    /// Addresses from the last layout pass. `None` until a pass has run, and
    /// again after any edit that changes the size of the level's bytes.
    pub fn placement(&self) -> Option<Placement> {
        self.placement
    }

    /// Only the layout pass should call this.
    pub fn set_placement(&mut self, placement: Option<Placement>) {
        self.placement = placement;
    }

    /// Replaces the map bytes. The level is left untouched if the bytes cannot
    /// hold a level header, or if the tile stream contains the terminator
    /// byte, which the game would stop reading at.
    pub fn set_map_bytes(&mut self, bytes: Vec<u8>) -> Result<()> {
        if bytes.len() < LEVEL_HEADER_LEN {
            return Err(Error::Format(format!(
                "map data needs at least {LEVEL_HEADER_LEN} bytes"
            )));
        }
        if let Some(p) = bytes[LEVEL_HEADER_LEN..]
            .iter()
            .position(|&b| b == LEVEL_TERMINATOR)
        {
            return Err(Error::Format(format!(
                "map byte {} is the level terminator {LEVEL_TERMINATOR:#04X}",
                LEVEL_HEADER_LEN + p
            )));
        }
        if bytes.len() != self.data.len() {
            self.placement = None;
        }
        if bytes != self.data {
            self.modified = true;
        }
        self.data = bytes;
        Ok(())
    }

    pub fn set_enemy_bytes(&mut self, bytes: Vec<u8>) -> Result<()> {
        check_enemy_record(&bytes)?;
        if bytes.len() != self.enemy_data.len() {
            self.placement = None;
        }
        if bytes != self.enemy_data {
            self.modified = true;
        }
        self.enemy_data = bytes;
        Ok(())
    }

    pub fn map_hex(&self) -> String {
        to_hex(&self.data)
    }

    pub fn enemy_hex(&self) -> String {
        to_hex(&self.enemy_data)
    }

    pub fn set_map_hex(&mut self, s: &str) -> Result<()> {
        self.set_map_bytes(from_hex(s)?)
    }

    pub fn set_enemy_hex(&mut self, s: &str) -> Result<()> {
        let bytes = from_hex(s)?;
        if bytes.is_empty() {
            return Err(Error::Format("enemy data is empty".to_string()));
        }
        self.set_enemy_bytes(bytes)
    }
}
