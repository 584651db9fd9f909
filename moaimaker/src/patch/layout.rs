use log::{debug, info, warn};
use moaimaker_game::codec::{self, enemy_count};
use moaimaker_game::layout::{
    Region, BANK_SIZE, DEFAULT_LEVEL_TIMER, DEMO_LEVEL_SLOTS, ENEMY_POINTER_OFFSET, HEADER_SIZE,
    LEVEL_COUNT_OFFSET, LEVEL_HEADER_LEN, LEVEL_TERMINATOR, MAX_TOTAL_ENEMIES,
};
use moaimaker_game::{
    CapacityError, Error, FileOffset, Level, LogicalLevel, Placement, Result, RomLayout,
};
use serde::Serialize;

use super::address::AddressTranslator;
use super::romfix;
use super::Rom;

/// Slots from here up to `DEMO_LEVEL_SLOTS` are played by the attract-mode
/// demo and get redirected to level 1 when they are not active.
const DEMO_FIRST_SLOT: usize = DEMO_LEVEL_SLOTS - 2;

/// Bytes used and available in the two variable-size regions.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub level_data_used: usize,
    pub level_data_capacity: usize,
    pub enemy_data_used: usize,
    pub enemy_data_capacity: usize,
    pub enemy_count: usize,
    pub max_enemies: usize,
}

/// The ordered level set of one loaded image, together with the image it
/// came from. Levels past `level_count` are soft-deleted: they keep their
/// bytes and slot but are not written out.
#[derive(Clone)]
pub struct LayoutStore {
    layout: RomLayout,
    translator: AddressTranslator,
    rom: Rom,
    levels: Vec<Level>,
    level_count: usize,
    level_base: FileOffset,
    enemy_base: FileOffset,
}

fn format_err(e: Error, what: &str) -> Error {
    Error::Format(format!("{what}: {e}"))
}

/// Parses an image into its layout and active levels.
pub fn parse_rom(bytes: &[u8]) -> Result<(RomLayout, Vec<Level>)> {
    let store = LayoutStore::parse(bytes.to_vec())?;
    Ok((store.layout, store.levels))
}

impl LayoutStore {
    pub fn parse(bytes: Vec<u8>) -> Result<Self> {
        let layout = RomLayout::detect(&bytes);
        if bytes.len() < layout.image_size() {
            return Err(Error::Format(format!(
                "image is {:#X} bytes, a {layout} image needs {:#X}",
                bytes.len(),
                layout.image_size()
            )));
        }
        let t = AddressTranslator::new(layout);
        let rom = Rom::new(bytes);

        let stored_count = rom.read_u8(LEVEL_COUNT_OFFSET)? as usize;
        let max = layout.max_level_count();
        if stored_count < 2 || stored_count - 1 > max {
            return Err(Error::Format(format!(
                "level count byte {stored_count:#04X} is outside 1..={max}"
            )));
        }
        let count = stored_count - 1;

        let table = layout.level_table();
        let data_region = layout.level_data();
        let mut addrs: Vec<FileOffset> = Vec::with_capacity(count);
        for i in 0..count {
            let cpu = rom.read_u16(table.start + 2 * i)? as usize;
            let offset = t
                .file_offset(cpu, Some(layout.level_data_bank()))
                .map_err(|e| format_err(e, &format!("level {} address", i + 1)))?;
            if !(table.end..data_region.end).contains(&offset) {
                return Err(Error::Format(format!(
                    "level {} starts at {offset:#X}, outside the level data",
                    i + 1
                )));
            }
            addrs.push(offset);
        }

        // The original image packs its first level right after some code that
        // the fixes zero out; anything below the region start gets moved up on
        // the next build.
        let level_base = addrs[0].max(data_region.start);
        let enemy_base = match layout.enemy_data() {
            Some(region) => region.start,
            None => {
                let cpu = rom.read_u16(ENEMY_POINTER_OFFSET)? as usize;
                t.file_offset(cpu, Some(layout.enemy_data_bank()))
                    .map_err(|e| format_err(e, "enemy data pointer"))?
            }
        };

        let mut store = LayoutStore {
            layout,
            translator: t,
            rom,
            levels: Vec::with_capacity(count),
            level_count: count,
            level_base,
            enemy_base,
        };
        let enemy_region = store.enemy_region();
        if enemy_region.end > HEADER_SIZE + layout.prg_bank_count() * BANK_SIZE {
            return Err(Error::Format(format!(
                "enemy data at {:#X} runs past the program data",
                enemy_region.start
            )));
        }

        let mut enemy_cursor = enemy_region.start;
        for (i, &start) in addrs.iter().enumerate() {
            let data = store.read_level_data(&addrs, i)?;
            let enemy_data = store.read_enemy_record(enemy_cursor, enemy_region, i)?;
            let mut level = Level::new(i, data, enemy_data);
            if let Some(timers) = layout.timer_table() {
                level.timer = store.rom.read_u8(timers.start + i)?;
            }
            level.set_placement(Some(Placement {
                cpu_address: t.cpu_address(start)?,
                rom_address: start,
                enemy_cpu_address: t.cpu_address(enemy_cursor)?,
                enemy_rom_address: enemy_cursor,
            }));
            enemy_cursor += level.enemy_data().len();
            store.levels.push(level);
        }

        info!(
            "parsed {layout} image: {count} levels, level data at {:#X}, enemy data at {:#X}",
            store.level_base, store.enemy_base
        );
        Ok(store)
    }

    fn read_level_data(&self, addrs: &[FileOffset], i: usize) -> Result<Vec<u8>> {
        let start = addrs[i];
        let region_end = self.layout.level_data().end;
        let end = match addrs.get(i + 1) {
            Some(&next) if next > start => next.min(region_end),
            _ => region_end,
        };
        if start + LEVEL_HEADER_LEN > end {
            return Err(Error::Format(format!(
                "level {} at {start:#X} has no room for its header",
                i + 1
            )));
        }
        let end = end.min(start + self.layout.max_level_len() + self.layout.level_overhead());
        let window = self.rom.read_n(start, end - start)?;
        if let Some(p) = window[LEVEL_HEADER_LEN..]
            .iter()
            .position(|&b| b == LEVEL_TERMINATOR)
        {
            return Ok(window[..LEVEL_HEADER_LEN + p].to_vec());
        }
        warn!("level {} at {start:#X} has no terminator", i + 1);
        let mut data = window[..window.len().min(self.layout.max_level_len())].to_vec();
        if self.layout == RomLayout::Expanded {
            // Unterminated slots are zero-filled past the stream.
            while data.len() > LEVEL_HEADER_LEN && data.last() == Some(&0) {
                data.pop();
            }
        }
        Ok(data)
    }

    fn read_enemy_record(&self, at: FileOffset, region: Region, i: usize) -> Result<Vec<u8>> {
        let len_byte = self.rom.read_u8(at)?;
        let len = match len_byte {
            0x00 | 0x01 => 1,
            b => b as usize,
        };
        if at + len > region.end {
            return Err(Error::Format(format!(
                "enemy record of level {} at {at:#X} runs past {:#X}",
                i + 1,
                region.end
            )));
        }
        if len_byte > 0x01 && len_byte % 2 == 0 {
            warn!(
                "level {} enemy length byte {len_byte:#04X} is even",
                i + 1
            );
        }
        Ok(self.rom.read_n(at, len)?.to_vec())
    }

    pub fn layout(&self) -> RomLayout {
        self.layout
    }

    pub fn translator(&self) -> &AddressTranslator {
        &self.translator
    }

    pub fn rom(&self) -> &Rom {
        &self.rom
    }

    pub fn level_count(&self) -> usize {
        self.level_count
    }

    /// Every level, soft-deleted ones included.
    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn active_levels(&self) -> &[Level] {
        &self.levels[..self.level_count]
    }

    pub fn level(&self, index: usize) -> Option<&Level> {
        self.active_levels().get(index)
    }

    /// Direct access for byte-level edits. A size change clears the level's
    /// placement until the next `relayout`.
    pub fn level_mut(&mut self, index: usize) -> Option<&mut Level> {
        self.levels[..self.level_count].get_mut(index)
    }

    pub fn logical_level(&self, index: usize) -> Result<LogicalLevel> {
        let level = self.level(index).ok_or_else(|| self.bad_index(index))?;
        codec::to_logical(level)
    }

    fn bad_index(&self, index: usize) -> Error {
        Error::Validation(format!(
            "level index {index} is outside 0..{}",
            self.level_count
        ))
    }

    fn enemy_region(&self) -> Region {
        match self.layout.enemy_data() {
            Some(region) => region,
            None => Region::new(
                self.enemy_base,
                self.enemy_base + self.layout.enemy_data_len(),
            ),
        }
    }

    // Demo padding: in the original layout, level 1's record is repeated
    // until the demo slots have a record each.
    fn demo_enemy_padding(&self) -> usize {
        match self.layout {
            RomLayout::Original if self.level_count < DEMO_LEVEL_SLOTS => {
                DEMO_LEVEL_SLOTS + 1 - self.level_count
            }
            _ => 0,
        }
    }

    fn enemy_bytes_needed(&self) -> usize {
        let active = self.active_levels();
        let records: usize = active.iter().map(|l| l.enemy_data().len()).sum();
        records + self.demo_enemy_padding() * active[0].enemy_data().len()
    }

    pub fn usage(&self) -> Usage {
        let data_end = self.layout.level_data().end;
        Usage {
            level_data_used: self
                .active_levels()
                .iter()
                .map(|l| l.stored_size(self.layout))
                .sum(),
            level_data_capacity: data_end - self.level_base,
            enemy_data_used: self.enemy_bytes_needed(),
            enemy_data_capacity: self.enemy_region().len(),
            enemy_count: self
                .active_levels()
                .iter()
                .map(|l| enemy_count(l.enemy_data()))
                .sum(),
            max_enemies: MAX_TOTAL_ENEMIES,
        }
    }

    /// Recomputes every active level's addresses from the current order and
    /// sizes. Either all placements are updated or, on error, none are.
    pub fn relayout(&mut self) -> Result<()> {
        let layout = self.layout;
        let count = self.level_count;

        let table = layout.level_table();
        if count * 2 > table.len() {
            return Err(CapacityError::AddressTable {
                count,
                needed: count * 2,
                available: table.len(),
            }
            .into());
        }
        let usage = self.usage();
        if usage.enemy_count > MAX_TOTAL_ENEMIES {
            return Err(CapacityError::EnemyCount {
                count: usage.enemy_count,
                max: MAX_TOTAL_ENEMIES,
            }
            .into());
        }

        let data_end = layout.level_data().end;
        let mut placements: Vec<(FileOffset, usize)> = Vec::with_capacity(count);
        let mut cursor = self.level_base;
        for (i, level) in self.active_levels().iter().enumerate() {
            let size = level.stored_size(layout);
            let limit = data_end.min(cursor + layout.max_level_len() + layout.level_overhead());
            let end = cursor + size;
            if end > limit {
                return Err(CapacityError::LevelData {
                    level: i + 1,
                    end,
                    limit,
                }
                .into());
            }
            placements.push((cursor, 0));
            cursor = end;
        }

        let enemy_region = self.enemy_region();
        if usage.enemy_data_used > enemy_region.len() {
            return Err(CapacityError::EnemyData {
                needed: usage.enemy_data_used,
                available: enemy_region.len(),
            }
            .into());
        }
        let mut enemy_cursor = enemy_region.start;
        for (slot, level) in placements.iter_mut().zip(self.active_levels()) {
            slot.1 = enemy_cursor;
            enemy_cursor += level.enemy_data().len();
        }

        let mut resolved: Vec<Placement> = Vec::with_capacity(count);
        for &(rom_address, enemy_rom_address) in &placements {
            resolved.push(Placement {
                cpu_address: self.translator.cpu_address(rom_address)?,
                rom_address,
                enemy_cpu_address: self.translator.cpu_address(enemy_rom_address)?,
                enemy_rom_address,
            });
        }

        for (i, level) in self.levels.iter_mut().enumerate() {
            level.set_placement(resolved.get(i).copied());
        }
        debug!(
            "relayout: {count} levels, level data {:#X}..{cursor:#X}, enemy data {:#X}..{enemy_cursor:#X}",
            self.level_base, enemy_region.start
        );
        Ok(())
    }

    fn placement_of(&self, index: usize) -> Result<Placement> {
        self.levels[index].placement().ok_or_else(|| {
            Error::LayoutInvariant(format!("level {} has no placement after relayout", index + 1))
        })
    }

    fn write_levels(&self, rom: &mut Rom) -> Result<()> {
        let layout = self.layout;
        let count = self.level_count;
        let table = layout.level_table();
        let enemy_region = self.enemy_region();

        rom.fill(table, 0x00)?;
        rom.fill(Region::new(self.level_base, layout.level_data().end), 0x00)?;
        rom.fill(enemy_region, 0x00)?;
        if let Some(enemy_table) = layout.enemy_table() {
            rom.fill(enemy_table, 0x00)?;
        }
        if let Some(timers) = layout.timer_table() {
            rom.fill(timers, DEFAULT_LEVEL_TIMER)?;
        }

        rom.write_u8(LEVEL_COUNT_OFFSET, (count + 1) as u8)?;
        let mut enemy_end = enemy_region.start;
        for (i, level) in self.active_levels().iter().enumerate() {
            let p = self.placement_of(i)?;
            rom.write_u16(table.start + 2 * i, p.cpu_address as u16)?;
            rom.write_n(p.rom_address, level.data())?;
            rom.write_u8(p.rom_address + level.data().len(), LEVEL_TERMINATOR)?;
            rom.write_n(p.enemy_rom_address, level.enemy_data())?;
            enemy_end = p.enemy_rom_address + level.enemy_data().len();
            if let Some(enemy_table) = layout.enemy_table() {
                rom.write_u16(enemy_table.start + 2 * i, p.enemy_cpu_address as u16)?;
            }
            if let Some(timers) = layout.timer_table() {
                rom.write_u8(timers.start + i, level.timer)?;
            }
        }

        // Demo slots
        let first = self.placement_of(0)?;
        for slot in count.max(DEMO_FIRST_SLOT)..DEMO_LEVEL_SLOTS {
            rom.write_u16(table.start + 2 * slot, first.cpu_address as u16)?;
            if let Some(enemy_table) = layout.enemy_table() {
                rom.write_u16(enemy_table.start + 2 * slot, first.enemy_cpu_address as u16)?;
            }
        }
        let first_record = self.levels[0].enemy_data();
        for _ in 0..self.demo_enemy_padding() {
            rom.write_n(enemy_end, first_record)?;
            enemy_end += first_record.len();
        }
        Ok(())
    }

    /// Lays out the levels and writes them into a copy of the image. The
    /// copy becomes the store's image and is returned.
    pub fn build(&mut self) -> Result<Vec<u8>> {
        self.relayout()?;
        let mut rom = self.rom.clone();
        rom.enable_tracking();
        self.write_levels(&mut rom)?;
        for (start, end) in rom.get_modified_ranges() {
            debug!("wrote {start:#X}..{end:#X}");
        }
        info!(
            "built {} image with {} levels",
            self.layout, self.level_count
        );
        for level in &mut self.levels {
            level.modified = false;
        }
        let out = rom.data.clone();
        self.rom = rom;
        Ok(out)
    }

    /// An image holding only `level`, as level 1. The store is unchanged.
    pub fn build_preview(&self, level: &Level) -> Result<Vec<u8>> {
        let mut level = level.clone();
        level.index = 0;
        level.is_deleted = false;
        let mut preview = self.clone();
        preview.levels = vec![level];
        preview.level_count = 1;
        preview.build()
    }

    fn reindex(&mut self) {
        let count = self.level_count;
        for (i, level) in self.levels.iter_mut().enumerate() {
            level.index = i;
            level.is_deleted = i >= count;
        }
    }

    // Runs `edit`, then relayouts. If either fails, the level set is put
    // back the way it was.
    fn transact(&mut self, edit: impl FnOnce(&mut Self) -> Result<()>) -> Result<()> {
        let saved_levels = self.levels.clone();
        let saved_count = self.level_count;
        let result = edit(self).and_then(|()| {
            self.reindex();
            self.relayout()
        });
        if result.is_err() {
            self.levels = saved_levels;
            self.level_count = saved_count;
        }
        result
    }

    pub fn move_level(&mut self, from: usize, to: usize) -> Result<()> {
        if from >= self.level_count {
            return Err(self.bad_index(from));
        }
        if to >= self.level_count {
            return Err(self.bad_index(to));
        }
        self.transact(|store| {
            let level = store.levels.remove(from);
            store.levels.insert(to, level);
            Ok(())
        })?;
        info!("moved level {} to {}", from + 1, to + 1);
        Ok(())
    }

    /// Changes how many levels are active. Shrinking soft-deletes the levels
    /// past `count`; growing brings them back, then adds empty levels.
    pub fn set_level_count(&mut self, count: usize) -> Result<()> {
        let max = self.layout.max_level_count();
        if !(1..=max).contains(&count) {
            return Err(CapacityError::LevelCount { count, max }.into());
        }
        self.transact(|store| {
            while store.levels.len() < count {
                let index = store.levels.len();
                store.levels.push(Level::default_empty(index));
            }
            store.level_count = count;
            Ok(())
        })?;
        info!("level count set to {count}");
        Ok(())
    }

    /// Replaces a level's bytes with the encoding of `logical`.
    pub fn set_level_from_logical(&mut self, index: usize, logical: &LogicalLevel) -> Result<()> {
        if index >= self.level_count {
            return Err(self.bad_index(index));
        }
        let (map, enemies) = codec::from_logical(logical)?;
        self.transact(|store| {
            let level = &mut store.levels[index];
            level.set_map_bytes(map)?;
            level.set_enemy_bytes(enemies)
        })
    }

    /// Applies the fixed bug-fix patches to the store's image.
    pub fn apply_fixes(&mut self) -> Result<()> {
        romfix::apply_fixed_patches(&mut self.rom, self.layout)
    }

    /// Converts the image to the expanded layout and lays the current levels
    /// out in the new regions. On error the store is unchanged.
    pub fn expand(&mut self) -> Result<()> {
        let layout = RomLayout::Expanded;
        let rom = romfix::expand(&self.rom)?;
        let mut next = self.clone();
        next.layout = layout;
        next.translator = AddressTranslator::new(layout);
        next.rom = rom;
        next.level_base = layout.level_data().start;
        next.enemy_base = next.enemy_region().start;
        next.relayout()?;
        *self = next;
        info!("expanded image to {} levels max", layout.max_level_count());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moaimaker_game::layout::EXPANDED_MAPPER_BYTE;

    const LEVEL_BASE: FileOffset = 0x5A3D;
    const ENEMY_BASE: FileOffset = 0x5500;

    fn cpu(offset: FileOffset) -> u16 {
        (offset - HEADER_SIZE - BANK_SIZE + 0xC000) as u16
    }

    fn original_image(levels: &[(&[u8], &[u8])]) -> Vec<u8> {
        let mut rom = Rom::new(vec![0; RomLayout::Original.image_size()]);
        rom.write_n(0, b"NES\x1A\x02\x04\x31\x00").unwrap();
        rom.write_u8(LEVEL_COUNT_OFFSET, levels.len() as u8 + 1).unwrap();
        rom.write_u16(ENEMY_POINTER_OFFSET, cpu(ENEMY_BASE)).unwrap();
        let table = RomLayout::Original.level_table().start;
        let (mut at, mut enemy_at) = (LEVEL_BASE, ENEMY_BASE);
        for (i, (data, enemies)) in levels.iter().enumerate() {
            rom.write_u16(table + 2 * i, cpu(at)).unwrap();
            rom.write_n(at, data).unwrap();
            rom.write_u8(at + data.len(), LEVEL_TERMINATOR).unwrap();
            at += data.len() + 1;
            rom.write_n(enemy_at, enemies).unwrap();
            enemy_at += enemies.len();
        }
        rom.data
    }

    fn sample_store() -> LayoutStore {
        let bytes = original_image(&[
            (&[0x03, 0x10, 0x02, 0x03, 0xF1, 0x22], &[0x03, 0x01, 0xDD]),
            (&[0x11, 0x25, 0x06, 0x07, 0xF0, 0xF0, 0x31], &[0x01]),
            (&[0x05, 0x42, 0x08, 0x09], &[0x05, 0x02, 0x33, 0x81, 0x44]),
        ]);
        LayoutStore::parse(bytes).unwrap()
    }

    #[test]
    fn parse_reads_levels_and_enemies() {
        let store = sample_store();
        assert_eq!(store.layout(), RomLayout::Original);
        assert_eq!(store.level_count(), 3);
        let levels = store.active_levels();
        assert_eq!(levels[0].data(), &[0x03, 0x10, 0x02, 0x03, 0xF1, 0x22]);
        assert_eq!(levels[1].data(), &[0x11, 0x25, 0x06, 0x07, 0xF0, 0xF0, 0x31]);
        assert_eq!(levels[2].data(), &[0x05, 0x42, 0x08, 0x09]);
        assert_eq!(levels[2].enemy_data(), &[0x05, 0x02, 0x33, 0x81, 0x44]);
        let p = levels[1].placement().unwrap();
        assert_eq!(p.rom_address, LEVEL_BASE + 7);
        assert_eq!(p.cpu_address, cpu(LEVEL_BASE + 7) as usize);
        assert_eq!(p.enemy_rom_address, ENEMY_BASE + 3);
    }

    #[test]
    fn parse_rejects_bad_count() {
        let mut bytes = original_image(&[(&[0x03, 0x10, 0x02, 0x03], &[0x01])]);
        bytes[LEVEL_COUNT_OFFSET] = 1;
        assert!(matches!(LayoutStore::parse(bytes.clone()), Err(Error::Format(_))));
        bytes[LEVEL_COUNT_OFFSET] = 200;
        assert!(matches!(LayoutStore::parse(bytes), Err(Error::Format(_))));
        assert!(matches!(LayoutStore::parse(vec![0; 64]), Err(Error::Format(_))));
    }

    #[test]
    fn build_round_trips() {
        let mut store = sample_store();
        let before: Vec<Level> = store.active_levels().to_vec();
        let bytes = store.build().unwrap();
        let (layout, levels) = parse_rom(&bytes).unwrap();
        assert_eq!(layout, RomLayout::Original);
        assert_eq!(levels.len(), 3);
        for (a, b) in before.iter().zip(&levels) {
            assert_eq!(a.data(), b.data());
            assert_eq!(a.enemy_data(), b.enemy_data());
            assert_eq!(a.placement(), b.placement());
        }
    }

    #[test]
    fn build_points_demo_slots_at_first_level() {
        let mut store = sample_store();
        let bytes = store.build().unwrap();
        let table = RomLayout::Original.level_table().start;
        let first = cpu(LEVEL_BASE);
        for slot in 6..8 {
            let entry = u16::from_le_bytes([bytes[table + 2 * slot], bytes[table + 2 * slot + 1]]);
            assert_eq!(entry, first);
        }
        assert_eq!(bytes[table + 2 * 5], 0);
        // 3 records + 6 copies of level 1's.
        let end = ENEMY_BASE + 3 + 1 + 5;
        for copy in 0..6 {
            let at = end + 3 * copy;
            assert_eq!(bytes[at..at + 3], [0x03, 0x01, 0xDD]);
        }
        assert_eq!(bytes[end + 18], 0);
    }

    #[test]
    fn relayout_overflow_leaves_placements() {
        let mut store = sample_store();
        let before: Vec<Option<Placement>> =
            store.active_levels().iter().map(|l| l.placement()).collect();
        let mut big = vec![0x03, 0x10, 0x02, 0x03];
        big.resize(RomLayout::Original.level_data().len(), 0x21);
        store.level_mut(0).unwrap().set_map_bytes(big).unwrap();
        let err = store.relayout().unwrap_err();
        assert!(matches!(err, Error::Capacity(CapacityError::LevelData { level: 1, .. })));
        assert!(store.level(0).unwrap().placement().is_none());
        assert_eq!(store.level(1).unwrap().placement(), before[1]);
        assert_eq!(store.level(2).unwrap().placement(), before[2]);
    }

    #[test]
    fn too_many_enemies_rejected() {
        let mut store = sample_store();
        store.set_level_count(10).unwrap();
        let mut eight = vec![17u8];
        for i in 0..8u8 {
            eight.extend([0x01, 0x20 + i]);
        }
        for i in 0..10 {
            store.level_mut(i).unwrap().set_enemy_bytes(eight.clone()).unwrap();
        }
        assert!(matches!(
            store.relayout(),
            Err(Error::Capacity(CapacityError::EnemyCount { count: 80, max: 78 }))
        ));
    }

    #[test]
    fn level_count_soft_deletes_and_restores() {
        let mut store = sample_store();
        store.set_level_count(1).unwrap();
        assert_eq!(store.levels().len(), 3);
        assert!(store.levels()[2].is_deleted);
        assert!(store.levels()[1].placement().is_none());

        store.set_level_count(4).unwrap();
        assert_eq!(store.levels()[2].data(), &[0x05, 0x42, 0x08, 0x09]);
        assert!(!store.levels()[2].is_deleted);
        assert_eq!(store.levels()[3].data(), &[0x00, 0x88, 0x08, 0x08]);
        assert!(store.level(3).unwrap().placement().is_some());

        assert!(matches!(
            store.set_level_count(0),
            Err(Error::Capacity(CapacityError::LevelCount { .. }))
        ));
        assert!(matches!(
            store.set_level_count(128),
            Err(Error::Capacity(CapacityError::LevelCount { count: 128, max: 127 }))
        ));
        assert_eq!(store.level_count(), 4);
    }

    #[test]
    fn move_level_reindexes() {
        let mut store = sample_store();
        store.move_level(2, 0).unwrap();
        let levels = store.active_levels();
        assert_eq!(levels[0].data(), &[0x05, 0x42, 0x08, 0x09]);
        assert_eq!(levels[0].original_index(), 2);
        assert_eq!(
            levels.iter().map(|l| l.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(levels[0].placement().unwrap().rom_address, LEVEL_BASE);
        assert_eq!(levels[1].placement().unwrap().rom_address, LEVEL_BASE + 5);
        assert!(matches!(store.move_level(0, 3), Err(Error::Validation(_))));
    }

    #[test]
    fn logical_edit_goes_through_codec() {
        let mut store = sample_store();
        let mut logical = store.logical_level(1).unwrap();
        logical.tiles.set(4, 5, 0x02);
        store.set_level_from_logical(1, &logical).unwrap();
        assert_eq!(store.logical_level(1).unwrap(), logical);
        assert!(store.level(1).unwrap().modified);

        logical.tiles.set(0, 0, 0x02);
        assert!(store.set_level_from_logical(1, &logical).is_err());
    }

    #[test]
    fn preview_holds_one_level() {
        let store = sample_store();
        let level = store.level(2).unwrap().clone();
        let bytes = store.build_preview(&level).unwrap();
        let (_, levels) = parse_rom(&bytes).unwrap();
        assert_eq!(levels.len(), 1);
        assert_eq!(levels[0].data(), level.data());
        assert_eq!(store.level_count(), 3);
    }

    #[test]
    fn expand_then_parse() {
        let mut store = sample_store();
        store.expand().unwrap();
        assert_eq!(store.layout(), RomLayout::Expanded);
        let bytes = store.build().unwrap();
        assert_eq!(bytes[6], EXPANDED_MAPPER_BYTE);
        // The relocated loader stops on the terminator, so every level needs
        // one before the next level's header.
        let levels = store.active_levels();
        for (i, level) in levels.iter().enumerate() {
            let p = level.placement().unwrap();
            let end = p.rom_address + level.data().len();
            assert_eq!(bytes[p.rom_address..end], *level.data());
            assert_eq!(bytes[end], LEVEL_TERMINATOR, "level {}", i + 1);
            if let Some(next) = levels.get(i + 1) {
                assert_eq!(next.placement().unwrap().rom_address, end + 1);
            }
        }
        assert_eq!(store.usage().level_data_used, 7 + 8 + 5);
        let reparsed = LayoutStore::parse(bytes).unwrap();
        assert_eq!(reparsed.layout(), RomLayout::Expanded);
        for (a, b) in store.active_levels().iter().zip(reparsed.active_levels()) {
            assert_eq!(a.data(), b.data());
            assert_eq!(a.enemy_data(), b.enemy_data());
            assert_eq!(b.timer, DEFAULT_LEVEL_TIMER);
        }
        let p = reparsed.level(0).unwrap().placement().unwrap();
        assert_eq!(p.rom_address, 0x10010);
        assert_eq!(p.cpu_address, 0x8000);
        assert_eq!(p.enemy_cpu_address, 0x8400);
    }

    #[test]
    fn usage_counts_demo_padding() {
        let store = sample_store();
        let usage = store.usage();
        assert_eq!(usage.level_data_used, 7 + 8 + 5);
        assert_eq!(usage.enemy_data_used, 9 + 6 * 3);
        assert_eq!(usage.enemy_data_capacity, 0x11C);
        assert_eq!(usage.enemy_count, 3);
    }
}
