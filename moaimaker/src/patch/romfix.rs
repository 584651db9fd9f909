use log::{debug, info};
use moaimaker_game::layout::{
    Region, BANK_SIZE, CHR_END, CHR_START, DEFAULT_LEVEL_TIMER, ENEMY_POINTER_OFFSET,
    EXPANDED_HEADER_BYTES, HEADER_SIZE,
};
use moaimaker_game::{ensure_layout, CpuAddr, Error, FileOffset, Result, RomLayout};

use super::address::AddressTranslator;
use super::Rom;

// CHR offsets (identical in both layouts). The boss graphics at
// `BOSS_TILES_SOURCE` are copied over two unused pages, whose previous
// contents are kept in `BOSS_TILES_BACKUP`.
const BOSS_TILES_SOURCE: FileOffset = 0xEA70;
const BOSS_TILES_PAGE1: FileOffset = 0xAA70;
const BOSS_TILES_PAGE2: FileOffset = 0xCA70;
const BOSS_TILES_BACKUP: FileOffset = 0x8C50;
const BOSS_TILES_LEN: usize = 0xEE10 - 0xEA70;

// Legacy PRG offsets.
const MAX_HEIGHT_FIX_ADDR: FileOffset = 0x19A5;
const LABEL_ADDR: FileOffset = 0x05D9;
const SPECIAL_ANIMATION_START: FileOffset = 0x59E3;
const SPECIAL_ANIMATION_END: FileOffset = 0x5A3D;

// Replacement for the vertical scroll update; the original kills the player
// on reaching the top of the screen.
const MAX_HEIGHT_FIX: [u8; 26] = [
    0x18, 0xA5, 0xC4, 0x65, 0xC8, 0x85, 0xC4, 0xAD, 0x1E, 0x04, 0x65, 0xC7, 0x24, 0xC7, 0x10,
    0x06, 0xC9, 0xD5, 0x90, 0x02, 0xA9, 0x00, 0x8D, 0x1E, 0x04, 0x60,
];

const LABEL_LETTER_BASE: u8 = 0x0B;
// Each line alternates between two blank tiles, chosen by absolute position.
const LABEL_LINES: [(&str, [u8; 2]); 2] = [
    ("  MADE WITH      ", [0xE3, 0xE2]),
    ("                 MOAIKUN MAKER", [0xD3, 0xD2]),
];

const JSR: u8 = 0x20;
const NOP: u8 = 0xEA;

fn encode_label() -> Vec<u8> {
    let mut out: Vec<u8> = Vec::new();
    for (text, blanks) in LABEL_LINES {
        for c in text.chars() {
            let tile = if c.is_ascii_uppercase() {
                LABEL_LETTER_BASE + (c as u8 - b'A')
            } else {
                blanks[out.len() % 2]
            };
            out.push(tile);
        }
    }
    out
}

fn backup_boss_tiles(rom: &mut Rom) -> Result<()> {
    let backup = rom.read_n(BOSS_TILES_BACKUP, BOSS_TILES_LEN)?;
    if backup.iter().any(|&b| b != 0) {
        debug!("boss tiles already backed up");
        return Ok(());
    }
    let source = rom.read_n(BOSS_TILES_SOURCE, BOSS_TILES_LEN)?.to_vec();
    let page1 = rom.read_n(BOSS_TILES_PAGE1, BOSS_TILES_LEN)?.to_vec();
    if page1 == source {
        // Already copied, and the page held nothing but zeros.
        return Ok(());
    }
    rom.write_n(BOSS_TILES_BACKUP, &page1)?;
    rom.write_n(BOSS_TILES_PAGE1, &source)?;
    rom.write_n(BOSS_TILES_PAGE2, &source)?;
    Ok(())
}

/// Bug fixes every saved image gets. Safe to apply any number of times.
pub fn apply_fixed_patches(rom: &mut Rom, layout: RomLayout) -> Result<()> {
    ensure_layout!(
        rom.len() >= layout.image_size(),
        "image is {:#X} bytes, the {layout} layout needs {:#X}",
        rom.len(),
        layout.image_size()
    );
    let t = AddressTranslator::new(layout);

    backup_boss_tiles(rom)?;
    rom.write_n(t.legacy_file_offset(MAX_HEIGHT_FIX_ADDR)?, &MAX_HEIGHT_FIX)?;
    rom.write_n(t.legacy_file_offset(LABEL_ADDR)?, &encode_label())?;

    // Special-level transition animation; it carries the game past the level
    // the player is on.
    let start = t.legacy_file_offset(SPECIAL_ANIMATION_START)?;
    let end = t.legacy_file_offset(SPECIAL_ANIMATION_END)?;
    rom.fill(Region::new(start, end), 0x00)?;
    Ok(())
}

/// Points a hook site in the original code at a placed fragment:
/// `prefix`, the fragment's CPU address (little-endian), then `suffix`.
struct Hook {
    legacy_offset: FileOffset,
    prefix: &'static [u8],
    suffix: &'static [u8],
}

impl Hook {
    fn jsr(legacy_offset: FileOffset, nops: usize) -> Hook {
        static NOPS: [u8; 8] = [NOP; 8];
        Hook {
            legacy_offset,
            prefix: &[JSR],
            suffix: &NOPS[..nops],
        }
    }
}

struct Fragment {
    name: &'static str,
    code: Vec<u8>,
    hooks: Vec<Hook>,
}

/// Next free byte in the fragment space. Each insertion consumes the cursor
/// and hands back the one after the placed code.
#[derive(Copy, Clone, Debug)]
pub struct Cursor {
    offset: FileOffset,
    limit: FileOffset,
}

impl Cursor {
    pub fn new(space: Region) -> Cursor {
        Cursor {
            offset: space.start,
            limit: space.end,
        }
    }

    pub fn offset(&self) -> FileOffset {
        self.offset
    }

    /// Writes `code` at the cursor and returns the advanced cursor.
    pub fn place(self, rom: &mut Rom, code: &[u8]) -> Result<Cursor> {
        let end = self.offset + code.len();
        ensure_layout!(
            end <= self.limit,
            "fragment of {} bytes at {:#X} overruns free space ending at {:#X}",
            code.len(),
            self.offset,
            self.limit
        );
        rom.write_n(self.offset, code)?;
        Ok(Cursor {
            offset: end,
            limit: self.limit,
        })
    }

    fn insert(
        self,
        rom: &mut Rom,
        t: &AddressTranslator,
        fragment: Fragment,
    ) -> Result<(CpuAddr, Cursor)> {
        let cpu = t.cpu_address(self.offset)?;
        let next = self.place(rom, &fragment.code)?;
        for hook in &fragment.hooks {
            let mut site = hook.prefix.to_vec();
            site.extend((cpu as u16).to_le_bytes());
            site.extend(hook.suffix);
            rom.write_n(t.legacy_file_offset(hook.legacy_offset)?, &site)?;
        }
        debug!(
            "placed {} ({} bytes) at {:#X} (${cpu:04X}), {} hook(s)",
            fragment.name,
            fragment.code.len(),
            self.offset,
            fragment.hooks.len()
        );
        Ok((cpu, next))
    }
}

fn lo(addr: CpuAddr) -> u8 {
    (addr & 0xFF) as u8
}

fn hi(addr: CpuAddr) -> u8 {
    ((addr >> 8) & 0xFF) as u8
}

/// CPU addresses and banks the expansion routines are assembled against.
struct ExpandedMap {
    table_bank: u8,
    level_bank: u8,
    level_table: CpuAddr,
    timer_table: CpuAddr,
}

// The routines below follow one pattern: select a bank through the mapper
// register at $8000, read through a zero-page pointer, restore bank 0.

fn load_graphics() -> Fragment {
    // Copies one 8 KiB CHR set from PRG banks 2-3 into CHR-RAM with
    // rendering off, then restores the PPU state.
    let code = vec![
        0x48, 0x8A, 0x48, 0x98, 0x48, 0xA5, 0x30, 0x48, 0xA5, 0x31, 0x48, 0xA5, 0x2F, 0x85, 0x2E,
        0xA9, 0x00, 0x8D, 0x00, 0x20, 0x8D, 0x01, 0x20, 0xA5, 0x2F, 0x4A, 0x18, 0x69, 0x02, 0x8D,
        0x00, 0x80, 0xA5, 0x2F, 0x29, 0x01, 0xF0, 0x04, 0xA9, 0xA0, 0xD0, 0x02, 0xA9, 0x80, 0x85,
        0x31, 0xA9, 0x00, 0x85, 0x30, 0xAD, 0x02, 0x20, 0xA9, 0x00, 0x8D, 0x06, 0x20, 0x8D, 0x06,
        0x20, 0xA2, 0x20, 0xA0, 0x00, 0xB1, 0x30, 0x8D, 0x07, 0x20, 0xC8, 0xD0, 0xF8, 0xE6, 0x31,
        0xCA, 0xD0, 0xF3, 0xA9, 0x1E, 0x8D, 0x01, 0x20, 0xA9, 0x00, 0x8D, 0x05, 0x20, 0x8D, 0x05,
        0x20, 0xA9, 0x80, 0x8D, 0x00, 0x20, 0xA9, 0x00, 0x8D, 0x00, 0x80, 0x68, 0x85, 0x31, 0x68,
        0x85, 0x30, 0x68, 0xA8, 0x68, 0xAA, 0x68, 0x60,
    ];
    Fragment {
        name: "load_graphics",
        code,
        hooks: vec![Hook {
            // Graphics-set change check in the NMI handler.
            legacy_offset: 0x00BE,
            prefix: &[0xA5, 0x2F, 0xC5, 0x2E, 0xF0, 0x03, JSR],
            suffix: &[],
        }],
    }
}

fn title_screen(load_graphics: CpuAddr) -> Fragment {
    let code = vec![
        0xA9, 0xB0, 0x85, 0xFF, 0x8D, 0x00, 0x20, 0xA9, 0x1E, 0x85, 0xFE, 0xA9, 0x05, 0x85, 0x1D,
        JSR, lo(load_graphics), hi(load_graphics), 0x60,
    ];
    Fragment {
        name: "title_screen",
        code,
        hooks: vec![Hook {
            // Operand of the title-screen setup call.
            legacy_offset: 0x007E,
            prefix: &[],
            suffix: &[],
        }],
    }
}

fn load_level_pointer(m: &ExpandedMap) -> Fragment {
    // Level numbers start at 1, so the table is indexed from two bytes before.
    let base = m.level_table - 2;
    let code = vec![
        0x48, 0xA9, m.table_bank, 0x8D, 0x00, 0x80, 0xB9, lo(base), hi(base), 0x85, 0x00, 0xB9,
        lo(base + 1), hi(base + 1), 0x85, 0x01, 0xA9, 0x00, 0x8D, 0x00, 0x80, 0x68, 0x60,
    ];
    Fragment {
        name: "load_level_pointer",
        code,
        hooks: vec![Hook::jsr(0x0D32, 7)],
    }
}

fn load_background(m: &ExpandedMap) -> Fragment {
    let code = vec![
        0xA9, m.level_bank, 0x8D, 0x00, 0x80, 0xB1, 0x00, 0x48, 0x4A, 0x4A, 0x4A, 0x4A, 0x85, 0x3D,
        0xA9, 0x00, 0x8D, 0x00, 0x80, 0x68, 0x60,
    ];
    Fragment {
        name: "load_background",
        code,
        hooks: vec![Hook::jsr(0x0D19, 7)],
    }
}

fn load_tile_byte(m: &ExpandedMap) -> Fragment {
    let code = vec![
        0xA9, m.level_bank, 0x8D, 0x00, 0x80, 0xB1, 0x00, 0x48, 0xA9, 0x00, 0x8D, 0x00, 0x80, 0x68,
        0xC9, 0xFF, 0x60,
    ];
    Fragment {
        name: "load_tile_byte",
        code,
        hooks: vec![Hook::jsr(0x2929, 1)],
    }
}

fn load_player(m: &ExpandedMap) -> Fragment {
    let code = vec![
        0xA9, m.level_bank, 0x8D, 0x00, 0x80, 0xB1, 0x00, 0x48, 0xA9, 0x00, 0x8D, 0x00, 0x80, 0x68,
        0x85, 0x00, 0x60,
    ];
    Fragment {
        name: "load_player",
        code,
        hooks: vec![Hook::jsr(0x1B1C, 1)],
    }
}

fn load_door(m: &ExpandedMap) -> Fragment {
    let code = vec![
        0xA9, m.level_bank, 0x8D, 0x00, 0x80, 0xB1, 0x00, 0x85, 0x63, 0xC8, 0xB1, 0x00, 0x85, 0x64,
        0xA9, 0x00, 0x8D, 0x00, 0x80, 0x60,
    ];
    Fragment {
        name: "load_door",
        code,
        hooks: vec![Hook::jsr(0x35F9, 6)],
    }
}

fn load_enemy_count(m: &ExpandedMap) -> Fragment {
    let code = vec![
        0xA9, m.table_bank, 0x8D, 0x00, 0x80, 0xB1, 0x06, 0x48, 0xA9, 0x00, 0x8D, 0x00, 0x80, 0x68,
        0x4A, 0x60,
    ];
    Fragment {
        name: "load_enemy_count",
        code,
        hooks: vec![Hook::jsr(0x2DD9, 0)],
    }
}

fn load_enemy_id(m: &ExpandedMap) -> Fragment {
    let code = vec![
        0xA9, m.table_bank, 0x8D, 0x00, 0x80, 0xB1, 0x06, 0x48, 0xA9, 0x00, 0x8D, 0x00, 0x80, 0x68,
        0x85, 0x00, 0x60,
    ];
    Fragment {
        name: "load_enemy_id",
        code,
        hooks: vec![Hook::jsr(0x2DE6, 1)],
    }
}

fn load_enemy_position(m: &ExpandedMap) -> Fragment {
    let code = vec![
        0xA9, m.table_bank, 0x8D, 0x00, 0x80, 0xB1, 0x06, 0x48, 0xA9, 0x00, 0x8D, 0x00, 0x80, 0x68,
        0x9D, 0x76, 0x05, 0x60,
    ];
    Fragment {
        name: "load_enemy_position",
        code,
        hooks: vec![Hook::jsr(0x2E11, 2)],
    }
}

fn load_enemy_pointer(m: &ExpandedMap) -> Fragment {
    // Replaces the walk over every earlier level's enemy record with a
    // lookup in the enemy-address table at ($06).
    let code = vec![
        0xA8, 0x90, 0x02, 0xE6, 0x07, 0xA9, m.table_bank, 0x8D, 0x00, 0x80, 0xB1, 0x06, 0x48, 0xC8,
        0xD0, 0x02, 0xE6, 0x07, 0xB1, 0x06, 0x48, 0xA9, 0x00, 0x8D, 0x00, 0x80, 0x68, 0x85, 0x07,
        0x68, 0x85, 0x06, 0x60,
    ];
    Fragment {
        name: "load_enemy_pointer",
        code,
        hooks: vec![Hook {
            legacy_offset: 0x2DC7,
            // TXA; ASL; JSR ...
            prefix: &[0x8A, 0x0A, JSR],
            // LDY #0; LDX #0; LDA #0; then pad out the old loop.
            suffix: &[0xA0, 0x00, 0xA2, 0x00, 0xA9, 0x00, NOP, NOP, NOP, NOP, NOP, NOP, NOP],
        }],
    }
}

fn load_timer(m: &ExpandedMap) -> Fragment {
    let code = vec![
        0xA9, m.table_bank, 0x8D, 0x00, 0x80, 0xB9, lo(m.timer_table), hi(m.timer_table), 0x48,
        0x48, 0xA9, 0x00, 0x8D, 0x00, 0x80, 0x68, 0x4A, 0x4A, 0x4A, 0x4A, 0x85, 0x71, 0x68, 0x60,
    ];
    Fragment {
        name: "load_timer",
        code,
        hooks: vec![Hook::jsr(0x0AE5, 8)],
    }
}

fn bank_u8(bank: usize) -> Result<u8> {
    u8::try_from(bank)
        .map_err(|_| Error::LayoutInvariant(format!("bank {bank} does not fit the mapper")))
}

/// Converts an original image into the expanded layout: new header, program
/// banks rearranged, and the level/enemy/timer loaders redirected to
/// routines that read from the added banks. Level data is not written here;
/// the layout store lays the levels out in the new regions afterwards.
pub fn expand(rom: &Rom) -> Result<Rom> {
    let from = RomLayout::detect(&rom.data);
    ensure_layout!(
        from == RomLayout::Original,
        "only an original image can be expanded, this one is {from}"
    );
    ensure_layout!(
        rom.len() >= from.image_size(),
        "image is {:#X} bytes, expected at least {:#X}",
        rom.len(),
        from.image_size()
    );
    let layout = RomLayout::Expanded;
    let t = AddressTranslator::new(layout);
    let mut out = Rom::new(vec![0; layout.image_size()]);

    out.write_n(0, rom.read_n(0, HEADER_SIZE)?)?;
    out.write_n(4, &EXPANDED_HEADER_BYTES)?;
    let bank0 = HEADER_SIZE;
    let bank1 = HEADER_SIZE + BANK_SIZE;
    out.write_n(bank0, rom.read_n(bank0, BANK_SIZE)?)?;
    out.write_n(t.legacy_file_offset(bank1)?, rom.read_n(bank1, BANK_SIZE)?)?;
    out.write_n(CHR_START, rom.read_n(CHR_START, CHR_END - CHR_START)?)?;

    let (Some(space), Some(enemy_table), Some(timer_table)) = (
        layout.fragment_space(),
        layout.enemy_table(),
        layout.timer_table(),
    ) else {
        return Err(Error::LayoutInvariant(format!(
            "{layout} layout is missing its expansion regions"
        )));
    };
    out.fill(space, 0x00)?;

    let m = ExpandedMap {
        table_bank: bank_u8(layout.enemy_data_bank())?,
        level_bank: bank_u8(layout.level_data_bank())?,
        level_table: t.cpu_address(layout.level_table().start)?,
        timer_table: t.cpu_address(timer_table.start)?,
    };

    let cursor = Cursor::new(space);
    let (gfx, cursor) = cursor.insert(&mut out, &t, load_graphics())?;
    let (_, cursor) = cursor.insert(&mut out, &t, title_screen(gfx))?;
    let (_, cursor) = cursor.insert(&mut out, &t, load_level_pointer(&m))?;
    let (_, cursor) = cursor.insert(&mut out, &t, load_background(&m))?;
    let (_, cursor) = cursor.insert(&mut out, &t, load_tile_byte(&m))?;
    let (_, cursor) = cursor.insert(&mut out, &t, load_player(&m))?;
    let (_, cursor) = cursor.insert(&mut out, &t, load_door(&m))?;
    out.write_u16(
        t.legacy_file_offset(ENEMY_POINTER_OFFSET)?,
        t.cpu_address(enemy_table.start)? as u16,
    )?;
    let (_, cursor) = cursor.insert(&mut out, &t, load_enemy_count(&m))?;
    let (_, cursor) = cursor.insert(&mut out, &t, load_enemy_id(&m))?;
    let (_, cursor) = cursor.insert(&mut out, &t, load_enemy_position(&m))?;
    let (_, cursor) = cursor.insert(&mut out, &t, load_enemy_pointer(&m))?;
    let (_, cursor) = cursor.insert(&mut out, &t, load_timer(&m))?;
    info!(
        "expansion code uses {:#X}..{:#X} of {:#X}..{:#X}",
        space.start,
        cursor.offset(),
        space.start,
        space.end
    );

    out.fill(timer_table, DEFAULT_LEVEL_TIMER)?;
    apply_fixed_patches(&mut out, layout)?;
    Ok(out)
}
