// Translation between 6502 addresses and file offsets.
//
// PRG is seen through two 16 KiB windows: $8000-$BFFF shows the switchable
// bank and $C000-$FFFF the fixed one. Every offset computation in the crate
// goes through `AddressTranslator`.

use moaimaker_game::layout::{BANK_SIZE, CPU_PRG_BASE, CPU_PRG_END, HEADER_SIZE};
use moaimaker_game::{ensure_layout, CpuAddr, FileOffset, Result, RomLayout};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AddressTranslator {
    layout: RomLayout,
}

impl AddressTranslator {
    pub fn new(layout: RomLayout) -> Self {
        AddressTranslator { layout }
    }

    pub fn layout(&self) -> RomLayout {
        self.layout
    }

    fn prg_end(&self) -> FileOffset {
        HEADER_SIZE + self.layout.prg_bank_count() * BANK_SIZE
    }

    /// File offset of `cpu_addr` as seen with `bank` mapped. Without a bank,
    /// the lower window resolves to part 1 and the upper window to part 2.
    pub fn file_offset(&self, cpu_addr: CpuAddr, bank: Option<usize>) -> Result<FileOffset> {
        ensure_layout!(
            (CPU_PRG_BASE..CPU_PRG_END).contains(&cpu_addr),
            "CPU address {cpu_addr:#06X} is outside PRG space"
        );
        let bank = match bank {
            Some(b) => b,
            None if cpu_addr - CPU_PRG_BASE < BANK_SIZE => self.layout.part1_bank(),
            None => self.layout.part2_bank(),
        };
        ensure_layout!(
            bank < self.layout.prg_bank_count(),
            "bank {bank} does not exist in the {} layout",
            self.layout
        );
        Ok(cpu_addr % BANK_SIZE + bank * BANK_SIZE + HEADER_SIZE)
    }

    pub fn cpu_address(&self, offset: FileOffset) -> Result<CpuAddr> {
        ensure_layout!(
            (HEADER_SIZE..self.prg_end()).contains(&offset),
            "file offset {offset:#X} is outside PRG data"
        );
        let pos = offset - HEADER_SIZE;
        let folded = if pos / BANK_SIZE == self.layout.part2_bank() {
            pos % (2 * BANK_SIZE)
        } else {
            pos % BANK_SIZE
        };
        Ok(folded + CPU_PRG_BASE)
    }

    /// Resolves an offset taken from the unexpanded image. Anything past the
    /// first bank moved along with the original second bank.
    pub fn legacy_file_offset(&self, legacy: FileOffset) -> Result<FileOffset> {
        let original_end = HEADER_SIZE + RomLayout::Original.prg_bank_count() * BANK_SIZE;
        ensure_layout!(
            (HEADER_SIZE..original_end).contains(&legacy),
            "legacy offset {legacy:#X} is outside the original PRG data"
        );
        if legacy >= HEADER_SIZE + BANK_SIZE {
            Ok(legacy + self.layout.legacy_displacement())
        } else {
            Ok(legacy)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moaimaker_game::Error;

    #[test]
    fn original_windows() {
        let t = AddressTranslator::new(RomLayout::Original);
        assert_eq!(t.file_offset(0x8000, None).unwrap(), 0x10);
        assert_eq!(t.file_offset(0xBFFF, None).unwrap(), 0x400F);
        assert_eq!(t.file_offset(0xD831, None).unwrap(), 0x5841);
        assert_eq!(t.cpu_address(0x5841).unwrap(), 0xD831);
        assert_eq!(t.cpu_address(0x0BD3).unwrap(), 0x8BC3);
    }

    #[test]
    fn expanded_windows() {
        let t = AddressTranslator::new(RomLayout::Expanded);
        // Upper window is the relocated original second bank.
        assert_eq!(t.file_offset(0xEF80, None).unwrap(), 0x1EF90);
        assert_eq!(t.cpu_address(0x1EF90).unwrap(), 0xEF80);
        // Switchable banks all appear at $8000.
        assert_eq!(t.file_offset(0x8300, Some(1)).unwrap(), 0x4310);
        assert_eq!(t.cpu_address(0x4310).unwrap(), 0x8300);
        assert_eq!(t.cpu_address(0x7F10).unwrap(), 0xBF00);
        assert_eq!(t.file_offset(0x8000, Some(4)).unwrap(), 0x10010);
        assert_eq!(t.cpu_address(0x10010).unwrap(), 0x8000);
    }

    #[test]
    fn translation_round_trips_in_every_window() {
        for layout in [RomLayout::Original, RomLayout::Expanded] {
            let t = AddressTranslator::new(layout);
            for cpu in (0x8000..0x10000).step_by(7) {
                let offset = t.file_offset(cpu, None).unwrap();
                assert_eq!(t.cpu_address(offset).unwrap(), cpu, "{layout} {cpu:#X}");
            }
            for bank in 0..layout.prg_bank_count() {
                if bank == layout.part2_bank() {
                    continue;
                }
                for cpu in (0x8000..0xC000).step_by(13) {
                    let offset = t.file_offset(cpu, Some(bank)).unwrap();
                    assert_eq!(t.cpu_address(offset).unwrap(), cpu);
                }
            }
        }
    }

    #[test]
    fn legacy_offsets_follow_the_second_bank() {
        let original = AddressTranslator::new(RomLayout::Original);
        let expanded = AddressTranslator::new(RomLayout::Expanded);
        assert_eq!(original.legacy_file_offset(0x59E3).unwrap(), 0x59E3);
        assert_eq!(expanded.legacy_file_offset(0x59E3).unwrap(), 0x59E3 + 0x18000);
        assert_eq!(expanded.legacy_file_offset(0x19A5).unwrap(), 0x19A5);
        assert_eq!(expanded.legacy_file_offset(0x4010).unwrap(), 0x1C010);
    }

    #[test]
    fn out_of_range_inputs_are_invariant_errors() {
        let t = AddressTranslator::new(RomLayout::Original);
        assert!(matches!(t.file_offset(0x7FFF, None), Err(Error::LayoutInvariant(_))));
        assert!(matches!(t.file_offset(0x8000, Some(2)), Err(Error::LayoutInvariant(_))));
        assert!(matches!(t.cpu_address(0x8010), Err(Error::LayoutInvariant(_))));
        assert!(matches!(t.cpu_address(0x0F), Err(Error::LayoutInvariant(_))));
        assert!(matches!(t.legacy_file_offset(0x8C50), Err(Error::LayoutInvariant(_))));
    }
}
