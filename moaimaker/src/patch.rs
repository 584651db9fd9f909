pub mod address;
pub mod ips_write;
pub mod layout;
pub mod romfix;

use std::path::Path;

use anyhow::Context;
use hashbrown::HashSet;
use moaimaker_game::{ensure_layout, FileOffset, Region, Result};

/// A ROM image with bounds-checked access. Every out-of-range access is a
/// layout invariant failure, never a silent wrap or panic.
#[derive(Clone)]
pub struct Rom {
    pub data: Vec<u8>,
    track_touched: bool,
    touched: HashSet<usize>,
}

impl Rom {
    pub fn new(data: Vec<u8>) -> Self {
        Rom {
            data,
            track_touched: false,
            touched: HashSet::new(),
        }
    }

    pub fn enable_tracking(&mut self) {
        self.track_touched = true;
        self.touched.clear();
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("Unable to load ROM at path {}", path.display()))?;
        Ok(Rom::new(data))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        std::fs::write(path, &self.data)
            .with_context(|| format!("Unable to save ROM at path {}", path.display()))?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn read_u8(&self, addr: FileOffset) -> Result<u8> {
        ensure_layout!(
            addr < self.data.len(),
            "read_u8 at {addr:#X} is out of bounds"
        );
        Ok(self.data[addr])
    }

    /// Little-endian.
    pub fn read_u16(&self, addr: FileOffset) -> Result<u16> {
        let b = self.read_n(addr, 2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_n(&self, addr: FileOffset, n: usize) -> Result<&[u8]> {
        ensure_layout!(
            addr + n <= self.data.len(),
            "read_n of {n} bytes at {addr:#X} is out of bounds"
        );
        Ok(&self.data[addr..(addr + n)])
    }

    pub fn read_region(&self, region: Region) -> Result<&[u8]> {
        self.read_n(region.start, region.len())
    }

    pub fn write_u8(&mut self, addr: FileOffset, x: u8) -> Result<()> {
        self.write_n(addr, &[x])
    }

    pub fn write_u16(&mut self, addr: FileOffset, x: u16) -> Result<()> {
        self.write_n(addr, &x.to_le_bytes())
    }

    pub fn write_n(&mut self, addr: FileOffset, x: &[u8]) -> Result<()> {
        ensure_layout!(
            addr + x.len() <= self.data.len(),
            "write_n of {} bytes at {addr:#X} is out of bounds",
            x.len()
        );
        self.data[addr..(addr + x.len())].copy_from_slice(x);
        if self.track_touched {
            self.touched.extend(addr..(addr + x.len()));
        }
        Ok(())
    }

    pub fn fill(&mut self, region: Region, value: u8) -> Result<()> {
        self.write_n(region.start, &vec![value; region.len()])
    }

    // Returns a list of [start, end) ranges.
    pub fn get_modified_ranges(&self) -> Vec<(usize, usize)> {
        let mut addresses: Vec<usize> = self.touched.iter().copied().collect();
        addresses.sort();
        let mut ranges: Vec<(usize, usize)> = vec![];
        for a in addresses {
            match ranges.last_mut() {
                Some(r) if r.1 == a => r.1 = a + 1,
                _ => ranges.push((a, a + 1)),
            }
        }
        ranges
    }
}
