// The changes suggested by this lint usually make the code more cluttered and less clear:
#![allow(clippy::needless_range_loop)]

pub mod patch;

pub use patch::layout::{parse_rom, LayoutStore, Usage};
pub use patch::Rom;
