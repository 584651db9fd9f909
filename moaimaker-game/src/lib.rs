pub mod codec;
pub mod error;
pub mod hex;
pub mod layout;
pub mod level;
pub mod logical;

pub use error::{CapacityError, Error, Result};
pub use layout::{CpuAddr, FileOffset, Region, RomLayout};
pub use level::{Level, Placement};
pub use logical::{
    Enemy, LogicalLevel, Position, TileGrid, GRID_HEIGHT, GRID_WIDTH, HALF_WIDTH,
};
