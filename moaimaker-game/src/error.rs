use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed hex or byte input from a manual edit. The edit is rejected.
    #[error("format error: {0}")]
    Format(String),
    #[error(transparent)]
    Capacity(#[from] CapacityError),
    /// A byte record disagrees with itself (e.g. an enemy length byte).
    #[error("validation error: {0}")]
    Validation(String),
    /// An address or offset fell outside every known bank or region. This
    /// means the in-memory model is corrupt; the current operation is aborted.
    #[error("layout invariant violated: {0}")]
    LayoutInvariant(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CapacityError {
    #[error("level data for level {level} would end at {end:#X}, past the region end {limit:#X}")]
    LevelData {
        level: usize,
        end: usize,
        limit: usize,
    },
    #[error("enemy data needs {needed} bytes but the region holds {available}")]
    EnemyData { needed: usize, available: usize },
    #[error("{count} levels need {needed} address-table bytes but the table holds {available}")]
    AddressTable {
        count: usize,
        needed: usize,
        available: usize,
    },
    #[error("level count {count} is outside 1..={max}")]
    LevelCount { count: usize, max: usize },
    #[error("{count} enemies placed but at most {max} fit in the enemy table")]
    EnemyCount { count: usize, max: usize },
}

/// Like `anyhow::ensure!`, but fails with [`Error::LayoutInvariant`].
#[macro_export]
macro_rules! ensure_layout {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::Error::LayoutInvariant(format!($($arg)+)));
        }
    };
}
