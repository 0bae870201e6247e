use serde::{Deserialize, Serialize};

/// One tradable instrument from the catalog, with its classification.
///
/// Built once at catalog-load time and never mutated afterwards; workers
/// only ever read it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct InstrumentDescriptor {
    /// Exchange ticker, unique within a catalog.
    pub symbol: String,
    pub sector: String,
    pub domain: String,
    /// Human-readable instrument name.
    pub name: String,
}

impl InstrumentDescriptor {
    pub fn new(
        symbol: impl Into<String>,
        sector: impl Into<String>,
        domain: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            sector: sector.into(),
            domain: domain.into(),
            name: name.into(),
        }
    }

    /// File name stem of this instrument's record, see [`file_stem`].
    pub fn file_stem(&self) -> String {
        file_stem(&self.symbol)
    }
}

/// Symbols become record file names; path separators are replaced by `_`.
///
/// Two symbols with the same stem would share one record file, so the
/// catalog rejects them.
pub fn file_stem(symbol: &str) -> String {
    symbol
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect()
}
