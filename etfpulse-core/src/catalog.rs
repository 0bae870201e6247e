//! Instrument catalog: Sector → Domain → Instrument, flattened in order.
//!
//! The catalog file is JSON (or TOML, chosen by extension) of the shape
//! `{ "Sectors": [ { "Name", "Domains": [ { "Name", "ETFs": [ { "Ticker", "Name" } ] } ] } ] }`.
//! The French keys of older catalog files (`Secteurs`, `Domaines`, `Nom`)
//! are accepted as aliases. Loading flattens the tree into an ordered list
//! of `InstrumentDescriptor`s; any problem is fatal for the run.

use crate::domain::InstrumentDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("read catalog file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse catalog JSON: {0}")]
    Json(String),

    #[error("parse catalog TOML: {0}")]
    Toml(String),

    #[error("empty ticker in sector '{sector}', domain '{domain}'")]
    EmptyTicker { sector: String, domain: String },

    #[error("duplicate ticker '{symbol}' in catalog")]
    DuplicateTicker { symbol: String },

    #[error("tickers '{first}' and '{second}' would share the record file '{stem}.json'")]
    FileNameCollision {
        first: String,
        second: String,
        stem: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(rename = "Sectors", alias = "Secteurs")]
    pub sectors: Vec<SectorEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorEntry {
    #[serde(rename = "Name", alias = "Nom")]
    pub name: String,
    #[serde(rename = "Domains", alias = "Domaines", default)]
    pub domains: Vec<DomainEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEntry {
    #[serde(rename = "Name", alias = "Nom")]
    pub name: String,
    #[serde(rename = "ETFs", default)]
    pub etfs: Vec<InstrumentEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentEntry {
    #[serde(rename = "Ticker")]
    pub ticker: String,
    #[serde(rename = "Name", alias = "Nom")]
    pub name: String,
}

/// A validated, flattened catalog.
#[derive(Debug, Clone)]
pub struct Catalog {
    instruments: Vec<InstrumentDescriptor>,
}

impl Catalog {
    /// Load a catalog file; `.toml` files are parsed as TOML, anything else as JSON.
    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        if path.extension().and_then(|e| e.to_str()) == Some("toml") {
            Self::from_toml(&content)
        } else {
            Self::from_json(&content)
        }
    }

    pub fn from_json(content: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile =
            serde_json::from_str(content).map_err(|e| CatalogError::Json(e.to_string()))?;
        Self::from_tree(file)
    }

    pub fn from_toml(content: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile =
            toml::from_str(content).map_err(|e| CatalogError::Toml(e.to_string()))?;
        Self::from_tree(file)
    }

    /// Flatten a parsed tree, preserving nesting order, and validate tickers.
    pub fn from_tree(file: CatalogFile) -> Result<Self, CatalogError> {
        let mut instruments = Vec::new();
        for sector in file.sectors {
            for domain in sector.domains {
                for etf in domain.etfs {
                    let symbol = etf.ticker.trim();
                    if symbol.is_empty() {
                        return Err(CatalogError::EmptyTicker {
                            sector: sector.name.clone(),
                            domain: domain.name.clone(),
                        });
                    }
                    instruments.push(InstrumentDescriptor::new(
                        symbol,
                        sector.name.as_str(),
                        domain.name.as_str(),
                        etf.name,
                    ));
                }
            }
        }
        Self::from_instruments(instruments)
    }

    /// Build a catalog from an already-flat list, rejecting duplicate symbols
    /// and symbols that map to the same record file.
    pub fn from_instruments(instruments: Vec<InstrumentDescriptor>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        let mut stems: HashMap<String, &str> = HashMap::new();
        for inst in &instruments {
            if !seen.insert(inst.symbol.as_str()) {
                return Err(CatalogError::DuplicateTicker {
                    symbol: inst.symbol.clone(),
                });
            }
            let stem = inst.file_stem();
            if let Some(first) = stems.get(&stem) {
                return Err(CatalogError::FileNameCollision {
                    first: (*first).to_string(),
                    second: inst.symbol.clone(),
                    stem,
                });
            }
            stems.insert(stem, &inst.symbol);
        }
        Ok(Self { instruments })
    }

    /// All instruments, in catalog order.
    pub fn instruments(&self) -> &[InstrumentDescriptor] {
        &self.instruments
    }

    pub fn into_instruments(self) -> Vec<InstrumentDescriptor> {
        self.instruments
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    pub fn get(&self, symbol: &str) -> Option<&InstrumentDescriptor> {
        self.instruments.iter().find(|i| i.symbol == symbol)
    }

    /// Distinct sector names, in first-seen order.
    pub fn sector_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for inst in &self.instruments {
            if !names.contains(&inst.sector.as_str()) {
                names.push(&inst.sector);
            }
        }
        names
    }

    /// A small starter catalog of broad US ETFs.
    pub fn sample_tree() -> CatalogFile {
        let etf = |ticker: &str, name: &str| InstrumentEntry {
            ticker: ticker.to_string(),
            name: name.to_string(),
        };
        CatalogFile {
            sectors: vec![
                SectorEntry {
                    name: "Broad Market".into(),
                    domains: vec![
                        DomainEntry {
                            name: "US Large Cap".into(),
                            etfs: vec![
                                etf("SPY", "SPDR S&P 500 ETF Trust"),
                                etf("IVV", "iShares Core S&P 500 ETF"),
                                etf("DIA", "SPDR Dow Jones Industrial Average ETF"),
                            ],
                        },
                        DomainEntry {
                            name: "US Small Cap".into(),
                            etfs: vec![etf("IWM", "iShares Russell 2000 ETF")],
                        },
                    ],
                },
                SectorEntry {
                    name: "Technology".into(),
                    domains: vec![DomainEntry {
                        name: "Growth".into(),
                        etfs: vec![
                            etf("QQQ", "Invesco QQQ Trust"),
                            etf("XLK", "Technology Select Sector SPDR Fund"),
                        ],
                    }],
                },
                SectorEntry {
                    name: "Fixed Income".into(),
                    domains: vec![DomainEntry {
                        name: "Treasuries".into(),
                        etfs: vec![etf("TLT", "iShares 20+ Year Treasury Bond ETF")],
                    }],
                },
            ],
        }
    }
}
