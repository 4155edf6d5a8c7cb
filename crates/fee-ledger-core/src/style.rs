//! Presentation hints for an exported horizontal table.
//!
//! Styling is cosmetic. Producing or writing a [`StyleSheet`] never changes
//! the exported data.

use serde::{Deserialize, Serialize};

use crate::convert::Table;

/// Widest column hint emitted, in characters.
pub const MAX_COLUMN_WIDTH: usize = 30;

const COLUMN_PADDING: usize = 2;
const INFO_COLUMNS: usize = 2;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CellTone {
    Header,
    Paid,
    Unpaid,
    Plain,
}

impl CellTone {
    /// Background as an RGB hex string.
    #[must_use]
    pub fn fill(self) -> Option<&'static str> {
        match self {
            Self::Header => Some("4F46E5"),
            Self::Paid => Some("CCFFCC"),
            Self::Unpaid => Some("FFCCCC"),
            Self::Plain => None,
        }
    }

    #[must_use]
    pub fn font_color(self) -> Option<&'static str> {
        match self {
            Self::Header => Some("FFFFFF"),
            Self::Paid => Some("006600"),
            Self::Unpaid => Some("CC0000"),
            Self::Plain => None,
        }
    }

    #[must_use]
    pub fn bold(self) -> bool {
        matches!(self, Self::Header | Self::Unpaid)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct StyledColumn {
    pub header: String,
    pub width: usize,
}

/// Per-column widths plus one tone per cell. `tones[0]` is the header row.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct StyleSheet {
    pub columns: Vec<StyledColumn>,
    pub tones: Vec<Vec<CellTone>>,
}

#[must_use]
pub fn style_table(table: &Table) -> StyleSheet {
    let columns = table
        .headers
        .iter()
        .enumerate()
        .map(|(index, header)| {
            let widest = table
                .rows
                .iter()
                .map(|row| Table::cell(row, index).chars().count())
                .chain(std::iter::once(header.chars().count()))
                .max()
                .unwrap_or(0);
            StyledColumn {
                header: header.clone(),
                width: (widest + COLUMN_PADDING).min(MAX_COLUMN_WIDTH),
            }
        })
        .collect();

    let mut tones = vec![vec![CellTone::Header; table.headers.len()]];
    tones.extend(table.rows.iter().map(|row| {
        (0..table.headers.len())
            .map(|index| {
                if index < INFO_COLUMNS {
                    CellTone::Plain
                } else {
                    tone_for(Table::cell(row, index))
                }
            })
            .collect()
    }));

    StyleSheet { columns, tones }
}

fn tone_for(cell: &str) -> CellTone {
    if cell.contains("Not Paid") {
        CellTone::Unpaid
    } else if cell.contains("Paid") {
        CellTone::Paid
    } else {
        CellTone::Plain
    }
}
