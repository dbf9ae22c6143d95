//! The fixed list of colors a cell may hold.
//!
//! A color id is an index into the palette. Because the board stores one
//! byte per cell, a palette holds at most 256 entries.

use serde::Serialize;

/// Maximum number of palette entries addressable by a one-byte color id.
pub const MAX_PALETTE_LEN: usize = 256;

/// Errors that can occur when constructing a [`Palette`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaletteError {
    /// The palette has no colors.
    #[error("palette must contain at least one color")]
    Empty,

    /// The palette has more colors than a one-byte cell can address.
    #[error("palette has {len} colors, at most 256 are supported")]
    TooLarge {
        /// Number of colors supplied.
        len: usize,
    },
}

/// Immutable ordered list of color values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Palette {
    colors: Vec<String>,
}

impl Palette {
    /// Build a palette from an ordered list of color strings.
    ///
    /// # Errors
    ///
    /// Returns [`PaletteError::Empty`] for an empty list and
    /// [`PaletteError::TooLarge`] when more than [`MAX_PALETTE_LEN`] colors
    /// are given.
    pub fn new(colors: Vec<String>) -> Result<Self, PaletteError> {
        if colors.is_empty() {
            return Err(PaletteError::Empty);
        }
        if colors.len() > MAX_PALETTE_LEN {
            return Err(PaletteError::TooLarge { len: colors.len() });
        }
        Ok(Self { colors })
    }

    /// Number of colors, i.e. one past the largest valid color id.
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// Always `false`; a palette is non-empty by construction.
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Whether `color_id` names an entry in this palette.
    pub fn contains(&self, color_id: u8) -> bool {
        usize::from(color_id) < self.colors.len()
    }

    /// The colors in id order.
    pub fn colors(&self) -> &[String] {
        &self.colors
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            colors: default_colors(),
        }
    }
}

/// The classic sixteen-color palette.
pub fn default_colors() -> Vec<String> {
    [
        "#FFFFFF", "#E4E4E4", "#888888", "#222222", "#FFA7D1", "#E50000", "#E59500", "#A06A42",
        "#E5D900", "#94E044", "#02BE01", "#00D3DD", "#0083C7", "#0000EA", "#CF6EE4", "#820080",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
