//! The shared grid of cell colors.
//!
//! [`Board`] owns one [`AtomicU8`] per cell, laid out row-major
//! (`index = y * width + x`). Every cell is its own unit of
//! synchronization: a write to one cell never waits on a write to another,
//! and a reader can never observe a torn cell value. There is no
//! cross-cell transaction; a snapshot taken while placements land may
//! include some of them and not others.
//!
//! The persisted form is the raw cell bytes in index order. Loading is
//! lenient so the board can be resized across restarts: a short blob
//! leaves the tail at color 0 and a long blob is truncated.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::palette::Palette;

/// Errors produced by board reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    /// The coordinates fall outside the board.
    #[error("coordinates ({x}, {y}) are outside the {width}x{height} board")]
    OutOfBounds {
        /// Requested column.
        x: u32,
        /// Requested row.
        y: u32,
        /// Board width.
        width: u32,
        /// Board height.
        height: u32,
    },

    /// The color id is not in the palette.
    #[error("color {color} is not in the palette of {palette_len} colors")]
    InvalidColor {
        /// Requested color id.
        color: u8,
        /// Number of palette entries.
        palette_len: usize,
    },

    /// The board dimensions are zero or too large to address.
    #[error("invalid board dimensions {width}x{height}")]
    InvalidDimensions {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },
}

/// Fixed-size grid of color ids with per-cell atomic access.
#[derive(Debug)]
pub struct Board {
    width: u32,
    height: u32,
    palette: Palette,
    cells: Vec<AtomicU8>,
}

impl Board {
    /// Allocate a blank board (every cell color 0).
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::InvalidDimensions`] if either dimension is
    /// zero or `width * height` does not fit in memory addressing.
    pub fn new(width: u32, height: u32, palette: Palette) -> Result<Self, BoardError> {
        let len = cell_count(width, height).ok_or(BoardError::InvalidDimensions { width, height })?;
        let cells = std::iter::repeat_with(|| AtomicU8::new(0))
            .take(len)
            .collect();
        Ok(Self {
            width,
            height,
            palette,
            cells,
        })
    }

    /// Board width in cells.
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Board height in cells.
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Total number of cells (`width * height`).
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Always `false`; boards have at least one cell.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// The palette that bounds valid color ids.
    pub const fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Row-major index of `(x, y)`, or `None` when out of bounds.
    pub fn index_of(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let row = usize::try_from(y).ok()?;
        let width = usize::try_from(self.width).ok()?;
        let col = usize::try_from(x).ok()?;
        row.checked_mul(width)?.checked_add(col)
    }

    /// Read one cell.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::OutOfBounds`] for coordinates off the board.
    pub fn get_cell(&self, x: u32, y: u32) -> Result<u8, BoardError> {
        let cell = self.cell(x, y)?;
        Ok(cell.load(Ordering::Acquire))
    }

    /// Write one cell, returning the color it held before.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::OutOfBounds`] for coordinates off the board
    /// and [`BoardError::InvalidColor`] for a color id outside the palette.
    /// Nothing is written on error.
    pub fn set_cell(&self, x: u32, y: u32, color: u8) -> Result<u8, BoardError> {
        let cell = self.cell(x, y)?;
        if !self.palette.contains(color) {
            return Err(BoardError::InvalidColor {
                color,
                palette_len: self.palette.len(),
            });
        }
        Ok(cell.swap(color, Ordering::AcqRel))
    }

    /// Copy every cell, in index order.
    ///
    /// Each cell value is read atomically; the copy as a whole is not a
    /// single transaction.
    pub fn snapshot(&self) -> Vec<u8> {
        self.cells.iter().map(|c| c.load(Ordering::Acquire)).collect()
    }

    /// Encode the board in its persisted form: one byte per cell.
    pub fn serialize(&self) -> Vec<u8> {
        self.snapshot()
    }

    /// Overwrite the board from a persisted blob.
    ///
    /// Bytes beyond the board length are ignored and cells beyond the blob
    /// length are reset to color 0. Color ids are copied as-is, even when
    /// the palette has since shrunk.
    pub fn load(&self, bytes: &[u8]) {
        let mut source = bytes.iter().copied();
        for cell in &self.cells {
            cell.store(source.next().unwrap_or(0), Ordering::Release);
        }
    }

    fn cell(&self, x: u32, y: u32) -> Result<&AtomicU8, BoardError> {
        self.index_of(x, y)
            .and_then(|i| self.cells.get(i))
            .ok_or(BoardError::OutOfBounds {
                x,
                y,
                width: self.width,
                height: self.height,
            })
    }
}

/// Number of cells for the given dimensions, or `None` if zero or overflowing.
pub fn cell_count(width: u32, height: u32) -> Option<usize> {
    if width == 0 || height == 0 {
        return None;
    }
    usize::try_from(width)
        .ok()?
        .checked_mul(usize::try_from(height).ok()?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn two_color_board(width: u32, height: u32) -> Board {
        let palette = Palette::new(vec!["#FFFFFF".to_owned(), "#000000".to_owned()]).unwrap();
        Board::new(width, height, palette).unwrap()
    }

    #[test]
    fn new_board_is_blank() {
        let board = two_color_board(3, 2);
        assert_eq!(board.len(), 6);
        assert_eq!(board.snapshot(), vec![0; 6]);
    }

    #[test]
    fn rejects_zero_dimensions() {
        let err = Board::new(0, 5, Palette::default()).unwrap_err();
        assert_eq!(
            err,
            BoardError::InvalidDimensions {
                width: 0,
                height: 5
            }
        );
    }

    #[test]
    fn index_is_row_major() {
        let board = two_color_board(3, 3);
        assert_eq!(board.index_of(0, 0), Some(0));
        assert_eq!(board.index_of(2, 0), Some(2));
        assert_eq!(board.index_of(0, 1), Some(3));
        assert_eq!(board.index_of(2, 2), Some(8));
        assert_eq!(board.index_of(3, 0), None);
        assert_eq!(board.index_of(0, 3), None);
    }

    #[test]
    fn set_then_get() {
        let board = two_color_board(3, 3);
        assert_eq!(board.set_cell(1, 2, 1).unwrap(), 0);
        assert_eq!(board.get_cell(1, 2).unwrap(), 1);
        assert_eq!(board.snapshot()[7], 1);
        assert_eq!(board.set_cell(1, 2, 0).unwrap(), 1);
        assert_eq!(board.get_cell(1, 2).unwrap(), 0);
    }

    #[test]
    fn out_of_bounds_is_rejected() {
        let board = two_color_board(3, 3);
        assert!(matches!(
            board.get_cell(3, 0),
            Err(BoardError::OutOfBounds { x: 3, y: 0, .. })
        ));
        assert!(matches!(
            board.set_cell(0, 3, 1),
            Err(BoardError::OutOfBounds { .. })
        ));
        assert_eq!(board.snapshot(), vec![0; 9]);
    }

    #[test]
    fn invalid_color_is_rejected_without_write() {
        let board = two_color_board(3, 3);
        assert_eq!(
            board.set_cell(0, 0, 5),
            Err(BoardError::InvalidColor {
                color: 5,
                palette_len: 2
            })
        );
        assert_eq!(board.get_cell(0, 0).unwrap(), 0);
    }

    #[test]
    fn serialize_load_round_trip_is_identical() {
        let board = two_color_board(4, 4);
        board.set_cell(0, 0, 1).unwrap();
        board.set_cell(3, 3, 1).unwrap();
        board.set_cell(2, 1, 1).unwrap();
        let saved = board.serialize();

        let restored = two_color_board(4, 4);
        restored.load(&saved);
        assert_eq!(restored.serialize(), saved);
    }

    #[test]
    fn short_blob_is_zero_filled() {
        let board = two_color_board(3, 3);
        for x in 0..3 {
            for y in 0..3 {
                board.set_cell(x, y, 1).unwrap();
            }
        }
        board.load(&[1, 1, 1, 1]);
        assert_eq!(board.snapshot(), vec![1, 1, 1, 1, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn long_blob_is_truncated() {
        let board = two_color_board(2, 2);
        board.load(&[1, 0, 1, 0, 1, 1, 1]);
        assert_eq!(board.snapshot(), vec![1, 0, 1, 0]);
    }

    #[test]
    fn empty_blob_clears_board() {
        let board = two_color_board(2, 2);
        board.set_cell(1, 1, 1).unwrap();
        board.load(&[]);
        assert_eq!(board.snapshot(), vec![0; 4]);
    }

    #[test]
    fn concurrent_writers_on_distinct_cells() {
        let board = Arc::new(Board::new(64, 64, Palette::default()).unwrap());
        let handles: Vec<_> = (0..8u32)
            .map(|t| {
                let board = Arc::clone(&board);
                std::thread::spawn(move || {
                    for y in (t * 8)..(t * 8 + 8) {
                        for x in 0..64 {
                            let color = u8::try_from((x + y) % 16).unwrap();
                            board.set_cell(x, y, color).unwrap();
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        for y in 0..64u32 {
            for x in 0..64u32 {
                let expected = u8::try_from((x + y) % 16).unwrap();
                assert_eq!(board.get_cell(x, y).unwrap(), expected);
            }
        }
    }

    #[test]
    fn concurrent_writers_on_same_cell_leave_a_written_value() {
        let board = Arc::new(Board::new(1, 1, Palette::default()).unwrap());
        let handles: Vec<_> = (1..=8u8)
            .map(|color| {
                let board = Arc::clone(&board);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        board.set_cell(0, 0, color).unwrap();
                        let seen = board.get_cell(0, 0).unwrap();
                        assert!((1..=8).contains(&seen));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!((1..=8).contains(&board.get_cell(0, 0).unwrap()));
    }
}
