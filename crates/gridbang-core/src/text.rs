//! Plain-text program loading and saving.
//!
//! Programs are flat character streams: `.` marks an empty cell, every other
//! alphabet character fills one cell, and anything else (whitespace,
//! punctuation) is skipped without consuming an address.

use std::io::{BufRead, Write};
use tracing::trace;

use crate::symbol::Symbol;
use crate::{Grid, GridError};

/// Symbols per line written by [`Grid::save_string`].
pub const SAVE_LINE_WIDTH: usize = 16;

impl Grid {
    /// Load `text` starting at address `offset`; returns the address after the
    /// last consumed character so loads can continue across lines.
    pub fn load_str(&mut self, text: &str, offset: usize) -> usize {
        let mut offset = offset;
        for c in text.chars() {
            match Symbol::from_char(c) {
                Some(symbol) if symbol.is_empty() => offset += 1,
                Some(symbol) => {
                    self.set(offset as i64, symbol);
                    trace!(address = offset, symbol = %symbol, "loaded symbol");
                    offset += 1;
                }
                None => {}
            }
        }
        offset
    }

    /// Load a whole program line by line from address zero.
    pub fn load_reader<R: BufRead>(&mut self, reader: R) -> Result<usize, GridError> {
        let mut offset = 0;
        for line in reader.lines() {
            offset = self.load_str(&line?, offset);
        }
        Ok(offset)
    }

    /// Serialise the symbol buffer, breaking lines every 16 symbols.
    #[must_use]
    pub fn save_string(&self) -> String {
        let cells = self.symbols();
        let mut out = String::with_capacity(cells.len() + cells.len() / SAVE_LINE_WIDTH);
        for (i, symbol) in cells.iter().enumerate() {
            if i > 0 && i.is_multiple_of(SAVE_LINE_WIDTH) {
                out.push('\n');
            }
            out.push(symbol.as_char());
        }
        out
    }

    pub fn save_writer<W: Write>(&self, mut writer: W) -> Result<(), GridError> {
        writer.write_all(self.save_string().as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    /// Debug view: a hex column ruler followed by the flat symbol buffer.
    #[must_use]
    pub fn dump(&self) -> String {
        let flat: String = self.symbols().iter().map(|s| s.as_char()).collect();
        format!("0123456789abcdef\n{flat}\n")
    }
}

#[cfg(test)]
mod tests {
    use crate::{Grid, GridConfig};

    fn grid(width: u32, height: u32) -> Grid {
        Grid::new(GridConfig {
            width,
            height,
            rng_seed: Some(3),
        })
        .expect("grid")
    }

    #[test]
    fn load_skips_unknown_characters_without_advancing() {
        let mut grid = grid(2, 8);
        let next = grid.load_str("1 .>\t1#%", 0);
        assert_eq!(next, 4);
        assert_eq!(&grid.save_string()[..5], "1.>1.");
    }

    #[test]
    fn load_keeps_letters_without_entry_in_place() {
        let mut grid = grid(2, 8);
        let next = grid.load_str("1Z2B3", 0);
        assert_eq!(next, 5);
        assert_eq!(&grid.save_string()[..6], "1Z2B3.");
    }

    #[test]
    fn load_dot_advances_without_overwriting() {
        let mut grid = grid(2, 8);
        grid.load_str("abc", 0);
        let next = grid.load_str(".x.", 0);
        assert_eq!(next, 3);
        assert_eq!(&grid.save_string()[..3], "axc");
    }

    #[test]
    fn load_continues_from_returned_offset() {
        let mut grid = grid(2, 8);
        let offset = grid.load_str("S3", 0);
        let offset = grid.load_str("123", offset);
        assert_eq!(offset, 5);
        assert_eq!(&grid.save_string()[..5], "S3123");
    }

    #[test]
    fn save_breaks_lines_every_sixteen_symbols() {
        let mut grid = grid(2, 16);
        grid.load_str("0123456789abcdefg", 0);
        let saved = grid.save_string();
        let lines: Vec<&str> = saved.split('\n').collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "0123456789abcdef");
        assert_eq!(lines[1], "g...............");
        assert!(!saved.ends_with('\n'));
    }

    #[test]
    fn save_then_load_round_trips() {
        let mut source = grid(4, 8);
        source.load_str("G8.1..I?..S2ab..T5..O1?4", 3);
        let saved = source.save_string();

        let mut copy = grid(4, 8);
        let end = copy.load_reader(saved.as_bytes()).expect("load");
        assert_eq!(end, copy.cell_count());
        assert_eq!(copy.symbols(), source.symbols());
    }

    #[test]
    fn dump_prints_ruler_and_flat_buffer() {
        let mut grid = grid(1, 4);
        grid.load_str("1>", 0);
        assert_eq!(grid.dump(), "0123456789abcdef\n1>..\n");
    }
}
