//! Cell symbols and their base-36 value encoding.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::opcode;

/// Number of distinct values a cell (and a register id) can take.
pub const BASE: usize = 36;

/// Largest encodable cell value.
pub const MAX_VALUE: u8 = (BASE - 1) as u8;

/// A single grid symbol stored as its ASCII byte.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol(u8);

impl Symbol {
    /// The empty cell marker `.`.
    pub const EMPTY: Self = Self(b'.');
    /// The "substitute the bang" argument marker `?`.
    pub const QUERY: Self = Self(b'?');

    /// Wrap a byte, replacing anything outside the alphabet with [`Symbol::EMPTY`].
    #[must_use]
    pub fn new(byte: u8) -> Self {
        let symbol = Self(byte);
        if symbol.is_valid() { symbol } else { Self::EMPTY }
    }

    /// Parse a character, returning `None` for anything outside the alphabet.
    ///
    /// `.` parses to [`Symbol::EMPTY`] even though it is not "valid" for
    /// writing purposes.
    #[must_use]
    pub fn from_char(c: char) -> Option<Self> {
        let byte = u8::try_from(c).ok()?;
        let symbol = Self(byte);
        (symbol.is_empty() || symbol.is_valid()).then_some(symbol)
    }

    /// Encode an integer as a number symbol (modulo 36, sign discarded).
    #[must_use]
    pub fn from_value(value: i64) -> Self {
        let v = (value % BASE as i64).unsigned_abs() as u8;
        if v <= 9 {
            Self(b'0' + v)
        } else {
            Self(b'a' + (v - 10))
        }
    }

    #[must_use]
    pub const fn byte(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn as_char(self) -> char {
        self.0 as char
    }

    /// Decode the base-36 value; `.` and non-number symbols decode to zero.
    #[must_use]
    pub const fn value(self) -> u8 {
        match self.0 {
            b'0'..=b'9' => self.0 - b'0',
            b'a'..=b'z' => self.0 - b'a' + 10,
            _ => 0,
        }
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == b'.'
    }

    #[must_use]
    pub const fn is_query(self) -> bool {
        self.0 == b'?'
    }

    #[must_use]
    pub const fn is_number(self) -> bool {
        matches!(self.0, b'0'..=b'9' | b'a'..=b'z')
    }

    /// Every uppercase letter is a command, with or without an opcode table
    /// entry, as are the marks `<`, `>` and `$`.
    #[must_use]
    pub fn is_command(self) -> bool {
        self.0.is_ascii_uppercase() || opcode::lookup(self).is_some()
    }

    /// Numbers, commands and `?` may be stored in a cell.
    #[must_use]
    pub fn is_valid(self) -> bool {
        self.is_number() || self.is_command() || self.is_query()
    }

    /// Resolve an argument cell: `?` substitutes `bang`, anything else is kept.
    #[must_use]
    pub const fn or_bang(self, bang: Self) -> Self {
        if self.is_query() { bang } else { self }
    }
}

impl Default for Symbol {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({:?})", self.as_char())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Per-tick semantic tag of a cell.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum CellState {
    #[default]
    Empty,
    Command,
    Number,
    /// Operand of a preceding command; never moved or executed.
    Argument,
    /// Written by the left redirect this tick; inert until reclassified.
    New,
    Error,
}
