//! Core types for the gridbang symbol-grid machine.
//!
//! A [`Grid`] is both memory and program: every tick it classifies each cell,
//! evaluates commands from the highest address down, resolves teleport
//! broadcasts and advances its clock. Notes produced by the output command are
//! handed synchronously to a [`NoteSink`].

use gridbang_rng::Mt19937;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod grid;
pub mod opcode;
pub mod symbol;
mod text;

pub use grid::Grid;
pub use gridbang_rng::RngError;
pub use opcode::{Opcode, OpcodeSpec};
pub use symbol::{BASE, CellState, MAX_VALUE, Symbol};
pub use text::SAVE_LINE_WIDTH;

/// Discrete machine clock (ticks evaluated since the last reset).
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Resets the tick counter back to zero.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}

/// Errors raised while constructing or loading a grid.
#[derive(Debug, Error)]
pub enum GridError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// Reading or writing program text failed.
    #[error("program i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Static configuration for a grid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GridConfig {
    /// Number of columns.
    pub width: u32,
    /// Cells per column; numbers fall toward the bottom of a column.
    pub height: u32,
    /// Optional RNG seed for reproducible runs.
    pub rng_seed: Option<u64>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            width: 64,
            height: 32,
            rng_seed: None,
        }
    }
}

impl GridConfig {
    /// Validates the configuration, returning the total cell count.
    pub(crate) fn cell_count(&self) -> Result<usize, GridError> {
        if self.width == 0 || self.height == 0 {
            return Err(GridError::InvalidConfig("grid dimensions must be non-zero"));
        }
        let cells = u64::from(self.width) * u64::from(self.height);
        if i64::try_from(cells).is_err() || usize::try_from(cells).is_err() {
            return Err(GridError::InvalidConfig("grid is too large to address"));
        }
        Ok(cells as usize)
    }

    /// Returns the configured RNG, seeding from entropy if no seed is set.
    pub(crate) fn seeded_rng(&self) -> Mt19937 {
        match self.rng_seed {
            Some(seed) => Mt19937::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                Mt19937::seed_from_u64(seed)
            }
        }
    }
}

/// A note trigger produced by the output command.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct NoteEvent {
    pub tick: Tick,
    /// MIDI channel, always in `0..16`.
    pub channel: u8,
    pub note: u8,
    pub octave: u8,
    pub velocity: u8,
    pub length: u8,
}

impl NoteEvent {
    /// MIDI key number (`octave * 12 + note`).
    #[must_use]
    pub fn midi_key(&self) -> u16 {
        u16::from(self.octave) * 12 + u16::from(self.note)
    }

    /// Status byte of the matching note-on message.
    #[must_use]
    pub fn note_on_status(&self) -> u8 {
        0x90 + self.channel
    }
}

/// Receives note events synchronously while a tick is evaluated.
pub trait NoteSink: Send {
    fn on_note(&mut self, event: &NoteEvent);
}

/// Sink that discards every note.
#[derive(Debug, Default)]
pub struct NullSink;

impl NoteSink for NullSink {
    fn on_note(&mut self, _event: &NoteEvent) {}
}

/// Counters reported after processing a tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TickEvents {
    /// Clock value after the tick completed.
    pub tick: Tick,
    pub commands_fired: usize,
    pub notes_emitted: usize,
    /// Teleport receivers written during broadcast resolution.
    pub broadcasts: usize,
}
