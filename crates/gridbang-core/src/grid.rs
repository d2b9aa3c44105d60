use gridbang_rng::Mt19937;
use std::fmt;
use tracing::debug;

use crate::opcode::{self, Opcode};
use crate::symbol::{BASE, CellState, Symbol};
use crate::{GridConfig, GridError, NoteEvent, NoteSink, NullSink, Tick, TickEvents};

/// Symbol memory plus the per-tick state needed to evaluate it.
///
/// Cells are stored column-major: address `x` lives in column `x / height`,
/// row `x % height`. Every address is reduced with `abs(x) % cell_count`, so
/// reads and writes never go out of bounds.
pub struct Grid {
    config: GridConfig,
    height: usize,
    tick: Tick,
    symbols: Vec<Symbol>,
    states: Vec<CellState>,
    /// Named variables; persist across ticks.
    variables: [Symbol; BASE],
    /// Teleport channels; cleared at the end of every tick.
    channels: [u8; BASE],
    rng: Mt19937,
    sink: Box<dyn NoteSink>,
    notes_emitted: usize,
}

impl fmt::Debug for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grid")
            .field("config", &self.config)
            .field("tick", &self.tick)
            .field("cells", &self.symbols.len())
            .finish()
    }
}

impl Grid {
    /// Instantiate an empty grid using the supplied configuration.
    pub fn new(config: GridConfig) -> Result<Self, GridError> {
        Self::with_sink(config, Box::new(NullSink))
    }

    /// Instantiate an empty grid whose output command reports to `sink`.
    pub fn with_sink(config: GridConfig, sink: Box<dyn NoteSink>) -> Result<Self, GridError> {
        let cells = config.cell_count()?;
        let rng = config.seeded_rng();
        Ok(Self {
            height: config.height as usize,
            config,
            tick: Tick::zero(),
            symbols: vec![Symbol::EMPTY; cells],
            states: vec![CellState::Empty; cells],
            variables: [Symbol::EMPTY; BASE],
            channels: [0; BASE],
            rng,
            sink,
            notes_emitted: 0,
        })
    }

    #[must_use]
    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.config.width as usize
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Total number of cells (`width * height`).
    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.symbols.len()
    }

    #[must_use]
    pub fn tick(&self) -> Tick {
        self.tick
    }

    #[must_use]
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Classification produced by the most recent tick.
    #[must_use]
    pub fn states(&self) -> &[CellState] {
        &self.states
    }

    /// Replace the output sink.
    pub fn set_sink(&mut self, sink: Box<dyn NoteSink>) {
        self.sink = sink;
    }

    #[inline]
    fn slot(&self, x: i64) -> usize {
        (x.unsigned_abs() % self.symbols.len() as u64) as usize
    }

    /// Symbol at address `x` (toroidal).
    #[must_use]
    pub fn get(&self, x: i64) -> Symbol {
        self.symbols[self.slot(x)]
    }

    /// Classification of address `x` (toroidal).
    #[must_use]
    pub fn state(&self, x: i64) -> CellState {
        self.states[self.slot(x)]
    }

    /// Store `symbol` at address `x` without touching its classification.
    pub fn set(&mut self, x: i64, symbol: Symbol) {
        let slot = self.slot(x);
        self.symbols[slot] = symbol;
    }

    /// Editor-style write; characters outside the alphabet store `.`.
    pub fn edit(&mut self, x: i64, c: char) {
        let symbol = Symbol::from_char(c).unwrap_or(Symbol::EMPTY);
        self.set(x, symbol);
    }

    /// Value held by the named variable `id`.
    #[must_use]
    pub fn variable(&self, id: Symbol) -> Symbol {
        self.variables[usize::from(id.value())]
    }

    /// Pending broadcast value on channel `id`; always zero between ticks.
    #[must_use]
    pub fn channel(&self, id: Symbol) -> u8 {
        self.channels[usize::from(id.value())]
    }

    pub fn clear_variables(&mut self) {
        self.variables = [Symbol::EMPTY; BASE];
    }

    /// Clear memory, classification, registers and the clock.
    ///
    /// The RNG keeps its position; rebuild the grid to replay a seed.
    pub fn reset(&mut self) {
        self.symbols.fill(Symbol::EMPTY);
        self.states.fill(CellState::Empty);
        self.clear_variables();
        self.channels = [0; BASE];
        self.tick = Tick::zero();
    }

    pub(crate) fn write(&mut self, x: i64, symbol: Symbol, state: CellState) {
        let slot = self.slot(x);
        self.symbols[slot] = symbol;
        self.states[slot] = state;
    }

    pub(crate) fn set_variable(&mut self, id: Symbol, value: Symbol) {
        self.variables[usize::from(id.value())] = value;
    }

    pub(crate) fn send(&mut self, id: Symbol, value: u8) {
        self.channels[usize::from(id.value())] = value;
    }

    pub(crate) fn rng_mut(&mut self) -> &mut Mt19937 {
        &mut self.rng
    }

    pub(crate) fn emit(&mut self, event: NoteEvent) {
        debug!(
            tick = event.tick.0,
            channel = event.channel,
            note = event.note,
            octave = event.octave,
            velocity = event.velocity,
            length = event.length,
            "note emitted"
        );
        self.notes_emitted += 1;
        self.sink.on_note(&event);
    }

    /// Tag every cell for this tick, scanning from address zero upward.
    fn stage_classify(&mut self) {
        let mut pending = 0usize;
        for x in 0..self.symbols.len() {
            if pending > 0 {
                self.states[x] = CellState::Argument;
                pending -= 1;
                continue;
            }
            let symbol = self.symbols[x];
            self.states[x] = if symbol.is_empty() {
                CellState::Empty
            } else if symbol.is_number() {
                CellState::Number
            } else if symbol.is_command() {
                match opcode::lookup(symbol) {
                    Some(spec) => pending = spec.argument_count(self.get(x as i64 + 1)),
                    None => debug!(address = x, symbol = %symbol, "command has no table entry"),
                }
                CellState::Command
            } else {
                debug!(address = x, symbol = %symbol, "unrecognised symbol");
                CellState::Error
            };
        }
    }

    fn can_bang(&self, x: i64, required: u8) -> bool {
        (1..=i64::from(required)).all(|offset| self.state(x - offset) == CellState::Number)
    }

    /// Numbers fall one cell per tick and vanish at the bottom of a column.
    fn fall(&mut self, x: usize) {
        if (x + 1).is_multiple_of(self.height) {
            self.symbols[x] = Symbol::EMPTY;
            self.states[x] = CellState::Empty;
        } else if self.states[x + 1] == CellState::Empty {
            self.symbols[x + 1] = self.symbols[x];
            self.states[x + 1] = CellState::Number;
            self.symbols[x] = Symbol::EMPTY;
            self.states[x] = CellState::Empty;
        }
    }

    /// Apply gravity and fire ready commands from the highest address down.
    fn stage_evaluate(&mut self) -> usize {
        let mut fired = 0;
        for x in (0..self.symbols.len()).rev() {
            match self.states[x] {
                CellState::Number => self.fall(x),
                CellState::Command => {
                    let address = x as i64;
                    let Some(spec) = opcode::lookup(self.symbols[x]) else {
                        debug!(address, symbol = %self.symbols[x], "no handler for command");
                        continue;
                    };
                    if spec.pure || self.can_bang(address, spec.bangs) {
                        spec.opcode.apply(self, address);
                        for offset in 1..=i64::from(spec.bangs) {
                            self.write(address - offset, Symbol::EMPTY, CellState::Empty);
                        }
                        fired += 1;
                    }
                }
                _ => {}
            }
        }
        fired
    }

    /// Copy every live channel value to `x + 2` of each teleport sharing it,
    /// then clear the channels.
    fn stage_broadcast(&mut self) -> usize {
        let mut delivered = 0;
        for x in 0..self.symbols.len() {
            if opcode::lookup(self.symbols[x]).map(|spec| spec.opcode) != Some(Opcode::Teleport) {
                continue;
            }
            let address = x as i64;
            let value = self.channel(self.get(address + 1));
            if value > 0 {
                self.write(address + 2, Symbol::from_value(i64::from(value)), CellState::Number);
                delivered += 1;
            }
        }
        self.channels = [0; BASE];
        delivered
    }

    /// Advance the grid by one tick.
    pub fn step(&mut self) -> TickEvents {
        self.notes_emitted = 0;
        self.stage_classify();
        let commands_fired = self.stage_evaluate();
        let broadcasts = self.stage_broadcast();
        self.tick = self.tick.next();
        TickEvents {
            tick: self.tick,
            commands_fired,
            notes_emitted: self.notes_emitted,
            broadcasts,
        }
    }
}
