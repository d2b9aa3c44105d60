//! Command table and per-command handlers.
//!
//! Every handler is addressed relative to the firing command at `x`: inputs
//! ("bangs") sit at `x - 1 ..`, arguments at `x + 1 ..`, and outputs are
//! written past the arguments. All writes go through [`Grid::write`], which
//! wraps addresses toroidally.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::grid::Grid;
use crate::symbol::{BASE, CellState, MAX_VALUE, Symbol};
use crate::NoteEvent;

/// Behaviour selected by a command symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    Accumulate,
    Const,
    Decrement,
    Euclid,
    Filter,
    Generate,
    Increment,
    Jump,
    Modulo,
    Output,
    Probability,
    Query,
    Random,
    Sequence,
    Teleport,
    Variable,
    Kill,
    Right,
    Left,
    Duplicate,
    /// Reserved letter with metadata but no behaviour; firing only consumes the bang.
    Reserved,
}

/// Static metadata for a command symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeSpec {
    pub symbol: u8,
    pub opcode: Opcode,
    /// Fires every tick without waiting for inputs.
    pub pure: bool,
    /// Argument count is read from the cell after the command.
    pub variadic: bool,
    /// Preceding Number cells required to fire; cleared after firing.
    pub bangs: u8,
    /// Cells after the command classified as arguments.
    pub args: u8,
}

impl OpcodeSpec {
    const fn new(symbol: u8, opcode: Opcode, bangs: u8, args: u8) -> Self {
        Self {
            symbol,
            opcode,
            pure: false,
            variadic: false,
            bangs,
            args,
        }
    }

    const fn pure(mut self) -> Self {
        self.pure = true;
        self
    }

    const fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    /// Number of cells following the command that are consumed as arguments.
    ///
    /// Variadic commands treat `next` as a length: the length cell itself plus
    /// that many values are arguments. An empty length reserves only itself.
    #[must_use]
    pub fn argument_count(&self, next: Symbol) -> usize {
        if !self.variadic {
            return usize::from(self.args);
        }
        if next.is_empty() {
            1
        } else {
            usize::from(next.value()) + 1
        }
    }
}

const SPECS: [OpcodeSpec; 21] = [
    OpcodeSpec::new(b'A', Opcode::Accumulate, 1, 1),
    OpcodeSpec::new(b'C', Opcode::Const, 1, 1),
    OpcodeSpec::new(b'D', Opcode::Decrement, 1, 1),
    OpcodeSpec::new(b'E', Opcode::Euclid, 1, 3),
    OpcodeSpec::new(b'F', Opcode::Filter, 1, 1),
    OpcodeSpec::new(b'G', Opcode::Generate, 0, 2).pure(),
    OpcodeSpec::new(b'I', Opcode::Increment, 1, 1),
    OpcodeSpec::new(b'J', Opcode::Jump, 1, 1),
    OpcodeSpec::new(b'M', Opcode::Modulo, 1, 1),
    OpcodeSpec::new(b'O', Opcode::Output, 1, 5),
    OpcodeSpec::new(b'P', Opcode::Probability, 1, 1),
    OpcodeSpec::new(b'Q', Opcode::Query, 1, 1),
    OpcodeSpec::new(b'R', Opcode::Random, 1, 2),
    OpcodeSpec::new(b'S', Opcode::Sequence, 1, 1).variadic(),
    OpcodeSpec::new(b'T', Opcode::Teleport, 1, 1),
    OpcodeSpec::new(b'V', Opcode::Variable, 1, 2),
    OpcodeSpec::new(b'X', Opcode::Kill, 1, 0),
    OpcodeSpec::new(b'Z', Opcode::Reserved, 1, 1),
    OpcodeSpec::new(b'<', Opcode::Left, 1, 1),
    OpcodeSpec::new(b'>', Opcode::Right, 1, 1),
    OpcodeSpec::new(b'$', Opcode::Duplicate, 1, 1),
];

const fn build_table() -> [Option<OpcodeSpec>; 128] {
    let mut table = [None; 128];
    let mut i = 0;
    while i < SPECS.len() {
        table[SPECS[i].symbol as usize] = Some(SPECS[i]);
        i += 1;
    }
    table
}

static TABLE: [Option<OpcodeSpec>; 128] = build_table();

/// Look up the command metadata for `symbol` in constant time.
#[must_use]
pub fn lookup(symbol: Symbol) -> Option<&'static OpcodeSpec> {
    TABLE.get(usize::from(symbol.byte()))?.as_ref()
}

/// All command specs in table order.
#[must_use]
pub fn specs() -> &'static [OpcodeSpec] {
    &SPECS
}

impl Opcode {
    /// Run the handler for a command firing at address `x`.
    pub(crate) fn apply(self, grid: &mut Grid, x: i64) {
        match self {
            Self::Accumulate => accumulate(grid, x),
            Self::Const => constant(grid, x),
            Self::Decrement => decrement(grid, x),
            Self::Euclid => euclid(grid, x),
            Self::Filter => filter(grid, x),
            Self::Generate => generate(grid, x),
            Self::Increment => increment(grid, x),
            Self::Jump => jump(grid, x),
            Self::Modulo => modulo(grid, x),
            Self::Output => output(grid, x),
            Self::Probability => probability(grid, x),
            Self::Query => query(grid, x),
            Self::Random => random(grid, x),
            Self::Sequence => sequence(grid, x),
            Self::Teleport => teleport_send(grid, x),
            Self::Variable => variable(grid, x),
            Self::Kill => {}
            Self::Right => redirect_right(grid, x),
            Self::Left => redirect_left(grid, x),
            Self::Duplicate => duplicate(grid, x),
            Self::Reserved => debug!(address = x, "command has no handler"),
        }
    }
}

/// Step amount for increment/decrement: `?` takes the bang, empty means one.
fn step_amount(arg: Symbol, bang: u8) -> i64 {
    if arg.is_query() {
        i64::from(bang)
    } else if arg.is_empty() {
        1
    } else {
        i64::from(arg.value())
    }
}

// The running total is both argument storage and output; overflow wraps.
fn accumulate(grid: &mut Grid, x: i64) {
    let bang = grid.get(x - 1).value();
    let total = grid.get(x + 1).value();
    if bang == 0 {
        return;
    }
    let sum = Symbol::from_value(i64::from(total) + i64::from(bang));
    grid.write(x + 1, sum, CellState::Argument);
    grid.write(x + 2, sum, CellState::Number);
}

fn constant(grid: &mut Grid, x: i64) {
    let arg = grid.get(x + 1);
    if arg.is_empty() {
        return;
    }
    let out = arg.or_bang(grid.get(x - 1));
    grid.write(x + 2, out, CellState::Number);
}

fn decrement(grid: &mut Grid, x: i64) {
    let bang = grid.get(x - 1).value();
    let out = (i64::from(bang) - step_amount(grid.get(x + 1), bang)).max(0);
    grid.write(x + 2, Symbol::from_value(out), CellState::Number);
}

fn increment(grid: &mut Grid, x: i64) {
    let bang = grid.get(x - 1).value();
    let out = (i64::from(bang) + step_amount(grid.get(x + 1), bang)).min(i64::from(MAX_VALUE));
    grid.write(x + 2, Symbol::from_value(out), CellState::Number);
}

/// Euclidean rhythm: spreads `pulses` hits over `steps`, tracking the
/// position in the cycle at `x + 3`.
fn euclid(grid: &mut Grid, x: i64) {
    if grid.get(x - 1).value() == 0 {
        return;
    }
    let pulses_arg = grid.get(x + 1);
    let steps_arg = grid.get(x + 2);
    let current_arg = grid.get(x + 3);

    let steps = if steps_arg.is_empty() || steps_arg.value() == 0 {
        3
    } else {
        i64::from(steps_arg.value())
    };
    let pulses = if pulses_arg.is_empty() {
        1
    } else {
        i64::from(pulses_arg.value()).clamp(1, steps)
    };
    let mut current = if current_arg.is_empty() {
        1
    } else {
        i64::from(current_arg.value()) + 1
    };

    let bucket = (pulses * (current + steps - 1)) % steps + pulses;
    if bucket >= steps {
        grid.write(x + 4, Symbol::from_value(current), CellState::Number);
        if current == steps {
            current = 0;
        }
    }
    grid.write(x + 3, Symbol::from_value(current), CellState::Number);
}

fn filter(grid: &mut Grid, x: i64) {
    let bang = grid.get(x - 1);
    if grid.get(x + 1) == bang {
        grid.write(x + 2, bang, CellState::Number);
    }
}

/// Clock generator. Emits `((clock + 1) / rate) % modulus + 1` every `rate`
/// ticks; a zero directly above pauses it.
fn generate(grid: &mut Grid, x: i64) {
    let gate = grid.get(x - 1);
    if gate.is_empty() || gate.value() > 0 {
        let rate = match u64::from(grid.get(x + 1).or_bang(gate).value()) {
            0 => 8,
            v => v,
        };
        let clock = grid.tick().0;
        if clock.is_multiple_of(rate) {
            let modulus = u64::from(grid.get(x + 2).or_bang(gate).value()).max(1);
            let v = ((clock + 1) / rate) % modulus;
            grid.write(x + 3, Symbol::from_value(v as i64 + 1), CellState::Number);
        }
    }
    // Two stacked inputs would otherwise pile up above a pure command.
    if grid.state(x - 1) == CellState::Number && grid.state(x - 2) == CellState::Number {
        grid.write(x - 1, Symbol::EMPTY, CellState::Empty);
    }
}

fn jump(grid: &mut Grid, x: i64) {
    let bang = grid.get(x - 1);
    let arg = grid.get(x + 1);
    let target = if arg.is_query() {
        x + i64::from(bang.value()) + 1
    } else if arg.is_empty() {
        x + 2
    } else {
        x + 1 + i64::from(arg.value().max(1))
    };
    grid.write(target, bang, CellState::Number);
}

fn modulo(grid: &mut Grid, x: i64) {
    let arg = grid.get(x + 1);
    if arg.is_empty() {
        return;
    }
    let divisor = arg.value().max(1);
    let out = grid.get(x - 1).value() % divisor;
    grid.write(x + 2, Symbol::from_value(i64::from(out)), CellState::Number);
}

fn output(grid: &mut Grid, x: i64) {
    let bang = grid.get(x - 1);
    let mut values = [0u8; 5];
    for (slot, offset) in values.iter_mut().zip(1_i64..) {
        *slot = grid.get(x + offset).or_bang(bang).value();
    }
    if values[0] > 15 {
        values[0] = 0;
    }
    let [channel, note, octave, velocity, length] = values;
    grid.emit(NoteEvent {
        tick: grid.tick(),
        channel,
        note,
        octave,
        velocity,
        length,
    });
}

fn probability(grid: &mut Grid, x: i64) {
    let bang = grid.get(x - 1);
    let pass = match grid.get(x + 1).or_bang(bang).value() {
        0 => false,
        MAX_VALUE => true,
        weight => grid.rng_mut().next_f64() < f64::from(weight) / BASE as f64,
    };
    if pass {
        grid.write(x + 2, bang, CellState::Number);
    }
}

// The bang only gates firing; its value is never read.
fn query(grid: &mut Grid, x: i64) {
    let id = grid.get(x + 1);
    if id.is_empty() {
        return;
    }
    let stored = grid.variable(id);
    if !stored.is_empty() {
        grid.write(x + 2, stored, CellState::Number);
    }
}

/// Uniform value in `[min, max)`, drawn from one double.
fn random(grid: &mut Grid, x: i64) {
    let bang = grid.get(x - 1);
    let min = i64::from(grid.get(x + 1).or_bang(bang).value());
    let mut max = i64::from(grid.get(x + 2).or_bang(bang).value()) + 1;
    if max <= min {
        max = min + 2;
    }
    let draw = grid.rng_mut().next_f64() * (max - min) as f64 + min as f64;
    grid.write(x + 3, Symbol::from_value(draw as i64), CellState::Number);
}

/// `S n v1 .. vn`: a bang of `k` outputs `v((k - 1) % n + 1)` after the data.
fn sequence(grid: &mut Grid, x: i64) {
    let bang = i64::from(grid.get(x - 1).value());
    let len = i64::from(grid.get(x + 1).value());
    if len == 0 || bang == 0 {
        return;
    }
    let index = (bang - 1) % len + 1;
    let value = grid.get(x + 1 + index);
    if !value.is_empty() {
        grid.write(x + 2 + len, value, CellState::Number);
    }
}

// `?` decodes to zero, so it sends on channel 0.
fn teleport_send(grid: &mut Grid, x: i64) {
    let bang = grid.get(x - 1).value();
    let channel = grid.get(x + 1);
    grid.send(channel, bang);
    trace!(address = x, channel = %channel, value = bang, "teleport send");
}

fn variable(grid: &mut Grid, x: i64) {
    let id = grid.get(x + 1);
    if id.is_empty() {
        return;
    }
    let bang = grid.get(x - 1);
    grid.set_variable(id, bang);
    debug!(register = %id, value = %bang, "variable stored");
    grid.write(x + 2, bang, CellState::Argument);
    grid.write(x + 3, bang, CellState::Number);
}

/// Redirect distance: `?` takes the bang, empty means one column, and zero
/// means a literal two cells.
fn redirect_distance(grid: &Grid, x: i64, bang: Symbol) -> i64 {
    let arg = grid.get(x + 1);
    let columns = if arg.is_query() {
        bang.value()
    } else if arg.is_empty() {
        1
    } else {
        arg.value()
    };
    if columns == 0 {
        2
    } else {
        grid.height() as i64 * i64::from(columns)
    }
}

fn redirect_right(grid: &mut Grid, x: i64) {
    let bang = grid.get(x - 1);
    if bang.value() == 0 {
        return;
    }
    let target = x + redirect_distance(grid, x, bang);
    if target < grid.cell_count() as i64 {
        grid.write(target, bang, CellState::Number);
    }
}

// Tagged New rather than Number, so the value rests until the next tick.
fn redirect_left(grid: &mut Grid, x: i64) {
    let bang = grid.get(x - 1);
    if bang.value() == 0 {
        return;
    }
    let target = x - redirect_distance(grid, x, bang);
    if target > 0 {
        grid.write(target, bang, CellState::New);
    }
}

fn duplicate(grid: &mut Grid, x: i64) {
    let bang = grid.get(x - 1);
    if bang.value() == 0 {
        return;
    }
    grid.write(x + 2, bang, CellState::Number);
    let arg = grid.get(x + 1);
    let offset = if arg.is_query() {
        bang.value()
    } else if arg.is_empty() {
        1
    } else {
        arg.value()
    };
    grid.write(x + 2 + i64::from(offset.max(1)), bang, CellState::Number);
}
