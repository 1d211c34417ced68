use std::collections::TryReserveError;
use std::fmt;
use std::io::Write;

use thiserror::Error;

use crate::util::f32_close;

#[derive(Error, Debug)]
pub enum MatrixError {
    #[error("failed to allocate a DP matrix of {cells} cells")]
    Allocation {
        cells: usize,
        #[source]
        source: TryReserveError,
    },
    #[error("failed to allocate {rows} DP matrix row offsets")]
    RowAllocation {
        rows: usize,
        #[source]
        source: TryReserveError,
    },
}

#[derive(Error, Debug)]
#[error("{kind} matrix failed validation at row {row}: {reason}")]
pub struct MatrixValidationError {
    pub kind: MatrixKind,
    pub row: usize,
    pub reason: String,
}

/// What a DP matrix currently holds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MatrixKind {
    #[default]
    Unset,
    Forward,
    Backward,
    Decoding,
    Alignment,
    Viterbi,
}

impl fmt::Display for MatrixKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MatrixKind::Unset => "unset",
            MatrixKind::Forward => "forward",
            MatrixKind::Backward => "backward",
            MatrixKind::Decoding => "decoding",
            MatrixKind::Alignment => "alignment",
            MatrixKind::Viterbi => "viterbi",
        };
        write!(f, "{name}")
    }
}

/// The reference DP matrix.
///
/// Each row holds M+1 blocks of the six main states followed by the nine special states:
///
/// ```text
///     [ML MG IL IG DL DG]_0 ... [ML MG IL IG DL DG]_M  E N J B L G C JJ CC
/// ```
///
/// Rows 0..=L are addressed through a row offset table so that the
/// allocation can be reused for any (M, L) that fits inside it.
#[derive(Clone, Default)]
pub struct DpMatrix {
    /// The profile length the matrix is currently laid out for
    pub profile_length: usize,
    /// The target length the matrix is currently laid out for
    pub target_length: usize,
    pub kind: MatrixKind,
    /// The cell data; `data.len()` is the number of allocated cells
    pub data: Vec<f32>,
    /// The offset of the start of each valid row
    pub row_offsets: Vec<usize>,
    /// The width of an allocated row
    pub alloc_width: usize,
    /// The number of allocated row offsets
    pub alloc_rows: usize,
    /// The number of rows that currently have a valid offset
    pub valid_rows: usize,
}

impl DpMatrix {
    pub const NUM_MAIN_CELLS: usize = 6;
    pub const ML: usize = 0;
    pub const MG: usize = 1;
    pub const IL: usize = 2;
    pub const IG: usize = 3;
    pub const DL: usize = 4;
    pub const DG: usize = 5;

    pub const NUM_SPECIAL_CELLS: usize = 9;
    pub const E: usize = 0;
    pub const N: usize = 1;
    pub const J: usize = 2;
    pub const B: usize = 3;
    pub const L: usize = 4;
    pub const G: usize = 5;
    pub const C: usize = 6;
    pub const JJ: usize = 7;
    pub const CC: usize = 8;

    pub const MAIN_CELL_NAMES: [&'static str; 6] = ["ML", "MG", "IL", "IG", "DL", "DG"];
    pub const SPECIAL_CELL_NAMES: [&'static str; 9] =
        ["E", "N", "J", "B", "L", "G", "C", "JJ", "CC"];

    pub fn new(profile_length: usize, target_length: usize) -> Result<Self, MatrixError> {
        let mut matrix = DpMatrix::default();
        matrix.grow_to(profile_length, target_length)?;
        Ok(matrix)
    }

    #[inline(always)]
    fn row_width(profile_length: usize) -> usize {
        (profile_length + 1) * Self::NUM_MAIN_CELLS + Self::NUM_SPECIAL_CELLS
    }

    /// Makes sure the matrix can hold a (`profile_length`, `target_length`) problem.
    ///
    /// The allocation is only ever grown. Cell values are not preserved
    /// when the matrix has to be reallocated or its rows laid out again.
    pub fn grow_to(
        &mut self,
        profile_length: usize,
        target_length: usize,
    ) -> Result<(), MatrixError> {
        let width = Self::row_width(profile_length);
        let rows = target_length + 1;

        if width <= self.alloc_width && rows <= self.valid_rows {
            return Ok(());
        }

        let mut reset_rows = rows > self.valid_rows;

        if width > self.alloc_width {
            self.alloc_width = width;
            reset_rows = true;
        }

        let cells = rows * self.alloc_width;
        if cells > self.data.len() {
            let mut data: Vec<f32> = Vec::new();
            data.try_reserve_exact(cells)
                .map_err(|source| MatrixError::Allocation { cells, source })?;
            data.resize(cells, -f32::INFINITY);
            self.data = data;
            reset_rows = true;
        }

        if rows > self.alloc_rows {
            let mut row_offsets: Vec<usize> = Vec::new();
            row_offsets
                .try_reserve_exact(rows)
                .map_err(|source| MatrixError::RowAllocation { rows, source })?;
            row_offsets.resize(rows, 0);
            self.row_offsets = row_offsets;
            self.alloc_rows = rows;
            reset_rows = true;
        }

        if reset_rows {
            self.valid_rows = self.alloc_rows.min(self.data.len() / self.alloc_width);
            for (row_idx, offset) in self.row_offsets[..self.valid_rows].iter_mut().enumerate() {
                *offset = row_idx * self.alloc_width;
            }
        }

        log::trace!(
            "DP matrix grown to {} cells, {} valid rows of width {}",
            self.data.len(),
            self.valid_rows,
            self.alloc_width
        );

        self.profile_length = 0;
        self.target_length = 0;
        Ok(())
    }

    /// Grows the matrix if needed and lays it out for a new problem of the given kind.
    pub fn prepare(
        &mut self,
        kind: MatrixKind,
        profile_length: usize,
        target_length: usize,
    ) -> Result<(), MatrixError> {
        self.grow_to(profile_length, target_length)?;
        self.kind = kind;
        self.profile_length = profile_length;
        self.target_length = target_length;
        Ok(())
    }

    /// Marks the matrix as empty without releasing its allocation.
    pub fn reuse(&mut self) {
        self.kind = MatrixKind::Unset;
        self.profile_length = 0;
        self.target_length = 0;
    }

    /// The number of bytes held by the matrix.
    pub fn size_of(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.data.capacity() * std::mem::size_of::<f32>()
            + self.row_offsets.capacity() * std::mem::size_of::<usize>()
    }

    #[inline(always)]
    fn main_idx(&self, target_idx: usize, profile_idx: usize, cell: usize) -> usize {
        debug_assert!(target_idx <= self.target_length);
        debug_assert!(profile_idx <= self.profile_length);
        self.row_offsets[target_idx] + profile_idx * Self::NUM_MAIN_CELLS + cell
    }

    #[inline(always)]
    fn special_idx(&self, target_idx: usize, cell: usize) -> usize {
        debug_assert!(target_idx <= self.target_length);
        self.row_offsets[target_idx] + (self.profile_length + 1) * Self::NUM_MAIN_CELLS + cell
    }

    #[inline(always)]
    pub fn get(&self, target_idx: usize, profile_idx: usize, cell: usize) -> f32 {
        self.data[self.main_idx(target_idx, profile_idx, cell)]
    }

    #[inline(always)]
    pub fn set(&mut self, target_idx: usize, profile_idx: usize, cell: usize, value: f32) {
        let idx = self.main_idx(target_idx, profile_idx, cell);
        self.data[idx] = value;
    }

    #[inline(always)]
    pub fn get_special(&self, target_idx: usize, cell: usize) -> f32 {
        self.data[self.special_idx(target_idx, cell)]
    }

    #[inline(always)]
    pub fn set_special(&mut self, target_idx: usize, cell: usize, value: f32) {
        let idx = self.special_idx(target_idx, cell);
        self.data[idx] = value;
    }

    /// All cells of a row, main states then specials.
    pub fn row(&self, target_idx: usize) -> &[f32] {
        let start = self.row_offsets[target_idx];
        &self.data[start..start + Self::row_width(self.profile_length)]
    }

    pub fn row_mut(&mut self, target_idx: usize) -> &mut [f32] {
        let start = self.row_offsets[target_idx];
        let width = Self::row_width(self.profile_length);
        &mut self.data[start..start + width]
    }

    /// Sets every main cell of a row to `value`.
    pub fn fill_main_row(&mut self, target_idx: usize, value: f32) {
        let width = (self.profile_length + 1) * Self::NUM_MAIN_CELLS;
        self.row_mut(target_idx)[..width].fill(value);
    }

    pub fn decode_main_cell(cell: usize) -> Option<&'static str> {
        Self::MAIN_CELL_NAMES.get(cell).copied()
    }

    pub fn decode_special_cell(cell: usize) -> Option<&'static str> {
        Self::SPECIAL_CELL_NAMES.get(cell).copied()
    }

    /// Checks that two matrices hold the same problem and the same values to within `tolerance`.
    pub fn compare(&self, other: &DpMatrix, tolerance: f32) -> bool {
        if self.kind != other.kind
            || self.profile_length != other.profile_length
            || self.target_length != other.target_length
        {
            return false;
        }

        (0..=self.target_length).all(|target_idx| {
            self.row(target_idx)
                .iter()
                .zip(other.row(target_idx))
                .all(|(&a, &b)| f32_close(a, b, tolerance))
        })
    }

    /// Like `compare`, but only looks at the local path: the ML, IL and DL
    /// cells and every special except G.
    pub fn compare_local(&self, other: &DpMatrix, tolerance: f32) -> bool {
        if self.kind != other.kind
            || self.profile_length != other.profile_length
            || self.target_length != other.target_length
        {
            return false;
        }

        (0..=self.target_length).all(|target_idx| {
            let main_cells_match = (0..=self.profile_length).all(|profile_idx| {
                [Self::ML, Self::IL, Self::DL].into_iter().all(|cell| {
                    f32_close(
                        self.get(target_idx, profile_idx, cell),
                        other.get(target_idx, profile_idx, cell),
                        tolerance,
                    )
                })
            });

            main_cells_match
                && (0..Self::NUM_SPECIAL_CELLS)
                    .filter(|&cell| cell != Self::G)
                    .all(|cell| {
                        f32_close(
                            self.get_special(target_idx, cell),
                            other.get_special(target_idx, cell),
                            tolerance,
                        )
                    })
        })
    }

    /// Checks the boundary conditions that every matrix of the current kind must meet.
    ///
    /// Patterns are written per cell: `*` must be -inf, `0` must be exactly 0,
    /// `.` is unconstrained.
    /// No cell may be NaN.
    pub fn validate(&self) -> Result<(), MatrixValidationError> {
        let fail = |row: usize, reason: String| {
            Err(MatrixValidationError {
                kind: self.kind,
                row,
                reason,
            })
        };

        if self.kind == MatrixKind::Unset {
            return fail(0, "matrix kind is unset".to_string());
        }

        let length = self.target_length;
        let m = self.profile_length;

        for target_idx in 0..=length {
            if let Some(cell) = self.row(target_idx).iter().position(|v| v.is_nan()) {
                return fail(target_idx, format!("NaN at row offset {cell}"));
            }

            let column_zero = if self.kind == MatrixKind::Decoding {
                "000000"
            } else {
                "******"
            };
            self.check_main(target_idx, 0, column_zero)?;

            let rules = self.row_rules(target_idx);
            for rule in rules {
                for profile_idx in 1..=m {
                    if profile_idx == 1 {
                        self.check_main(target_idx, profile_idx, rule.first)?;
                    }
                    if profile_idx == m {
                        self.check_main(target_idx, profile_idx, rule.last)?;
                    }
                    if profile_idx != 1 && profile_idx != m {
                        self.check_main(target_idx, profile_idx, rule.middle)?;
                    }
                }
                self.check_specials(target_idx, rule.specials)?;
            }
        }

        Ok(())
    }

    /// The row classes that apply to a row; rows can fall in more than one class when L is small.
    fn row_rules(&self, target_idx: usize) -> Vec<RowRule> {
        let length = self.target_length;
        let mut rules = vec![];

        match self.kind {
            MatrixKind::Forward | MatrixKind::Viterbi => {
                if target_idx == 0 {
                    rules.push(RowRule::uniform("******", "*0*...***"));
                } else if target_idx == 1 {
                    rules.push(RowRule::new("..****", "..**..", "..**..", ".......**"));
                } else {
                    rules.push(RowRule::new("....**", "......", "..**..", ".......**"));
                }
            }
            MatrixKind::Backward => {
                if target_idx == 0 {
                    rules.push(RowRule::uniform("******", "*.*...***"));
                } else if target_idx < length {
                    rules.push(RowRule::new("......", "......", "..**..", ".......**"));
                }
                if target_idx == length {
                    rules.push(RowRule::uniform("..**..", ".*****.**"));
                }
            }
            MatrixKind::Decoding => {
                if target_idx == 0 {
                    rules.push(RowRule::uniform("000000", "0.0...000"));
                } else if target_idx == 1 {
                    rules.push(RowRule::new("..0000", "..00..", "..00..", ".......00"));
                } else if target_idx < length {
                    rules.push(RowRule::new("....00", "......", "..00..", "........."));
                }
                if target_idx == length && target_idx > 0 {
                    rules.push(RowRule::new("..0000", "..00..", "..00..", ".00000.0."));
                }
            }
            MatrixKind::Alignment => {
                if target_idx == 0 {
                    rules.push(RowRule::uniform("******", "*.*...***"));
                } else if target_idx == 1 {
                    rules.push(RowRule::new("..****", "..**..", "..**..", ".......**"));
                } else if target_idx < length {
                    rules.push(RowRule::new("....**", "......", "..**..", ".......**"));
                }
                if target_idx == length && target_idx > 0 {
                    rules.push(RowRule::new("..****", "..**..", "..**..", ".*****.**"));
                }
            }
            MatrixKind::Unset => {}
        }

        rules
    }

    fn check_main(
        &self,
        target_idx: usize,
        profile_idx: usize,
        pattern: &str,
    ) -> Result<(), MatrixValidationError> {
        for (cell, rule) in pattern.bytes().enumerate() {
            let value = self.get(target_idx, profile_idx, cell);
            if !matches_rule(value, rule) {
                return Err(MatrixValidationError {
                    kind: self.kind,
                    row: target_idx,
                    reason: format!(
                        "{}[{}] is {} but must match '{}'",
                        Self::MAIN_CELL_NAMES[cell],
                        profile_idx,
                        value,
                        rule as char
                    ),
                });
            }
        }
        Ok(())
    }

    fn check_specials(
        &self,
        target_idx: usize,
        pattern: &str,
    ) -> Result<(), MatrixValidationError> {
        for (cell, rule) in pattern.bytes().enumerate() {
            let value = self.get_special(target_idx, cell);
            if !matches_rule(value, rule) {
                return Err(MatrixValidationError {
                    kind: self.kind,
                    row: target_idx,
                    reason: format!(
                        "{} is {} but must match '{}'",
                        Self::SPECIAL_CELL_NAMES[cell],
                        value,
                        rule as char
                    ),
                });
            }
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn dump(&self, out: &mut impl Write) -> anyhow::Result<()> {
        self.dump_window(out, 0, self.target_length, 0, self.profile_length)
    }

    /// Writes rows `target_start..=target_end` and nodes `profile_start..=profile_end`.
    pub fn dump_window(
        &self,
        out: &mut impl Write,
        target_start: usize,
        target_end: usize,
        profile_start: usize,
        profile_end: usize,
    ) -> anyhow::Result<()> {
        let target_end = target_end.min(self.target_length);
        let profile_end = profile_end.min(self.profile_length);

        let target_idx_width = self.target_length.to_string().len();
        let first_column_width = target_idx_width + 4;
        let column_width = 10;
        let precision = 4;

        writeln!(out, "{} matrix", self.kind)?;

        // write the profile indices
        write!(out, "{}", " ".repeat(first_column_width))?;
        for profile_idx in profile_start..=profile_end {
            write!(out, "{:>w$} ", profile_idx, w = column_width)?;
        }
        for name in Self::SPECIAL_CELL_NAMES {
            write!(out, "{:>w$} ", name, w = column_width)?;
        }
        writeln!(out)?;

        write!(out, "{}", " ".repeat(first_column_width))?;
        for _ in profile_start..=profile_end + Self::NUM_SPECIAL_CELLS {
            write!(out, "{:>w$} ", "-".repeat(column_width - 2), w = column_width)?;
        }
        writeln!(out)?;

        for target_idx in target_start..=target_end {
            for (cell, name) in Self::MAIN_CELL_NAMES.iter().enumerate() {
                write!(out, "{:w$} {:2} ", target_idx, name, w = target_idx_width)?;
                for profile_idx in profile_start..=profile_end {
                    write!(
                        out,
                        "{:w$.p$} ",
                        self.get(target_idx, profile_idx, cell),
                        w = column_width,
                        p = precision
                    )?;
                }

                // the special states ride along on the ML line
                if cell == Self::ML {
                    for special in 0..Self::NUM_SPECIAL_CELLS {
                        write!(
                            out,
                            "{:w$.p$} ",
                            self.get_special(target_idx, special),
                            w = column_width,
                            p = precision
                        )?;
                    }
                }
                writeln!(out)?;
            }
            writeln!(out)?;
        }

        Ok(())
    }
}

impl fmt::Debug for DpMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DpMatrix {{ kind: {}, M: {}, L: {}, cells: {}, rows: {}/{} }}",
            self.kind,
            self.profile_length,
            self.target_length,
            self.data.len(),
            self.valid_rows,
            self.alloc_rows
        )
    }
}

struct RowRule {
    first: &'static str,
    middle: &'static str,
    last: &'static str,
    specials: &'static str,
}

impl RowRule {
    fn new(
        first: &'static str,
        middle: &'static str,
        last: &'static str,
        specials: &'static str,
    ) -> Self {
        RowRule {
            first,
            middle,
            last,
            specials,
        }
    }

    fn uniform(main: &'static str, specials: &'static str) -> Self {
        RowRule::new(main, main, main, specials)
    }
}

#[inline(always)]
fn matches_rule(value: f32, rule: u8) -> bool {
    match rule {
        b'*' => value == -f32::INFINITY,
        b'0' => value == 0.0,
        _ => true,
    }
}
