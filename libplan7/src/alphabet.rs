use phf::phf_map;
use serde::{Deserialize, Serialize};
use thiserror::Error;


#[derive(Error, Debug)]
#[error("unknown UTF8 sequence byte: {byte} for alphabet: {alphabet:?}")]
pub struct UnknownSymbolError {
    pub byte: u8,
    pub alphabet: Alphabet,
}

pub const AMINO_SYMBOLS: &[u8; 29] = b"ACDEFGHIKLMNPQRSTVWY-BJZOUX*~";
pub const DNA_SYMBOLS: &[u8; 18] = b"ACGT-RYMKSWHBVDN*~";
pub const RNA_SYMBOLS: &[u8; 18] = b"ACGU-RYMKSWHBVDN*~";

pub const AMINO_BACKGROUND_FREQUENCIES: [f32; 20] = [
    0.0787945, // A
    0.0151600, // C
    0.0535222, // D
    0.0668298, // E
    0.0397062, // F
    0.0695071, // G
    0.0229198, // H
    0.0590092, // I
    0.0594422, // K
    0.0963728, // L
    0.0237718, // M
    0.0414386, // N
    0.0482904, // P
    0.0395639, // Q
    0.0540978, // R
    0.0683364, // S
    0.0540687, // T
    0.0673417, // V
    0.0114135, // W
    0.0304133, // Y
];

pub const NUCLEOTIDE_BACKGROUND_FREQUENCIES: [f32; 4] = [0.25, 0.25, 0.25, 0.25];

pub const UTF8_TO_DIGITAL_AMINO: phf::Map<u8, u8> = phf_map! {
    // upper case
    65u8 => 0,    // A
    67u8 => 1,    // C
    68u8 => 2,    // D
    69u8 => 3,    // E
    70u8 => 4,    // F
    71u8 => 5,    // G
    72u8 => 6,    // H
    73u8 => 7,    // I
    75u8 => 8,    // K
    76u8 => 9,    // L
    77u8 => 10,   // M
    78u8 => 11,   // N
    80u8 => 12,   // P
    81u8 => 13,   // Q
    82u8 => 14,   // R
    83u8 => 15,   // S
    84u8 => 16,   // T
    86u8 => 17,   // V
    87u8 => 18,   // W
    89u8 => 19,   // Y
    // lower case
    97u8 => 0,    // a
    99u8 => 1,    // c
    100u8 => 2,   // d
    101u8 => 3,   // e
    102u8 => 4,   // f
    103u8 => 5,   // g
    104u8 => 6,   // h
    105u8 => 7,   // i
    107u8 => 8,   // k
    108u8 => 9,   // l
    109u8 => 10,  // m
    110u8 => 11,  // n
    112u8 => 12,  // p
    113u8 => 13,  // q
    114u8 => 14,  // r
    115u8 => 15,  // s
    116u8 => 16,  // t
    118u8 => 17,  // v
    119u8 => 18,  // w
    121u8 => 19,  // y
    // gap
    45u8 => 20,   // -
    46u8 => 20,   // .
    // degenerate characters
    66u8 => 21,   // B
    74u8 => 22,   // J
    90u8 => 23,   // Z
    79u8 => 24,   // O
    85u8 => 25,   // U
    88u8 => 26,   // X
    98u8 => 21,   // b
    106u8 => 22,  // j
    122u8 => 23,  // z
    111u8 => 24,  // o
    117u8 => 25,  // u
    120u8 => 26,  // x
    // non-residue and missing data
    42u8 => 27,   // *
    126u8 => 28,  // ~
};

pub const UTF8_TO_DIGITAL_DNA: phf::Map<u8, u8> = phf_map! {
    65u8 => 0,    // A
    67u8 => 1,    // C
    71u8 => 2,    // G
    84u8 => 3,    // T
    85u8 => 3,    // U
    97u8 => 0,    // a
    99u8 => 1,    // c
    103u8 => 2,   // g
    116u8 => 3,   // t
    117u8 => 3,   // u
    45u8 => 4,    // -
    46u8 => 4,    // .
    82u8 => 5,    // R
    89u8 => 6,    // Y
    77u8 => 7,    // M
    75u8 => 8,    // K
    83u8 => 9,    // S
    87u8 => 10,   // W
    72u8 => 11,   // H
    66u8 => 12,   // B
    86u8 => 13,   // V
    68u8 => 14,   // D
    78u8 => 15,   // N
    88u8 => 15,   // X
    114u8 => 5,   // r
    121u8 => 6,   // y
    109u8 => 7,   // m
    107u8 => 8,   // k
    115u8 => 9,   // s
    119u8 => 10,  // w
    104u8 => 11,  // h
    98u8 => 12,   // b
    118u8 => 13,  // v
    100u8 => 14,  // d
    110u8 => 15,  // n
    120u8 => 15,  // x
    42u8 => 16,   // *
    126u8 => 17,  // ~
};

// residues that each degenerate code stands for, indexed from K + 1
const AMINO_DEGENERACIES: [&[u8]; 6] = [
    &[2, 11],                                                              // B: D N
    &[7, 9],                                                               // J: I L
    &[3, 13],                                                              // Z: E Q
    &[8],                                                                  // O: K
    &[1],                                                                  // U: C
    &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19], // X
];

const NUCLEOTIDE_DEGENERACIES: [&[u8]; 11] = [
    &[0, 2],       // R
    &[1, 3],       // Y
    &[0, 1],       // M
    &[2, 3],       // K
    &[1, 2],       // S
    &[0, 3],       // W
    &[0, 1, 3],    // H
    &[1, 2, 3],    // B
    &[0, 1, 2],    // V
    &[0, 2, 3],    // D
    &[0, 1, 2, 3], // N
];

/// A digital biological sequence alphabet.
///
/// Digital codes are laid out as: the K canonical residues, the gap,
/// the degenerate residue codes, the non-residue `*` and missing data `~`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Alphabet {
    Amino,
    Dna,
    Rna,
}

impl Alphabet {
    /// The number of canonical residues.
    pub fn k(&self) -> usize {
        match self {
            Alphabet::Amino => 20,
            Alphabet::Dna | Alphabet::Rna => 4,
        }
    }

    /// The number of digital codes, including gap, degeneracies, non-residue and missing data.
    pub fn kp(&self) -> usize {
        self.symbols().len()
    }

    pub fn symbols(&self) -> &'static [u8] {
        match self {
            Alphabet::Amino => AMINO_SYMBOLS,
            Alphabet::Dna => DNA_SYMBOLS,
            Alphabet::Rna => RNA_SYMBOLS,
        }
    }

    pub fn gap_idx(&self) -> usize {
        self.k()
    }

    pub fn non_residue_idx(&self) -> usize {
        self.kp() - 2
    }

    pub fn missing_data_idx(&self) -> usize {
        self.kp() - 1
    }

    pub fn is_canonical(&self, code: u8) -> bool {
        (code as usize) < self.k()
    }

    pub fn is_degenerate(&self, code: u8) -> bool {
        let code = code as usize;
        code > self.gap_idx() && code < self.non_residue_idx()
    }

    /// The canonical residues that a residue code stands for.
    ///
    /// A canonical code stands for itself; gap, non-residue and missing data stand for nothing.
    pub fn residues_of(&self, code: u8) -> &'static [u8] {
        if self.is_canonical(code) {
            return &CANONICAL_CODES[code as usize..=code as usize];
        }

        if !self.is_degenerate(code) {
            return &[];
        }

        let degenerate_idx = code as usize - self.gap_idx() - 1;
        match self {
            Alphabet::Amino => AMINO_DEGENERACIES[degenerate_idx],
            Alphabet::Dna | Alphabet::Rna => NUCLEOTIDE_DEGENERACIES[degenerate_idx],
        }
    }

    pub fn background_frequencies(&self) -> &'static [f32] {
        match self {
            Alphabet::Amino => &AMINO_BACKGROUND_FREQUENCIES,
            Alphabet::Dna | Alphabet::Rna => &NUCLEOTIDE_BACKGROUND_FREQUENCIES,
        }
    }

    pub fn digitize(&self, utf8_byte: u8) -> Result<u8, UnknownSymbolError> {
        let map = match self {
            Alphabet::Amino => &UTF8_TO_DIGITAL_AMINO,
            Alphabet::Dna | Alphabet::Rna => &UTF8_TO_DIGITAL_DNA,
        };

        map.get(&utf8_byte).copied().ok_or(UnknownSymbolError {
            byte: utf8_byte,
            alphabet: *self,
        })
    }

    pub fn symbol(&self, code: u8) -> Option<u8> {
        self.symbols().get(code as usize).copied()
    }
}

static CANONICAL_CODES: [u8; 20] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19,
];

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::assert;

    #[test]
    fn test_special_codes() {
        assert!(Alphabet::Amino.k() == 20);
        assert!(Alphabet::Amino.kp() == 29);
        assert!(Alphabet::Amino.gap_idx() == 20);
        assert!(Alphabet::Amino.non_residue_idx() == 27);
        assert!(Alphabet::Amino.missing_data_idx() == 28);

        assert!(Alphabet::Dna.k() == 4);
        assert!(Alphabet::Dna.kp() == 18);
        assert!(Alphabet::Dna.gap_idx() == 4);
        assert!(Alphabet::Dna.non_residue_idx() == 16);
        assert!(Alphabet::Dna.missing_data_idx() == 17);
    }

    #[test]
    fn test_digitize_round_trips_symbols() -> anyhow::Result<()> {
        for alphabet in [Alphabet::Amino, Alphabet::Dna] {
            for (code, &symbol) in alphabet.symbols().iter().enumerate() {
                assert!(alphabet.digitize(symbol)? as usize == code);
            }
        }
        Ok(())
    }

    #[test]
    fn test_digitize_unknown() {
        assert!(Alphabet::Dna.digitize(b'E').is_err());
        assert!(Alphabet::Amino.digitize(b'1').is_err());
    }

    #[test]
    fn test_degeneracies() -> anyhow::Result<()> {
        let amino = Alphabet::Amino;
        assert!(amino.residues_of(amino.digitize(b'B')?) == &[2, 11]);
        assert!(amino.residues_of(amino.digitize(b'X')?).len() == 20);
        assert!(amino.residues_of(amino.digitize(b'W')?) == &[18]);
        assert!(amino.residues_of(amino.gap_idx() as u8).is_empty());

        let dna = Alphabet::Dna;
        assert!(dna.residues_of(dna.digitize(b'R')?) == &[0, 2]);
        assert!(dna.residues_of(dna.digitize(b'N')?) == &[0, 1, 2, 3]);
        assert!(dna.residues_of(dna.missing_data_idx() as u8).is_empty());
        Ok(())
    }
}
