use std::fmt::{Debug, Display, Formatter};

use rand::Rng;
use thiserror::Error;

use crate::alphabet::{Alphabet, UnknownSymbolError};

#[derive(Error, Debug)]
#[error("unknown digital sequence byte: {byte}")]
pub struct UnknownDigitalSequenceByteError {
    byte: u8,
}

/// This holds the both the "digital" data and string data of a biological sequence.
#[derive(Clone)]
pub struct Sequence {
    /// The name of the sequence
    pub name: String,
    /// The alphabet the digital data is encoded in
    pub alphabet: Alphabet,
    /// The length of the sequence
    pub length: usize,
    /// The "digital" data of the sequence, indexed 1..=length
    pub digital_bytes: Vec<u8>,
    /// The string data of the sequence, indexed 1..=length
    pub utf8_bytes: Vec<u8>,
}

impl Sequence {
    // position 1 of the sequence lives at index 1, so index 0 holds this sentinel
    pub const SENTINEL: u8 = 255;

    pub fn from_utf8(bytes: &[u8], alphabet: Alphabet) -> Result<Self, UnknownSymbolError> {
        let mut utf8_bytes: Vec<u8> = vec![Self::SENTINEL];
        let mut digital_bytes: Vec<u8> = vec![Self::SENTINEL];

        for &utf8_byte in bytes {
            digital_bytes.push(alphabet.digitize(utf8_byte)?);
            utf8_bytes.push(utf8_byte);
        }

        Ok(Sequence {
            name: "".to_string(),
            alphabet,
            length: bytes.len(),
            digital_bytes,
            utf8_bytes,
        })
    }

    pub fn from_digital(
        bytes: &[u8],
        alphabet: Alphabet,
    ) -> Result<Self, UnknownDigitalSequenceByteError> {
        let mut digital_bytes: Vec<u8> = vec![Self::SENTINEL; bytes.len() + 1];
        digital_bytes[1..].copy_from_slice(bytes);
        let mut utf8_bytes: Vec<u8> = vec![Self::SENTINEL; digital_bytes.len()];

        for (idx, &digital_byte) in bytes.iter().enumerate() {
            utf8_bytes[idx + 1] = alphabet
                .symbol(digital_byte)
                .ok_or(UnknownDigitalSequenceByteError { byte: digital_byte })?;
        }

        Ok(Sequence {
            name: "".to_string(),
            alphabet,
            length: bytes.len(),
            digital_bytes,
            utf8_bytes,
        })
    }

    /// Generates an i.i.d. sequence of canonical residues drawn from the background frequencies.
    pub fn random(length: usize, alphabet: Alphabet, rng: &mut impl Rng) -> Self {
        let frequencies = alphabet.background_frequencies();
        let total: f32 = frequencies.iter().sum();

        let residues: Vec<u8> = (0..length)
            .map(|_| {
                let mut draw = rng.gen::<f32>() * total;
                for (code, &frequency) in frequencies.iter().enumerate() {
                    if draw < frequency {
                        return code as u8;
                    }
                    draw -= frequency;
                }
                (frequencies.len() - 1) as u8
            })
            .collect();

        let mut utf8_bytes = vec![Self::SENTINEL];
        let symbols = alphabet.symbols();
        utf8_bytes.extend(residues.iter().map(|&code| symbols[code as usize]));

        let mut digital_bytes = vec![Self::SENTINEL];
        digital_bytes.extend(residues);

        Sequence {
            name: format!("random-{length}"),
            alphabet,
            length,
            digital_bytes,
            utf8_bytes,
        }
    }

    /// The digital residue at 1-based position `idx`.
    #[inline(always)]
    pub fn residue(&self, idx: usize) -> usize {
        self.digital_bytes[idx] as usize
    }
}

impl Display for Sequence {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.utf8_bytes[1..]))
    }
}

impl Debug for Sequence {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} ({} residues)", self.name, self, self.length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::assert;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    #[test]
    fn test_from_utf8() -> anyhow::Result<()> {
        let seq = Sequence::from_utf8(b"ACGTN", Alphabet::Dna)?;
        assert!(seq.length == 5);
        assert!(seq.digital_bytes == vec![255, 0, 1, 2, 3, 15]);
        assert!(seq.to_string() == "ACGTN");
        Ok(())
    }

    #[test]
    fn test_from_utf8_unknown_byte() {
        assert!(Sequence::from_utf8(b"ACGQ", Alphabet::Dna).is_err());
    }

    #[test]
    fn test_from_digital() -> anyhow::Result<()> {
        let seq = Sequence::from_digital(&[0, 1, 19], Alphabet::Amino)?;
        assert!(seq.to_string() == "ACY");
        assert!(Sequence::from_digital(&[40], Alphabet::Amino).is_err());
        Ok(())
    }

    #[test]
    fn test_random() {
        let mut rng = Pcg64::seed_from_u64(3);
        let seq = Sequence::random(250, Alphabet::Amino, &mut rng);

        assert!(seq.length == 250);
        assert!(seq.digital_bytes.len() == 251);
        assert!(seq.digital_bytes[1..].iter().all(|&b| b < 20));
    }
}
