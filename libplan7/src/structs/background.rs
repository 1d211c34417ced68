use crate::align::Nats;
use crate::alphabet::Alphabet;

/// The null (background) model: i.i.d. residues with a geometric length distribution.
#[derive(Clone, Debug)]
pub struct Background {
    pub alphabet: Alphabet,
    /// Residue frequencies over the canonical alphabet
    pub frequencies: Vec<f32>,
    /// The self-loop probability of the null model's single emitting state
    pub p1: f32,
}

impl Background {
    pub const DEFAULT_LENGTH: usize = 350;

    pub fn new(alphabet: Alphabet) -> Self {
        let mut background = Background {
            alphabet,
            frequencies: alphabet.background_frequencies().to_vec(),
            p1: 0.0,
        };
        background.set_length(Self::DEFAULT_LENGTH);
        background
    }

    pub fn set_length(&mut self, target_length: usize) {
        self.p1 = target_length as f32 / (target_length as f32 + 1.0);
    }

    /// The log probability of a sequence of `target_length` residues under the null length model.
    ///
    /// Residue emissions are not included: profile scores are already log-odds against them.
    pub fn null_score(&self, target_length: usize) -> Nats {
        Nats(target_length as f32 * self.p1.ln() + (1.0 - self.p1).ln())
    }
}
