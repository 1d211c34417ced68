use rand::Rng;
use thiserror::Error;

use crate::alphabet::Alphabet;
use crate::util::VecMath;

use self::constants::{
    HMM_DELETE_TO_DELETE, HMM_DELETE_TO_MATCH, HMM_INSERT_TO_INSERT, HMM_INSERT_TO_MATCH,
    HMM_MATCH_TO_DELETE, HMM_MATCH_TO_INSERT, HMM_MATCH_TO_MATCH, HMM_NUM_TRANSITIONS,
};

pub mod constants {
    // these constants describe indices of transitions
    pub const HMM_NUM_TRANSITIONS: usize = 7;
    pub const HMM_MATCH_TO_MATCH: usize = 0;
    pub const HMM_MATCH_TO_INSERT: usize = 1;
    pub const HMM_MATCH_TO_DELETE: usize = 2;
    pub const HMM_INSERT_TO_MATCH: usize = 3;
    pub const HMM_INSERT_TO_INSERT: usize = 4;
    pub const HMM_DELETE_TO_MATCH: usize = 5;
    pub const HMM_DELETE_TO_DELETE: usize = 6;
}

#[derive(Error, Debug)]
pub enum HmmError {
    #[error("a model must have at least one node")]
    EmptyModel,
    #[error("consensus residue code {code} is not canonical for alphabet: {alphabet:?}")]
    NonCanonicalConsensus { code: u8, alphabet: Alphabet },
    #[error("match emission probability must be in (0, 1), got: {probability}")]
    BadMatchProbability { probability: f32 },
}

/// Represents the header of the P7HMM.
#[derive(Clone, Debug, Default)]
pub struct Header {
    pub name: String,
    pub accession_number: String,
    pub model_length: usize,
    pub alphabet: Option<Alphabet>,
}

/// The probability model.
///
/// Each vector is indexed by node, 0..=M. Node 0 holds the begin state's
/// transitions and a dummy match emission; node M only transitions to the end.
#[derive(Clone, Debug, Default)]
pub struct Model {
    pub match_probabilities: Vec<Vec<f32>>,
    pub insert_probabilities: Vec<Vec<f32>>,
    pub transition_probabilities: Vec<[f32; HMM_NUM_TRANSITIONS]>,
}

/// The data that describes a trained core P7HMM.
#[derive(Clone, Debug, Default)]
pub struct Hmm {
    pub header: Header,
    pub model: Model,
}

impl Hmm {
    pub fn new(model_length: usize, alphabet: Alphabet) -> Result<Self, HmmError> {
        if model_length == 0 {
            return Err(HmmError::EmptyModel);
        }

        let k = alphabet.k();
        let mut match_probabilities = vec![vec![0.0; k]; model_length + 1];
        // by convention, the dummy match state at node 0 emits the first residue
        match_probabilities[0][0] = 1.0;

        let mut transition_probabilities = vec![[0.0; HMM_NUM_TRANSITIONS]; model_length + 1];
        transition_probabilities[0][HMM_DELETE_TO_MATCH] = 1.0;
        transition_probabilities[model_length][HMM_DELETE_TO_MATCH] = 1.0;

        Ok(Hmm {
            header: Header {
                model_length,
                alphabet: Some(alphabet),
                ..Default::default()
            },
            model: Model {
                match_probabilities,
                insert_probabilities: vec![
                    alphabet.background_frequencies().to_vec();
                    model_length + 1
                ],
                transition_probabilities,
            },
        })
    }

    pub fn length(&self) -> usize {
        self.header.model_length
    }

    pub fn alphabet(&self) -> Alphabet {
        self.header.alphabet.unwrap_or(Alphabet::Amino)
    }

    /// Samples a random model with uniformly distributed probability vectors.
    pub fn sample(
        model_length: usize,
        alphabet: Alphabet,
        rng: &mut impl Rng,
    ) -> Result<Self, HmmError> {
        let mut hmm = Hmm::new(model_length, alphabet)?;
        let k = alphabet.k();

        for node_idx in 1..=model_length {
            hmm.model.match_probabilities[node_idx] = random_probability_vector(k, rng);
        }

        for node_idx in 0..=model_length {
            hmm.model.insert_probabilities[node_idx] = random_probability_vector(k, rng);

            let t = &mut hmm.model.transition_probabilities[node_idx];

            if node_idx < model_length {
                let match_out = random_probability_vector(3, rng);
                t[HMM_MATCH_TO_MATCH] = match_out[0];
                t[HMM_MATCH_TO_INSERT] = match_out[1];
                t[HMM_MATCH_TO_DELETE] = match_out[2];
            } else {
                let match_out = random_probability_vector(2, rng);
                t[HMM_MATCH_TO_MATCH] = match_out[0];
                t[HMM_MATCH_TO_INSERT] = match_out[1];
                t[HMM_MATCH_TO_DELETE] = 0.0;
            }

            let insert_out = random_probability_vector(2, rng);
            t[HMM_INSERT_TO_MATCH] = insert_out[0];
            t[HMM_INSERT_TO_INSERT] = insert_out[1];

            if node_idx == 0 || node_idx == model_length {
                t[HMM_DELETE_TO_MATCH] = 1.0;
                t[HMM_DELETE_TO_DELETE] = 0.0;
            } else {
                let delete_out = random_probability_vector(2, rng);
                t[HMM_DELETE_TO_MATCH] = delete_out[0];
                t[HMM_DELETE_TO_DELETE] = delete_out[1];
            }
        }

        hmm.header.name = format!("sampled-{model_length}");
        Ok(hmm)
    }

    /// Builds a model that strongly prefers a single consensus sequence.
    ///
    /// `consensus` holds digital residue codes, one per node.
    pub fn from_consensus(
        consensus: &[u8],
        alphabet: Alphabet,
        match_probability: f32,
    ) -> Result<Self, HmmError> {
        if match_probability <= 0.0 || match_probability >= 1.0 {
            return Err(HmmError::BadMatchProbability {
                probability: match_probability,
            });
        }

        let model_length = consensus.len();
        let mut hmm = Hmm::new(model_length, alphabet)?;
        let k = alphabet.k();
        let off_probability = (1.0 - match_probability) / (k - 1) as f32;

        for (node_idx, &code) in consensus.iter().enumerate().map(|(i, c)| (i + 1, c)) {
            if !alphabet.is_canonical(code) {
                return Err(HmmError::NonCanonicalConsensus { code, alphabet });
            }
            let probabilities = &mut hmm.model.match_probabilities[node_idx];
            probabilities.iter_mut().for_each(|p| *p = off_probability);
            probabilities[code as usize] = match_probability;
        }

        const P_OPEN: f32 = 0.02;
        const P_EXTEND: f32 = 0.4;

        for node_idx in 0..=model_length {
            let t = &mut hmm.model.transition_probabilities[node_idx];
            t[HMM_INSERT_TO_MATCH] = 1.0 - P_EXTEND;
            t[HMM_INSERT_TO_INSERT] = P_EXTEND;

            if node_idx < model_length {
                t[HMM_MATCH_TO_MATCH] = 1.0 - 2.0 * P_OPEN;
                t[HMM_MATCH_TO_INSERT] = P_OPEN;
                t[HMM_MATCH_TO_DELETE] = P_OPEN;
            } else {
                t[HMM_MATCH_TO_MATCH] = 1.0 - P_OPEN;
                t[HMM_MATCH_TO_INSERT] = P_OPEN;
                t[HMM_MATCH_TO_DELETE] = 0.0;
            }

            if node_idx == 0 || node_idx == model_length {
                t[HMM_DELETE_TO_MATCH] = 1.0;
                t[HMM_DELETE_TO_DELETE] = 0.0;
            } else {
                t[HMM_DELETE_TO_MATCH] = 1.0 - P_EXTEND;
                t[HMM_DELETE_TO_DELETE] = P_EXTEND;
            }
        }

        hmm.header.name = "consensus".to_string();
        Ok(hmm)
    }

    /// The probability that each match state is used by a path through the core model.
    pub fn match_occupancy(&self) -> Vec<f32> {
        let t = &self.model.transition_probabilities;
        let mut match_occupancy = vec![0.0f32; self.length() + 1];

        match_occupancy[1] = t[0][HMM_MATCH_TO_INSERT] + t[0][HMM_MATCH_TO_MATCH];

        (2..=self.length())
            .map(|pos| (pos - 1, pos))
            .for_each(|(prev_pos, pos)| {
                let a = match_occupancy[prev_pos]
                    * (t[prev_pos][HMM_MATCH_TO_MATCH] + t[prev_pos][HMM_MATCH_TO_INSERT]);

                let b = (1.0 - match_occupancy[prev_pos]) * t[prev_pos][HMM_DELETE_TO_MATCH];

                match_occupancy[pos] = a + b;
            });

        match_occupancy
    }
}

fn random_probability_vector(length: usize, rng: &mut impl Rng) -> Vec<f32> {
    // exponential draws normalize to a flat Dirichlet sample
    let mut probabilities: Vec<f32> = (0..length)
        .map(|_| -(1.0 - rng.gen::<f32>()).ln())
        .collect();
    probabilities.normalize();
    probabilities
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::assert;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    #[test]
    fn test_sampled_probabilities_normalized() -> anyhow::Result<()> {
        let mut rng = Pcg64::seed_from_u64(7);
        let hmm = Hmm::sample(12, Alphabet::Amino, &mut rng)?;

        for node_idx in 1..=12 {
            let sum: f32 = hmm.model.match_probabilities[node_idx].iter().sum();
            assert!((sum - 1.0).abs() < 1e-5);
        }

        for t in &hmm.model.transition_probabilities {
            assert!((t[0] + t[1] + t[2] - 1.0).abs() < 1e-5);
            assert!((t[3] + t[4] - 1.0).abs() < 1e-5);
            assert!((t[5] + t[6] - 1.0).abs() < 1e-5);
        }

        assert!(hmm.model.transition_probabilities[12][HMM_MATCH_TO_DELETE] == 0.0);
        Ok(())
    }

    #[test]
    fn test_occupancy_of_consensus_model() -> anyhow::Result<()> {
        let hmm = Hmm::from_consensus(&[0, 1, 2, 3], Alphabet::Dna, 0.9)?;
        let occupancy = hmm.match_occupancy();

        assert!((occupancy[1] - 0.98).abs() < 1e-6);
        occupancy[1..]
            .iter()
            .for_each(|&occ| assert!(occ > 0.9 && occ <= 1.0));
        Ok(())
    }

    #[test]
    fn test_bad_consensus() {
        assert!(Hmm::from_consensus(&[0, 4], Alphabet::Dna, 0.9).is_err());
        assert!(Hmm::from_consensus(&[0, 1], Alphabet::Dna, 1.0).is_err());
        assert!(Hmm::from_consensus(&[], Alphabet::Dna, 0.5).is_err());
    }
}
