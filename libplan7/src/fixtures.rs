use std::sync::Arc;

use rand::SeedableRng;
use rand_pcg::Pcg64;

use crate::alphabet::Alphabet;
use crate::structs::{AlignmentMode, Background, Hmm, Profile, Sequence};

pub fn rng(seed: u64) -> Pcg64 {
    Pcg64::seed_from_u64(seed)
}

/// A profile configured from a randomly sampled model.
pub fn sampled_profile(
    length: usize,
    alphabet: Alphabet,
    mode: AlignmentMode,
    target_length: usize,
    seed: u64,
) -> anyhow::Result<Profile> {
    let hmm = Hmm::sample(length, alphabet, &mut rng(seed))?;
    Ok(Profile::from_hmm(
        Arc::new(hmm),
        Arc::new(Background::new(alphabet)),
        mode,
        target_length,
    )?)
}

/// A profile that strongly prefers `consensus`, given as text.
pub fn consensus_profile(
    consensus: &[u8],
    alphabet: Alphabet,
    mode: AlignmentMode,
    target_length: usize,
) -> anyhow::Result<Profile> {
    let digital = consensus
        .iter()
        .map(|&byte| alphabet.digitize(byte))
        .collect::<Result<Vec<u8>, _>>()?;
    let hmm = Hmm::from_consensus(&digital, alphabet, 0.9)?;
    Ok(Profile::from_hmm(
        Arc::new(hmm),
        Arc::new(Background::new(alphabet)),
        mode,
        target_length,
    )?)
}

pub fn random_target(length: usize, alphabet: Alphabet, seed: u64) -> Sequence {
    Sequence::random(length, alphabet, &mut rng(seed))
}
