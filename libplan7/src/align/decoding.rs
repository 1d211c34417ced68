use crate::align::structs::{DpMatrix, MatrixKind};
use crate::align::{check_matrix, DpError};
use crate::structs::Profile;

/// Computes posterior probabilities from a pair of finished Forward and Backward matrices.
///
/// Each emitting row's mass over the M and I cells plus N, JJ and CC must be
/// within `mass_tolerance` of 1. The row is then renormalized to sum to 1.
pub fn decoding(
    profile: &Profile,
    forward_matrix: &DpMatrix,
    backward_matrix: &DpMatrix,
    posterior_matrix: &mut DpMatrix,
    mass_tolerance: f32,
) -> Result<(), DpError> {
    let profile_length = profile.length;
    let target_length = forward_matrix.target_length;
    check_matrix(forward_matrix, MatrixKind::Forward, profile_length, target_length)?;
    check_matrix(backward_matrix, MatrixKind::Backward, profile_length, target_length)?;

    let overall_score = forward_matrix.get_special(target_length, DpMatrix::C)
        + profile.special_transition_score(Profile::SPECIAL_C_IDX, Profile::SPECIAL_MOVE_IDX);

    if overall_score == -f32::INFINITY {
        return Err(DpError::ImpossibleSequence);
    }

    posterior_matrix.prepare(MatrixKind::Decoding, profile_length, target_length)?;

    let posterior = |target_idx: usize, profile_idx: usize, cell: usize| -> f32 {
        (forward_matrix.get(target_idx, profile_idx, cell)
            + backward_matrix.get(target_idx, profile_idx, cell)
            - overall_score)
            .exp()
    };

    let special_posterior = |target_idx: usize, cell: usize| -> f32 {
        (forward_matrix.get_special(target_idx, cell)
            + backward_matrix.get_special(target_idx, cell)
            - overall_score)
            .exp()
    };

    // row 0: every path starts here in N
    posterior_matrix.fill_main_row(0, 0.0);
    posterior_matrix.set_special(0, DpMatrix::E, 0.0);
    posterior_matrix.set_special(0, DpMatrix::N, 1.0);
    posterior_matrix.set_special(0, DpMatrix::J, 0.0);
    posterior_matrix.set_special(0, DpMatrix::B, special_posterior(0, DpMatrix::B));
    posterior_matrix.set_special(0, DpMatrix::L, special_posterior(0, DpMatrix::L));
    posterior_matrix.set_special(0, DpMatrix::G, special_posterior(0, DpMatrix::G));
    posterior_matrix.set_special(0, DpMatrix::C, 0.0);
    posterior_matrix.set_special(0, DpMatrix::JJ, 0.0);
    posterior_matrix.set_special(0, DpMatrix::CC, 0.0);

    let j_loop =
        profile.special_transition_score(Profile::SPECIAL_J_IDX, Profile::SPECIAL_LOOP_IDX);
    let c_loop =
        profile.special_transition_score(Profile::SPECIAL_C_IDX, Profile::SPECIAL_LOOP_IDX);

    for target_idx in 1..=target_length {
        let prev_idx = target_idx - 1;
        let mut mass = 0.0;

        for cell in 0..DpMatrix::NUM_MAIN_CELLS {
            posterior_matrix.set(target_idx, 0, cell, 0.0);
        }

        for profile_idx in 1..=profile_length {
            for cell in 0..DpMatrix::NUM_MAIN_CELLS {
                posterior_matrix.set(
                    target_idx,
                    profile_idx,
                    cell,
                    posterior(target_idx, profile_idx, cell),
                );
            }

            mass += posterior_matrix.get(target_idx, profile_idx, DpMatrix::ML)
                + posterior_matrix.get(target_idx, profile_idx, DpMatrix::MG)
                + posterior_matrix.get(target_idx, profile_idx, DpMatrix::IL)
                + posterior_matrix.get(target_idx, profile_idx, DpMatrix::IG);
        }

        for cell in [
            DpMatrix::E,
            DpMatrix::N,
            DpMatrix::J,
            DpMatrix::B,
            DpMatrix::L,
            DpMatrix::G,
            DpMatrix::C,
        ] {
            posterior_matrix.set_special(target_idx, cell, special_posterior(target_idx, cell));
        }

        // JJ and CC are the probability that residue i was emitted by a J or C loop
        posterior_matrix.set_special(
            target_idx,
            DpMatrix::JJ,
            (forward_matrix.get_special(prev_idx, DpMatrix::J)
                + j_loop
                + backward_matrix.get_special(target_idx, DpMatrix::J)
                - overall_score)
                .exp(),
        );
        posterior_matrix.set_special(
            target_idx,
            DpMatrix::CC,
            (forward_matrix.get_special(prev_idx, DpMatrix::C)
                + c_loop
                + backward_matrix.get_special(target_idx, DpMatrix::C)
                - overall_score)
                .exp(),
        );

        mass += posterior_matrix.get_special(target_idx, DpMatrix::N)
            + posterior_matrix.get_special(target_idx, DpMatrix::JJ)
            + posterior_matrix.get_special(target_idx, DpMatrix::CC);

        if (mass - 1.0).abs() > mass_tolerance {
            log::debug!(
                "decoding row {} of {} has mass {}",
                target_idx,
                target_length,
                mass
            );
            return Err(DpError::MassMismatch {
                row: target_idx,
                mass,
                tolerance: mass_tolerance,
            });
        }

        let scale = 1.0 / mass;
        posterior_matrix
            .row_mut(target_idx)
            .iter_mut()
            .for_each(|value| *value *= scale);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::{backward, forward};
    use crate::alphabet::Alphabet;
    use crate::config::AlignmentConfig;
    use crate::fixtures::{consensus_profile, random_target, sampled_profile};
    use crate::structs::{AlignmentMode, Sequence};
    use assert2::assert;

    fn decode(
        profile: &Profile,
        target: &Sequence,
    ) -> anyhow::Result<(DpMatrix, DpMatrix, DpMatrix)> {
        let mut fwd = DpMatrix::default();
        let mut bck = DpMatrix::default();
        let mut pp = DpMatrix::default();
        forward(profile, target, &mut fwd)?;
        backward(profile, target, &mut bck)?;
        decoding(profile, &fwd, &bck, &mut pp, 1e-2)?;
        Ok((fwd, bck, pp))
    }

    #[test]
    fn test_decoding_rows_sum_to_one() -> anyhow::Result<()> {
        for (seed, mode) in [AlignmentMode::Dual, AlignmentMode::UniGlocal, AlignmentMode::Local]
            .into_iter()
            .enumerate()
        {
            for (profile_length, target_length) in [(1, 1), (5, 9), (20, 15)] {
                let profile = sampled_profile(
                    profile_length,
                    Alphabet::Amino,
                    mode,
                    target_length,
                    seed as u64,
                )?;
                let target = random_target(target_length, Alphabet::Amino, seed as u64 + 50);
                let (_, _, pp) = decode(&profile, &target)?;

                assert!(let Ok(()) = pp.validate());
                assert!(pp.get_special(0, DpMatrix::N) == 1.0);

                for target_idx in 1..=target_length {
                    let mut mass = pp.get_special(target_idx, DpMatrix::N)
                        + pp.get_special(target_idx, DpMatrix::JJ)
                        + pp.get_special(target_idx, DpMatrix::CC);
                    for profile_idx in 1..=profile_length {
                        mass += pp.get(target_idx, profile_idx, DpMatrix::ML)
                            + pp.get(target_idx, profile_idx, DpMatrix::MG)
                            + pp.get(target_idx, profile_idx, DpMatrix::IL)
                            + pp.get(target_idx, profile_idx, DpMatrix::IG);
                    }
                    assert!((mass - 1.0).abs() < 1e-4, "row {target_idx}: {mass}");
                }
            }
        }
        Ok(())
    }

    #[test]
    fn test_decoding_long_target_with_default_tolerance() -> anyhow::Result<()> {
        let mass_tolerance = AlignmentConfig::default().mass_tolerance;

        for (seed, mode) in [AlignmentMode::Dual, AlignmentMode::Glocal, AlignmentMode::UniLocal]
            .into_iter()
            .enumerate()
        {
            let profile = sampled_profile(60, Alphabet::Amino, mode, 600, seed as u64 + 30)?;
            let target = random_target(600, Alphabet::Amino, seed as u64 + 30);

            let mut fwd = DpMatrix::default();
            let mut bck = DpMatrix::default();
            let mut pp = DpMatrix::default();
            forward(&profile, &target, &mut fwd)?;
            backward(&profile, &target, &mut bck)?;
            decoding(&profile, &fwd, &bck, &mut pp, mass_tolerance)?;

            assert!(let Ok(()) = pp.validate());
            for target_idx in [1, 300, 600] {
                let mut mass = pp.get_special(target_idx, DpMatrix::N)
                    + pp.get_special(target_idx, DpMatrix::JJ)
                    + pp.get_special(target_idx, DpMatrix::CC);
                for profile_idx in 1..=60 {
                    mass += pp.get(target_idx, profile_idx, DpMatrix::ML)
                        + pp.get(target_idx, profile_idx, DpMatrix::MG)
                        + pp.get(target_idx, profile_idx, DpMatrix::IL)
                        + pp.get(target_idx, profile_idx, DpMatrix::IG);
                }
                assert!((mass - 1.0).abs() < 1e-4, "{mode:?} row {target_idx}: {mass}");
            }
        }
        Ok(())
    }

    #[test]
    fn test_decoding_single_path() -> anyhow::Result<()> {
        let profile = consensus_profile(b"G", Alphabet::Dna, AlignmentMode::UniLocal, 1)?;
        let target = Sequence::from_utf8(b"G", Alphabet::Dna)?;
        let (_, _, pp) = decode(&profile, &target)?;

        assert!((pp.get(1, 1, DpMatrix::ML) - 1.0).abs() < 1e-5);
        assert!(pp.get(1, 1, DpMatrix::MG) == 0.0);
        assert!(pp.get_special(1, DpMatrix::N) == 0.0);
        assert!(pp.get_special(1, DpMatrix::CC) == 0.0);
        Ok(())
    }

    #[test]
    fn test_decoding_consensus_is_confident() -> anyhow::Result<()> {
        let profile =
            consensus_profile(b"ACDEFGHIKL", Alphabet::Amino, AlignmentMode::UniGlocal, 10)?;
        let target = Sequence::from_utf8(b"ACDEFGHIKL", Alphabet::Amino)?;
        let (_, _, pp) = decode(&profile, &target)?;

        for target_idx in 1..=10 {
            assert!(pp.get(target_idx, target_idx, DpMatrix::MG) > 0.5);
        }
        Ok(())
    }

    #[test]
    fn test_decoding_rejects_wrong_inputs() -> anyhow::Result<()> {
        let profile = sampled_profile(4, Alphabet::Dna, AlignmentMode::Dual, 6, 2)?;
        let target = random_target(6, Alphabet::Dna, 2);
        let (fwd, bck, mut pp) = decode(&profile, &target)?;

        assert!(let Err(DpError::WrongMatrixKind { .. }) =
            decoding(&profile, &bck, &fwd, &mut pp, 1e-2));

        let mut short = DpMatrix::default();
        forward(&profile, &random_target(5, Alphabet::Dna, 2), &mut short)?;
        assert!(let Err(DpError::DimensionMismatch { .. }) =
            decoding(&profile, &short, &bck, &mut pp, 1e-2));
        Ok(())
    }

    #[test]
    fn test_decoding_impossible_and_mass_errors() -> anyhow::Result<()> {
        let profile = sampled_profile(4, Alphabet::Dna, AlignmentMode::Dual, 0, 9)?;
        let empty = random_target(0, Alphabet::Dna, 9);
        let mut fwd = DpMatrix::default();
        let mut bck = DpMatrix::default();
        let mut pp = DpMatrix::default();
        forward(&profile, &empty, &mut fwd)?;
        backward(&profile, &empty, &mut bck)?;
        assert!(let Err(DpError::ImpossibleSequence) =
            decoding(&profile, &fwd, &bck, &mut pp, 1e-2));

        let profile = sampled_profile(4, Alphabet::Dna, AlignmentMode::Dual, 6, 9)?;
        let target = random_target(6, Alphabet::Dna, 9);
        forward(&profile, &target, &mut fwd)?;
        backward(&profile, &target, &mut bck)?;
        for profile_idx in 1..=4 {
            for cell in 0..DpMatrix::NUM_MAIN_CELLS {
                bck.set(3, profile_idx, cell, bck.get(3, profile_idx, cell) + 5.0);
            }
        }
        for cell in [DpMatrix::N, DpMatrix::J, DpMatrix::C] {
            bck.set_special(3, cell, bck.get_special(3, cell) + 5.0);
        }
        assert!(let Err(DpError::MassMismatch { row: 3, .. }) =
            decoding(&profile, &fwd, &bck, &mut pp, 1e-2));
        Ok(())
    }
}
