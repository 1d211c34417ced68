use crate::align::structs::{DpMatrix, MatrixKind};
use crate::align::{check_alphabet, DpError, Nats};
use crate::log_sum;
use crate::structs::{Profile, Sequence};

/// Fills `dp_matrix` with the Forward algorithm and returns the Forward score.
///
/// Every cell of rows 0..=L is written. An empty target has a score of -inf.
pub fn forward(
    profile: &Profile,
    target: &Sequence,
    dp_matrix: &mut DpMatrix,
) -> Result<Nats, DpError> {
    check_alphabet(profile, target)?;

    let profile_length = profile.length;
    let target_length = target.length;
    dp_matrix.prepare(MatrixKind::Forward, profile_length, target_length)?;

    // row 0: nothing has been emitted, so only N, B, L and G are reachable
    dp_matrix.fill_main_row(0, -f32::INFINITY);
    let begin_score =
        profile.special_transition_score(Profile::SPECIAL_N_IDX, Profile::SPECIAL_MOVE_IDX);
    dp_matrix.set_special(0, DpMatrix::E, -f32::INFINITY);
    dp_matrix.set_special(0, DpMatrix::N, 0.0);
    dp_matrix.set_special(0, DpMatrix::J, -f32::INFINITY);
    dp_matrix.set_special(0, DpMatrix::B, begin_score);
    dp_matrix.set_special(
        0,
        DpMatrix::L,
        begin_score + profile.begin_split_score(Profile::SPLIT_LOCAL_IDX),
    );
    dp_matrix.set_special(
        0,
        DpMatrix::G,
        begin_score + profile.begin_split_score(Profile::SPLIT_GLOCAL_IDX),
    );
    dp_matrix.set_special(0, DpMatrix::C, -f32::INFINITY);
    dp_matrix.set_special(0, DpMatrix::JJ, -f32::INFINITY);
    dp_matrix.set_special(0, DpMatrix::CC, -f32::INFINITY);

    let n_loop =
        profile.special_transition_score(Profile::SPECIAL_N_IDX, Profile::SPECIAL_LOOP_IDX);
    let n_move =
        profile.special_transition_score(Profile::SPECIAL_N_IDX, Profile::SPECIAL_MOVE_IDX);
    let j_move =
        profile.special_transition_score(Profile::SPECIAL_J_IDX, Profile::SPECIAL_MOVE_IDX);

    for target_idx in 1..=target_length {
        let residue = target.residue(target_idx);
        let prev_idx = target_idx - 1;

        for cell in 0..DpMatrix::NUM_MAIN_CELLS {
            dp_matrix.set(target_idx, 0, cell, -f32::INFINITY);
        }

        let local_entry = dp_matrix.get_special(prev_idx, DpMatrix::L);
        let glocal_entry = dp_matrix.get_special(prev_idx, DpMatrix::G);
        let mut end_score = -f32::INFINITY;

        for profile_idx in 1..=profile_length {
            let prev_profile_idx = profile_idx - 1;
            let match_score = profile.match_score(residue, profile_idx);

            // match states
            dp_matrix.set(
                target_idx,
                profile_idx,
                DpMatrix::ML,
                log_sum!(
                    dp_matrix.get(prev_idx, prev_profile_idx, DpMatrix::ML)
                        + profile.transition_score(Profile::MATCH_TO_MATCH_IDX, prev_profile_idx),
                    dp_matrix.get(prev_idx, prev_profile_idx, DpMatrix::IL)
                        + profile.transition_score(Profile::INSERT_TO_MATCH_IDX, prev_profile_idx),
                    dp_matrix.get(prev_idx, prev_profile_idx, DpMatrix::DL)
                        + profile.transition_score(Profile::DELETE_TO_MATCH_IDX, prev_profile_idx),
                    local_entry + profile.begin_score(profile_idx)
                ) + match_score,
            );

            dp_matrix.set(
                target_idx,
                profile_idx,
                DpMatrix::MG,
                log_sum!(
                    dp_matrix.get(prev_idx, prev_profile_idx, DpMatrix::MG)
                        + profile.transition_score(Profile::MATCH_TO_MATCH_IDX, prev_profile_idx),
                    dp_matrix.get(prev_idx, prev_profile_idx, DpMatrix::IG)
                        + profile.transition_score(Profile::INSERT_TO_MATCH_IDX, prev_profile_idx),
                    dp_matrix.get(prev_idx, prev_profile_idx, DpMatrix::DG)
                        + profile.transition_score(Profile::DELETE_TO_MATCH_IDX, prev_profile_idx),
                    glocal_entry + profile.glocal_begin_score(profile_idx)
                ) + match_score,
            );

            // insert states
            if profile_idx < profile_length {
                let insert_score = profile.insert_score(residue, profile_idx);

                dp_matrix.set(
                    target_idx,
                    profile_idx,
                    DpMatrix::IL,
                    log_sum!(
                        dp_matrix.get(prev_idx, profile_idx, DpMatrix::ML)
                            + profile.transition_score(Profile::MATCH_TO_INSERT_IDX, profile_idx),
                        dp_matrix.get(prev_idx, profile_idx, DpMatrix::IL)
                            + profile.transition_score(Profile::INSERT_TO_INSERT_IDX, profile_idx)
                    ) + insert_score,
                );

                dp_matrix.set(
                    target_idx,
                    profile_idx,
                    DpMatrix::IG,
                    log_sum!(
                        dp_matrix.get(prev_idx, profile_idx, DpMatrix::MG)
                            + profile.transition_score(Profile::MATCH_TO_INSERT_IDX, profile_idx),
                        dp_matrix.get(prev_idx, profile_idx, DpMatrix::IG)
                            + profile.transition_score(Profile::INSERT_TO_INSERT_IDX, profile_idx)
                    ) + insert_score,
                );
            } else {
                dp_matrix.set(target_idx, profile_idx, DpMatrix::IL, -f32::INFINITY);
                dp_matrix.set(target_idx, profile_idx, DpMatrix::IG, -f32::INFINITY);
            }

            // delete states; D1 is never entered
            if profile_idx > 1 {
                let md = profile.transition_score(Profile::MATCH_TO_DELETE_IDX, prev_profile_idx);
                let dd = profile.transition_score(Profile::DELETE_TO_DELETE_IDX, prev_profile_idx);

                dp_matrix.set(
                    target_idx,
                    profile_idx,
                    DpMatrix::DL,
                    log_sum!(
                        dp_matrix.get(target_idx, prev_profile_idx, DpMatrix::ML) + md,
                        dp_matrix.get(target_idx, prev_profile_idx, DpMatrix::DL) + dd
                    ),
                );

                dp_matrix.set(
                    target_idx,
                    profile_idx,
                    DpMatrix::DG,
                    log_sum!(
                        dp_matrix.get(target_idx, prev_profile_idx, DpMatrix::MG) + md,
                        dp_matrix.get(target_idx, prev_profile_idx, DpMatrix::DG) + dd
                    ),
                );
            } else {
                dp_matrix.set(target_idx, profile_idx, DpMatrix::DL, -f32::INFINITY);
                dp_matrix.set(target_idx, profile_idx, DpMatrix::DG, -f32::INFINITY);
            }

            // local exit
            let exit_score = profile.end_score(profile_idx);
            end_score = log_sum!(
                end_score,
                dp_matrix.get(target_idx, profile_idx, DpMatrix::ML) + exit_score,
                dp_matrix.get(target_idx, profile_idx, DpMatrix::DL) + exit_score
            );
        }

        // glocal exit
        end_score = log_sum!(
            end_score,
            dp_matrix.get(target_idx, profile_length, DpMatrix::MG),
            dp_matrix.get(target_idx, profile_length, DpMatrix::DG)
        );

        // E state
        dp_matrix.set_special(target_idx, DpMatrix::E, end_score);

        // J state
        dp_matrix.set_special(
            target_idx,
            DpMatrix::J,
            log_sum!(
                dp_matrix.get_special(prev_idx, DpMatrix::J)
                    + profile.special_transition_score(
                        Profile::SPECIAL_J_IDX,
                        Profile::SPECIAL_LOOP_IDX
                    ),
                end_score
                    + profile.special_transition_score(
                        Profile::SPECIAL_E_IDX,
                        Profile::SPECIAL_LOOP_IDX
                    )
            ),
        );

        // C state
        dp_matrix.set_special(
            target_idx,
            DpMatrix::C,
            log_sum!(
                dp_matrix.get_special(prev_idx, DpMatrix::C)
                    + profile.special_transition_score(
                        Profile::SPECIAL_C_IDX,
                        Profile::SPECIAL_LOOP_IDX
                    ),
                end_score
                    + profile.special_transition_score(
                        Profile::SPECIAL_E_IDX,
                        Profile::SPECIAL_MOVE_IDX
                    )
            ),
        );

        // N state
        dp_matrix.set_special(
            target_idx,
            DpMatrix::N,
            dp_matrix.get_special(prev_idx, DpMatrix::N) + n_loop,
        );

        // B state
        let begin_score = log_sum!(
            dp_matrix.get_special(target_idx, DpMatrix::N) + n_move,
            dp_matrix.get_special(target_idx, DpMatrix::J) + j_move
        );
        dp_matrix.set_special(target_idx, DpMatrix::B, begin_score);

        // L and G states
        dp_matrix.set_special(
            target_idx,
            DpMatrix::L,
            begin_score + profile.begin_split_score(Profile::SPLIT_LOCAL_IDX),
        );
        dp_matrix.set_special(
            target_idx,
            DpMatrix::G,
            begin_score + profile.begin_split_score(Profile::SPLIT_GLOCAL_IDX),
        );

        // JJ and CC are only meaningful in decoding
        dp_matrix.set_special(target_idx, DpMatrix::JJ, -f32::INFINITY);
        dp_matrix.set_special(target_idx, DpMatrix::CC, -f32::INFINITY);
    }

    let final_c_state_score = dp_matrix.get_special(target_length, DpMatrix::C);
    let c_to_t_score =
        profile.special_transition_score(Profile::SPECIAL_C_IDX, Profile::SPECIAL_MOVE_IDX);

    Ok(Nats(final_c_state_score + c_to_t_score))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::Alphabet;
    use crate::fixtures::{consensus_profile, random_target, sampled_profile};
    use crate::structs::AlignmentMode;
    use assert2::assert;

    #[test]
    fn test_forward_single_path() -> anyhow::Result<()> {
        // with M=1, L=1 and no glocal or multihit paths there is exactly one path
        let profile = consensus_profile(b"A", Alphabet::Dna, AlignmentMode::UniLocal, 1)?;
        let target = Sequence::from_utf8(b"A", Alphabet::Dna)?;
        let mut matrix = DpMatrix::default();

        let score = forward(&profile, &target, &mut matrix)?;

        let expected = profile
            .special_transition_score(Profile::SPECIAL_N_IDX, Profile::SPECIAL_MOVE_IDX)
            + profile.begin_split_score(Profile::SPLIT_LOCAL_IDX)
            + profile.begin_score(1)
            + profile.match_score(0, 1)
            + profile.end_score(1)
            + profile.special_transition_score(Profile::SPECIAL_E_IDX, Profile::SPECIAL_MOVE_IDX)
            + profile.special_transition_score(Profile::SPECIAL_C_IDX, Profile::SPECIAL_MOVE_IDX);

        assert!((score.value() - expected).abs() < 1e-5);
        Ok(())
    }

    #[test]
    fn test_forward_matrix_validates() -> anyhow::Result<()> {
        let mut matrix = DpMatrix::default();

        for mode in [AlignmentMode::Dual, AlignmentMode::UniLocal, AlignmentMode::Glocal] {
            for profile_length in [1, 4, 13] {
                for target_length in [0, 1, 2, 17] {
                    let profile =
                        sampled_profile(profile_length, Alphabet::Amino, mode, target_length, 7)?;
                    let target = random_target(target_length, Alphabet::Amino, 11);

                    let score = forward(&profile, &target, &mut matrix)?;
                    assert!(matrix.kind == MatrixKind::Forward);
                    assert!(let Ok(()) = matrix.validate());
                    assert!(!score.value().is_nan());
                    assert!(score.is_impossible() == (target_length == 0));
                }
            }
        }
        Ok(())
    }

    #[test]
    fn test_forward_alphabet_mismatch() -> anyhow::Result<()> {
        let profile = sampled_profile(5, Alphabet::Amino, AlignmentMode::Dual, 3, 0)?;
        let target = Sequence::from_utf8(b"ACG", Alphabet::Dna)?;
        let mut matrix = DpMatrix::default();

        assert!(let Err(DpError::AlphabetMismatch { .. }) =
            forward(&profile, &target, &mut matrix));
        Ok(())
    }
}
