use crate::align::structs::{DpMatrix, MatrixKind};
use crate::align::{check_alphabet, DpError, Nats};
use crate::log_sum;
use crate::structs::{Profile, Sequence};

/// Fills `dp_matrix` with the Backward algorithm and returns the Backward score.
///
/// The score is read from the N cell of row 0. It matches the Forward score
/// to within the accuracy of the log-sum approximation.
pub fn backward(
    profile: &Profile,
    target: &Sequence,
    dp_matrix: &mut DpMatrix,
) -> Result<Nats, DpError> {
    check_alphabet(profile, target)?;

    let profile_length = profile.length;
    let target_length = target.length;
    dp_matrix.prepare(MatrixKind::Backward, profile_length, target_length)?;

    if target_length == 0 {
        // an empty target has no path: nothing is emitted before C->T
        dp_matrix.row_mut(0).fill(-f32::INFINITY);
        return Ok(Nats(-f32::INFINITY));
    }

    let e_loop =
        profile.special_transition_score(Profile::SPECIAL_E_IDX, Profile::SPECIAL_LOOP_IDX);
    let e_move =
        profile.special_transition_score(Profile::SPECIAL_E_IDX, Profile::SPECIAL_MOVE_IDX);
    let n_loop =
        profile.special_transition_score(Profile::SPECIAL_N_IDX, Profile::SPECIAL_LOOP_IDX);
    let n_move =
        profile.special_transition_score(Profile::SPECIAL_N_IDX, Profile::SPECIAL_MOVE_IDX);
    let j_loop =
        profile.special_transition_score(Profile::SPECIAL_J_IDX, Profile::SPECIAL_LOOP_IDX);
    let j_move =
        profile.special_transition_score(Profile::SPECIAL_J_IDX, Profile::SPECIAL_MOVE_IDX);
    let c_loop =
        profile.special_transition_score(Profile::SPECIAL_C_IDX, Profile::SPECIAL_LOOP_IDX);
    let c_move =
        profile.special_transition_score(Profile::SPECIAL_C_IDX, Profile::SPECIAL_MOVE_IDX);
    let split_local = profile.begin_split_score(Profile::SPLIT_LOCAL_IDX);
    let split_glocal = profile.begin_split_score(Profile::SPLIT_GLOCAL_IDX);

    // row L: every path must end through C->T
    let end_score = c_move + e_move;
    dp_matrix.set_special(target_length, DpMatrix::E, end_score);
    dp_matrix.set_special(target_length, DpMatrix::N, -f32::INFINITY);
    dp_matrix.set_special(target_length, DpMatrix::J, -f32::INFINITY);
    dp_matrix.set_special(target_length, DpMatrix::B, -f32::INFINITY);
    dp_matrix.set_special(target_length, DpMatrix::L, -f32::INFINITY);
    dp_matrix.set_special(target_length, DpMatrix::G, -f32::INFINITY);
    dp_matrix.set_special(target_length, DpMatrix::C, c_move);
    dp_matrix.set_special(target_length, DpMatrix::JJ, -f32::INFINITY);
    dp_matrix.set_special(target_length, DpMatrix::CC, -f32::INFINITY);

    for cell in 0..DpMatrix::NUM_MAIN_CELLS {
        dp_matrix.set(target_length, 0, cell, -f32::INFINITY);
    }

    // unrolled node M
    dp_matrix.set(
        target_length,
        profile_length,
        DpMatrix::ML,
        end_score + profile.end_score(profile_length),
    );
    dp_matrix.set(target_length, profile_length, DpMatrix::MG, end_score);
    dp_matrix.set(target_length, profile_length, DpMatrix::IL, -f32::INFINITY);
    dp_matrix.set(target_length, profile_length, DpMatrix::IG, -f32::INFINITY);
    dp_matrix.set(
        target_length,
        profile_length,
        DpMatrix::DL,
        end_score + profile.end_score(profile_length),
    );
    dp_matrix.set(target_length, profile_length, DpMatrix::DG, end_score);

    for profile_idx in (1..profile_length).rev() {
        let next_profile_idx = profile_idx + 1;
        let local_exit = end_score + profile.end_score(profile_idx);

        dp_matrix.set(
            target_length,
            profile_idx,
            DpMatrix::ML,
            log_sum!(
                local_exit,
                dp_matrix.get(target_length, next_profile_idx, DpMatrix::DL)
                    + profile.transition_score(Profile::MATCH_TO_DELETE_IDX, profile_idx)
            ),
        );
        dp_matrix.set(
            target_length,
            profile_idx,
            DpMatrix::MG,
            dp_matrix.get(target_length, next_profile_idx, DpMatrix::DG)
                + profile.transition_score(Profile::MATCH_TO_DELETE_IDX, profile_idx),
        );

        // an insert would have to emit past the end of the target
        dp_matrix.set(target_length, profile_idx, DpMatrix::IL, -f32::INFINITY);
        dp_matrix.set(target_length, profile_idx, DpMatrix::IG, -f32::INFINITY);

        dp_matrix.set(
            target_length,
            profile_idx,
            DpMatrix::DL,
            log_sum!(
                local_exit,
                dp_matrix.get(target_length, next_profile_idx, DpMatrix::DL)
                    + profile.transition_score(Profile::DELETE_TO_DELETE_IDX, profile_idx)
            ),
        );
        dp_matrix.set(
            target_length,
            profile_idx,
            DpMatrix::DG,
            dp_matrix.get(target_length, next_profile_idx, DpMatrix::DG)
                + profile.transition_score(Profile::DELETE_TO_DELETE_IDX, profile_idx),
        );
    }

    // rows L-1..=0
    for target_idx in (0..target_length).rev() {
        let next_idx = target_idx + 1;
        let next_residue = target.residue(next_idx);

        // L and G enter a match state that emits the next residue
        let mut local_entry = -f32::INFINITY;
        let mut glocal_entry = -f32::INFINITY;
        for profile_idx in 1..=profile_length {
            let match_score = profile.match_score(next_residue, profile_idx);
            local_entry = log_sum!(
                local_entry,
                dp_matrix.get(next_idx, profile_idx, DpMatrix::ML)
                    + match_score
                    + profile.begin_score(profile_idx)
            );
            glocal_entry = log_sum!(
                glocal_entry,
                dp_matrix.get(next_idx, profile_idx, DpMatrix::MG)
                    + match_score
                    + profile.glocal_begin_score(profile_idx)
            );
        }

        let begin_score = log_sum!(local_entry + split_local, glocal_entry + split_glocal);

        dp_matrix.set_special(target_idx, DpMatrix::L, local_entry);
        dp_matrix.set_special(target_idx, DpMatrix::G, glocal_entry);
        dp_matrix.set_special(target_idx, DpMatrix::B, begin_score);
        dp_matrix.set_special(target_idx, DpMatrix::JJ, -f32::INFINITY);
        dp_matrix.set_special(target_idx, DpMatrix::CC, -f32::INFINITY);

        // N state
        dp_matrix.set_special(
            target_idx,
            DpMatrix::N,
            log_sum!(
                dp_matrix.get_special(next_idx, DpMatrix::N) + n_loop,
                begin_score + n_move
            ),
        );

        if target_idx == 0 {
            // row 0: only N, B, L and G can start a path
            dp_matrix.fill_main_row(0, -f32::INFINITY);
            dp_matrix.set_special(0, DpMatrix::E, -f32::INFINITY);
            dp_matrix.set_special(0, DpMatrix::J, -f32::INFINITY);
            dp_matrix.set_special(0, DpMatrix::C, -f32::INFINITY);
            break;
        }

        // J, C and E states
        let j_score = log_sum!(
            dp_matrix.get_special(next_idx, DpMatrix::J) + j_loop,
            begin_score + j_move
        );
        let c_score = dp_matrix.get_special(next_idx, DpMatrix::C) + c_loop;
        let end_score = log_sum!(j_score + e_loop, c_score + e_move);

        dp_matrix.set_special(target_idx, DpMatrix::J, j_score);
        dp_matrix.set_special(target_idx, DpMatrix::C, c_score);
        dp_matrix.set_special(target_idx, DpMatrix::E, end_score);

        for cell in 0..DpMatrix::NUM_MAIN_CELLS {
            dp_matrix.set(target_idx, 0, cell, -f32::INFINITY);
        }

        // unrolled node M
        dp_matrix.set(
            target_idx,
            profile_length,
            DpMatrix::ML,
            end_score + profile.end_score(profile_length),
        );
        dp_matrix.set(target_idx, profile_length, DpMatrix::MG, end_score);
        dp_matrix.set(target_idx, profile_length, DpMatrix::IL, -f32::INFINITY);
        dp_matrix.set(target_idx, profile_length, DpMatrix::IG, -f32::INFINITY);
        dp_matrix.set(
            target_idx,
            profile_length,
            DpMatrix::DL,
            end_score + profile.end_score(profile_length),
        );
        dp_matrix.set(target_idx, profile_length, DpMatrix::DG, end_score);

        for profile_idx in (1..profile_length).rev() {
            let next_profile_idx = profile_idx + 1;
            let next_match_score = profile.match_score(next_residue, next_profile_idx);
            let insert_score = profile.insert_score(next_residue, profile_idx);
            let local_exit = end_score + profile.end_score(profile_idx);

            let next_local_match =
                dp_matrix.get(next_idx, next_profile_idx, DpMatrix::ML) + next_match_score;
            let next_glocal_match =
                dp_matrix.get(next_idx, next_profile_idx, DpMatrix::MG) + next_match_score;
            let next_local_insert =
                dp_matrix.get(next_idx, profile_idx, DpMatrix::IL) + insert_score;
            let next_glocal_insert =
                dp_matrix.get(next_idx, profile_idx, DpMatrix::IG) + insert_score;

            // match states
            dp_matrix.set(
                target_idx,
                profile_idx,
                DpMatrix::ML,
                log_sum!(
                    next_local_match
                        + profile.transition_score(Profile::MATCH_TO_MATCH_IDX, profile_idx),
                    next_local_insert
                        + profile.transition_score(Profile::MATCH_TO_INSERT_IDX, profile_idx),
                    dp_matrix.get(target_idx, next_profile_idx, DpMatrix::DL)
                        + profile.transition_score(Profile::MATCH_TO_DELETE_IDX, profile_idx),
                    local_exit
                ),
            );
            dp_matrix.set(
                target_idx,
                profile_idx,
                DpMatrix::MG,
                log_sum!(
                    next_glocal_match
                        + profile.transition_score(Profile::MATCH_TO_MATCH_IDX, profile_idx),
                    next_glocal_insert
                        + profile.transition_score(Profile::MATCH_TO_INSERT_IDX, profile_idx),
                    dp_matrix.get(target_idx, next_profile_idx, DpMatrix::DG)
                        + profile.transition_score(Profile::MATCH_TO_DELETE_IDX, profile_idx)
                ),
            );

            // insert states
            dp_matrix.set(
                target_idx,
                profile_idx,
                DpMatrix::IL,
                log_sum!(
                    next_local_match
                        + profile.transition_score(Profile::INSERT_TO_MATCH_IDX, profile_idx),
                    next_local_insert
                        + profile.transition_score(Profile::INSERT_TO_INSERT_IDX, profile_idx)
                ),
            );
            dp_matrix.set(
                target_idx,
                profile_idx,
                DpMatrix::IG,
                log_sum!(
                    next_glocal_match
                        + profile.transition_score(Profile::INSERT_TO_MATCH_IDX, profile_idx),
                    next_glocal_insert
                        + profile.transition_score(Profile::INSERT_TO_INSERT_IDX, profile_idx)
                ),
            );

            // delete states
            dp_matrix.set(
                target_idx,
                profile_idx,
                DpMatrix::DL,
                log_sum!(
                    next_local_match
                        + profile.transition_score(Profile::DELETE_TO_MATCH_IDX, profile_idx),
                    dp_matrix.get(target_idx, next_profile_idx, DpMatrix::DL)
                        + profile.transition_score(Profile::DELETE_TO_DELETE_IDX, profile_idx),
                    local_exit
                ),
            );
            dp_matrix.set(
                target_idx,
                profile_idx,
                DpMatrix::DG,
                log_sum!(
                    next_glocal_match
                        + profile.transition_score(Profile::DELETE_TO_MATCH_IDX, profile_idx),
                    dp_matrix.get(target_idx, next_profile_idx, DpMatrix::DG)
                        + profile.transition_score(Profile::DELETE_TO_DELETE_IDX, profile_idx)
                ),
            );
        }
    }

    Ok(Nats(dp_matrix.get_special(0, DpMatrix::N)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::forward;
    use crate::alphabet::Alphabet;
    use crate::fixtures::{random_target, sampled_profile};
    use crate::structs::AlignmentMode;
    use assert2::assert;

    #[test]
    fn test_backward_matches_forward() -> anyhow::Result<()> {
        let mut fwd = DpMatrix::default();
        let mut bck = DpMatrix::default();

        for (seed, mode) in [
            AlignmentMode::Local,
            AlignmentMode::Glocal,
            AlignmentMode::Dual,
            AlignmentMode::UniLocal,
            AlignmentMode::UniGlocal,
            AlignmentMode::UniDual,
        ]
        .into_iter()
        .enumerate()
        {
            for (profile_length, target_length) in [(1, 1), (1, 5), (6, 2), (12, 30), (30, 12)] {
                let profile = sampled_profile(
                    profile_length,
                    Alphabet::Amino,
                    mode,
                    target_length,
                    seed as u64,
                )?;
                let target = random_target(target_length, Alphabet::Amino, 100 + seed as u64);

                let forward_score = forward(&profile, &target, &mut fwd)?;
                let backward_score = backward(&profile, &target, &mut bck)?;

                assert!(
                    (forward_score.value() - backward_score.value()).abs() < 1e-3,
                    "mode: {mode:?}, M: {profile_length}, L: {target_length}"
                );
                assert!(let Ok(()) = bck.validate());
            }
        }
        Ok(())
    }

    #[test]
    fn test_backward_matches_forward_on_a_long_glocal_target() -> anyhow::Result<()> {
        let profile = sampled_profile(200, Alphabet::Amino, AlignmentMode::Glocal, 1000, 21)?;
        let target = random_target(1000, Alphabet::Amino, 21);
        let mut fwd = DpMatrix::default();
        let mut bck = DpMatrix::default();

        let forward_score = forward(&profile, &target, &mut fwd)?;
        let backward_score = backward(&profile, &target, &mut bck)?;

        assert!(forward_score.value().is_finite());
        assert!((forward_score.value() - backward_score.value()).abs() < 1e-3);
        Ok(())
    }

    #[test]
    fn test_backward_empty_target() -> anyhow::Result<()> {
        let profile = sampled_profile(4, Alphabet::Dna, AlignmentMode::Dual, 0, 3)?;
        let target = random_target(0, Alphabet::Dna, 3);
        let mut matrix = DpMatrix::default();

        let score = backward(&profile, &target, &mut matrix)?;
        assert!(score.is_impossible());
        assert!(matrix.kind == MatrixKind::Backward);
        assert!(let Ok(()) = matrix.validate());
        Ok(())
    }

    #[test]
    fn test_backward_reuses_matrix() -> anyhow::Result<()> {
        let mut matrix = DpMatrix::default();
        let large = sampled_profile(20, Alphabet::Amino, AlignmentMode::Dual, 40, 5)?;
        backward(&large, &random_target(40, Alphabet::Amino, 5), &mut matrix)?;
        let size = matrix.size_of();

        let small = sampled_profile(8, Alphabet::Amino, AlignmentMode::Dual, 10, 6)?;
        backward(&small, &random_target(10, Alphabet::Amino, 6), &mut matrix)?;

        assert!(matrix.size_of() == size);
        assert!(matrix.profile_length == 8);
        assert!(matrix.target_length == 10);
        assert!(let Ok(()) = matrix.validate());
        Ok(())
    }
}
