use crate::align::structs::{DpMatrix, MatrixKind, Trace};
use crate::align::{check_matrix, traceback, AccuracyPaths, DpError, PathScorer};
use crate::max_f32;
use crate::structs::Profile;

/// Finds the alignment with the highest expected accuracy under a decoding matrix.
///
/// Residues aligned to match states earn `gamma` times their posterior
/// probability; residues in insert states or in N, J and C loops earn their
/// posterior probability. Paths may only use transitions that have a
/// non-impossible score in `profile`. The best path is traced back into
/// `trace` with its per-step posteriors, and its gain is returned.
pub fn optimal_accuracy(
    profile: &Profile,
    posterior_matrix: &DpMatrix,
    alignment_matrix: &mut DpMatrix,
    gamma: f32,
    trace: &mut Trace,
) -> Result<f32, DpError> {
    let profile_length = profile.length;
    let target_length = posterior_matrix.target_length;
    check_matrix(posterior_matrix, MatrixKind::Decoding, profile_length, target_length)?;

    alignment_matrix.prepare(MatrixKind::Alignment, profile_length, target_length)?;

    let paths = AccuracyPaths { posterior_matrix };

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

    // initialization of the zero row
    alignment_matrix.fill_main_row(0, -f32::INFINITY);
    let begin_gain = paths.path(0.0, n_move);
    alignment_matrix.set_special(0, DpMatrix::E, -f32::INFINITY);
    alignment_matrix.set_special(0, DpMatrix::N, 0.0);
    alignment_matrix.set_special(0, DpMatrix::J, -f32::INFINITY);
    alignment_matrix.set_special(0, DpMatrix::B, begin_gain);
    alignment_matrix.set_special(0, DpMatrix::L, paths.path(begin_gain, split_local));
    alignment_matrix.set_special(0, DpMatrix::G, paths.path(begin_gain, split_glocal));
    alignment_matrix.set_special(0, DpMatrix::C, -f32::INFINITY);
    alignment_matrix.set_special(0, DpMatrix::JJ, -f32::INFINITY);
    alignment_matrix.set_special(0, DpMatrix::CC, -f32::INFINITY);

    for target_idx in 1..=target_length {
        let prev_idx = target_idx - 1;
        let last_row = target_idx == target_length;

        for cell in 0..DpMatrix::NUM_MAIN_CELLS {
            alignment_matrix.set(target_idx, 0, cell, -f32::INFINITY);
        }

        let local_entry = alignment_matrix.get_special(prev_idx, DpMatrix::L);
        let glocal_entry = alignment_matrix.get_special(prev_idx, DpMatrix::G);
        let mut end_gain = -f32::INFINITY;

        for profile_idx in 1..=profile_length {
            let prev_profile_idx = profile_idx - 1;
            let mm = profile.transition_score(Profile::MATCH_TO_MATCH_IDX, prev_profile_idx);
            let im = profile.transition_score(Profile::INSERT_TO_MATCH_IDX, prev_profile_idx);
            let dm = profile.transition_score(Profile::DELETE_TO_MATCH_IDX, prev_profile_idx);

            // match states
            alignment_matrix.set(
                target_idx,
                profile_idx,
                DpMatrix::ML,
                max_f32!(
                    paths.path(alignment_matrix.get(prev_idx, prev_profile_idx, DpMatrix::ML), mm),
                    paths.path(alignment_matrix.get(prev_idx, prev_profile_idx, DpMatrix::IL), im),
                    paths.path(alignment_matrix.get(prev_idx, prev_profile_idx, DpMatrix::DL), dm),
                    paths.path(local_entry, profile.begin_score(profile_idx))
                ) + gamma * posterior_matrix.get(target_idx, profile_idx, DpMatrix::ML),
            );

            alignment_matrix.set(
                target_idx,
                profile_idx,
                DpMatrix::MG,
                max_f32!(
                    paths.path(alignment_matrix.get(prev_idx, prev_profile_idx, DpMatrix::MG), mm),
                    paths.path(alignment_matrix.get(prev_idx, prev_profile_idx, DpMatrix::IG), im),
                    paths.path(alignment_matrix.get(prev_idx, prev_profile_idx, DpMatrix::DG), dm),
                    paths.path(glocal_entry, profile.glocal_begin_score(profile_idx))
                ) + gamma * posterior_matrix.get(target_idx, profile_idx, DpMatrix::MG),
            );

            // insert states; an insert on the last row could never be followed by a match
            if profile_idx < profile_length && !last_row {
                let mi = profile.transition_score(Profile::MATCH_TO_INSERT_IDX, profile_idx);
                let ii = profile.transition_score(Profile::INSERT_TO_INSERT_IDX, profile_idx);

                alignment_matrix.set(
                    target_idx,
                    profile_idx,
                    DpMatrix::IL,
                    max_f32!(
                        paths.path(alignment_matrix.get(prev_idx, profile_idx, DpMatrix::ML), mi),
                        paths.path(alignment_matrix.get(prev_idx, profile_idx, DpMatrix::IL), ii)
                    ) + posterior_matrix.get(target_idx, profile_idx, DpMatrix::IL),
                );

                alignment_matrix.set(
                    target_idx,
                    profile_idx,
                    DpMatrix::IG,
                    max_f32!(
                        paths.path(alignment_matrix.get(prev_idx, profile_idx, DpMatrix::MG), mi),
                        paths.path(alignment_matrix.get(prev_idx, profile_idx, DpMatrix::IG), ii)
                    ) + posterior_matrix.get(target_idx, profile_idx, DpMatrix::IG),
                );
            } else {
                alignment_matrix.set(target_idx, profile_idx, DpMatrix::IL, -f32::INFINITY);
                alignment_matrix.set(target_idx, profile_idx, DpMatrix::IG, -f32::INFINITY);
            }

            // delete states
            if profile_idx > 1 {
                let md = profile.transition_score(Profile::MATCH_TO_DELETE_IDX, prev_profile_idx);
                let dd = profile.transition_score(Profile::DELETE_TO_DELETE_IDX, prev_profile_idx);

                alignment_matrix.set(
                    target_idx,
                    profile_idx,
                    DpMatrix::DL,
                    max_f32!(
                        paths.path(
                            alignment_matrix.get(target_idx, prev_profile_idx, DpMatrix::ML),
                            md
                        ),
                        paths.path(
                            alignment_matrix.get(target_idx, prev_profile_idx, DpMatrix::DL),
                            dd
                        )
                    ),
                );

                alignment_matrix.set(
                    target_idx,
                    profile_idx,
                    DpMatrix::DG,
                    max_f32!(
                        paths.path(
                            alignment_matrix.get(target_idx, prev_profile_idx, DpMatrix::MG),
                            md
                        ),
                        paths.path(
                            alignment_matrix.get(target_idx, prev_profile_idx, DpMatrix::DG),
                            dd
                        )
                    ),
                );
            } else {
                alignment_matrix.set(target_idx, profile_idx, DpMatrix::DL, -f32::INFINITY);
                alignment_matrix.set(target_idx, profile_idx, DpMatrix::DG, -f32::INFINITY);
            }

            end_gain = max_f32!(
                end_gain,
                paths.path(
                    alignment_matrix.get(target_idx, profile_idx, DpMatrix::ML),
                    profile.end_score(profile_idx)
                ),
                paths.path(
                    alignment_matrix.get(target_idx, profile_idx, DpMatrix::DL),
                    profile.end_score(profile_idx)
                )
            );
        }

        let glocal_end_score = profile.glocal_end_score(profile_length);
        end_gain = max_f32!(
            end_gain,
            paths.path(
                alignment_matrix.get(target_idx, profile_length, DpMatrix::MG),
                glocal_end_score
            ),
            paths.path(
                alignment_matrix.get(target_idx, profile_length, DpMatrix::DG),
                glocal_end_score
            )
        );
        alignment_matrix.set_special(target_idx, DpMatrix::E, end_gain);

        alignment_matrix.set_special(
            target_idx,
            DpMatrix::C,
            max_f32!(
                paths.path(alignment_matrix.get_special(prev_idx, DpMatrix::C), c_loop)
                    + posterior_matrix.get_special(target_idx, DpMatrix::CC),
                paths.path(end_gain, e_move)
            ),
        );

        alignment_matrix.set_special(target_idx, DpMatrix::JJ, -f32::INFINITY);
        alignment_matrix.set_special(target_idx, DpMatrix::CC, -f32::INFINITY);

        if last_row {
            // nothing that needs another residue can complete a path
            for cell in [DpMatrix::N, DpMatrix::J, DpMatrix::B, DpMatrix::L, DpMatrix::G] {
                alignment_matrix.set_special(target_idx, cell, -f32::INFINITY);
            }
            continue;
        }

        let j_gain = max_f32!(
            paths.path(alignment_matrix.get_special(prev_idx, DpMatrix::J), j_loop)
                + posterior_matrix.get_special(target_idx, DpMatrix::JJ),
            paths.path(end_gain, e_loop)
        );
        alignment_matrix.set_special(target_idx, DpMatrix::J, j_gain);

        let n_gain = paths.path(alignment_matrix.get_special(prev_idx, DpMatrix::N), n_loop)
            + posterior_matrix.get_special(target_idx, DpMatrix::N);
        alignment_matrix.set_special(target_idx, DpMatrix::N, n_gain);

        let begin_gain = max_f32!(paths.path(n_gain, n_move), paths.path(j_gain, j_move));
        alignment_matrix.set_special(target_idx, DpMatrix::B, begin_gain);
        alignment_matrix.set_special(target_idx, DpMatrix::L, paths.path(begin_gain, split_local));
        alignment_matrix.set_special(target_idx, DpMatrix::G, paths.path(begin_gain, split_glocal));
    }

    let gain = paths.path(alignment_matrix.get_special(target_length, DpMatrix::C), c_move);

    if gain == -f32::INFINITY {
        trace.clear();
        return Err(DpError::ImpossibleSequence);
    }

    traceback(profile, alignment_matrix, &paths, trace)?;
    trace.set_posteriors(posterior_matrix);

    Ok(gain)
}
