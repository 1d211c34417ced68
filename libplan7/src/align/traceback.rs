use crate::align::structs::{DpMatrix, MatrixKind, Trace};
use crate::align::{check_matrix, DpError};
use crate::structs::Profile;

/// The scoring rule shared by a filled matrix and its traceback.
///
/// The traceback recomputes the value each predecessor offers to the current
/// cell and takes the best one, so the rule has to match the one used to fill
/// the matrix.
pub trait PathScorer {
    /// The kind of matrix this rule fills.
    fn matrix_kind(&self) -> MatrixKind;

    /// The value a predecessor holding `previous` offers through a transition scored `transition`.
    fn path(&self, previous: f32, transition: f32) -> f32;

    /// The extra value earned when an N, C or J loop emits residue `target_idx`.
    fn loop_gain(&self, target_idx: usize, special_cell: usize) -> f32;
}

/// Log-odds scores: predecessors offer their score plus the transition score.
pub struct ViterbiPaths;

impl PathScorer for ViterbiPaths {
    fn matrix_kind(&self) -> MatrixKind {
        MatrixKind::Viterbi
    }

    #[inline(always)]
    fn path(&self, previous: f32, transition: f32) -> f32 {
        previous + transition
    }

    #[inline(always)]
    fn loop_gain(&self, _target_idx: usize, _special_cell: usize) -> f32 {
        0.0
    }
}

/// Expected accuracy: predecessors offer their gain unchanged, unless the transition is impossible.
pub struct AccuracyPaths<'a> {
    pub posterior_matrix: &'a DpMatrix,
}

impl<'a> PathScorer for AccuracyPaths<'a> {
    fn matrix_kind(&self) -> MatrixKind {
        MatrixKind::Alignment
    }

    #[inline(always)]
    fn path(&self, previous: f32, transition: f32) -> f32 {
        if transition == -f32::INFINITY {
            -f32::INFINITY
        } else {
            previous
        }
    }

    #[inline(always)]
    fn loop_gain(&self, target_idx: usize, special_cell: usize) -> f32 {
        self.posterior_matrix.get_special(target_idx, special_cell)
    }
}

/// Picks the best of `candidates`; the first one listed wins a tie.
fn best(candidates: &[(f32, usize)]) -> Option<usize> {
    let mut best_value = -f32::INFINITY;
    let mut best_state = None;

    for &(value, state) in candidates {
        if value > best_value {
            best_value = value;
            best_state = Some(state);
        }
    }

    best_state
}

/// Recovers the optimal path from a filled Viterbi or Alignment matrix.
///
/// The trace is built from T back to S and then reversed. Emitting steps
/// carry their target position; loops of N, C and J put the position on the
/// later step of the pair.
pub fn traceback(
    profile: &Profile,
    matrix: &DpMatrix,
    scorer: &impl PathScorer,
    trace: &mut Trace,
) -> Result<(), DpError> {
    let profile_length = profile.length;
    let target_length = matrix.target_length;
    check_matrix(matrix, scorer.matrix_kind(), profile_length, target_length)?;

    let e_loop =
        profile.special_transition_score(Profile::SPECIAL_E_IDX, Profile::SPECIAL_LOOP_IDX);
    let e_move =
        profile.special_transition_score(Profile::SPECIAL_E_IDX, Profile::SPECIAL_MOVE_IDX);
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

    if scorer.path(matrix.get_special(target_length, DpMatrix::C), c_move) == -f32::INFINITY {
        return Err(DpError::ImpossibleSequence);
    }

    trace.steps.clear();
    trace.profile_length = profile_length;
    trace.target_length = target_length;

    trace.append(Trace::T_STATE, 0, 0);
    trace.append(Trace::C_STATE, 0, 0);

    let mut target_idx = target_length;
    let mut profile_idx = 0;
    let mut state = Trace::C_STATE;

    while state != Trace::S_STATE {
        let (row, node) = (target_idx, profile_idx);
        let no_predecessor = move || DpError::NoPredecessor {
            state: Trace::state_name(state),
            row,
            node,
        };

        let previous_state = match state {
            Trace::C_STATE => {
                let loop_value = if target_idx > 0 {
                    scorer.path(matrix.get_special(target_idx - 1, DpMatrix::C), c_loop)
                        + scorer.loop_gain(target_idx, DpMatrix::CC)
                } else {
                    -f32::INFINITY
                };
                best(&[
                    (loop_value, Trace::C_STATE),
                    (
                        scorer.path(matrix.get_special(target_idx, DpMatrix::E), e_move),
                        Trace::E_STATE,
                    ),
                ])
                .ok_or_else(no_predecessor)?
            }

            Trace::J_STATE => {
                let loop_value = if target_idx > 0 {
                    scorer.path(matrix.get_special(target_idx - 1, DpMatrix::J), j_loop)
                        + scorer.loop_gain(target_idx, DpMatrix::JJ)
                } else {
                    -f32::INFINITY
                };
                best(&[
                    (loop_value, Trace::J_STATE),
                    (
                        scorer.path(matrix.get_special(target_idx, DpMatrix::E), e_loop),
                        Trace::E_STATE,
                    ),
                ])
                .ok_or_else(no_predecessor)?
            }

            Trace::N_STATE => {
                if target_idx > 0 {
                    Trace::N_STATE
                } else {
                    Trace::S_STATE
                }
            }

            Trace::E_STATE => {
                // scan the exits in node order, local before glocal
                let mut best_value = -f32::INFINITY;
                let mut best_exit = None;
                let mut consider = |value: f32, exit: (usize, usize)| {
                    if value > best_value {
                        best_value = value;
                        best_exit = Some(exit);
                    }
                };

                for node in 1..=profile_length {
                    let end_score = profile.end_score(node);
                    consider(
                        scorer.path(matrix.get(target_idx, node, DpMatrix::ML), end_score),
                        (Trace::ML_STATE, node),
                    );
                    consider(
                        scorer.path(matrix.get(target_idx, node, DpMatrix::DL), end_score),
                        (Trace::DL_STATE, node),
                    );
                }
                let glocal_end_score = profile.glocal_end_score(profile_length);
                consider(
                    scorer.path(
                        matrix.get(target_idx, profile_length, DpMatrix::MG),
                        glocal_end_score,
                    ),
                    (Trace::MG_STATE, profile_length),
                );
                consider(
                    scorer.path(
                        matrix.get(target_idx, profile_length, DpMatrix::DG),
                        glocal_end_score,
                    ),
                    (Trace::DG_STATE, profile_length),
                );

                let (exit_state, exit_node) = best_exit.ok_or_else(no_predecessor)?;
                profile_idx = exit_node;
                exit_state
            }

            Trace::ML_STATE | Trace::MG_STATE => {
                let (m, i, d, entry, entry_state, entry_score) = if state == Trace::ML_STATE {
                    (
                        DpMatrix::ML,
                        DpMatrix::IL,
                        DpMatrix::DL,
                        DpMatrix::L,
                        Trace::L_STATE,
                        profile.begin_score(profile_idx),
                    )
                } else {
                    (
                        DpMatrix::MG,
                        DpMatrix::IG,
                        DpMatrix::DG,
                        DpMatrix::G,
                        Trace::G_STATE,
                        profile.glocal_begin_score(profile_idx),
                    )
                };
                let state_offset = state - Trace::ML_STATE;
                let prev_idx = target_idx - 1;
                let prev_node = profile_idx - 1;

                let previous_state = best(&[
                    (
                        scorer.path(
                            matrix.get(prev_idx, prev_node, m),
                            profile.transition_score(Profile::MATCH_TO_MATCH_IDX, prev_node),
                        ),
                        Trace::ML_STATE + state_offset,
                    ),
                    (
                        scorer.path(
                            matrix.get(prev_idx, prev_node, i),
                            profile.transition_score(Profile::INSERT_TO_MATCH_IDX, prev_node),
                        ),
                        Trace::IL_STATE + state_offset,
                    ),
                    (
                        scorer.path(
                            matrix.get(prev_idx, prev_node, d),
                            profile.transition_score(Profile::DELETE_TO_MATCH_IDX, prev_node),
                        ),
                        Trace::DL_STATE + state_offset,
                    ),
                    (
                        scorer.path(matrix.get_special(prev_idx, entry), entry_score),
                        entry_state,
                    ),
                ])
                .ok_or_else(no_predecessor)?;

                target_idx -= 1;
                profile_idx = if Trace::is_match(previous_state)
                    || Trace::is_insert(previous_state)
                    || Trace::is_delete(previous_state)
                {
                    prev_node
                } else {
                    0
                };
                previous_state
            }

            Trace::IL_STATE | Trace::IG_STATE => {
                let state_offset = state - Trace::IL_STATE;
                let (m, i) = if state == Trace::IL_STATE {
                    (DpMatrix::ML, DpMatrix::IL)
                } else {
                    (DpMatrix::MG, DpMatrix::IG)
                };
                let prev_idx = target_idx - 1;

                let previous_state = best(&[
                    (
                        scorer.path(
                            matrix.get(prev_idx, profile_idx, m),
                            profile.transition_score(Profile::MATCH_TO_INSERT_IDX, profile_idx),
                        ),
                        Trace::ML_STATE + state_offset,
                    ),
                    (
                        scorer.path(
                            matrix.get(prev_idx, profile_idx, i),
                            profile.transition_score(Profile::INSERT_TO_INSERT_IDX, profile_idx),
                        ),
                        Trace::IL_STATE + state_offset,
                    ),
                ])
                .ok_or_else(no_predecessor)?;

                target_idx -= 1;
                previous_state
            }

            Trace::DL_STATE | Trace::DG_STATE => {
                let state_offset = state - Trace::DL_STATE;
                let (m, d) = if state == Trace::DL_STATE {
                    (DpMatrix::ML, DpMatrix::DL)
                } else {
                    (DpMatrix::MG, DpMatrix::DG)
                };
                let prev_node = profile_idx - 1;

                let previous_state = best(&[
                    (
                        scorer.path(
                            matrix.get(target_idx, prev_node, m),
                            profile.transition_score(Profile::MATCH_TO_DELETE_IDX, prev_node),
                        ),
                        Trace::ML_STATE + state_offset,
                    ),
                    (
                        scorer.path(
                            matrix.get(target_idx, prev_node, d),
                            profile.transition_score(Profile::DELETE_TO_DELETE_IDX, prev_node),
                        ),
                        Trace::DL_STATE + state_offset,
                    ),
                ])
                .ok_or_else(no_predecessor)?;

                profile_idx = prev_node;
                previous_state
            }

            Trace::L_STATE | Trace::G_STATE => Trace::B_STATE,

            Trace::B_STATE => best(&[
                (
                    scorer.path(matrix.get_special(target_idx, DpMatrix::N), n_move),
                    Trace::N_STATE,
                ),
                (
                    scorer.path(matrix.get_special(target_idx, DpMatrix::J), j_move),
                    Trace::J_STATE,
                ),
            ])
            .ok_or_else(no_predecessor)?,

            _ => return Err(no_predecessor()),
        };

        // a flanking state looping on itself emits the current residue
        if Trace::is_flanking(state) && previous_state == state {
            trace.set_last_emission(target_idx);
            target_idx -= 1;
        }

        let (step_node, step_position) = if Trace::is_match(previous_state)
            || Trace::is_insert(previous_state)
        {
            (profile_idx, target_idx)
        } else if Trace::is_delete(previous_state) {
            (profile_idx, 0)
        } else {
            (0, 0)
        };

        trace.append(previous_state, step_node, step_position);
        state = previous_state;
    }

    trace.reverse();
    Ok(())
}
