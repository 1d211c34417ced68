use std::io::Write;

use thiserror::Error;

use crate::align::structs::DpMatrix;
use crate::structs::profile::TransitionError;
use crate::structs::{Profile, Sequence};

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("trace is empty")]
    Empty,
    #[error("trace must start with S->N, found {0}")]
    BadStart(&'static str),
    #[error("trace must end with C->T, found {0}")]
    BadEnd(&'static str),
    #[error("step {step}: {source}")]
    Transition {
        step: usize,
        #[source]
        source: TransitionError,
    },
    #[error("step {step}: {state} at node {profile_idx} does not follow node {previous_idx}")]
    BadNode {
        step: usize,
        state: &'static str,
        profile_idx: usize,
        previous_idx: usize,
    },
    #[error("step {step}: {state} emits position {target_idx}, expected {expected}")]
    BadPosition {
        step: usize,
        state: &'static str,
        target_idx: usize,
        expected: usize,
    },
    #[error("trace accounts for {found} residues, target has {expected}")]
    BadLength { found: usize, expected: usize },
}

#[derive(Clone, Copy, PartialEq)]
pub struct TraceStep {
    pub state: usize,
    pub profile_idx: usize,
    /// The emitted target position, or 0 for steps that emit nothing
    pub target_idx: usize,
    pub posterior: f32,
}

impl std::fmt::Debug for TraceStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<{}> p: {} t: {}",
            Trace::state_name(self.state),
            self.profile_idx,
            self.target_idx,
        )
    }
}

/// A state path through the profile.
///
/// N, C and J emit on transition: of an NN, CC or JJ pair, only the second
/// step carries a target position.
#[derive(Clone, Debug, Default)]
pub struct Trace {
    pub profile_length: usize,
    pub target_length: usize,
    pub steps: Vec<TraceStep>,
}

impl Trace {
    pub const TRACE_IDX_TO_NAME: [&'static str; 16] = [
        "INVALID", "ML", "MG", "IL", "IG", "DL", "DG", "S", "N", "B", "L", "G", "E", "C", "J",
        "T",
    ];

    pub const INVALID_STATE: usize = 0;
    pub const ML_STATE: usize = 1;
    pub const MG_STATE: usize = 2;
    pub const IL_STATE: usize = 3;
    pub const IG_STATE: usize = 4;
    pub const DL_STATE: usize = 5;
    pub const DG_STATE: usize = 6;
    pub const S_STATE: usize = 7;
    pub const N_STATE: usize = 8;
    pub const B_STATE: usize = 9;
    pub const L_STATE: usize = 10;
    pub const G_STATE: usize = 11;
    pub const E_STATE: usize = 12;
    pub const C_STATE: usize = 13;
    pub const J_STATE: usize = 14;
    pub const T_STATE: usize = 15;

    /// The name of a state code, or "?" for codes outside the grammar.
    pub fn state_name(state: usize) -> &'static str {
        Trace::TRACE_IDX_TO_NAME.get(state).copied().unwrap_or("?")
    }

    pub fn is_valid_state(state: usize) -> bool {
        (Trace::ML_STATE..=Trace::T_STATE).contains(&state)
    }

    pub fn is_match(state: usize) -> bool {
        state == Trace::ML_STATE || state == Trace::MG_STATE
    }

    pub fn is_insert(state: usize) -> bool {
        state == Trace::IL_STATE || state == Trace::IG_STATE
    }

    pub fn is_delete(state: usize) -> bool {
        state == Trace::DL_STATE || state == Trace::DG_STATE
    }

    pub fn is_flanking(state: usize) -> bool {
        matches!(state, Trace::N_STATE | Trace::C_STATE | Trace::J_STATE)
    }

    pub fn new(target_length: usize, profile_length: usize) -> Self {
        Trace {
            profile_length,
            target_length,
            steps: vec![],
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn clear(&mut self) {
        self.steps.clear();
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TraceStep> {
        self.steps.iter()
    }

    pub fn append(&mut self, state: usize, profile_idx: usize, target_idx: usize) {
        self.steps.push(TraceStep {
            state,
            profile_idx,
            target_idx,
            posterior: 0.0,
        });
    }

    /// Marks the last step as emitting `target_idx`; used for N, C and J loops.
    pub fn set_last_emission(&mut self, target_idx: usize) {
        if let Some(step) = self.steps.last_mut() {
            step.target_idx = target_idx;
        }
    }

    /// Traces are built backwards from T; this puts them in S..T order.
    pub fn reverse(&mut self) {
        self.steps.reverse();
    }

    /// The number of domains (B states) in the trace.
    pub fn num_domains(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| step.state == Trace::B_STATE)
            .count()
    }

    /// Fills each emitting step's posterior probability from a decoding matrix.
    pub fn set_posteriors(&mut self, posterior_matrix: &DpMatrix) {
        for step in self.steps.iter_mut() {
            step.posterior = if step.target_idx == 0 {
                0.0
            } else {
                match step.state {
                    Trace::ML_STATE => {
                        posterior_matrix.get(step.target_idx, step.profile_idx, DpMatrix::ML)
                    }
                    Trace::MG_STATE => {
                        posterior_matrix.get(step.target_idx, step.profile_idx, DpMatrix::MG)
                    }
                    Trace::IL_STATE => {
                        posterior_matrix.get(step.target_idx, step.profile_idx, DpMatrix::IL)
                    }
                    Trace::IG_STATE => {
                        posterior_matrix.get(step.target_idx, step.profile_idx, DpMatrix::IG)
                    }
                    Trace::N_STATE => posterior_matrix.get_special(step.target_idx, DpMatrix::N),
                    Trace::C_STATE => posterior_matrix.get_special(step.target_idx, DpMatrix::CC),
                    Trace::J_STATE => posterior_matrix.get_special(step.target_idx, DpMatrix::JJ),
                    _ => 0.0,
                }
            };
        }
    }

    /// The sum of the posterior probabilities of the emitting steps.
    pub fn expected_accuracy(&self) -> f32 {
        self.steps.iter().map(|step| step.posterior).sum()
    }

    /// The log-odds score of the path: its transition scores plus its emission scores.
    pub fn score(&self, profile: &Profile, target: &Sequence) -> Result<f32, TraceError> {
        let mut score = 0.0;

        for (step_idx, pair) in self.steps.windows(2).enumerate() {
            let (current, next) = (pair[0], pair[1]);
            score += profile
                .generic_transition_score(
                    current.state,
                    current.profile_idx,
                    next.state,
                    next.profile_idx,
                )
                .map_err(|source| TraceError::Transition {
                    step: step_idx,
                    source,
                })?;
        }

        for step in self.steps.iter() {
            if Trace::is_match(step.state) {
                score += profile.match_score(target.residue(step.target_idx), step.profile_idx);
            } else if Trace::is_insert(step.state) {
                score += profile.insert_score(target.residue(step.target_idx), step.profile_idx);
            }
        }

        Ok(score)
    }

    /// Checks that the trace is a complete, well-formed path that accounts for
    /// `target_length` residues.
    pub fn validate(&self, profile: &Profile, target_length: usize) -> Result<(), TraceError> {
        let first = self.steps.first().ok_or(TraceError::Empty)?;
        let last = self.steps.last().ok_or(TraceError::Empty)?;

        let second = self.steps.get(1).map(|step| step.state);
        if first.state != Trace::S_STATE || second != Some(Trace::N_STATE) {
            return Err(TraceError::BadStart(Trace::state_name(first.state)));
        }

        let second_to_last = self.steps.len().checked_sub(2).map(|idx| self.steps[idx].state);
        if last.state != Trace::T_STATE || second_to_last != Some(Trace::C_STATE) {
            return Err(TraceError::BadEnd(Trace::state_name(last.state)));
        }

        let mut emitted = 0;
        for (step_idx, step) in self.steps.iter().enumerate() {
            let name = Trace::state_name(step.state);

            if step_idx > 0 {
                let previous = self.steps[step_idx - 1];
                profile
                    .generic_transition_score(
                        previous.state,
                        previous.profile_idx,
                        step.state,
                        step.profile_idx,
                    )
                    .map_err(|source| TraceError::Transition {
                        step: step_idx,
                        source,
                    })?;

                let node_advances = (Trace::is_match(step.state) || Trace::is_delete(step.state))
                    && !matches!(previous.state, Trace::L_STATE | Trace::G_STATE);
                let node_holds = Trace::is_insert(step.state);

                if (node_advances && step.profile_idx != previous.profile_idx + 1)
                    || (node_holds && step.profile_idx != previous.profile_idx)
                {
                    return Err(TraceError::BadNode {
                        step: step_idx,
                        state: name,
                        profile_idx: step.profile_idx,
                        previous_idx: previous.profile_idx,
                    });
                }
            }

            let loops = step_idx > 0
                && Trace::is_flanking(step.state)
                && self.steps[step_idx - 1].state == step.state;
            let emits = Trace::is_match(step.state) || Trace::is_insert(step.state) || loops;

            let expected = if emits { emitted + 1 } else { 0 };
            if step.target_idx != expected {
                return Err(TraceError::BadPosition {
                    step: step_idx,
                    state: name,
                    target_idx: step.target_idx,
                    expected,
                });
            }
            if emits {
                emitted += 1;
            }
        }

        if emitted != target_length {
            return Err(TraceError::BadLength {
                found: emitted,
                expected: target_length,
            });
        }

        Ok(())
    }

    pub fn dump(
        &self,
        out: &mut impl Write,
        profile: &Profile,
        target: &Sequence,
    ) -> anyhow::Result<()> {
        let mut score: f32 = 0.0;
        let mut accuracy: f32 = 0.0;

        writeln!(
            out,
            "st   p     t      transit emission postprob - traceback len {}",
            self.steps.len()
        )?;
        writeln!(out, "--  ---- ------  -------- -------- --------")?;
        for (trace_idx, step) in self.steps.iter().enumerate() {
            let transition_score = match self.steps.get(trace_idx + 1) {
                Some(next) => profile
                    .generic_transition_score(
                        step.state,
                        step.profile_idx,
                        next.state,
                        next.profile_idx,
                    )
                    .unwrap_or_default(),
                None => 0.0,
            };
            score += transition_score;

            write!(
                out,
                "{:2}  {:4} {:6}   {:8.4}",
                Trace::state_name(step.state),
                step.profile_idx,
                step.target_idx,
                transition_score
            )?;

            let residue_symbol = if step.target_idx > 0 {
                target.utf8_bytes[step.target_idx] as char
            } else {
                '-'
            };

            if step.target_idx > 0 {
                let emission_score = if Trace::is_match(step.state) {
                    profile.match_score(target.residue(step.target_idx), step.profile_idx)
                } else if Trace::is_insert(step.state) {
                    profile.insert_score(target.residue(step.target_idx), step.profile_idx)
                } else {
                    0.0
                };
                score += emission_score;
                accuracy += step.posterior;

                write!(out, " {:8.4} {:8.4}", emission_score, step.posterior)?;
            }

            writeln!(out, " {}", residue_symbol)?;
        }

        writeln!(out, "                -------- -------- --------")?;
        writeln!(out, "                  total: {:8.4} {:8.4}\n", score, accuracy)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::Alphabet;
    use crate::structs::{AlignmentMode, Background, Hmm};
    use assert2::assert;
    use std::sync::Arc;

    fn consensus_profile() -> anyhow::Result<Profile> {
        let hmm = Hmm::from_consensus(&[0, 1, 2], Alphabet::Dna, 0.9)?;
        Ok(Profile::from_hmm(
            Arc::new(hmm),
            Arc::new(Background::new(Alphabet::Dna)),
            AlignmentMode::Dual,
            4,
        )?)
    }

    // S N N(1) B L ML1(2) ML2(3) E C C(4) T for target "TACA"
    fn local_trace() -> Trace {
        let mut trace = Trace::new(4, 3);
        trace.append(Trace::S_STATE, 0, 0);
        trace.append(Trace::N_STATE, 0, 0);
        trace.append(Trace::N_STATE, 0, 1);
        trace.append(Trace::B_STATE, 0, 0);
        trace.append(Trace::L_STATE, 0, 0);
        trace.append(Trace::ML_STATE, 1, 2);
        trace.append(Trace::ML_STATE, 2, 3);
        trace.append(Trace::E_STATE, 0, 0);
        trace.append(Trace::C_STATE, 0, 0);
        trace.append(Trace::C_STATE, 0, 4);
        trace.append(Trace::T_STATE, 0, 0);
        trace
    }

    #[test]
    fn test_validate_local_trace() -> anyhow::Result<()> {
        let profile = consensus_profile()?;
        let trace = local_trace();
        trace.validate(&profile, 4)?;
        assert!(trace.num_domains() == 1);
        Ok(())
    }

    #[test]
    fn test_score_local_trace() -> anyhow::Result<()> {
        let profile = consensus_profile()?;
        let target = Sequence::from_utf8(b"TACA", Alphabet::Dna)?;
        let trace = local_trace();

        let n_loop =
            profile.special_transition_score(Profile::SPECIAL_N_IDX, Profile::SPECIAL_LOOP_IDX);
        let n_move =
            profile.special_transition_score(Profile::SPECIAL_N_IDX, Profile::SPECIAL_MOVE_IDX);
        let c_loop =
            profile.special_transition_score(Profile::SPECIAL_C_IDX, Profile::SPECIAL_LOOP_IDX);
        let c_move =
            profile.special_transition_score(Profile::SPECIAL_C_IDX, Profile::SPECIAL_MOVE_IDX);
        let e_move =
            profile.special_transition_score(Profile::SPECIAL_E_IDX, Profile::SPECIAL_MOVE_IDX);

        let expected = n_loop
            + n_move
            + profile.begin_split_score(Profile::SPLIT_LOCAL_IDX)
            + profile.begin_score(1)
            + profile.match_score(0, 1)
            + profile.transition_score(Profile::MATCH_TO_MATCH_IDX, 1)
            + profile.match_score(1, 2)
            + profile.end_score(2)
            + e_move
            + c_loop
            + c_move;

        assert!((trace.score(&profile, &target)? - expected).abs() < 1e-5);
        Ok(())
    }

    #[test]
    fn test_validate_rejects_bad_traces() -> anyhow::Result<()> {
        let profile = consensus_profile()?;

        let mut trace = local_trace();
        trace.steps[6].profile_idx = 3;
        assert!(let Err(TraceError::BadNode { .. }) = trace.validate(&profile, 4));

        let mut trace = local_trace();
        trace.steps[9].target_idx = 5;
        assert!(let Err(TraceError::BadPosition { .. }) = trace.validate(&profile, 4));

        let trace = local_trace();
        assert!(let Err(TraceError::BadLength { found: 4, expected: 5 }) =
            trace.validate(&profile, 5));

        let mut trace = local_trace();
        trace.steps[4].state = Trace::G_STATE;
        assert!(let Err(TraceError::Transition { step: 5, .. }) = trace.validate(&profile, 4));

        let mut trace = local_trace();
        trace.steps.pop();
        assert!(let Err(TraceError::BadEnd(_)) = trace.validate(&profile, 4));

        assert!(let Err(TraceError::Empty) = Trace::default().validate(&profile, 0));
        Ok(())
    }

    #[test]
    fn test_unknown_state_codes() -> anyhow::Result<()> {
        let profile = consensus_profile()?;
        let target = Sequence::from_utf8(b"TACA", Alphabet::Dna)?;

        let mut trace = local_trace();
        trace.steps[0].state = 42;

        assert!(Trace::state_name(42) == "?");
        assert!(let Err(TraceError::BadStart("?")) = trace.validate(&profile, 4));
        assert!(let Err(TraceError::Transition {
            step: 0,
            source: TransitionError::UnknownState(42),
        }) = trace.score(&profile, &target));

        let mut out: Vec<u8> = vec![];
        trace.dump(&mut out, &profile, &target)?;
        assert!(String::from_utf8(out)?.contains("traceback len 11"));
        assert!(format!("{:?}", trace.steps[0]).starts_with("<?>"));
        Ok(())
    }

    #[test]
    fn test_reverse() {
        let mut trace = Trace::new(0, 1);
        trace.append(Trace::T_STATE, 0, 0);
        trace.append(Trace::C_STATE, 0, 0);
        trace.reverse();

        assert!(trace.steps[0].state == Trace::C_STATE);
        assert!(trace.steps[1].state == Trace::T_STATE);
    }

    #[test]
    fn test_dump() -> anyhow::Result<()> {
        let profile = consensus_profile()?;
        let target = Sequence::from_utf8(b"TACA", Alphabet::Dna)?;
        let mut out: Vec<u8> = vec![];
        local_trace().dump(&mut out, &profile, &target)?;

        let text = String::from_utf8(out)?;
        assert!(text.contains("traceback len 11"));
        assert!(text.contains("total:"));
        Ok(())
    }
}
