use std::collections::TryReserveError;
use std::fmt;
use std::fmt::Formatter;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::align::structs::Trace;
use crate::alphabet::Alphabet;
use crate::structs::hmm::constants::{
    HMM_DELETE_TO_DELETE, HMM_DELETE_TO_MATCH, HMM_INSERT_TO_INSERT, HMM_INSERT_TO_MATCH,
    HMM_MATCH_TO_DELETE, HMM_MATCH_TO_INSERT, HMM_MATCH_TO_MATCH,
};
use crate::structs::{Background, Hmm};
use crate::util::LogAbuse;

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("a profile must have at least one node")]
    EmptyProfile,
    #[error("failed to allocate the profile {table} table")]
    Allocation {
        table: &'static str,
        #[source]
        source: TryReserveError,
    },
    #[error("model alphabet {model:?} does not match background alphabet {background:?}")]
    AlphabetMismatch {
        model: Alphabet,
        background: Alphabet,
    },
    #[error("cannot configure a profile without a search mode")]
    NoMode,
}

#[derive(Error, Debug, PartialEq)]
pub enum TransitionError {
    #[error("no such state code: {0}")]
    UnknownState(usize),
    #[error("illegal transition: {from} -> {to}")]
    IllegalTransition {
        from: &'static str,
        to: &'static str,
    },
    #[error("node {node} has no stored transition in a profile of length {length}")]
    NodeOutOfRange { node: usize, length: usize },
}

/// The search mode a profile is configured in.
///
/// Multihit modes allow more than one domain per target through the J state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlignmentMode {
    #[default]
    NoMode,
    Local,
    Glocal,
    Dual,
    UniLocal,
    UniGlocal,
    UniDual,
}

impl AlignmentMode {
    pub fn is_multihit(&self) -> bool {
        matches!(
            self,
            AlignmentMode::Local | AlignmentMode::Glocal | AlignmentMode::Dual
        )
    }

    /// The probability of entering the local path from the B state.
    pub fn local_fraction(&self) -> Option<f32> {
        match self {
            AlignmentMode::NoMode => None,
            AlignmentMode::Local | AlignmentMode::UniLocal => Some(1.0),
            AlignmentMode::Glocal | AlignmentMode::UniGlocal => Some(0.0),
            AlignmentMode::Dual | AlignmentMode::UniDual => Some(0.5),
        }
    }
}

fn try_filled<T: Clone>(
    len: usize,
    value: T,
    table: &'static str,
) -> Result<Vec<T>, ProfileError> {
    let mut vec: Vec<T> = Vec::new();
    vec.try_reserve_exact(len)
        .map_err(|source| ProfileError::Allocation { table, source })?;
    vec.resize(len, value);
    Ok(vec)
}

#[derive(Clone)]
pub struct Profile {
    /// The name of the profile
    pub name: String,
    /// The accession number of the profile
    pub accession: String,
    /// Model length (number of nodes)
    pub length: usize,
    /// The sequence alphabet
    pub alphabet: Alphabet,
    /// The search mode the profile is configured in
    pub mode: AlignmentMode,
    /// Current target sequence length
    pub target_length: usize,
    /// The expected number of times that the J state is used
    pub expected_j_uses: f32,
    /// Transition scores out of nodes 0..M-1; node 0 is an impossible sentinel
    pub transitions: Vec<[f32; Profile::NUM_STATE_TRANSITIONS]>,
    /// Match scores, residue-major: Kp rows of M+1 nodes
    pub match_scores: Vec<f32>,
    /// Insert scores, residue-major: Kp rows of M nodes
    pub insert_scores: Vec<f32>,
    /// Local entry scores L->ML_k, indexed 0..=M
    pub begin_scores: Vec<f32>,
    /// Local exit scores ML_k->E and DL_k->E, indexed 0..=M
    pub end_scores: Vec<f32>,
    /// Wing retracted glocal entry scores G->MG_k, indexed 0..=M
    pub glocal_begin_scores: Vec<f32>,
    /// The implicit probability model's local entry distribution
    pub begin_probabilities: Vec<f32>,
    /// The implicit probability model's local exit probabilities
    pub end_probabilities: Vec<f32>,
    /// Loop and move scores for the special states E, N, J, C
    pub special_transitions: [[f32; 2]; 4],
    /// Loop and move probabilities for the special states E, N, J, C
    pub special_probabilities: [[f32; 2]; 4],
    /// B->L and B->G scores
    pub begin_split_scores: [f32; 2],
    /// B->L and B->G probabilities
    pub begin_split_probabilities: [f32; 2],
    pub do_length_correction: bool,
    pub length_correction: f32,
    /// Set when the profile mimics the legacy single-mode length model
    pub legacy_mode: bool,
    pub hmm: Option<Arc<Hmm>>,
    pub background: Option<Arc<Background>>,
}

impl Profile {
    // special state indices
    pub const NUM_SPECIAL_STATES: usize = 4;
    pub const SPECIAL_E_IDX: usize = 0;
    pub const SPECIAL_N_IDX: usize = 1;
    pub const SPECIAL_J_IDX: usize = 2;
    pub const SPECIAL_C_IDX: usize = 3;

    pub const SPECIAL_STATE_IDX_TO_NAME: [&'static str; 4] = ["E", "N", "J", "C"];

    // special transition indices
    pub const SPECIAL_LOOP_IDX: usize = 0;
    pub const SPECIAL_MOVE_IDX: usize = 1;

    // begin split indices
    pub const SPLIT_LOCAL_IDX: usize = 0;
    pub const SPLIT_GLOCAL_IDX: usize = 1;

    /// The number of stored state transitions per node.
    pub const NUM_STATE_TRANSITIONS: usize = 7;
    pub const MATCH_TO_MATCH_IDX: usize = 0;
    pub const MATCH_TO_INSERT_IDX: usize = 1;
    pub const MATCH_TO_DELETE_IDX: usize = 2;
    pub const INSERT_TO_MATCH_IDX: usize = 3;
    pub const INSERT_TO_INSERT_IDX: usize = 4;
    pub const DELETE_TO_MATCH_IDX: usize = 5;
    pub const DELETE_TO_DELETE_IDX: usize = 6;

    pub const TRANSITION_IDX_TO_NAME: [&'static str; 7] =
        ["MM", "MI", "MD", "IM", "II", "DM", "DD"];

    /// Allocates an unconfigured profile of `length` nodes.
    ///
    /// Scores that are impossible by construction are already set: every
    /// transition out of node 0, the delete transitions out of node 1, node 0
    /// emissions, and gap, non-residue and missing data emissions at every node.
    pub fn new(length: usize, alphabet: Alphabet) -> Result<Self, ProfileError> {
        if length == 0 {
            return Err(ProfileError::EmptyProfile);
        }

        let kp = alphabet.kp();
        let mut profile = Profile {
            name: String::new(),
            accession: String::new(),
            length,
            alphabet,
            mode: AlignmentMode::NoMode,
            target_length: 0,
            expected_j_uses: 0.0,
            transitions: try_filled(length, [0.0; Profile::NUM_STATE_TRANSITIONS], "transition")?,
            match_scores: try_filled(kp * (length + 1), 0.0, "match emission")?,
            insert_scores: try_filled(kp * length, 0.0, "insert emission")?,
            begin_scores: try_filled(length + 1, -f32::INFINITY, "local entry")?,
            end_scores: try_filled(length + 1, -f32::INFINITY, "local exit")?,
            glocal_begin_scores: try_filled(length + 1, -f32::INFINITY, "glocal entry")?,
            begin_probabilities: try_filled(length + 1, 0.0, "entry probability")?,
            end_probabilities: try_filled(length + 1, 0.0, "exit probability")?,
            special_transitions: [[0.0; 2]; 4],
            special_probabilities: [[0.0; 2]; 4],
            begin_split_scores: [0.0; 2],
            begin_split_probabilities: [0.0; 2],
            do_length_correction: false,
            length_correction: 0.0,
            legacy_mode: false,
            hmm: None,
            background: None,
        };

        profile.transitions[0] = [-f32::INFINITY; Profile::NUM_STATE_TRANSITIONS];
        if length > 1 {
            // D1 is never entered, so it never leaves
            profile.transitions[1][Profile::DELETE_TO_MATCH_IDX] = -f32::INFINITY;
            profile.transitions[1][Profile::DELETE_TO_DELETE_IDX] = -f32::INFINITY;
        }

        for residue in 0..kp {
            *profile.match_score_mut(residue, 0) = -f32::INFINITY;
            *profile.insert_score_mut(residue, 0) = -f32::INFINITY;
        }

        for residue in [
            alphabet.gap_idx(),
            alphabet.non_residue_idx(),
            alphabet.missing_data_idx(),
        ] {
            for profile_idx in 0..=length {
                *profile.match_score_mut(residue, profile_idx) = -f32::INFINITY;
            }
            for profile_idx in 0..length {
                *profile.insert_score_mut(residue, profile_idx) = -f32::INFINITY;
            }
        }

        Ok(profile)
    }

    /// Builds a search profile from a core model, a null model, a search mode and a target length.
    pub fn from_hmm(
        hmm: Arc<Hmm>,
        background: Arc<Background>,
        mode: AlignmentMode,
        target_length: usize,
    ) -> Result<Self, ProfileError> {
        let alphabet = hmm.alphabet();
        if alphabet != background.alphabet {
            return Err(ProfileError::AlphabetMismatch {
                model: alphabet,
                background: background.alphabet,
            });
        }
        let local_fraction = mode.local_fraction().ok_or(ProfileError::NoMode)?;

        let mut profile = Profile::new(hmm.length(), alphabet)?;
        profile.name = hmm.header.name.clone();
        profile.accession = hmm.header.accession_number.clone();
        profile.mode = mode;

        let length = profile.length;
        let t = &hmm.model.transition_probabilities;

        // transition scores
        for profile_idx in 1..length {
            let scores = &mut profile.transitions[profile_idx];
            scores[Profile::MATCH_TO_MATCH_IDX] = t[profile_idx][HMM_MATCH_TO_MATCH].ln_or_inf();
            scores[Profile::MATCH_TO_INSERT_IDX] = t[profile_idx][HMM_MATCH_TO_INSERT].ln_or_inf();
            scores[Profile::MATCH_TO_DELETE_IDX] = t[profile_idx][HMM_MATCH_TO_DELETE].ln_or_inf();
            scores[Profile::INSERT_TO_MATCH_IDX] = t[profile_idx][HMM_INSERT_TO_MATCH].ln_or_inf();
            scores[Profile::INSERT_TO_INSERT_IDX] =
                t[profile_idx][HMM_INSERT_TO_INSERT].ln_or_inf();
            if profile_idx > 1 {
                scores[Profile::DELETE_TO_MATCH_IDX] =
                    t[profile_idx][HMM_DELETE_TO_MATCH].ln_or_inf();
                scores[Profile::DELETE_TO_DELETE_IDX] =
                    t[profile_idx][HMM_DELETE_TO_DELETE].ln_or_inf();
            }
        }

        // match scores
        let k = alphabet.k();
        let frequencies = &background.frequencies;
        for profile_idx in 1..=length {
            for residue in 0..k {
                // score is match ln(emission / background)
                *profile.match_score_mut(residue, profile_idx) =
                    (hmm.model.match_probabilities[profile_idx][residue] / frequencies[residue])
                        .ln_or_inf();
            }

            // degenerate residues score as the background weighted expectation of their members
            for residue in (alphabet.gap_idx() + 1)..alphabet.non_residue_idx() {
                let members = alphabet.residues_of(residue as u8);
                let mut result: f32 = 0.0;
                let mut denominator: f32 = 0.0;
                for &member in members {
                    result += profile.match_score(member as usize, profile_idx)
                        * frequencies[member as usize];
                    denominator += frequencies[member as usize];
                }
                *profile.match_score_mut(residue, profile_idx) = result / denominator;
            }
        }

        // insert scores
        for profile_idx in 1..length {
            for residue in 0..alphabet.non_residue_idx() {
                // setting insert scores to 0 corresponds to insertion
                // emissions being equal to background probabilities
                //    ** because ln(P/P) = ln(1) = 0
                if residue != alphabet.gap_idx() {
                    *profile.insert_score_mut(residue, profile_idx) = 0.0;
                }
            }
        }

        // local entry is weighted by match occupancy so that
        // every local fragment k..j is equiprobable a priori
        let match_occupancy = hmm.match_occupancy();
        let z: f32 = (1..=length)
            .map(|profile_idx| match_occupancy[profile_idx] * (length - profile_idx + 1) as f32)
            .sum();

        for profile_idx in 1..=length {
            let begin_probability = match_occupancy[profile_idx] / z;
            profile.begin_probabilities[profile_idx] = begin_probability;
            profile.begin_scores[profile_idx] = begin_probability.ln_or_inf();
            profile.end_probabilities[profile_idx] = 1.0;
            profile.end_scores[profile_idx] = 0.0;
        }

        // glocal entry folds the G->D1->...->D(k-1)->Mk paths into G->Mk
        let to_match = t[0][HMM_MATCH_TO_MATCH];
        let to_delete = t[0][HMM_MATCH_TO_DELETE];
        let entry_total = to_match + to_delete;
        profile.glocal_begin_scores[1] = (to_match / entry_total).ln_or_inf();

        let mut delete_path = (to_delete / entry_total).ln_or_inf();
        for profile_idx in 2..=length {
            profile.glocal_begin_scores[profile_idx] =
                delete_path + t[profile_idx - 1][HMM_DELETE_TO_MATCH].ln_or_inf();
            delete_path += t[profile_idx - 1][HMM_DELETE_TO_DELETE].ln_or_inf();
        }

        let (e_loop, e_move) = if mode.is_multihit() {
            (0.5, 0.5)
        } else {
            (0.0, 1.0)
        };
        profile.set_special(Profile::SPECIAL_E_IDX, e_loop, e_move);
        profile.expected_j_uses = if mode.is_multihit() { 1.0 } else { 0.0 };

        profile.begin_split_probabilities = [local_fraction, 1.0 - local_fraction];
        profile.begin_split_scores = [
            local_fraction.ln_or_inf(),
            (1.0 - local_fraction).ln_or_inf(),
        ];

        profile.configure_for_target_length(target_length);
        profile.hmm = Some(hmm);
        profile.background = Some(background);

        log::debug!(
            "configured profile {} (M={}) in {:?} mode for L={}",
            profile.name,
            profile.length,
            profile.mode,
            target_length
        );

        Ok(profile)
    }

    fn set_special(&mut self, state_idx: usize, loop_probability: f32, move_probability: f32) {
        self.special_probabilities[state_idx] = [loop_probability, move_probability];
        self.special_transitions[state_idx] =
            [loop_probability.ln_or_inf(), move_probability.ln_or_inf()];
    }

    /// Sets the length of the current target sequence to which the profile will be aligned.
    ///
    /// This also adjusts the loop and move transition scores for the special states N, J, C.
    pub fn configure_for_target_length(&mut self, length: usize) {
        self.target_length = length;

        let move_probability: f32 =
            (2.0 + self.expected_j_uses) / (length as f32 + 2.0 + self.expected_j_uses);

        let loop_probability: f32 = 1.0 - move_probability;

        self.set_special(Profile::SPECIAL_N_IDX, loop_probability, move_probability);
        self.set_special(Profile::SPECIAL_J_IDX, loop_probability, move_probability);
        self.set_special(Profile::SPECIAL_C_IDX, loop_probability, move_probability);
    }

    #[inline(always)]
    fn match_score_mut(&mut self, residue: usize, profile_idx: usize) -> &mut f32 {
        &mut self.match_scores[residue * (self.length + 1) + profile_idx]
    }

    #[inline(always)]
    fn insert_score_mut(&mut self, residue: usize, profile_idx: usize) -> &mut f32 {
        &mut self.insert_scores[residue * self.length + profile_idx]
    }

    #[inline(always)]
    pub fn match_score(&self, residue: usize, profile_idx: usize) -> f32 {
        self.match_scores[residue * (self.length + 1) + profile_idx]
    }

    /// There is no insert state at node M.
    #[inline(always)]
    pub fn insert_score(&self, residue: usize, profile_idx: usize) -> f32 {
        debug_assert!(profile_idx < self.length);
        self.insert_scores[residue * self.length + profile_idx]
    }

    /// There are no stored transitions out of node M.
    #[inline(always)]
    pub fn transition_score(&self, transition_idx: usize, profile_idx: usize) -> f32 {
        self.transitions[profile_idx][transition_idx]
    }

    #[inline(always)]
    pub fn begin_score(&self, profile_idx: usize) -> f32 {
        self.begin_scores[profile_idx]
    }

    #[inline(always)]
    pub fn end_score(&self, profile_idx: usize) -> f32 {
        self.end_scores[profile_idx]
    }

    #[inline(always)]
    pub fn glocal_begin_score(&self, profile_idx: usize) -> f32 {
        self.glocal_begin_scores[profile_idx]
    }

    /// Glocal paths can only exit from node M.
    #[inline(always)]
    pub fn glocal_end_score(&self, profile_idx: usize) -> f32 {
        if profile_idx == self.length {
            0.0
        } else {
            -f32::INFINITY
        }
    }

    #[inline(always)]
    pub fn special_transition_score(&self, state_idx: usize, transition_idx: usize) -> f32 {
        self.special_transitions[state_idx][transition_idx]
    }

    #[inline(always)]
    pub fn begin_split_score(&self, split_idx: usize) -> f32 {
        self.begin_split_scores[split_idx]
    }

    fn stored_node(&self, node: usize) -> Result<usize, TransitionError> {
        if node < self.length {
            Ok(node)
        } else {
            Err(TransitionError::NodeOutOfRange {
                node,
                length: self.length,
            })
        }
    }

    fn model_node(&self, node: usize) -> Result<usize, TransitionError> {
        if (1..=self.length).contains(&node) {
            Ok(node)
        } else {
            Err(TransitionError::NodeOutOfRange {
                node,
                length: self.length,
            })
        }
    }

    /// Looks up the score of the transition `state_from`@`idx_from` -> `state_to`@`idx_to`.
    ///
    /// States are the `Trace` state codes. Local and glocal paths never mix.
    pub fn generic_transition_score(
        &self,
        state_from: usize,
        idx_from: usize,
        state_to: usize,
        idx_to: usize,
    ) -> Result<f32, TransitionError> {
        for state in [state_from, state_to] {
            if !Trace::is_valid_state(state) {
                return Err(TransitionError::UnknownState(state));
            }
        }

        let illegal = || TransitionError::IllegalTransition {
            from: Trace::state_name(state_from),
            to: Trace::state_name(state_to),
        };

        let special = |state_idx: usize, transition_idx: usize| -> Result<f32, TransitionError> {
            Ok(self.special_transition_score(state_idx, transition_idx))
        };

        match (state_from, state_to) {
            (Trace::S_STATE, Trace::N_STATE) => Ok(0.0),

            (Trace::N_STATE, Trace::B_STATE) => {
                special(Profile::SPECIAL_N_IDX, Profile::SPECIAL_MOVE_IDX)
            }
            (Trace::N_STATE, Trace::N_STATE) => {
                special(Profile::SPECIAL_N_IDX, Profile::SPECIAL_LOOP_IDX)
            }

            (Trace::B_STATE, Trace::L_STATE) => {
                Ok(self.begin_split_score(Profile::SPLIT_LOCAL_IDX))
            }
            (Trace::B_STATE, Trace::G_STATE) => {
                Ok(self.begin_split_score(Profile::SPLIT_GLOCAL_IDX))
            }

            (Trace::L_STATE, Trace::ML_STATE) => Ok(self.begin_score(self.model_node(idx_to)?)),
            (Trace::G_STATE, Trace::MG_STATE) => {
                Ok(self.glocal_begin_score(self.model_node(idx_to)?))
            }

            (Trace::ML_STATE, Trace::ML_STATE) | (Trace::MG_STATE, Trace::MG_STATE) => Ok(self
                .transition_score(Profile::MATCH_TO_MATCH_IDX, self.stored_node(idx_from)?)),
            (Trace::ML_STATE, Trace::IL_STATE) | (Trace::MG_STATE, Trace::IG_STATE) => Ok(self
                .transition_score(Profile::MATCH_TO_INSERT_IDX, self.stored_node(idx_from)?)),
            (Trace::ML_STATE, Trace::DL_STATE) | (Trace::MG_STATE, Trace::DG_STATE) => Ok(self
                .transition_score(Profile::MATCH_TO_DELETE_IDX, self.stored_node(idx_from)?)),

            (Trace::IL_STATE, Trace::ML_STATE) | (Trace::IG_STATE, Trace::MG_STATE) => Ok(self
                .transition_score(Profile::INSERT_TO_MATCH_IDX, self.stored_node(idx_from)?)),
            (Trace::IL_STATE, Trace::IL_STATE) | (Trace::IG_STATE, Trace::IG_STATE) => Ok(self
                .transition_score(Profile::INSERT_TO_INSERT_IDX, self.stored_node(idx_from)?)),

            (Trace::DL_STATE, Trace::ML_STATE) | (Trace::DG_STATE, Trace::MG_STATE) => Ok(self
                .transition_score(Profile::DELETE_TO_MATCH_IDX, self.stored_node(idx_from)?)),
            (Trace::DL_STATE, Trace::DL_STATE) | (Trace::DG_STATE, Trace::DG_STATE) => Ok(self
                .transition_score(Profile::DELETE_TO_DELETE_IDX, self.stored_node(idx_from)?)),

            (Trace::ML_STATE | Trace::DL_STATE, Trace::E_STATE) => {
                Ok(self.end_score(self.model_node(idx_from)?))
            }
            (Trace::MG_STATE | Trace::DG_STATE, Trace::E_STATE) => {
                Ok(self.glocal_end_score(self.model_node(idx_from)?))
            }

            (Trace::E_STATE, Trace::C_STATE) => {
                special(Profile::SPECIAL_E_IDX, Profile::SPECIAL_MOVE_IDX)
            }
            (Trace::E_STATE, Trace::J_STATE) => {
                special(Profile::SPECIAL_E_IDX, Profile::SPECIAL_LOOP_IDX)
            }

            (Trace::J_STATE, Trace::B_STATE) => {
                special(Profile::SPECIAL_J_IDX, Profile::SPECIAL_MOVE_IDX)
            }
            (Trace::J_STATE, Trace::J_STATE) => {
                special(Profile::SPECIAL_J_IDX, Profile::SPECIAL_LOOP_IDX)
            }

            (Trace::C_STATE, Trace::T_STATE) => {
                special(Profile::SPECIAL_C_IDX, Profile::SPECIAL_MOVE_IDX)
            }
            (Trace::C_STATE, Trace::C_STATE) => {
                special(Profile::SPECIAL_C_IDX, Profile::SPECIAL_LOOP_IDX)
            }

            _ => Err(illegal()),
        }
    }

    /// Checks that the implicit probability model is normalized to within `tolerance`.
    pub fn validate(&self, tolerance: f32) -> bool {
        let length = self.length;

        let begin_sum: f32 = (1..=length)
            .map(|profile_idx| {
                self.begin_probabilities[profile_idx] * (length - profile_idx + 1) as f32
            })
            .sum();

        if (begin_sum - 1.0).abs() > tolerance {
            log::debug!("local entry distribution sums to {begin_sum}");
            return false;
        }

        if let Some(profile_idx) =
            (1..=length).find(|&profile_idx| self.end_probabilities[profile_idx] != 1.0)
        {
            log::debug!("local exit probability at node {profile_idx} is not 1.0");
            return false;
        }

        for state_idx in 0..Profile::NUM_SPECIAL_STATES {
            let [loop_probability, move_probability] = self.special_probabilities[state_idx];
            if (loop_probability + move_probability - 1.0).abs() > tolerance {
                log::debug!(
                    "{} loop and move sum to {}",
                    Profile::SPECIAL_STATE_IDX_TO_NAME[state_idx],
                    loop_probability + move_probability
                );
                return false;
            }
        }

        let split_sum: f32 = self.begin_split_probabilities.iter().sum();
        if (split_sum - 1.0).abs() > tolerance {
            log::debug!("begin split sums to {split_sum}");
            return false;
        }

        true
    }
}

impl fmt::Debug for Profile {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "name: {}", self.name)?;
        writeln!(f, "model length: {}", self.length)?;
        writeln!(f, "target length: {}", self.target_length)?;
        writeln!(f, "mode: {:?}", self.mode)?;

        for (state_idx, name) in Profile::SPECIAL_STATE_IDX_TO_NAME.iter().enumerate() {
            writeln!(
                f,
                "{}: {:8.4} {:8.4}",
                name,
                self.special_transitions[state_idx][Profile::SPECIAL_LOOP_IDX],
                self.special_transitions[state_idx][Profile::SPECIAL_MOVE_IDX]
            )?;
        }
        writeln!(
            f,
            "B: {:8.4} {:8.4}",
            self.begin_split_scores[Profile::SPLIT_LOCAL_IDX],
            self.begin_split_scores[Profile::SPLIT_GLOCAL_IDX]
        )?;

        let kp = self.alphabet.kp();
        for profile_idx in 0..=self.length {
            writeln!(f, "{}", profile_idx)?;
            for &residue in self.alphabet.symbols() {
                write!(f, "    {}    ", residue as char)?;
            }
            writeln!(f)?;

            for _ in 0..kp {
                write!(f, "  ------ ")?;
            }
            writeln!(f)?;

            for residue in 0..kp {
                write!(f, "{:8.4} ", self.match_score(residue, profile_idx))?;
            }
            writeln!(f)?;

            if profile_idx < self.length {
                for residue in 0..kp {
                    write!(f, "{:8.4} ", self.insert_score(residue, profile_idx))?;
                }
                writeln!(f)?;

                for name in Profile::TRANSITION_IDX_TO_NAME {
                    write!(f, "{:>8} ", name)?;
                }
                writeln!(f)?;

                for transition_idx in 0..Profile::NUM_STATE_TRANSITIONS {
                    write!(f, "{:8.4} ", self.transitions[profile_idx][transition_idx])?;
                }
                writeln!(f)?;
            }

            writeln!(
                f,
                "L: {:8.4} G: {:8.4} E: {:8.4}",
                self.begin_scores[profile_idx],
                self.glocal_begin_scores[profile_idx],
                self.end_scores[profile_idx]
            )?;
            writeln!(f)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::structs::Trace;
    use assert2::assert;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    fn sampled_profile(length: usize, mode: AlignmentMode) -> anyhow::Result<Profile> {
        let mut rng = Pcg64::seed_from_u64(11);
        let hmm = Arc::new(Hmm::sample(length, Alphabet::Amino, &mut rng)?);
        let background = Arc::new(Background::new(Alphabet::Amino));
        Ok(Profile::from_hmm(hmm, background, mode, 100)?)
    }

    #[test]
    fn test_new_sets_impossible_scores() -> anyhow::Result<()> {
        let profile = Profile::new(5, Alphabet::Dna)?;
        let alphabet = profile.alphabet;

        assert!(profile.transitions[0].iter().all(|&t| t == -f32::INFINITY));
        assert!(profile.transition_score(Profile::DELETE_TO_MATCH_IDX, 1) == -f32::INFINITY);
        assert!(profile.transition_score(Profile::DELETE_TO_DELETE_IDX, 1) == -f32::INFINITY);

        for residue in 0..alphabet.kp() {
            assert!(profile.match_score(residue, 0) == -f32::INFINITY);
            assert!(profile.insert_score(residue, 0) == -f32::INFINITY);
        }

        for profile_idx in 1..=5 {
            assert!(profile.match_score(alphabet.gap_idx(), profile_idx) == -f32::INFINITY);
            assert!(
                profile.match_score(alphabet.missing_data_idx(), profile_idx) == -f32::INFINITY
            );
        }

        assert!(profile.mode == AlignmentMode::NoMode);
        assert!(!profile.legacy_mode);
        assert!(profile.hmm.is_none());
        Ok(())
    }

    #[test]
    fn test_new_empty() {
        assert!(Profile::new(0, Alphabet::Amino).is_err());
    }

    #[test]
    fn test_configured_profile_validates() -> anyhow::Result<()> {
        for mode in [
            AlignmentMode::Local,
            AlignmentMode::Glocal,
            AlignmentMode::Dual,
            AlignmentMode::UniLocal,
            AlignmentMode::UniGlocal,
            AlignmentMode::UniDual,
        ] {
            let profile = sampled_profile(40, mode)?;
            assert!(profile.validate(1e-4), "mode: {:?}", mode);
        }
        Ok(())
    }

    #[test]
    fn test_unconfigured_profile_fails_validation() -> anyhow::Result<()> {
        let profile = Profile::new(10, Alphabet::Amino)?;
        assert!(!profile.validate(1e-4));
        Ok(())
    }

    #[test]
    fn test_perturbed_profile_fails_validation() -> anyhow::Result<()> {
        let mut profile = sampled_profile(10, AlignmentMode::Dual)?;
        profile.end_probabilities[3] = 0.99;
        assert!(!profile.validate(1e-2));

        let mut profile = sampled_profile(10, AlignmentMode::Dual)?;
        profile.special_probabilities[Profile::SPECIAL_C_IDX][Profile::SPECIAL_LOOP_IDX] += 0.1;
        assert!(!profile.validate(1e-2));

        let mut profile = sampled_profile(10, AlignmentMode::Dual)?;
        profile.begin_probabilities[1] += 0.5;
        assert!(!profile.validate(1e-2));
        Ok(())
    }

    #[test]
    fn test_configure_for_target_length() -> anyhow::Result<()> {
        let mut profile = sampled_profile(10, AlignmentMode::Dual)?;
        profile.configure_for_target_length(398);

        // multihit: move = (2 + 1) / (398 + 2 + 1)
        let move_probability: f32 = 3.0 / 401.0;
        let n_move =
            profile.special_transition_score(Profile::SPECIAL_N_IDX, Profile::SPECIAL_MOVE_IDX);
        let c_loop =
            profile.special_transition_score(Profile::SPECIAL_C_IDX, Profile::SPECIAL_LOOP_IDX);
        assert!((n_move - move_probability.ln()).abs() < 1e-6);
        assert!((c_loop - (1.0 - move_probability).ln()).abs() < 1e-6);
        assert!(profile.target_length == 398);
        Ok(())
    }

    #[test]
    fn test_unihit_forbids_j() -> anyhow::Result<()> {
        let profile = sampled_profile(10, AlignmentMode::UniDual)?;
        assert!(
            profile.special_transition_score(Profile::SPECIAL_E_IDX, Profile::SPECIAL_LOOP_IDX)
                == -f32::INFINITY
        );
        assert!(
            profile.special_transition_score(Profile::SPECIAL_E_IDX, Profile::SPECIAL_MOVE_IDX)
                == 0.0
        );
        Ok(())
    }

    #[test]
    fn test_glocal_entry_is_normalized_with_deletes() -> anyhow::Result<()> {
        let profile = sampled_profile(6, AlignmentMode::Glocal)?;
        let hmm = profile.hmm.clone().ok_or(anyhow::anyhow!("no model"))?;
        let t = &hmm.model.transition_probabilities;

        // G->M1 + G->D1->...->M_k + G->D1->...->D_M = 1
        let entry: f32 = (1..=6).map(|k| profile.glocal_begin_score(k).exp()).sum();
        let d1 = t[0][HMM_MATCH_TO_DELETE] / (t[0][HMM_MATCH_TO_MATCH] + t[0][HMM_MATCH_TO_DELETE]);
        let all_deletes: f32 = d1 * (1..6).map(|k| t[k][HMM_DELETE_TO_DELETE]).product::<f32>();
        assert!((entry + all_deletes - 1.0).abs() < 1e-4);
        Ok(())
    }

    #[test]
    fn test_transition_lookup() -> anyhow::Result<()> {
        let profile = sampled_profile(8, AlignmentMode::Dual)?;

        assert!(profile.generic_transition_score(Trace::S_STATE, 0, Trace::N_STATE, 0) == Ok(0.0));
        assert!(
            profile.generic_transition_score(Trace::ML_STATE, 3, Trace::ML_STATE, 4)
                == Ok(profile.transition_score(Profile::MATCH_TO_MATCH_IDX, 3))
        );
        assert!(
            profile.generic_transition_score(Trace::L_STATE, 0, Trace::ML_STATE, 5)
                == Ok(profile.begin_score(5))
        );
        assert!(
            profile.generic_transition_score(Trace::G_STATE, 0, Trace::MG_STATE, 2)
                == Ok(profile.glocal_begin_score(2))
        );
        assert!(
            profile.generic_transition_score(Trace::B_STATE, 0, Trace::G_STATE, 0)
                == Ok(0.5f32.ln())
        );
        assert!(profile.generic_transition_score(Trace::MG_STATE, 8, Trace::E_STATE, 0) == Ok(0.0));
        assert!(
            profile.generic_transition_score(Trace::MG_STATE, 7, Trace::E_STATE, 0)
                == Ok(-f32::INFINITY)
        );
        assert!(profile.generic_transition_score(Trace::DL_STATE, 4, Trace::E_STATE, 0) == Ok(0.0));
        Ok(())
    }

    /// The node transitions as (from, to, stored index), local then glocal.
    fn node_transitions() -> Vec<(usize, usize, usize)> {
        [0, 1]
            .into_iter()
            .flat_map(|offset| {
                let m = Trace::ML_STATE + offset;
                let i = Trace::IL_STATE + offset;
                let d = Trace::DL_STATE + offset;
                [
                    (m, m, Profile::MATCH_TO_MATCH_IDX),
                    (m, i, Profile::MATCH_TO_INSERT_IDX),
                    (m, d, Profile::MATCH_TO_DELETE_IDX),
                    (i, m, Profile::INSERT_TO_MATCH_IDX),
                    (i, i, Profile::INSERT_TO_INSERT_IDX),
                    (d, m, Profile::DELETE_TO_MATCH_IDX),
                    (d, d, Profile::DELETE_TO_DELETE_IDX),
                ]
            })
            .collect()
    }

    /// Every other legal pair with the score it should have at `node`.
    fn other_transitions(profile: &Profile, node: usize) -> Vec<(usize, usize, f32)> {
        let loops =
            |state_idx| profile.special_transition_score(state_idx, Profile::SPECIAL_LOOP_IDX);
        let moves =
            |state_idx| profile.special_transition_score(state_idx, Profile::SPECIAL_MOVE_IDX);

        vec![
            (Trace::S_STATE, Trace::N_STATE, 0.0),
            (Trace::N_STATE, Trace::N_STATE, loops(Profile::SPECIAL_N_IDX)),
            (Trace::N_STATE, Trace::B_STATE, moves(Profile::SPECIAL_N_IDX)),
            (Trace::B_STATE, Trace::L_STATE, profile.begin_split_score(Profile::SPLIT_LOCAL_IDX)),
            (Trace::B_STATE, Trace::G_STATE, profile.begin_split_score(Profile::SPLIT_GLOCAL_IDX)),
            (Trace::L_STATE, Trace::ML_STATE, profile.begin_score(node)),
            (Trace::G_STATE, Trace::MG_STATE, profile.glocal_begin_score(node)),
            (Trace::ML_STATE, Trace::E_STATE, profile.end_score(node)),
            (Trace::DL_STATE, Trace::E_STATE, profile.end_score(node)),
            (Trace::MG_STATE, Trace::E_STATE, profile.glocal_end_score(node)),
            (Trace::DG_STATE, Trace::E_STATE, profile.glocal_end_score(node)),
            (Trace::E_STATE, Trace::C_STATE, moves(Profile::SPECIAL_E_IDX)),
            (Trace::E_STATE, Trace::J_STATE, loops(Profile::SPECIAL_E_IDX)),
            (Trace::J_STATE, Trace::J_STATE, loops(Profile::SPECIAL_J_IDX)),
            (Trace::J_STATE, Trace::B_STATE, moves(Profile::SPECIAL_J_IDX)),
            (Trace::C_STATE, Trace::C_STATE, loops(Profile::SPECIAL_C_IDX)),
            (Trace::C_STATE, Trace::T_STATE, moves(Profile::SPECIAL_C_IDX)),
        ]
    }

    #[test]
    fn test_transition_lookup_covers_every_state_pair() -> anyhow::Result<()> {
        let profile = sampled_profile(8, AlignmentMode::Dual)?;
        let node_pairs = node_transitions();

        for node in [1, 2, 5, 7, 8] {
            let other_pairs = other_transitions(&profile, node);

            for state_from in Trace::INVALID_STATE..=Trace::T_STATE + 1 {
                for state_to in Trace::INVALID_STATE..=Trace::T_STATE + 1 {
                    let result = profile.generic_transition_score(state_from, node, state_to, node);
                    let context = format!(
                        "{} -> {} at node {node}",
                        Trace::state_name(state_from),
                        Trace::state_name(state_to)
                    );

                    let node_pair = node_pairs
                        .iter()
                        .find(|&&(from, to, _)| from == state_from && to == state_to);
                    let other_pair = other_pairs
                        .iter()
                        .find(|&&(from, to, _)| from == state_from && to == state_to);

                    if !Trace::is_valid_state(state_from) {
                        let expected = Err(TransitionError::UnknownState(state_from));
                        assert!(result == expected, "{context}");
                    } else if !Trace::is_valid_state(state_to) {
                        let expected = Err(TransitionError::UnknownState(state_to));
                        assert!(result == expected, "{context}");
                    } else if let Some(&(_, _, transition_idx)) = node_pair {
                        if node < profile.length {
                            let expected = Ok(profile.transition_score(transition_idx, node));
                            assert!(result == expected, "{context}");
                        } else {
                            let expected = Err(TransitionError::NodeOutOfRange { node, length: 8 });
                            assert!(result == expected, "{context}");
                        }
                    } else if let Some(&(_, _, score)) = other_pair {
                        assert!(result == Ok(score), "{context}");
                    } else {
                        assert!(
                            let Err(TransitionError::IllegalTransition { .. }) = result,
                            "{context}"
                        );
                    }
                }
            }
        }

        // the glocal exit is free at node M and impossible before it
        for state_from in [Trace::MG_STATE, Trace::DG_STATE] {
            assert!(profile.generic_transition_score(state_from, 8, Trace::E_STATE, 0) == Ok(0.0));
            assert!(
                profile.generic_transition_score(state_from, 3, Trace::E_STATE, 0)
                    == Ok(-f32::INFINITY)
            );
        }
        Ok(())
    }

    #[test]
    fn test_transition_lookup_errors() -> anyhow::Result<()> {
        let profile = sampled_profile(8, AlignmentMode::Dual)?;

        assert!(let Err(TransitionError::IllegalTransition { .. }) =
            profile.generic_transition_score(Trace::ML_STATE, 3, Trace::MG_STATE, 4));
        assert!(let Err(TransitionError::IllegalTransition { .. }) =
            profile.generic_transition_score(Trace::N_STATE, 0, Trace::C_STATE, 0));
        assert!(let Err(TransitionError::IllegalTransition { .. }) =
            profile.generic_transition_score(Trace::IL_STATE, 3, Trace::DL_STATE, 4));
        assert!(let Err(TransitionError::UnknownState(99)) =
            profile.generic_transition_score(99, 0, Trace::N_STATE, 0));
        assert!(let Err(TransitionError::NodeOutOfRange { node: 8, .. }) =
            profile.generic_transition_score(Trace::ML_STATE, 8, Trace::ML_STATE, 9));

        // the neutral score for an invalid pair
        let score = profile
            .generic_transition_score(Trace::T_STATE, 0, Trace::S_STATE, 0)
            .unwrap_or_default();
        assert!(score == 0.0);
        Ok(())
    }

    #[test]
    fn test_debug_lists_transition_names() -> anyhow::Result<()> {
        let profile = sampled_profile(3, AlignmentMode::Dual)?;
        let text = format!("{:?}", profile);

        assert!(text.contains("model length: 3"));
        for name in Profile::TRANSITION_IDX_TO_NAME {
            assert!(text.contains(name));
        }
        Ok(())
    }

    #[test]
    fn test_degenerate_scores_are_expectations() -> anyhow::Result<()> {
        let profile = sampled_profile(4, AlignmentMode::Local)?;
        let alphabet = profile.alphabet;
        let background = profile.background.clone().ok_or(anyhow::anyhow!("no background"))?;

        let b = alphabet.digitize(b'B')? as usize;
        let d = alphabet.digitize(b'D')? as usize;
        let n = alphabet.digitize(b'N')? as usize;

        let f = &background.frequencies;
        let expected = (profile.match_score(d, 2) * f[d] + profile.match_score(n, 2) * f[n])
            / (f[d] + f[n]);
        assert!((profile.match_score(b, 2) - expected).abs() < 1e-6);
        Ok(())
    }
}
