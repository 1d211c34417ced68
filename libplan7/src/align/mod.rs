pub mod structs;

use thiserror::Error;

use crate::alphabet::Alphabet;
use structs::{MatrixError, MatrixKind};

mod forward;
pub use forward::forward;

mod backward;
pub use backward::backward;

mod decoding;
pub use decoding::decoding;

mod viterbi;
pub use viterbi::viterbi;

mod optimal_accuracy;
pub use optimal_accuracy::optimal_accuracy;

mod scoring;
pub use scoring::{Bits, Nats};

mod traceback;
pub use traceback::{traceback, AccuracyPaths, PathScorer, ViterbiPaths};

#[derive(Error, Debug)]
pub enum DpError {
    #[error(transparent)]
    Matrix(#[from] MatrixError),
    #[error("expected a {expected} matrix, found a {found} matrix")]
    WrongMatrixKind {
        expected: MatrixKind,
        found: MatrixKind,
    },
    #[error(
        "matrix is laid out for M={found_profile}, L={found_target}; \
         expected M={profile_length}, L={target_length}"
    )]
    DimensionMismatch {
        profile_length: usize,
        target_length: usize,
        found_profile: usize,
        found_target: usize,
    },
    #[error("profile alphabet {profile:?} does not match target alphabet {target:?}")]
    AlphabetMismatch { profile: Alphabet, target: Alphabet },
    #[error("the target has no possible path through the profile")]
    ImpossibleSequence,
    #[error("traceback found no predecessor for {state} at row {row}, node {node}")]
    NoPredecessor {
        state: &'static str,
        row: usize,
        node: usize,
    },
    #[error("decoded row {row} has probability mass {mass}, outside tolerance {tolerance}")]
    MassMismatch {
        row: usize,
        mass: f32,
        tolerance: f32,
    },
}

/// Checks that a finished matrix is of `kind` and holds an (M, L) problem.
pub(crate) fn check_matrix(
    matrix: &structs::DpMatrix,
    kind: MatrixKind,
    profile_length: usize,
    target_length: usize,
) -> Result<(), DpError> {
    if matrix.kind != kind {
        return Err(DpError::WrongMatrixKind {
            expected: kind,
            found: matrix.kind,
        });
    }

    if matrix.profile_length != profile_length || matrix.target_length != target_length {
        return Err(DpError::DimensionMismatch {
            profile_length,
            target_length,
            found_profile: matrix.profile_length,
            found_target: matrix.target_length,
        });
    }

    Ok(())
}

pub(crate) fn check_alphabet(
    profile: &crate::structs::Profile,
    target: &crate::structs::Sequence,
) -> Result<(), DpError> {
    if profile.alphabet != target.alphabet {
        Err(DpError::AlphabetMismatch {
            profile: profile.alphabet,
            target: target.alphabet,
        })
    } else {
        Ok(())
    }
}
