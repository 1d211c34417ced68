use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use rayon::prelude::*;

use crate::align::structs::{DpMatrix, Trace};
use crate::align::{backward, decoding, forward, optimal_accuracy, viterbi, Bits, DpError, Nats};
use crate::config::AlignmentConfig;
use crate::structs::{Background, Hmm, Profile, Sequence};

/// Configures a profile from a model in the mode and length model given by `config`.
pub fn build_profile(
    hmm: Arc<Hmm>,
    background: Arc<Background>,
    config: &AlignmentConfig,
) -> anyhow::Result<Profile> {
    let name = hmm.header.name.clone();
    let profile = Profile::from_hmm(hmm, background, config.mode, config.target_length)
        .with_context(|| format!("failed to configure profile {name}"))?;

    if !profile.validate(config.validation_tolerance) {
        anyhow::bail!("profile {name} failed validation");
    }

    Ok(profile)
}

#[derive(Clone, Debug, Default)]
pub struct AlignmentTimes {
    pub forward: Duration,
    pub backward: Duration,
    pub decoding: Duration,
    pub viterbi: Duration,
    pub optimal_accuracy: Duration,
}

/// Everything the engine chain produces for one (profile, target) pair.
#[derive(Clone, Debug)]
pub struct AlignmentResult {
    pub profile_name: String,
    pub target_name: String,
    pub forward_score: Nats,
    pub backward_score: Nats,
    pub viterbi_score: Nats,
    /// The score of the target under the null model
    pub null_score: Nats,
    pub viterbi_trace: Trace,
    pub alignment_trace: Trace,
    /// The expected accuracy gain of the optimal accuracy alignment
    pub gain: f32,
    pub times: AlignmentTimes,
}

impl AlignmentResult {
    /// The Forward score relative to the null model.
    pub fn bit_score(&self) -> Bits {
        (self.forward_score - self.null_score).to_bits()
    }
}

/// A reusable set of DP matrices.
///
/// Matrices are grown as needed and never shrunk, so one workspace can be
/// used for many alignments.
#[derive(Default)]
pub struct Workspace {
    pub forward: DpMatrix,
    pub backward: DpMatrix,
    pub decoding: DpMatrix,
    pub alignment: DpMatrix,
    pub viterbi: DpMatrix,
}

impl Workspace {
    /// The number of bytes held by the workspace's matrices.
    pub fn size_of(&self) -> usize {
        self.forward.size_of()
            + self.backward.size_of()
            + self.decoding.size_of()
            + self.alignment.size_of()
            + self.viterbi.size_of()
    }

    /// Runs Forward, Backward, Decoding, Viterbi and optimal accuracy alignment.
    ///
    /// The profile's length model should already be configured for the target.
    pub fn align(
        &mut self,
        profile: &Profile,
        target: &Sequence,
        config: &AlignmentConfig,
    ) -> anyhow::Result<AlignmentResult> {
        let mut times = AlignmentTimes::default();

        let now = Instant::now();
        let forward_score = forward(profile, target, &mut self.forward)
            .with_context(|| format!("forward failed on {}", target.name))?;
        times.forward = now.elapsed();

        if forward_score.is_impossible() {
            return Err(DpError::ImpossibleSequence)
                .with_context(|| format!("{} cannot be aligned to {}", target.name, profile.name));
        }

        let now = Instant::now();
        let backward_score = backward(profile, target, &mut self.backward)
            .with_context(|| format!("backward failed on {}", target.name))?;
        times.backward = now.elapsed();

        let now = Instant::now();
        decoding(
            profile,
            &self.forward,
            &self.backward,
            &mut self.decoding,
            config.mass_tolerance,
        )
        .with_context(|| format!("decoding failed on {}", target.name))?;
        times.decoding = now.elapsed();

        let now = Instant::now();
        let mut viterbi_trace = Trace::default();
        let viterbi_score = viterbi(profile, target, &mut self.viterbi, Some(&mut viterbi_trace))
            .with_context(|| format!("viterbi failed on {}", target.name))?;
        times.viterbi = now.elapsed();

        let now = Instant::now();
        let mut alignment_trace = Trace::default();
        let gain = optimal_accuracy(
            profile,
            &self.decoding,
            &mut self.alignment,
            config.gamma,
            &mut alignment_trace,
        )
        .with_context(|| format!("optimal accuracy alignment failed on {}", target.name))?;
        times.optimal_accuracy = now.elapsed();

        let null_score = match profile.background.as_deref() {
            Some(background) => {
                let mut null_model = background.clone();
                null_model.set_length(target.length);
                null_model.null_score(target.length)
            }
            None => Nats(0.0),
        };

        log::debug!(
            "{} x {}: forward {:.3} backward {:.3} viterbi {:.3} gain {:.3}",
            profile.name,
            target.name,
            forward_score.value(),
            backward_score.value(),
            viterbi_score.value(),
            gain
        );

        Ok(AlignmentResult {
            profile_name: profile.name.clone(),
            target_name: target.name.clone(),
            forward_score,
            backward_score,
            viterbi_score,
            null_score,
            viterbi_trace,
            alignment_trace,
            gain,
            times,
        })
    }
}

/// Aligns `profile` to every target in parallel.
///
/// Each worker thread owns a workspace and a private copy of the profile whose
/// length model is reset for every target. Results are in target order.
pub fn align_all(
    profile: &Profile,
    targets: &[Sequence],
    config: &AlignmentConfig,
) -> Vec<anyhow::Result<AlignmentResult>> {
    targets
        .par_iter()
        .map_init(
            || (Workspace::default(), profile.clone()),
            |(workspace, profile), target| {
                profile.configure_for_target_length(target.length);
                workspace.align(profile, target, config)
            },
        )
        .collect()
}
