//! Sends configured profiles across a byte stream and rebuilds them on the other side.
//!
//! A profile is written as a fixed sequence of bincode frames, one per field.
//! The first frame is the model length; a length of -1 marks the end of the
//! data. The receiver supplies the alphabet and the background model, which
//! are not sent.

use std::io::{Read, Write};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::alphabet::Alphabet;
use crate::structs::profile::ProfileError;
use crate::structs::{AlignmentMode, Background, Profile};

/// The length frame that marks the end of the data.
pub const END_OF_DATA: i64 = -1;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Bincode(#[from] bincode::Error),
    #[error(transparent)]
    Profile(#[from] ProfileError),
    #[error("received a model length of {0}")]
    BadLength(i64),
    #[error("received {found} values for {field}, expected {expected}")]
    SizeMismatch {
        field: &'static str,
        expected: usize,
        found: usize,
    },
}

fn send<T: Serialize + ?Sized>(writer: &mut impl Write, value: &T) -> Result<(), DispatchError> {
    bincode::serialize_into(writer, value)?;
    Ok(())
}

fn recv<T: DeserializeOwned>(reader: &mut impl Read) -> Result<T, DispatchError> {
    Ok(bincode::deserialize_from(reader)?)
}

fn recv_vec(
    reader: &mut impl Read,
    field: &'static str,
    expected: usize,
) -> Result<Vec<f32>, DispatchError> {
    let values: Vec<f32> = recv(reader)?;
    if values.len() != expected {
        return Err(DispatchError::SizeMismatch {
            field,
            expected,
            found: values.len(),
        });
    }
    Ok(values)
}

/// Writes every field of `profile` to `writer`.
pub fn send_profile(writer: &mut impl Write, profile: &Profile) -> Result<(), DispatchError> {
    send(writer, &(profile.length as i64))?;
    send(writer, &profile.mode)?;
    send(writer, &profile.transitions)?;
    send(writer, &profile.match_scores)?;
    send(writer, &profile.insert_scores)?;
    for row in profile.special_transitions.iter() {
        send(writer, row)?;
    }
    send(writer, &profile.begin_scores)?;
    send(writer, &profile.end_scores)?;
    for row in profile.special_probabilities.iter() {
        send(writer, row)?;
    }
    send(writer, &profile.begin_probabilities)?;
    send(writer, &profile.end_probabilities)?;
    send(writer, &profile.do_length_correction)?;
    send(writer, &profile.length_correction)?;
    send(writer, &profile.legacy_mode)?;
    send(writer, &profile.glocal_begin_scores)?;
    send(writer, &profile.begin_split_scores)?;
    send(writer, &profile.begin_split_probabilities)?;
    send(writer, &(profile.target_length as u64))?;

    log::trace!("sent profile {} (M={})", profile.name, profile.length);
    Ok(())
}

/// Tells the receiver that no more profiles follow.
pub fn send_end_of_data(writer: &mut impl Write) -> Result<(), DispatchError> {
    send(writer, &END_OF_DATA)
}

/// Reads one profile from `reader`, or `None` at the end of the data.
pub fn recv_profile(
    reader: &mut impl Read,
    alphabet: Alphabet,
    background: Arc<Background>,
) -> Result<Option<Profile>, DispatchError> {
    let length: i64 = recv(reader)?;
    if length == END_OF_DATA {
        return Ok(None);
    }
    if length <= 0 {
        return Err(DispatchError::BadLength(length));
    }

    let length = length as usize;
    let kp = alphabet.kp();
    let mut profile = Profile::new(length, alphabet)?;

    profile.mode = recv::<AlignmentMode>(reader)?;

    let transitions: Vec<[f32; Profile::NUM_STATE_TRANSITIONS]> = recv(reader)?;
    if transitions.len() != length {
        return Err(DispatchError::SizeMismatch {
            field: "transitions",
            expected: length,
            found: transitions.len(),
        });
    }
    profile.transitions = transitions;

    profile.match_scores = recv_vec(reader, "match scores", kp * (length + 1))?;
    profile.insert_scores = recv_vec(reader, "insert scores", kp * length)?;
    for row in profile.special_transitions.iter_mut() {
        *row = recv(reader)?;
    }
    profile.begin_scores = recv_vec(reader, "local entry scores", length + 1)?;
    profile.end_scores = recv_vec(reader, "local exit scores", length + 1)?;
    for row in profile.special_probabilities.iter_mut() {
        *row = recv(reader)?;
    }
    profile.begin_probabilities = recv_vec(reader, "entry probabilities", length + 1)?;
    profile.end_probabilities = recv_vec(reader, "exit probabilities", length + 1)?;
    profile.do_length_correction = recv(reader)?;
    profile.length_correction = recv(reader)?;
    profile.legacy_mode = recv(reader)?;
    profile.glocal_begin_scores = recv_vec(reader, "glocal entry scores", length + 1)?;
    profile.begin_split_scores = recv(reader)?;
    profile.begin_split_probabilities = recv(reader)?;
    profile.target_length = recv::<u64>(reader)? as usize;

    profile.expected_j_uses = if profile.mode.is_multihit() { 1.0 } else { 0.0 };
    profile.background = Some(background);

    log::trace!("received profile (M={})", profile.length);
    Ok(Some(profile))
}

/// Reads profiles until the end of the data, handing each one to `handle`.
///
/// Returns the number of profiles received.
pub fn serve<R, F>(
    reader: &mut R,
    alphabet: Alphabet,
    background: Arc<Background>,
    mut handle: F,
) -> anyhow::Result<usize>
where
    R: Read,
    F: FnMut(Profile) -> anyhow::Result<()>,
{
    let mut count = 0;
    while let Some(profile) = recv_profile(reader, alphabet, background.clone())? {
        handle(profile)?;
        count += 1;
    }
    log::debug!("received {count} profiles");
    Ok(count)
}
