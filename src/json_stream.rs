//! Decoding of response bodies made of consecutive JSON documents
//!
//! Streaming endpoints such as image pull or push answer with one JSON
//! object per event, separated by nothing or by whitespace. Documents are
//! decoded one at a time straight from the reader, so each event is handed
//! over as soon as its closing brace arrives.

use serde::de::DeserializeOwned;
use std::io::{BufReader, Read};

use crate::error::Result;

/// Lazily decode every JSON document in `reader`
pub fn iter<T, R>(reader: R) -> impl Iterator<Item = Result<T>>
where
    T: DeserializeOwned,
    R: Read,
{
    serde_json::Deserializer::from_reader(BufReader::new(reader))
        .into_iter::<T>()
        .map(|item| item.map_err(Into::into))
}

/// Decode every JSON document in `reader`, passing each to `consumer` in
/// arrival order. Stops at the first malformed document or consumer error.
pub fn read_all<T, R, F>(reader: R, mut consumer: F) -> Result<()>
where
    T: DeserializeOwned,
    R: Read,
    F: FnMut(T) -> Result<()>,
{
    let mut count = 0usize;
    for item in iter::<T, R>(reader) {
        consumer(item?)?;
        count += 1;
    }
    tracing::trace!(count, "Decoded JSON stream");
    Ok(())
}
