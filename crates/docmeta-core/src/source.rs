use std::io;

use thiserror::Error;

use crate::record::InputRecord;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to read {origin}: {source}")]
    Io {
        origin: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid input {origin}: {message}")]
    Invalid { origin: String, message: String },
}

/// Input partition handed to one worker. Records come out in partition order.
pub trait RecordSource {
    fn next_record(&mut self) -> Option<Result<InputRecord, SourceError>>;
}

impl<I> RecordSource for I
where
    I: Iterator<Item = Result<InputRecord, SourceError>>,
{
    fn next_record(&mut self) -> Option<Result<InputRecord, SourceError>> {
        self.next()
    }
}
