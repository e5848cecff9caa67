use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::domain::{errors::ReplayError, models::ObjectChange};

/// Read a change log written by [`FileChangeLog`] (or any compatible
/// producer) into memory. The whole array is deserialized at once.
///
/// [`FileChangeLog`]: super::FileChangeLog
pub fn read_change_log(path: &Path) -> Result<Vec<ObjectChange>, ReplayError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader).map_err(|err| ReplayError::LogMalformed(err.to_string()))
}
