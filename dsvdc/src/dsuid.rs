//! dSUID helpers

use rand::RngCore;

use crate::config::DSUID_LENGTH;
use crate::error::*;

/// A random dSUID: 17 random bytes in upper case hex.
pub fn random_dsuid() -> String {
    let mut bytes = [0u8; DSUID_LENGTH];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode_upper(bytes)
}

/// Check that `dsuid` is 34 hex digits and return it in upper case.
pub fn parse_dsuid(dsuid: &str) -> Result<String> {
    let bytes = hex::decode(dsuid)
        .map_err(|e| Error::with_source(ErrorKind::Param(format!("dsuid '{}'", dsuid)), e))?;
    if bytes.len() != DSUID_LENGTH {
        return Err(ErrorKind::Param(format!(
            "dsuid '{}' has {} bytes, expected {}",
            dsuid,
            bytes.len(),
            DSUID_LENGTH
        ))
        .into());
    }
    Ok(hex::encode_upper(bytes))
}
