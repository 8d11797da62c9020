//! Container and entry name validation.

use crate::error::{StoreError, StoreResult};

/// Longest accepted container or entry name, in bytes.
pub const MAX_NAME_LEN: usize = 32 * 1024;

/// Validate a container or entry name.
///
/// Names are opaque bytes. The only rules are that a name is non-empty and
/// no longer than [`MAX_NAME_LEN`].
pub fn validate_name(name: &[u8]) -> StoreResult<()> {
    if name.is_empty() {
        return Err(StoreError::InvalidName("name must not be empty".into()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(StoreError::InvalidName(format!(
            "name is {} bytes, limit is {MAX_NAME_LEN}",
            name.len()
        )));
    }
    Ok(())
}
