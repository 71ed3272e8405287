//! Short human-typable codes that identify a waiting streamer.
//!
//! A streamer receives its code in an `ID` frame and reads it out to the
//! viewer, who types it into a `FIND_STREAMER` request. Codes are drawn from
//! an alphanumeric alphabet so they survive being dictated or copy-pasted.

use rand::Rng;

/// Number of characters in a session code.
pub const SESSION_CODE_LENGTH: usize = 10;

/// Characters a session code may contain.
pub const SESSION_CODE_ALPHABET: &[u8] =
    b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Draws a fresh code of [`SESSION_CODE_LENGTH`] characters from `rng`.
///
/// Uniqueness is not guaranteed here; the registry retries on collision.
pub fn generate_session_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..SESSION_CODE_LENGTH)
        .map(|_| {
            let index = rng.random_range(0..SESSION_CODE_ALPHABET.len());
            char::from(SESSION_CODE_ALPHABET[index])
        })
        .collect()
}

/// Returns `true` if `code` has the shape of a generated session code.
pub fn is_well_formed_session_code(code: &str) -> bool {
    code.len() == SESSION_CODE_LENGTH
        && code.bytes().all(|b| SESSION_CODE_ALPHABET.contains(&b))
}
