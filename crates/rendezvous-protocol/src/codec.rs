//! Frame-level checks for inbound transport frames.
//!
//! The relay forwards frames verbatim, so decoding here never re-encodes:
//! it only validates size and encoding and hands back the original text.

use thiserror::Error;

/// Default maximum frame size (64 KiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

/// Protocol errors that can occur while decoding an inbound frame.
///
/// None of these are reported to clients; the offending frame is dropped.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds the configured maximum size.
    #[error("Frame size {size} exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },

    /// Frame is not valid UTF-8.
    #[error("Frame is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// JSON decoding error.
    #[error("Decoding error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Top-level JSON value is not an object.
    #[error("Message is not a JSON object")]
    NotAnObject,

    /// The `from` field is missing, empty, or not a string.
    #[error("Missing sender identity")]
    MissingFrom,

    /// A routing field has a shape the relay cannot interpret.
    #[error("Invalid field: {0}")]
    InvalidField(&'static str),
}

/// Check a frame against the size limit.
///
/// # Errors
///
/// Returns [`ProtocolError::FrameTooLarge`] if `len` exceeds `max_size`.
pub fn check_size(len: usize, max_size: usize) -> Result<(), ProtocolError> {
    if len > max_size {
        return Err(ProtocolError::FrameTooLarge {
            size: len,
            max: max_size,
        });
    }
    Ok(())
}

/// Validate a raw frame and return it as text.
///
/// Binary frames are accepted as long as they carry UTF-8; they are relayed
/// onward as text.
///
/// # Errors
///
/// Returns an error if the frame is too large or not UTF-8.
pub fn decode_text(data: &[u8], max_size: usize) -> Result<&str, ProtocolError> {
    check_size(data.len(), max_size)?;
    Ok(std::str::from_utf8(data)?)
}
