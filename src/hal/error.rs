use thiserror::Error;

/// Errors raised by a protocol codec
#[derive(Debug, Error)]
pub enum CodecError {
    /// The request cannot be expressed on the wire
    #[error("Cannot encode {request}: {message}")]
    Encode { request: String, message: String },

    /// The frame could not be decoded
    #[error("Malformed frame ({len} bytes): {message}")]
    Malformed { len: usize, message: String },
}
