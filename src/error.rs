//! Error taxonomy for the model builder, tiler, and wire codec.
//!
//! Each fallible subsystem gets its own `thiserror` enum rather than one crate-wide
//! catch-all, mirroring how the teacher library separates `GridConstructionError` from
//! the top-level `ReconstructionError`.

use thiserror::Error as ThisError;

/// Errors raised while building the in-memory [`crate::model::Model`].
#[non_exhaustive]
#[derive(Debug, ThisError)]
pub enum ModelError {
    /// A primitive id was already present in the model.
    #[error("primitive \"{0}\" already exists")]
    DuplicatePrimitive(String),
    /// An entity id was already present in the model.
    #[error("entity \"{0}\" already exists")]
    DuplicateEntity(String),
    /// The source mesh data supplied to `create_primitive` is malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Errors raised while partitioning entities into tiles and quantizing positions.
#[non_exhaustive]
#[derive(Debug, ThisError)]
pub enum TilerError {
    /// A position fell outside its quantization AABB by more than one LSB.
    #[error(
        "position {position:?} lies outside its quantization aabb {aabb:?} by more than one LSB"
    )]
    QuantizationOverflow {
        /// The offending position.
        position: [f32; 3],
        /// The AABB it was quantized against, as `[xmin,ymin,zmin,xmax,ymax,zmax]`.
        aabb: [f32; 6],
    },
}

/// Errors raised while decompressing and parsing an encoded package.
#[non_exhaustive]
#[derive(Debug, ThisError)]
pub enum CodecError {
    /// Decompression of a stream failed.
    #[error("failed to decompress stream {stream_index} ({stream_name}): {source}")]
    Decompress {
        /// Index of the stream (0..=16) within the package envelope.
        stream_index: u8,
        /// Human-readable name of the stream.
        stream_name: &'static str,
        /// Underlying zlib/deflate error.
        #[source]
        source: std::io::Error,
    },
    /// A decompressed stream's byte length is not a multiple of its element size.
    #[error(
        "stream {stream_index} ({stream_name}) has length {len} which is not a multiple of element size {element_size}"
    )]
    MisalignedStream {
        /// Index of the stream (0..=16) within the package envelope.
        stream_index: u8,
        /// Human-readable name of the stream.
        stream_name: &'static str,
        /// Length in bytes of the decompressed stream.
        len: usize,
        /// Expected element size in bytes.
        element_size: usize,
    },
    /// The parser was invoked on an envelope that does not declare format version 6.
    #[error("format version mismatch: expected {expected}, found {found}")]
    FormatVersionMismatch {
        /// The version this crate implements.
        expected: u32,
        /// The version found in the envelope.
        found: u32,
    },
    /// The envelope did not contain exactly 17 streams.
    #[error("expected 17 streams in package envelope, found {0}")]
    WrongStreamCount(usize),
}

/// A non-fatal issue accumulated during model building or decoding; reported to the
/// caller without aborting the operation, per the `UnknownPrimitive` propagation policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// An entity referenced a primitive id that does not exist in the model. The
    /// reference is silently dropped from the entity's instance list.
    UnknownPrimitive {
        /// The entity that made the reference.
        entity_id: String,
        /// The missing primitive id.
        primitive_id: String,
    },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::UnknownPrimitive {
                entity_id,
                primitive_id,
            } => write!(
                f,
                "entity \"{entity_id}\" references unknown primitive \"{primitive_id}\", dropping reference"
            ),
        }
    }
}
