//! Wire codec for the 17-stream binary package envelope described in `spec.md` §6.
//!
//! The envelope itself (any outer header/container wrapping these 17 blobs) is out of
//! scope per `spec.md` §1; this module's public surface is `encoder::encode` and
//! `decoder::decode`, operating on an ordered `Vec<Vec<u8>>` of compressed blobs.

pub mod decoder;
pub mod encoder;

use std::io::{Read, Write};

use bytemuck_derive::{Pod, Zeroable};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::CodecError;

/// Wire layout of the `each_primitive_color_and_opacity` stream: `[r, g, b, a]` per
/// primitive, `a = round(opacity * 255)` (`spec.md` §4.4). `#[repr(C)]` plus
/// `Pod`/`Zeroable` lets the encoder and decoder cast a `&[ColorOpacity]` straight to
/// and from bytes instead of pushing components one at a time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct ColorOpacity {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

/// Human-readable names of the 17 streams, in wire order. Used only for error messages
/// and logging.
pub const STREAM_NAMES: [&str; NUM_STREAMS] = [
    "positions",
    "normals",
    "indices",
    "edge_indices",
    "matrices",
    "instanced_primitives_decode_matrix",
    "each_primitive_positions_and_normals_portion",
    "each_primitive_indices_portion",
    "each_primitive_edge_indices_portion",
    "each_primitive_color_and_opacity",
    "primitive_instances",
    "each_entity_id",
    "each_entity_primitive_instances_portion",
    "each_entity_matrices_portion",
    "each_tile_aabb",
    "each_tile_decode_matrix",
    "each_tile_entities_portion",
];

/// Number of streams in the envelope.
pub const NUM_STREAMS: usize = 17;

/// Index of each stream within the 17-blob envelope, per `spec.md` §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StreamIndex {
    Positions = 0,
    Normals = 1,
    Indices = 2,
    EdgeIndices = 3,
    Matrices = 4,
    InstancedPrimitivesDecodeMatrix = 5,
    EachPrimitivePositionsAndNormalsPortion = 6,
    EachPrimitiveIndicesPortion = 7,
    EachPrimitiveEdgeIndicesPortion = 8,
    EachPrimitiveColorAndOpacity = 9,
    PrimitiveInstances = 10,
    EachEntityId = 11,
    EachEntityPrimitiveInstancesPortion = 12,
    EachEntityMatricesPortion = 13,
    EachTileAabb = 14,
    EachTileDecodeMatrix = 15,
    EachTileEntitiesPortion = 16,
}

/// Compresses a byte buffer with a zlib-compatible DEFLATE codec.
pub fn deflate(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(bytes)
        .expect("writing to an in-memory buffer cannot fail");
    encoder
        .finish()
        .expect("flushing an in-memory buffer cannot fail")
}

/// Decompresses a zlib-compatible DEFLATE-compressed byte buffer, with no stream
/// identity attached (used by callers outside the 17-stream envelope, e.g. tests).
pub fn inflate(bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut decoder = ZlibDecoder::new(bytes);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|source| CodecError::Decompress {
            stream_index: 0,
            stream_name: "unnamed",
            source,
        })?;
    Ok(out)
}

/// Decompresses stream `index`, validating that its byte length is a multiple of
/// `element_size` (0 means "no alignment requirement", used for the JSON entity-id
/// stream).
pub(crate) fn inflate_stream(
    bytes: &[u8],
    index: StreamIndex,
    element_size: usize,
) -> Result<Vec<u8>, CodecError> {
    let name = STREAM_NAMES[index as usize];
    let mut decoder = ZlibDecoder::new(bytes);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|source| CodecError::Decompress {
            stream_index: index as u8,
            stream_name: name,
            source,
        })?;
    if element_size > 0 && out.len() % element_size != 0 {
        return Err(CodecError::MisalignedStream {
            stream_index: index as u8,
            stream_name: name,
            len: out.len(),
            element_size,
        });
    }
    Ok(out)
}

/// Converts a `u16` slice to little-endian bytes. Going from a typed slice down to
/// `u8` never has an alignment concern, so this is a genuine zero-copy [`bytemuck`]
/// cast followed by one copy into the owned output buffer.
pub(crate) fn bytes_from_u16_le(v: &[u16]) -> Vec<u8> {
    let le: Vec<u16> = v.iter().map(|x| x.to_le()).collect();
    bytemuck::cast_slice(&le).to_vec()
}

/// Converts a `u32` slice to little-endian bytes. See [`bytes_from_u16_le`].
pub(crate) fn bytes_from_u32_le(v: &[u32]) -> Vec<u8> {
    let le: Vec<u32> = v.iter().map(|x| x.to_le()).collect();
    bytemuck::cast_slice(&le).to_vec()
}

/// Converts an `f32` slice to little-endian bytes. See [`bytes_from_u16_le`].
pub(crate) fn bytes_from_f32_le(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|x| x.to_le_bytes()).collect()
}

/// Reinterprets a little-endian byte buffer as `u16`s.
///
/// The decompressed buffer has no alignment guarantee, so this reads element-by-element
/// via `from_le_bytes` rather than an in-place [`bytemuck`] cast (`spec.md` §5: "the
/// format itself is little-endian...the decoder must byte-swap as needed on big-endian
/// hosts" — `from_le_bytes` handles that on every host, not just big-endian ones).
pub(crate) fn cast_u16_le(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect()
}

/// Reinterprets a little-endian byte buffer as `u32`s. See [`cast_u16_le`].
pub(crate) fn cast_u32_le(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Reinterprets a little-endian byte buffer as `f32`s. See [`cast_u16_le`].
pub(crate) fn cast_f32_le(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Reinterprets a byte buffer as `i8`s (endianness-agnostic, single-byte elements).
pub(crate) fn cast_i8(bytes: &[u8]) -> Vec<i8> {
    bytemuck::cast_slice(bytes).to_vec()
}
