//! Inverse of [`crate::codec::encoder::encode`]: replays a 17-stream package onto a
//! [`SceneBuilder`]. See `spec.md` §4.5 / §4.6.

use nalgebra::Matrix4;

use crate::adapter::{CreateEntity, CreateGeometry, CreateMesh, MeshSource, SceneBuilder};
use crate::codec::{
    cast_f32_le, cast_i8, cast_u16_le, cast_u32_le, inflate_stream, ColorOpacity, StreamIndex,
};
use crate::error::CodecError;
use crate::new_map;

/// Decodes the 17-stream envelope produced by `encode`, driving `builder` with the
/// resulting geometries, meshes, and entities.
///
/// A primitive referenced by two or more instances across the package is treated as
/// shared geometry (one `create_geometry` call, `spec.md` §4.5); a primitive used by
/// exactly one instance is emitted as a fully inline mesh.
pub fn decode(streams: &[Vec<u8>], builder: &mut impl SceneBuilder) -> Result<(), CodecError> {
    crate::profile!("decode", decode_inner(streams, builder))
}

fn decode_inner(streams: &[Vec<u8>], builder: &mut impl SceneBuilder) -> Result<(), CodecError> {
    if streams.len() != crate::codec::NUM_STREAMS {
        return Err(CodecError::WrongStreamCount(streams.len()));
    }

    let positions = cast_u16_le(&inflate_stream(&streams[StreamIndex::Positions as usize], StreamIndex::Positions, 2)?);
    let normals = cast_i8(&inflate_stream(&streams[StreamIndex::Normals as usize], StreamIndex::Normals, 1)?);
    let indices = cast_u32_le(&inflate_stream(&streams[StreamIndex::Indices as usize], StreamIndex::Indices, 4)?);
    let edge_indices = cast_u32_le(&inflate_stream(
        &streams[StreamIndex::EdgeIndices as usize],
        StreamIndex::EdgeIndices,
        4,
    )?);
    let matrices = cast_f32_le(&inflate_stream(&streams[StreamIndex::Matrices as usize], StreamIndex::Matrices, 4)?);
    let instanced_decode_matrix_flat = cast_f32_le(&inflate_stream(
        &streams[StreamIndex::InstancedPrimitivesDecodeMatrix as usize],
        StreamIndex::InstancedPrimitivesDecodeMatrix,
        4,
    )?);
    let positions_and_normals_portion = cast_u32_le(&inflate_stream(
        &streams[StreamIndex::EachPrimitivePositionsAndNormalsPortion as usize],
        StreamIndex::EachPrimitivePositionsAndNormalsPortion,
        4,
    )?);
    let indices_portion = cast_u32_le(&inflate_stream(
        &streams[StreamIndex::EachPrimitiveIndicesPortion as usize],
        StreamIndex::EachPrimitiveIndicesPortion,
        4,
    )?);
    let edge_indices_portion = cast_u32_le(&inflate_stream(
        &streams[StreamIndex::EachPrimitiveEdgeIndicesPortion as usize],
        StreamIndex::EachPrimitiveEdgeIndicesPortion,
        4,
    )?);
    let color_and_opacity_bytes = inflate_stream(
        &streams[StreamIndex::EachPrimitiveColorAndOpacity as usize],
        StreamIndex::EachPrimitiveColorAndOpacity,
        4,
    )?;
    let color_and_opacity: &[ColorOpacity] = bytemuck::cast_slice(&color_and_opacity_bytes);
    let primitive_instances = cast_u32_le(&inflate_stream(
        &streams[StreamIndex::PrimitiveInstances as usize],
        StreamIndex::PrimitiveInstances,
        4,
    )?);
    let entity_id_json = inflate_stream(&streams[StreamIndex::EachEntityId as usize], StreamIndex::EachEntityId, 0)?;
    let entity_ids: Vec<String> = serde_json::from_slice(&entity_id_json).map_err(|_| CodecError::MisalignedStream {
        stream_index: StreamIndex::EachEntityId as u8,
        stream_name: "each_entity_id",
        len: entity_id_json.len(),
        element_size: 0,
    })?;
    let entity_primitive_instances_portion = cast_u32_le(&inflate_stream(
        &streams[StreamIndex::EachEntityPrimitiveInstancesPortion as usize],
        StreamIndex::EachEntityPrimitiveInstancesPortion,
        4,
    )?);
    let entity_matrices_portion = cast_u32_le(&inflate_stream(
        &streams[StreamIndex::EachEntityMatricesPortion as usize],
        StreamIndex::EachEntityMatricesPortion,
        4,
    )?);
    let tile_aabb = cast_f32_le(&inflate_stream(&streams[StreamIndex::EachTileAabb as usize], StreamIndex::EachTileAabb, 4)?);
    let tile_decode_matrix = cast_f32_le(&inflate_stream(
        &streams[StreamIndex::EachTileDecodeMatrix as usize],
        StreamIndex::EachTileDecodeMatrix,
        4,
    )?);
    let tile_entities_portion = cast_u32_le(&inflate_stream(
        &streams[StreamIndex::EachTileEntitiesPortion as usize],
        StreamIndex::EachTileEntitiesPortion,
        4,
    )?);

    let num_primitives = positions_and_normals_portion.len();
    let total_vertices = positions.len() / 3;
    let total_indices = indices.len();
    let total_edge_indices = edge_indices.len();

    let vertex_range = |i: usize| -> (usize, usize) {
        let start = positions_and_normals_portion[i] as usize;
        let end = positions_and_normals_portion
            .get(i + 1)
            .map(|&v| v as usize)
            .unwrap_or(total_vertices);
        (start, end)
    };
    let index_range = |i: usize| -> (usize, usize) {
        let start = indices_portion[i] as usize;
        let end = indices_portion.get(i + 1).map(|&v| v as usize).unwrap_or(total_indices);
        (start, end)
    };
    let edge_range = |i: usize| -> (usize, usize) {
        let start = edge_indices_portion[i] as usize;
        let end = edge_indices_portion
            .get(i + 1)
            .map(|&v| v as usize)
            .unwrap_or(total_edge_indices);
        (start, end)
    };

    let instanced_decode_matrix = Matrix4::from_column_slice(&instanced_decode_matrix_flat);

    // A primitive referenced by >=2 instances across the whole package is shared.
    let mut instance_counts = vec![0u32; num_primitives];
    for &primitive_ref in &primitive_instances {
        instance_counts[primitive_ref as usize] += 1;
    }

    let num_tiles = tile_aabb.len() / 6;
    let num_entities = entity_ids.len();

    let mut next_mesh_id = 0u32;
    let mut created_geometries = new_map::<u32, u32>();

    for tile_index in 0..num_tiles {
        let decode_matrix =
            Matrix4::from_column_slice(&tile_decode_matrix[tile_index * 16..tile_index * 16 + 16]);

        let entity_start = tile_entities_portion[tile_index] as usize;
        let entity_end = tile_entities_portion
            .get(tile_index + 1)
            .map(|&v| v as usize)
            .unwrap_or(num_entities);

        for entity_pos in entity_start..entity_end {
            let entity_id = entity_ids[entity_pos].clone();

            let matrix_offset = entity_matrices_portion[entity_pos] as usize;
            let entity_matrix = Matrix4::from_column_slice(&matrices[matrix_offset..matrix_offset + 16]);

            let inst_start = entity_primitive_instances_portion[entity_pos] as usize;
            let inst_end = entity_primitive_instances_portion
                .get(entity_pos + 1)
                .map(|&v| v as usize)
                .unwrap_or(primitive_instances.len());

            let mut mesh_ids = Vec::new();

            for &primitive_ref in &primitive_instances[inst_start..inst_end] {
                let primitive_ref = primitive_ref as usize;
                let (v_start, v_end) = vertex_range(primitive_ref);
                let (i_start, i_end) = index_range(primitive_ref);
                let (e_start, e_end) = edge_range(primitive_ref);

                let prim_positions: Vec<[u16; 3]> = (v_start..v_end)
                    .map(|v| [positions[v * 3], positions[v * 3 + 1], positions[v * 3 + 2]])
                    .collect();
                let prim_normals: Vec<[i8; 2]> =
                    (v_start..v_end).map(|v| [normals[v * 2], normals[v * 2 + 1]]).collect();
                let prim_indices = indices[i_start..i_end].to_vec();
                let prim_edge_indices = edge_indices[e_start..e_end].to_vec();

                let mesh_id = next_mesh_id;
                next_mesh_id += 1;

                if instance_counts[primitive_ref] >= 2 {
                    if !created_geometries.contains_key(&(primitive_ref as u32)) {
                        builder.create_geometry(CreateGeometry {
                            id: primitive_ref as u32,
                            positions: prim_positions,
                            normals: prim_normals,
                            indices: prim_indices,
                            edge_indices: prim_edge_indices,
                            positions_decode_matrix: instanced_decode_matrix,
                        });
                        created_geometries.insert(primitive_ref as u32, primitive_ref as u32);
                    }
                    builder.create_mesh(CreateMesh {
                        id: mesh_id,
                        source: MeshSource::Geometry {
                            geometry_id: primitive_ref as u32,
                        },
                        matrix: Some(entity_matrix),
                    });
                } else {
                    let c = color_and_opacity[primitive_ref];
                    builder.create_mesh(CreateMesh {
                        id: mesh_id,
                        source: MeshSource::Inline {
                            positions: prim_positions,
                            normals: prim_normals,
                            indices: prim_indices,
                            edge_indices: prim_edge_indices,
                            positions_decode_matrix: decode_matrix,
                            color: [c.r, c.g, c.b],
                            opacity: c.a as f32 / 255.0,
                        },
                        matrix: None,
                    });
                }
                mesh_ids.push(mesh_id);
            }

            if !mesh_ids.is_empty() {
                builder.create_entity(CreateEntity {
                    id: entity_id,
                    is_object: true,
                    mesh_ids,
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::RecordingSceneBuilder;
    use crate::codec::encoder::encode;
    use crate::model::Model;
    use crate::tiler::TilerParameters;
    use nalgebra::{Point3, Vector3};

    fn unit_cube() -> (Vec<Point3<f32>>, Vec<Vector3<f32>>, Vec<u32>) {
        let p = vec![
            Point3::new(-0.5, -0.5, -0.5),
            Point3::new(0.5, -0.5, -0.5),
            Point3::new(0.5, 0.5, -0.5),
            Point3::new(-0.5, 0.5, -0.5),
            Point3::new(-0.5, -0.5, 0.5),
            Point3::new(0.5, -0.5, 0.5),
            Point3::new(0.5, 0.5, 0.5),
            Point3::new(-0.5, 0.5, 0.5),
        ];
        let n: Vec<Vector3<f32>> = (0..8).map(|_| Vector3::new(0.0, 0.0, 1.0)).collect();
        #[rustfmt::skip]
        let indices: Vec<u32> = vec![
            0, 1, 2, 0, 2, 3,
            4, 6, 5, 4, 7, 6,
            0, 4, 5, 0, 5, 1,
            3, 2, 6, 3, 6, 7,
            0, 3, 7, 0, 7, 4,
            1, 5, 6, 1, 6, 2,
        ];
        (p, n, indices)
    }

    #[test]
    fn rejects_wrong_stream_count() {
        let mut builder = RecordingSceneBuilder::new();
        let err = decode(&[], &mut builder).unwrap_err();
        assert!(matches!(err, CodecError::WrongStreamCount(0)));
    }

    #[test]
    fn single_non_reused_primitive_decodes_to_inline_mesh() {
        use nalgebra::Matrix4;
        let mut model = Model::new();
        let (p, n, idx) = unit_cube();
        model
            .create_primitive("cube", false, Matrix4::identity(), [9, 8, 7], 0.75, p, n, idx)
            .unwrap();
        model
            .create_entity("only", Matrix4::identity(), &["cube"], false)
            .unwrap();
        model.create_tiles(&TilerParameters::default()).unwrap();

        let streams = encode(&model).unwrap();
        let mut builder = RecordingSceneBuilder::new();
        decode(&streams, &mut builder).unwrap();

        assert_eq!(builder.geometries.len(), 0);
        assert_eq!(builder.meshes.len(), 1);
        assert_eq!(builder.entities.len(), 1);
        assert!(matches!(builder.meshes[0].source, MeshSource::Inline { .. }));
        assert_eq!(builder.entities[0].id, "only");
    }
}
