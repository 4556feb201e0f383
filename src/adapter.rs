//! The scene-builder adapter: the narrow interface the decoder drives. See `spec.md`
//! §4.6. The real engine-side implementation lives outside this crate; a
//! [`RecordingSceneBuilder`] test double is provided for round-trip tests and as a
//! reference implementation of the trait.

use nalgebra::Matrix4;

/// Inline or geometry-referencing data for one mesh, passed to
/// [`SceneBuilder::create_mesh`].
pub enum MeshSource {
    /// References geometry created earlier via [`SceneBuilder::create_geometry`]
    /// (the instanced / reused-primitive case).
    Geometry {
        /// Id returned by the matching `create_geometry` call.
        geometry_id: u32,
    },
    /// Self-contained, non-instanced geometry (positions/normals/indices/edges inline),
    /// with its own decode matrix, color, and opacity.
    Inline {
        /// 16-bit quantized triples.
        positions: Vec<[u16; 3]>,
        /// Oct-encoded signed-8-bit pairs.
        normals: Vec<[i8; 2]>,
        /// Flat triangle list.
        indices: Vec<u32>,
        /// Flat line list.
        edge_indices: Vec<u32>,
        /// Maps this mesh's quantized positions back to world space.
        positions_decode_matrix: Matrix4<f32>,
        /// `[r, g, b]`.
        color: [u8; 3],
        /// `0.0..=1.0`.
        opacity: f32,
    },
}

/// One mesh creation call.
pub struct CreateMesh {
    /// Sequential id allocated by the decoder.
    pub id: u32,
    /// Inline data, or a reference to previously created geometry.
    pub source: MeshSource,
    /// The entity's modeling transform, applied only for instanced (geometry-
    /// referencing) meshes; `None` for inline meshes, whose transform is already baked
    /// into their positions.
    pub matrix: Option<Matrix4<f32>>,
}

/// One geometry creation call (always instanced / reused-primitive geometry).
pub struct CreateGeometry {
    /// Sequential id allocated by the decoder.
    pub id: u32,
    /// 16-bit quantized triples, in primitive-local (object) space.
    pub positions: Vec<[u16; 3]>,
    /// Oct-encoded signed-8-bit pairs.
    pub normals: Vec<[i8; 2]>,
    /// Flat triangle list.
    pub indices: Vec<u32>,
    /// Flat line list.
    pub edge_indices: Vec<u32>,
    /// Maps this geometry's quantized positions back to object space.
    pub positions_decode_matrix: Matrix4<f32>,
}

/// One entity creation call.
pub struct CreateEntity {
    /// The entity id, passed through unchanged from the file.
    pub id: String,
    /// Whether this entity represents an object (as opposed to e.g. a spatial grouping
    /// node); always `true` for entities produced by this crate's decoder.
    pub is_object: bool,
    /// Ids of the meshes (from `create_mesh`) that make up this entity.
    pub mesh_ids: Vec<u32>,
}

/// The abstract interface the decoder drives. See `spec.md` §4.6.
pub trait SceneBuilder {
    /// Registers shared, instanced geometry. Called at most once per distinct
    /// instanced primitive, no matter how many entities reference it.
    fn create_geometry(&mut self, geometry: CreateGeometry);

    /// Registers a mesh: either a reference to previously created geometry (instanced)
    /// or a fully inline, self-contained mesh (non-instanced).
    fn create_mesh(&mut self, mesh: CreateMesh);

    /// Registers an entity aggregating one or more meshes. Not called for entities
    /// with zero materialized meshes (`spec.md` §4.5).
    fn create_entity(&mut self, entity: CreateEntity);
}

/// An in-memory [`SceneBuilder`] that records every call it receives, for use in tests
/// and as a reference implementation. The real engine-side adapter is external.
#[derive(Default)]
pub struct RecordingSceneBuilder {
    /// Every `create_geometry` call received, in order.
    pub geometries: Vec<CreateGeometry>,
    /// Every `create_mesh` call received, in order.
    pub meshes: Vec<CreateMesh>,
    /// Every `create_entity` call received, in order.
    pub entities: Vec<CreateEntity>,
}

impl RecordingSceneBuilder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SceneBuilder for RecordingSceneBuilder {
    fn create_geometry(&mut self, geometry: CreateGeometry) {
        self.geometries.push(geometry);
    }

    fn create_mesh(&mut self, mesh: CreateMesh) {
        self.meshes.push(mesh);
    }

    fn create_entity(&mut self, entity: CreateEntity) {
        self.entities.push(entity);
    }
}
