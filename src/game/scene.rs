//! Scene Initialization
//!
//! A room is seeded once from a scene descriptor: the obstacle list,
//! per-obstacle physics settings, the crowd switch, the base ground
//! height and an optional terrain heightfield.
//!
//! ```text
//!   <scene_dir>/<game>/<scene>.json ──► JsonSceneLoader ──┐
//!                                                         ├─► load_scene_or_default ──► SceneDescriptor
//!   any failure (I/O, parse, bad id) ──► warn! + default ─┘
//! ```
//!
//! Ground height is sampled here as well, since it depends on the
//! terrain and on the live obstacle list.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use glam::Vec3;
use serde::{Serialize, Deserialize};
use tracing::{debug, warn};

use crate::game::state::Obstacle;

// =============================================================================
// PHYSICS CONFIG
// =============================================================================

/// How an obstacle participates in physics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyType {
    /// Immovable
    #[default]
    Static,
    /// Simulated: gravity, contacts, pushes
    Dynamic,
    /// Moved externally; treated as static by the solver
    Kinematic,
}

/// Per-obstacle physics parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObstaclePhysicsConfig {
    pub enabled: bool,
    pub body_type: BodyType,
    pub mass: f32,
    pub friction: f32,
    pub restitution: f32,
    pub linear_damping: f32,
    pub gravity_scale: f32,
    /// Extra height added to a dynamic body's spawn position
    pub spawn_height_offset: f32,
    pub initial_velocity: Vec3,
    /// Triggers never collide and never act as ground
    pub is_trigger: bool,
}

impl Default for ObstaclePhysicsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            body_type: BodyType::Static,
            mass: 1.0,
            friction: 0.5,
            restitution: 0.2,
            linear_damping: 0.1,
            gravity_scale: 1.0,
            spawn_height_offset: 0.0,
            initial_velocity: Vec3::ZERO,
            is_trigger: false,
        }
    }
}

impl ObstaclePhysicsConfig {
    /// Config for a simulated rigid body.
    pub fn dynamic(mass: f32, restitution: f32) -> Self {
        Self {
            enabled: true,
            body_type: BodyType::Dynamic,
            mass,
            restitution,
            ..Self::default()
        }
    }

    /// Whether the dynamic obstacle solver runs on this body.
    #[inline]
    pub fn is_simulated(&self) -> bool {
        self.enabled && self.body_type == BodyType::Dynamic && !self.is_trigger
    }
}

// =============================================================================
// SCENE DESCRIPTOR
// =============================================================================

/// Obstacle as authored in the scene.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObstacleDescriptor {
    pub id: String,
    /// Box centre
    pub position: Vec3,
    /// Full extents
    pub size: Vec3,
}

/// Smooth sinusoidal heightfield added to the base ground height.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TerrainDescriptor {
    pub amplitude: f32,
    pub frequency: f32,
}

impl TerrainDescriptor {
    /// Height offset at (x, z).
    #[inline]
    pub fn height_at(&self, x: f32, z: f32) -> f32 {
        self.amplitude * (x * self.frequency).sin() * (z * self.frequency).cos()
    }
}

/// Everything a room needs from its scene.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SceneDescriptor {
    pub obstacles: Vec<ObstacleDescriptor>,
    /// Physics settings by obstacle id; missing entries are static
    pub physics: BTreeMap<String, ObstaclePhysicsConfig>,
    pub crowd_enabled: bool,
    pub ground_height: f32,
    pub terrain: Option<TerrainDescriptor>,
}

// =============================================================================
// LOADING
// =============================================================================

/// Scene loading errors.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    /// Scene file could not be read.
    #[error("Failed to read scene {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Scene file is not a valid descriptor.
    #[error("Failed to parse scene {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Game or scene id cannot name a file.
    #[error("Invalid scene id: {0:?}")]
    InvalidId(String),
}

/// Source of scene descriptors, keyed by game and scene id.
pub trait SceneLoader: Send + Sync {
    /// Load the scene for a room.
    fn load(&self, game_id: &str, scene_id: &str) -> Result<SceneDescriptor, SceneError>;
}

/// Reads `<root>/<game>/<scene>.json`.
#[derive(Clone, Debug)]
pub struct JsonSceneLoader {
    root: PathBuf,
}

impl JsonSceneLoader {
    /// Create a loader rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File path for a scene, after validating both ids.
    pub fn scene_path(&self, game_id: &str, scene_id: &str) -> Result<PathBuf, SceneError> {
        validate_scene_id(game_id)?;
        validate_scene_id(scene_id)?;
        Ok(self.root.join(game_id).join(format!("{}.json", scene_id)))
    }
}

impl SceneLoader for JsonSceneLoader {
    fn load(&self, game_id: &str, scene_id: &str) -> Result<SceneDescriptor, SceneError> {
        let path = self.scene_path(game_id, scene_id)?;
        let text = std::fs::read_to_string(&path).map_err(|source| SceneError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| SceneError::Parse { path, source })
    }
}

/// Always returns the same descriptor. Used by the demo and tests.
#[derive(Clone, Debug, Default)]
pub struct FixedSceneLoader {
    scene: SceneDescriptor,
}

impl FixedSceneLoader {
    pub fn new(scene: SceneDescriptor) -> Self {
        Self { scene }
    }
}

impl SceneLoader for FixedSceneLoader {
    fn load(&self, _game_id: &str, _scene_id: &str) -> Result<SceneDescriptor, SceneError> {
        Ok(self.scene.clone())
    }
}

/// Reject ids that are empty or could escape the scene directory.
pub fn validate_scene_id(id: &str) -> Result<(), SceneError> {
    let bad = id.is_empty()
        || id.contains("..")
        || id.contains('/')
        || id.contains('\\')
        || id.contains('\0');
    if bad {
        Err(SceneError::InvalidId(id.to_string()))
    } else {
        Ok(())
    }
}

/// Load a scene, falling back to an empty one on any failure.
///
/// The fallback has no obstacles, crowd disabled, ground height 0 and no
/// terrain, so a broken scene never prevents a room from starting.
pub fn load_scene_or_default(
    loader: &dyn SceneLoader,
    game_id: &str,
    scene_id: &str,
) -> SceneDescriptor {
    match loader.load(game_id, scene_id) {
        Ok(scene) => {
            debug!(
                game = game_id,
                scene = scene_id,
                obstacles = scene.obstacles.len(),
                crowd = scene.crowd_enabled,
                "Scene loaded"
            );
            scene
        }
        Err(e) => {
            warn!(game = game_id, scene = scene_id, error = %e, "Scene load failed, using empty scene");
            SceneDescriptor::default()
        }
    }
}

// =============================================================================
// GROUND HEIGHT
// =============================================================================

/// Terrain part of the ground: base height plus optional heightfield.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GroundModel {
    pub base_height: f32,
    pub terrain: Option<TerrainDescriptor>,
}

impl GroundModel {
    /// Ground model for a scene.
    pub fn from_scene(scene: &SceneDescriptor) -> Self {
        Self {
            base_height: scene.ground_height,
            terrain: scene.terrain,
        }
    }

    /// Terrain height at (x, z), ignoring obstacles.
    pub fn terrain_height(&self, x: f32, z: f32) -> f32 {
        if !x.is_finite() || !z.is_finite() {
            return self.base_height;
        }
        match &self.terrain {
            Some(terrain) => self.base_height + terrain.height_at(x, z),
            None => self.base_height,
        }
    }

    /// Ground height at (x, z): terrain or the highest solid obstacle top
    /// whose footprint contains the point.
    #[inline]
    pub fn sample(&self, obstacles: &[Obstacle], x: f32, z: f32) -> f32 {
        self.sample_excluding(obstacles, x, z, None)
    }

    /// Like [`sample`](Self::sample) but ignoring the obstacle at index `exclude`.
    pub fn sample_excluding(
        &self,
        obstacles: &[Obstacle],
        x: f32,
        z: f32,
        exclude: Option<usize>,
    ) -> f32 {
        let mut height = self.terrain_height(x, z);
        for (index, obstacle) in obstacles.iter().enumerate() {
            if Some(index) == exclude || !obstacle.is_solid() {
                continue;
            }
            let aabb = obstacle.aabb();
            if aabb.contains_xz(x, z) && aabb.max.y > height {
                height = aabb.max.y;
            }
        }
        height
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const SCENE_JSON: &str = r#"{
        "obstacles": [
            { "id": "wall", "position": [0.0, 1.0, 5.0], "size": [10.0, 2.0, 1.0] },
            { "id": "crate", "position": [2.0, 0.5, 0.0], "size": [1.0, 1.0, 1.0] }
        ],
        "physics": {
            "crate": { "enabled": true, "bodyType": "dynamic", "mass": 2.0, "restitution": 0.4 }
        },
        "crowdEnabled": true,
        "groundHeight": 0.25,
        "terrain": { "amplitude": 0.5, "frequency": 0.2 }
    }"#;

    #[test]
    fn test_json_loader_reads_scene() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("arena")).unwrap();
        fs::write(dir.path().join("arena").join("plaza.json"), SCENE_JSON).unwrap();

        let loader = JsonSceneLoader::new(dir.path());
        let scene = loader.load("arena", "plaza").unwrap();

        assert_eq!(scene.obstacles.len(), 2);
        assert!(scene.crowd_enabled);
        assert_eq!(scene.ground_height, 0.25);
        assert!(scene.terrain.is_some());

        let crate_cfg = &scene.physics["crate"];
        assert!(crate_cfg.is_simulated());
        assert_eq!(crate_cfg.mass, 2.0);
        // Unspecified fields take defaults
        assert_eq!(crate_cfg.gravity_scale, 1.0);
        assert!(!scene.physics.contains_key("wall"));
    }

    #[test]
    fn test_loader_rejects_path_ids() {
        let loader = JsonSceneLoader::new("/tmp");
        for bad in ["../etc", "a/b", "a\\b", ""] {
            assert!(matches!(
                loader.load(bad, "plaza"),
                Err(SceneError::InvalidId(_))
            ));
            assert!(matches!(
                loader.load("arena", bad),
                Err(SceneError::InvalidId(_))
            ));
        }
    }

    #[test]
    fn test_missing_scene_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let loader = JsonSceneLoader::new(dir.path());

        assert!(matches!(loader.load("arena", "nope"), Err(SceneError::Io { .. })));

        let scene = load_scene_or_default(&loader, "arena", "nope");
        assert_eq!(scene, SceneDescriptor::default());
        assert!(scene.obstacles.is_empty());
        assert!(!scene.crowd_enabled);
        assert_eq!(scene.ground_height, 0.0);
        assert!(scene.terrain.is_none());
    }

    #[test]
    fn test_malformed_scene_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("arena")).unwrap();
        fs::write(dir.path().join("arena").join("broken.json"), "{ not json").unwrap();

        let loader = JsonSceneLoader::new(dir.path());
        assert!(matches!(loader.load("arena", "broken"), Err(SceneError::Parse { .. })));
        assert_eq!(load_scene_or_default(&loader, "arena", "broken"), SceneDescriptor::default());
    }

    #[test]
    fn test_terrain_height() {
        let ground = GroundModel {
            base_height: 1.0,
            terrain: Some(TerrainDescriptor { amplitude: 2.0, frequency: 1.0 }),
        };
        assert_eq!(ground.terrain_height(0.0, 0.0), 1.0);
        let peak = ground.terrain_height(std::f32::consts::FRAC_PI_2, 0.0);
        assert!((peak - 3.0).abs() < 1e-5);
        assert_eq!(ground.terrain_height(f32::NAN, 0.0), 1.0);
    }

    #[test]
    fn test_ground_includes_obstacle_tops() {
        let ground = GroundModel::default();
        let obstacles = vec![
            Obstacle::new("low", Vec3::new(0.0, 0.5, 0.0), Vec3::splat(1.0), ObstaclePhysicsConfig::default()),
            Obstacle::new("high", Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.5, 2.0, 0.5), ObstaclePhysicsConfig::default()),
        ];

        assert_eq!(ground.sample(&obstacles, 0.0, 0.0), 2.0);
        assert_eq!(ground.sample(&obstacles, 0.4, 0.0), 1.0);
        assert_eq!(ground.sample(&obstacles, 3.0, 0.0), 0.0);
        assert_eq!(ground.sample_excluding(&obstacles, 0.0, 0.0, Some(1)), 1.0);
    }

    #[test]
    fn test_triggers_are_not_ground() {
        let trigger = ObstaclePhysicsConfig {
            is_trigger: true,
            ..ObstaclePhysicsConfig::default()
        };
        let obstacles = vec![Obstacle::new("zone", Vec3::new(0.0, 0.5, 0.0), Vec3::splat(1.0), trigger)];
        assert_eq!(GroundModel::default().sample(&obstacles, 0.0, 0.0), 0.0);
    }
}
