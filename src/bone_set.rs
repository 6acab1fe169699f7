use bevy::prelude::Resource;
use serde::Deserialize;
use std::{
    collections::HashSet,
    fs::File,
    io::BufReader,
    path::Path,
};
use thiserror::Error;

pub const DEFAULT_ROOT_BONE: &str = "pelvis";
pub const DEFAULT_PRUNE_BONE: &str = "head";

// Canonical bone names eligible for the registry
const CANONICAL_BONES: [&str; 27] = [
    "pelvis",
    "spine", "spine1", "spine2",
    "neck", "head",
    "l_eye", "r_eye",
    "l_clavicle", "l_upperarm", "l_forearm", "l_hand",
    "r_clavicle", "r_upperarm", "r_forearm", "r_hand",
    "l_thigh", "l_calf", "l_foot", "l_toe",
    "r_thigh", "r_calf", "r_foot", "r_toe",
    "jaw", "l_breast", "r_breast",
];

// Driven once at bind time, never re-synced
const BIND_ONLY_BONES: [&str; 2] = ["l_eye", "r_eye"];

#[derive(Error, Debug)]
pub enum BoneSetError {
    #[error("failed to open bone set file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse bone set json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("synced bone '{0}' is not in the bone allow-list")]
    UnknownSyncedBone(String),
}

/*---------+
 |  JSON   |
 +---------*/
#[derive(Deserialize, Debug)]
struct BoneSetFile {
    root_bone: Option<String>,
    prune_bone: Option<String>,
    bones: Vec<String>,
    // Falls back to every bone when omitted
    synced_bones: Option<Vec<String>>,
}

/*-------------+
 |  Resources  |
 +-------------*/
/// Allow-list of bone names a skeleton is filtered against.
///
/// `synced_bones` is always a subset of `bones`.  The set is read-only once
/// the plugin has inserted it; build a new one to change it.
#[derive(Resource, Clone, Debug, PartialEq)]
pub struct BoneSet {
    root_bone: String,
    prune_bone: String,
    bones: HashSet<String>,
    synced_bones: HashSet<String>,
}

impl Default for BoneSet {
    fn default() -> Self {
        let bones: HashSet<String> = CANONICAL_BONES.iter().map(|b| b.to_string()).collect();
        let synced_bones = bones.iter()
            .filter(|b| !BIND_ONLY_BONES.contains(&b.as_str()))
            .cloned()
            .collect();
        BoneSet {
            root_bone: DEFAULT_ROOT_BONE.to_string(),
            prune_bone: DEFAULT_PRUNE_BONE.to_string(),
            bones,
            synced_bones,
        }
    }
}

impl BoneSet {
    /// Replaces the allow-list.  Every bone is also synced until
    /// [`BoneSet::with_synced_bones`] narrows it down.
    pub fn with_bones<I, S>(mut self, bones: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bones = bones.into_iter().map(Into::into).collect();
        self.synced_bones = self.bones.clone();
        self
    }

    /// Names outside the allow-list are dropped.
    pub fn with_synced_bones<I, S>(mut self, bones: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.synced_bones = bones.into_iter()
            .map(Into::into)
            .filter(|b| self.bones.contains(b))
            .collect();
        self
    }

    pub fn with_root_bone(mut self, name: impl Into<String>) -> Self {
        self.root_bone = name.into();
        self
    }

    pub fn with_prune_bone(mut self, name: impl Into<String>) -> Self {
        self.prune_bone = name.into();
        self
    }

    pub fn from_json_file<T: AsRef<Path>>(path: T) -> Result<Self, BoneSetError> {
        let file = File::open(path.as_ref())?;
        let config: BoneSetFile = serde_json::from_reader(BufReader::new(file))?;
        Self::from_file_config(config)
    }

    pub fn from_json_str(json: &str) -> Result<Self, BoneSetError> {
        let config: BoneSetFile = serde_json::from_str(json)?;
        Self::from_file_config(config)
    }

    fn from_file_config(config: BoneSetFile) -> Result<Self, BoneSetError> {
        let bones: HashSet<String> = config.bones.into_iter().collect();
        let synced_bones: HashSet<String> = match config.synced_bones {
            Some(synced) => synced.into_iter().collect(),
            None => bones.clone(),
        };
        if let Some(unknown) = synced_bones.iter().find(|b| !bones.contains(*b)) {
            return Err(BoneSetError::UnknownSyncedBone(unknown.to_string()));
        }
        Ok(BoneSet {
            root_bone: config.root_bone.unwrap_or_else(|| DEFAULT_ROOT_BONE.to_string()),
            prune_bone: config.prune_bone.unwrap_or_else(|| DEFAULT_PRUNE_BONE.to_string()),
            bones,
            synced_bones,
        })
    }

    pub fn root_bone(&self) -> &str {
        &self.root_bone
    }

    pub fn prune_bone(&self) -> &str {
        &self.prune_bone
    }

    pub fn includes(&self, name: &str) -> bool {
        self.bones.contains(name)
    }

    pub fn is_synced(&self, name: &str) -> bool {
        self.synced_bones.contains(name)
    }

    pub fn prunes(&self, name: &str) -> bool {
        self.prune_bone == name
    }
}
