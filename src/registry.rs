use bevy::{
    prelude::*,
    color::palettes::css::RED,
};
use std::collections::HashSet;
use crate::{
    BoneHierarchy,
    BoneSet,
};

/*---------+
 |  Types  |
 +---------*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoneEntry {
    pub name: String,
    pub entity: Entity,
}

/*------------+
 | Components |
 +------------*/
/// Owner of a skeleton whose allow-listed bones drive bound child skeletons.
///
/// The registry is rebuilt on insertion and after a [`RefreshSkeleton`]
/// trigger.  Entries are in pre-order discovery order.
#[derive(Component, Debug)]
pub struct ParentSkeleton {
    bones: Vec<BoneEntry>,
    refresh_requested: bool,
}

impl Default for ParentSkeleton {
    fn default() -> Self {
        ParentSkeleton {
            bones: Vec::<BoneEntry>::new(),
            refresh_requested: true,
        }
    }
}

impl ParentSkeleton {
    pub fn bones(&self) -> &[BoneEntry] {
        &self.bones
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bones.iter().map(|entry| entry.name.as_str())
    }

    /// Bone recorded at the last rebuild, `None` once it has been despawned.
    pub fn lookup(&self, name: &str, hierarchy: &BoneHierarchy) -> Option<Entity> {
        self.bones.iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.entity)
            .filter(|&entity| hierarchy.contains(entity))
    }

    pub fn request_refresh(&mut self) {
        self.refresh_requested = true;
    }
}

/*----------+
 |  Events  |
 +----------*/
#[derive(Event, Debug, Clone, Copy)]
pub struct RefreshSkeleton;

/*-----------+
 | Functions |
 +-----------*/
pub fn collect_bones(
    owner: Entity,
    bone_set: &BoneSet,
    hierarchy: &BoneHierarchy,
) -> Vec<BoneEntry> {
    let Some(root) = hierarchy.find_own_bone(owner, bone_set.root_bone()) else {
        debug!("No '{}' joint under {:?}, registry left empty", bone_set.root_bone(), owner);
        return Vec::new();
    };

    let mut bones = Vec::<BoneEntry>::new();
    let mut stack = vec![root];
    while let Some(entity) = stack.pop() {
        // Bones of a bound skeleton parented into this one are its own
        if hierarchy.is_child_skeleton(entity) {
            continue;
        }
        if let Some(name) = hierarchy.name_of(entity) {
            if bone_set.includes(name) {
                bones.push(BoneEntry { name: name.to_string(), entity });
            }
            // Head attachments (eyes etc.) are not descended into
            if bone_set.prunes(name) {
                continue;
            }
        }
        stack.extend(hierarchy.children_of(entity).iter().rev());
    }
    bones
}

/*---------+
 | Systems |
 +---------*/
pub(crate) fn refresh_parent_skeletons(
    bone_set: Res<BoneSet>,
    hierarchy: BoneHierarchy,
    mut skeletons: Query<(Entity, &mut ParentSkeleton)>,
) {
    for (owner, mut skeleton) in skeletons.iter_mut() {
        if !skeleton.refresh_requested {
            continue;
        }
        skeleton.bones = collect_bones(owner, &bone_set, &hierarchy);
        skeleton.refresh_requested = false;
        debug!("Registry for {:?} rebuilt with {} bones", owner, skeleton.bones.len());
    }
}

pub(crate) fn on_refresh_skeleton(
    trigger: Trigger<RefreshSkeleton>,
    mut skeletons: Query<&mut ParentSkeleton>,
) {
    let Ok(mut skeleton) = skeletons.get_mut(trigger.entity()) else { return };
    skeleton.request_refresh();
}

pub(crate) fn bone_debug_draw(
    skeletons: Query<&ParentSkeleton>,
    transforms: Query<&GlobalTransform>,
    parents: Query<&Parent>,
    mut gizmos: Gizmos,
) {
    for skeleton in skeletons.iter() {
        let registered: HashSet<Entity> = skeleton.bones.iter().map(|entry| entry.entity).collect();
        for entry in skeleton.bones.iter() {
            let Ok(parent) = parents.get(entry.entity) else { continue };
            if !registered.contains(&parent.get()) { continue; }
            let (Ok(start), Ok(end)) = (transforms.get(entry.entity), transforms.get(parent.get())) else { continue };
            gizmos.line(start.translation(), end.translation(), RED);
        }
    }
}
