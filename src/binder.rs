use bevy::prelude::*;
use std::collections::HashMap;
use crate::{
    BoneEntry,
    BoneHierarchy,
    BoneSet,
    ParentSkeleton,
};

/*---------+
 |  Types  |
 +---------*/
#[derive(Debug, Clone, PartialEq)]
pub struct BoneBinding {
    pub parent_bone: String,
    /// `inverse(parent_rotation) * child_rotation` at bind time
    pub relative_rotation: Quat,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Positions and offsets are captured once, bones are not driven afterwards.
    #[default]
    BindOnce,
    /// Hard snap of every synced bone each `Update`.
    Continuous,
    /// Moves bones toward the parent pose using `lerp_speed` and `weight`.
    Smoothed,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum BindState {
    #[default]
    Unbound,
    Bound,
}

/*------------+
 | Components |
 +------------*/
/// Root of a skeleton whose bones follow a [`ParentSkeleton`] by name.
///
/// Bones are matched on this entity and everything below it, so the
/// component may sit directly on a joint such as `pelvis`.  The parent
/// skeleton's registry never includes bones under this entity.
#[derive(Component, Debug)]
pub struct ChildSkeleton {
    /// Entity carrying the `ParentSkeleton`.  Nearest ancestor when `None`.
    pub source: Option<Entity>,
    pub mode: SyncMode,
    // Only read in SyncMode::Smoothed
    pub lerp_speed: f32,
    pub weight: f32,
    bindings: HashMap<String, BoneBinding>,
    state: BindState,
    bind_requested: bool,
    // Set by an explicit reset, blocks binding until RebindSkeleton
    held: bool,
}

impl Default for ChildSkeleton {
    fn default() -> Self {
        ChildSkeleton {
            source: None,
            mode: SyncMode::default(),
            lerp_speed: 10.0,
            weight: 1.0,
            bindings: HashMap::<String, BoneBinding>::new(),
            state: BindState::Unbound,
            bind_requested: true,
            held: false,
        }
    }
}

impl ChildSkeleton {
    pub fn with_source(mut self, source: Entity) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_mode(mut self, mode: SyncMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn state(&self) -> BindState {
        self.state
    }

    pub fn binding(&self, bone: &str) -> Option<&BoneBinding> {
        self.bindings.get(bone)
    }

    pub fn bound_bones(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    pub fn request_bind(&mut self) {
        self.bind_requested = true;
        self.held = false;
    }

    /// Unbound until the next explicit [`ChildSkeleton::request_bind`].
    pub fn reset(&mut self) {
        self.unbind();
        self.bind_requested = false;
        self.held = true;
    }

    fn unbind(&mut self) {
        self.bindings.clear();
        self.state = BindState::Unbound;
    }

    fn smoothing_factor(&self, delta_seconds: f32) -> f32 {
        (self.lerp_speed * delta_seconds).clamp(0.0, 1.0) * self.weight.clamp(0.0, 1.0)
    }
}

/*----------+
 |  Events  |
 +----------*/
/// Drops the current bindings and binds again on the next `Update`.
#[derive(Event, Debug, Clone, Copy)]
pub struct RebindSkeleton;

/// Drops the current bindings and leaves the skeleton Unbound.
#[derive(Event, Debug, Clone, Copy)]
pub struct ResetSkeleton;

/*-----------+
 | Functions |
 +-----------*/
/// Snaps every name-matched child bone onto its parent bone and records
/// `inverse(parent_rotation) * child_rotation` for it.
pub fn bind_bones(
    entries: &[BoneEntry],
    child_root: Entity,
    hierarchy: &mut BoneHierarchy,
) -> HashMap<String, BoneBinding> {
    let mut bindings = HashMap::<String, BoneBinding>::with_capacity(entries.len());
    for entry in entries.iter() {
        let Some(parent) = hierarchy.world_transform(entry.entity) else {
            debug!("Parent bone '{}' is gone, skipping", entry.name);
            continue;
        };
        let Some(child_bone) = hierarchy.find_self_or_descendant(child_root, &entry.name) else {
            debug!("No '{}' bone under {:?}, skipping", entry.name, child_root);
            continue;
        };
        let Some(child) = hierarchy.world_transform(child_bone) else {
            continue;
        };
        hierarchy.set_world_translation(child_bone, parent.translation);
        bindings.insert(entry.name.clone(), BoneBinding {
            parent_bone: entry.name.clone(),
            relative_rotation: (parent.rotation.inverse() * child.rotation).normalize(),
        });
    }
    bindings
}

/// Drives synced child bones from the parent pose.  `blend` of `None` is a
/// hard snap, `Some(t)` moves `t` of the way there.
pub fn sync_bones(
    entries: &[BoneEntry],
    bone_set: &BoneSet,
    bindings: &HashMap<String, BoneBinding>,
    child_root: Entity,
    hierarchy: &mut BoneHierarchy,
    blend: Option<f32>,
) {
    for entry in entries.iter() {
        if !bone_set.is_synced(&entry.name) {
            continue;
        }
        let Some(binding) = bindings.get(&entry.name) else {
            continue;
        };
        let Some(parent) = hierarchy.world_transform(entry.entity) else {
            continue;
        };
        let Some(child_bone) = hierarchy.find_self_or_descendant(child_root, &entry.name) else {
            continue;
        };

        let mut translation = parent.translation;
        let mut rotation = parent.rotation * binding.relative_rotation;
        if let Some(t) = blend {
            let Some(current) = hierarchy.world_transform(child_bone) else { continue };
            translation = current.translation.lerp(translation, t);
            rotation = current.rotation.slerp(rotation, t);
        }
        hierarchy.set_world_translation(child_bone, translation);
        hierarchy.set_world_rotation(child_bone, rotation);
    }
}

fn resolve_source(
    child: Entity,
    skeleton: &ChildSkeleton,
    sources: &Query<Ref<ParentSkeleton>>,
    hierarchy: &BoneHierarchy,
) -> Option<Entity> {
    match skeleton.source {
        Some(source) => sources.contains(source).then_some(source),
        None => hierarchy.ancestors(child).find(|&ancestor| sources.contains(ancestor)),
    }
}

/*---------+
 | Systems |
 +---------*/
pub(crate) fn bind_child_skeletons(
    mut children: Query<(Entity, &mut ChildSkeleton)>,
    sources: Query<Ref<ParentSkeleton>>,
    mut hierarchy: BoneHierarchy,
) {
    for (child, mut skeleton) in children.iter_mut() {
        let source = resolve_source(child, &skeleton, &sources, &hierarchy);
        let source_changed = source
            .and_then(|s| sources.get(s).ok())
            .is_some_and(|s| s.is_changed());
        let retry = skeleton.state == BindState::Unbound && !skeleton.held && source_changed;
        if !skeleton.bind_requested && !retry {
            continue;
        }

        skeleton.bind_requested = false;
        let Some(source) = source else {
            warn!("No parent skeleton found for {:?}, staying unbound", child);
            continue;
        };
        let Ok(registry) = sources.get(source) else { continue };
        let bindings = bind_bones(registry.bones(), child, &mut hierarchy);
        if bindings.is_empty() {
            debug!("No bones of {:?} matched {:?}", child, source);
            skeleton.unbind();
            continue;
        }
        info!("Bound {} bones of {:?} to {:?}", bindings.len(), child, source);
        skeleton.bindings = bindings;
        skeleton.state = BindState::Bound;
    }
}

pub(crate) fn sync_child_skeletons(
    time: Res<Time>,
    bone_set: Res<BoneSet>,
    children: Query<(Entity, &ChildSkeleton)>,
    sources: Query<Ref<ParentSkeleton>>,
    mut hierarchy: BoneHierarchy,
) {
    for (child, skeleton) in children.iter() {
        if skeleton.state != BindState::Bound { continue; }
        let blend = match skeleton.mode {
            SyncMode::BindOnce => continue,
            SyncMode::Continuous => None,
            SyncMode::Smoothed => Some(skeleton.smoothing_factor(time.delta_seconds())),
        };
        let Some(source) = resolve_source(child, skeleton, &sources, &hierarchy) else { continue };
        let Ok(registry) = sources.get(source) else { continue };
        sync_bones(registry.bones(), &bone_set, &skeleton.bindings, child, &mut hierarchy, blend);
    }
}

pub(crate) fn on_rebind_skeleton(
    trigger: Trigger<RebindSkeleton>,
    mut children: Query<&mut ChildSkeleton>,
) {
    let Ok(mut skeleton) = children.get_mut(trigger.entity()) else { return };
    skeleton.unbind();
    skeleton.request_bind();
}

pub(crate) fn on_reset_skeleton(
    trigger: Trigger<ResetSkeleton>,
    mut children: Query<&mut ChildSkeleton>,
) {
    let Ok(mut skeleton) = children.get_mut(trigger.entity()) else { return };
    skeleton.reset();
}
