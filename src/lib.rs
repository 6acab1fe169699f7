mod binder;
mod bone_set;
mod hierarchy;
mod registry;

use bevy::prelude::*;
use binder::{
    bind_child_skeletons,
    sync_child_skeletons,
    on_rebind_skeleton,
    on_reset_skeleton,
};
use registry::{
    refresh_parent_skeletons,
    on_refresh_skeleton,
    bone_debug_draw,
};

pub use binder::{
    bind_bones,
    sync_bones,
    BindState,
    BoneBinding,
    ChildSkeleton,
    RebindSkeleton,
    ResetSkeleton,
    SyncMode,
};
pub use bone_set::{
    BoneSet,
    BoneSetError,
    DEFAULT_PRUNE_BONE,
    DEFAULT_ROOT_BONE,
};
pub use hierarchy::BoneHierarchy;
pub use registry::{
    collect_bones,
    BoneEntry,
    ParentSkeleton,
    RefreshSkeleton,
};

pub mod prelude {
    pub use crate::{
        BoneBind,
        BoneBindSet,
        BoneSet,
        ChildSkeleton,
        ParentSkeleton,
        RebindSkeleton,
        RefreshSkeleton,
        ResetSkeleton,
        SyncMode,
    };
}

/*----------+
 |  Plugin  |
 +----------*/
pub struct BoneBind {
    pub bone_set: BoneSet,
    /// Draws registry bones with gizmos. Needs the gizmo plugin.
    pub debug: bool,
}

impl Default for BoneBind {
    fn default() -> Self {
        BoneBind {
            bone_set: BoneSet::default(),
            debug: false,
        }
    }
}

impl BoneBind {
    pub fn with_bone_set(mut self, bone_set: BoneSet) -> Self {
        self.bone_set = bone_set;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

impl Plugin for BoneBind {
    fn build(&self, app: &mut App) {
        app.insert_resource(self.bone_set.clone());
        app.observe(on_refresh_skeleton);
        app.observe(on_rebind_skeleton);
        app.observe(on_reset_skeleton);
        app.add_systems(Update, (
            refresh_parent_skeletons,
            bind_child_skeletons,
            sync_child_skeletons,
        ).chain().in_set(BoneBindSet));
        if self.debug {
            app.add_systems(Update, bone_debug_draw.after(BoneBindSet));
        }
    }
}

/*--------------+
 |  System Sets |
 +--------------*/
/// Registry refresh, binding and per-frame sync, in that order.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub struct BoneBindSet;
