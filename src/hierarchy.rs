use bevy::{
    ecs::system::SystemParam,
    prelude::*,
};
use crate::ChildSkeleton;

/// Read/write access to the bone hierarchy of the scene.
///
/// Positions and orientations here are always world-space values composed
/// from local `Transform`s up the `Parent` chain. `GlobalTransform` is not
/// used because it lags until transform propagation runs in `PostUpdate`.
#[derive(SystemParam)]
pub struct BoneHierarchy<'w, 's> {
    names: Query<'w, 's, &'static Name>,
    children: Query<'w, 's, &'static Children>,
    parents: Query<'w, 's, &'static Parent>,
    transforms: Query<'w, 's, &'static mut Transform>,
    child_skeletons: Query<'w, 's, (), With<ChildSkeleton>>,
}

impl<'w, 's> BoneHierarchy<'w, 's> {
    pub fn name_of(&self, entity: Entity) -> Option<&str> {
        self.names.get(entity).ok().map(|name| name.as_str())
    }

    pub fn children_of(&self, entity: Entity) -> &[Entity] {
        self.children.get(entity).map(|children| &**children).unwrap_or(&[])
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.transforms.contains(entity)
    }

    /// Roots of bound skeletons, whose bones belong to them and not to
    /// whatever skeleton they are parented under.
    pub fn is_child_skeleton(&self, entity: Entity) -> bool {
        self.child_skeletons.contains(entity)
    }

    // Depth first, pre-order, root excluded.  Duplicate names resolve to
    // the first hit.
    pub fn find_by_name(&self, root: Entity, name: &str) -> Option<Entity> {
        self.search(self.children_of(root).iter().rev().copied().collect(), name, false)
    }

    pub fn find_self_or_descendant(&self, root: Entity, name: &str) -> Option<Entity> {
        self.search(vec![root], name, false)
    }

    /// Like [`BoneHierarchy::find_self_or_descendant`] but never enters a
    /// subtree rooted at a [`ChildSkeleton`] below `root`.
    pub fn find_own_bone(&self, root: Entity, name: &str) -> Option<Entity> {
        self.search(vec![root], name, true)
    }

    fn search(&self, mut stack: Vec<Entity>, name: &str, skip_child_skeletons: bool) -> Option<Entity> {
        while let Some(entity) = stack.pop() {
            if skip_child_skeletons && self.is_child_skeleton(entity) {
                continue;
            }
            if self.name_of(entity) == Some(name) {
                return Some(entity);
            }
            stack.extend(self.children_of(entity).iter().rev());
        }
        None
    }

    pub fn ancestors(&self, entity: Entity) -> impl Iterator<Item = Entity> + '_ {
        std::iter::successors(
            self.parents.get(entity).ok().map(Parent::get),
            move |&current| self.parents.get(current).ok().map(Parent::get),
        )
    }

    /// `None` when the entity has been despawned or carries no transform.
    pub fn world_transform(&self, entity: Entity) -> Option<Transform> {
        let mut world = *self.transforms.get(entity).ok()?;
        for ancestor in self.ancestors(entity) {
            // Stop at the first ancestor outside the transform hierarchy
            let Ok(local) = self.transforms.get(ancestor) else { break };
            world = local.mul_transform(world);
        }
        Some(world)
    }

    fn parent_world_transform(&self, entity: Entity) -> Transform {
        self.parents.get(entity).ok()
            .and_then(|parent| self.world_transform(parent.get()))
            .unwrap_or(Transform::IDENTITY)
    }

    pub fn set_world_translation(&mut self, entity: Entity, translation: Vec3) -> bool {
        let parent = self.parent_world_transform(entity);
        let Ok(mut local) = self.transforms.get_mut(entity) else { return false };
        local.translation = parent.rotation.inverse() * (translation - parent.translation) / parent.scale;
        true
    }

    pub fn set_world_rotation(&mut self, entity: Entity, rotation: Quat) -> bool {
        let parent = self.parent_world_transform(entity);
        let Ok(mut local) = self.transforms.get_mut(entity) else { return false };
        local.rotation = (parent.rotation.inverse() * rotation).normalize();
        true
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use super::test_utils::*;
    use bevy::ecs::system::RunSystemOnce;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn find_by_name_is_preorder_and_skips_root() {
        let mut world = World::new();
        let root = spawn_bone(&mut world, "hand", Transform::IDENTITY);
        let a = spawn_child(&mut world, root, "a", Transform::IDENTITY);
        let deep = spawn_child(&mut world, a, "hand", Transform::IDENTITY);
        let _late = spawn_child(&mut world, root, "hand", Transform::IDENTITY);

        let found = world.run_system_once(move |hierarchy: BoneHierarchy| {
            (hierarchy.find_by_name(root, "hand"), hierarchy.find_self_or_descendant(root, "hand"))
        });
        assert_eq!(found, (Some(deep), Some(root)));
    }

    #[test]
    fn own_bone_search_skips_bound_skeletons() {
        let mut world = World::new();
        let owner = spawn_bone(&mut world, "character", Transform::IDENTITY);
        let shirt = spawn_child(&mut world, owner, "shirt", Transform::IDENTITY);
        world.entity_mut(shirt).insert(ChildSkeleton::default());
        let shirt_pelvis = spawn_child(&mut world, shirt, "pelvis", Transform::IDENTITY);
        let pelvis = spawn_child(&mut world, owner, "pelvis", Transform::IDENTITY);

        let found = world.run_system_once(move |hierarchy: BoneHierarchy| {
            (hierarchy.find_self_or_descendant(owner, "pelvis"), hierarchy.find_own_bone(owner, "pelvis"))
        });
        assert_eq!(found, (Some(shirt_pelvis), Some(pelvis)));
    }

    #[test]
    fn world_transform_composes_parents() {
        let mut world = World::new();
        let root = spawn_bone(&mut world, "root",
            Transform::from_xyz(1.0, 0.0, 0.0).with_rotation(Quat::from_rotation_z(FRAC_PI_2)));
        let child = spawn_child(&mut world, root, "child", Transform::from_xyz(1.0, 0.0, 0.0));

        let xform = world.run_system_once(move |hierarchy: BoneHierarchy| hierarchy.world_transform(child));
        let xform = xform.unwrap();
        assert_same_position(xform.translation, Vec3::new(1.0, 1.0, 0.0));
        assert_same_rotation(xform.rotation, Quat::from_rotation_z(FRAC_PI_2));
    }

    #[test]
    fn set_world_values_under_rotated_scaled_parent() {
        let mut world = World::new();
        let root = spawn_bone(&mut world, "root", Transform::from_xyz(0.0, 2.0, 0.0)
            .with_rotation(Quat::from_rotation_y(0.7))
            .with_scale(Vec3::splat(2.0)));
        let child = spawn_child(&mut world, root, "child", Transform::IDENTITY);
        let target_pos = Vec3::new(3.0, -1.0, 0.5);
        let target_rot = Quat::from_rotation_x(1.1);

        let xform = world.run_system_once(move |mut hierarchy: BoneHierarchy| {
            assert!(hierarchy.set_world_translation(child, target_pos));
            assert!(hierarchy.set_world_rotation(child, target_rot));
            hierarchy.world_transform(child)
        }).unwrap();
        assert_same_position(xform.translation, target_pos);
        assert_same_rotation(xform.rotation, target_rot);
    }

    #[test]
    fn despawned_bone_is_absent() {
        let mut world = World::new();
        let bone = spawn_bone(&mut world, "gone", Transform::IDENTITY);
        world.despawn(bone);
        let (xform, moved) = world.run_system_once(move |mut hierarchy: BoneHierarchy| {
            (hierarchy.world_transform(bone), hierarchy.set_world_translation(bone, Vec3::ONE))
        });
        assert!(xform.is_none());
        assert!(!moved);
    }
}
