use bevy::{
    prelude::*,
    color::palettes::css::DEEP_SKY_BLUE,
};
use bonebind::prelude::*;
use std::{
    env,
    path::PathBuf,
};

#[derive(Component)]
struct Sway;

#[derive(Component)]
struct ChildBoneTag;

fn load_bone_set() -> BoneSet {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("assets/bone_sets/default.json");
    let path = env::var("BONEBIND_BONE_SET").map(PathBuf::from).unwrap_or(path);
    match BoneSet::from_json_file(&path) {
        Ok(bone_set) => bone_set,
        Err(err) => {
            warn!("{}: {}, using compiled-in bone set", path.display(), err);
            BoneSet::default()
        }
    }
}

fn spawn_bones(
    commands: &mut Commands,
    root: Entity,
    bones: &[(&str, Option<usize>, Transform)],
    tag_children: bool,
) -> Vec<Entity> {
    let mut entities = Vec::<Entity>::with_capacity(bones.len());
    for (name, parent, transform) in bones.iter() {
        let mut bone = commands.spawn((Name::new(name.to_string()), SpatialBundle::from_transform(*transform)));
        if tag_children { bone.insert(ChildBoneTag); }
        let bone = bone.id();
        let parent = parent.map(|i| entities[i]).unwrap_or(root);
        commands.entity(parent).push_children(&[bone]);
        entities.push(bone);
    }
    entities
}

fn setup_env(mut commands: Commands) {
    // camera
    commands.spawn(Camera3dBundle {
        transform: Transform::from_xyz(0.0, 1.5, 4.0).looking_at(Vec3::Y * 1.2, Vec3::Y),
        ..default()
    });
    // point light
    commands.spawn(PointLightBundle {
        transform: Transform::from_xyz(4.0, 8.0, 5.0),
        ..default()
    });

    // parent skeleton
    let character = commands.spawn((
        Name::new("character"),
        SpatialBundle::from_transform(Transform::from_xyz(-0.5, 0.0, 0.0)),
        ParentSkeleton::default(),
    )).id();
    let parent_bones = spawn_bones(&mut commands, character, &[
        ("pelvis", None, Transform::from_xyz(0.0, 1.0, 0.0)),
        ("spine", Some(0), Transform::from_xyz(0.0, 0.25, 0.0)),
        ("neck", Some(1), Transform::from_xyz(0.0, 0.3, 0.0)),
        ("head", Some(2), Transform::from_xyz(0.0, 0.15, 0.0)),
        ("l_eye", Some(3), Transform::from_xyz(0.04, 0.08, 0.08)),
        ("l_upperarm", Some(1), Transform::from_xyz(0.2, 0.25, 0.0)),
        ("l_forearm", Some(5), Transform::from_xyz(0.3, 0.0, 0.0)),
        ("l_hand", Some(6), Transform::from_xyz(0.25, 0.0, 0.0)),
        ("l_thigh", Some(0), Transform::from_xyz(0.1, -0.05, 0.0)),
        ("l_calf", Some(8), Transform::from_xyz(0.0, -0.45, 0.0)),
    ], false);
    commands.entity(parent_bones[1]).insert(Sway);

    // child skeleton, independently authored with its own offsets
    let cape = commands.spawn((
        Name::new("cape"),
        SpatialBundle::from_transform(Transform::from_xyz(1.0, 0.0, 0.0)),
        ChildSkeleton::default()
            .with_source(character)
            .with_mode(SyncMode::Continuous),
    )).id();
    spawn_bones(&mut commands, cape, &[
        ("pelvis", None, Transform::from_xyz(0.0, 0.9, -0.1).with_rotation(Quat::from_rotation_y(0.3))),
        ("spine", Some(0), Transform::from_xyz(0.0, 0.3, 0.0).with_rotation(Quat::from_rotation_x(-0.2))),
        ("l_upperarm", Some(1), Transform::from_xyz(0.2, 0.2, 0.0)),
        ("l_hand", Some(2), Transform::from_xyz(0.5, 0.0, 0.0)),
        ("cape_tail", Some(0), Transform::from_xyz(0.0, -0.6, -0.2)),
    ], true);
}

fn sway_spine(time: Res<Time>, mut bones: Query<&mut Transform, With<Sway>>) {
    for mut transform in bones.iter_mut() {
        transform.rotation = Quat::from_rotation_z((time.elapsed_seconds() * 1.5).sin() * 0.5);
    }
}

fn child_debug_draw(
    query: Query<(&GlobalTransform, &Parent), With<ChildBoneTag>>,
    transforms: Query<&GlobalTransform, With<ChildBoneTag>>,
    mut gizmos: Gizmos,
) {
    query.iter().for_each(|(transform, parent)| {
        if let Ok(end) = transforms.get(parent.get()) {
            gizmos.line(transform.translation(), end.translation(), DEEP_SKY_BLUE);
        }
    })
}

fn rebind_on_space(
    keys: Res<ButtonInput<KeyCode>>,
    children: Query<Entity, With<ChildSkeleton>>,
    mut commands: Commands,
) {
    if !keys.just_pressed(KeyCode::Space) { return; }
    for child in children.iter() {
        commands.trigger_targets(RebindSkeleton, child);
    }
}

fn main() {
    App::new()
        .add_plugins(DefaultPlugins)
        .add_plugins(BoneBind::default().with_bone_set(load_bone_set()).with_debug(true))
        .add_systems(Startup, setup_env)
        .add_systems(Update, (
            sway_spine.before(BoneBindSet),
            child_debug_draw.after(BoneBindSet),
            rebind_on_space,
        ))
        .run();
}
