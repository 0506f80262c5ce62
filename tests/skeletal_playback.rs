mod common;

use anyhow::{Context, Result};
use avatar_rig::bone_map::{BoneNameMapping, NamingConvention, HEAD_BONE, MIXAMO_BONES};
use avatar_rig::model::ModelKey;
use avatar_rig::pose_correction::{euler_degrees_to_quat, PoseCorrectionTable};
use avatar_rig::skeletal_player::{ClipProgress, FrameSample, MotionClip, SkeletalAnimationPlayer};
use avatar_rig::skeleton::Skeleton;
use common::{approx_quat, mixamo_skeleton};
use glam::{Quat, Vec3};

fn streamed_pose() -> FrameSample {
    FrameSample::new()
        .with_rotation("mixamorigHips", Quat::from_rotation_y(0.4))
        .with_rotation("mixamorigSpine", Quat::from_rotation_x(0.1))
        .with_rotation("mixamorigNeck", Quat::from_euler(glam::EulerRot::XYZ, 0.2, -0.3, 0.1))
        .with_rotation("mixamorigHead", Quat::from_rotation_z(-0.25))
        .with_rotation("mixamorigLeftArm", Quat::from_rotation_x(1.1))
        .with_rotation("mixamorigLeftToeBase", Quat::from_rotation_x(0.9))
}

fn bone_index(skeleton: &Skeleton, mapping: &BoneNameMapping, canonical: &str) -> Result<u32> {
    let index =
        mapping.target(canonical).map(|target| target.index).with_context(|| format!("{canonical} unmapped"))?;
    anyhow::ensure!(skeleton.bone(index).is_some(), "{canonical} index out of range");
    Ok(index)
}

#[test]
fn resolver_prefers_unprefixed_names_and_is_idempotent() -> Result<()> {
    let plain = mixamo_skeleton(false, Quat::IDENTITY)?;
    let mapping = BoneNameMapping::resolve(&plain);
    assert_eq!(mapping.len(), MIXAMO_BONES.len());
    let head = mapping.target(HEAD_BONE).context("head mapped")?;
    assert_eq!(head.name.as_ref(), "Head");
    assert_eq!(head.convention, NamingConvention::Unprefixed);
    assert_eq!(BoneNameMapping::resolve(&plain), mapping);

    let prefixed = mixamo_skeleton(true, Quat::IDENTITY)?;
    let mapping = BoneNameMapping::resolve(&prefixed);
    let head = mapping.target(HEAD_BONE).context("head mapped")?;
    assert_eq!(head.name.as_ref(), HEAD_BONE);
    assert_eq!(head.convention, NamingConvention::Prefixed);
    assert_eq!(mapping.skeleton(), Some(prefixed.id()));
    Ok(())
}

#[test]
fn resolver_skips_bones_the_rig_lacks() -> Result<()> {
    let mut skeleton = Skeleton::new();
    let hips = skeleton.add_bone("Hips", None, Vec3::Y, Quat::IDENTITY)?;
    skeleton.add_bone("Spine", Some(hips), Vec3::Y * 0.1, Quat::IDENTITY)?;
    skeleton.add_bone("tail_01", Some(hips), Vec3::NEG_Z * 0.1, Quat::IDENTITY)?;
    let mapping = BoneNameMapping::resolve(&skeleton);
    assert_eq!(mapping.len(), 2);
    assert!(mapping.target(HEAD_BONE).is_none());

    // Frames naming unmapped bones are applied without complaint.
    let player = SkeletalAnimationPlayer::new();
    let applied = player.apply_frame(&streamed_pose(), &mapping, &mut skeleton);
    assert_eq!(applied, 2);
    Ok(())
}

#[test]
fn frames_reach_the_same_world_orientation_on_different_rest_poses() -> Result<()> {
    let mut upright = mixamo_skeleton(true, Quat::IDENTITY)?;
    let mut tilted = mixamo_skeleton(false, Quat::from_rotation_x(0.3) * Quat::from_rotation_z(-0.2))?;
    let upright_map = BoneNameMapping::resolve(&upright);
    let tilted_map = BoneNameMapping::resolve(&tilted);
    let sample = streamed_pose();
    let player = SkeletalAnimationPlayer::new();

    player.apply_frame(&sample, &upright_map, &mut upright);
    player.apply_frame(&sample, &tilted_map, &mut tilted);

    for canonical in ["mixamorigHips", "mixamorigSpine", "mixamorigNeck", "mixamorigHead", "mixamorigLeftArm"] {
        let a = upright.world_rotation(bone_index(&upright, &upright_map, canonical)?);
        let b = tilted.world_rotation(bone_index(&tilted, &tilted_map, canonical)?);
        approx_quat(a, b, 1e-5);
        approx_quat(a, sample.rotations[canonical], 1e-5);
    }
    Ok(())
}

#[test]
fn world_matrices_follow_applied_rotations() -> Result<()> {
    let mut skeleton = mixamo_skeleton(true, Quat::IDENTITY)?;
    let mapping = BoneNameMapping::resolve(&skeleton);
    let head = bone_index(&skeleton, &mapping, HEAD_BONE)?;
    let before = skeleton.world_position(head).context("head position")?;

    let bend = Quat::from_rotation_x(std::f32::consts::FRAC_PI_2);
    let sample = FrameSample::new().with_rotation("mixamorigSpine", bend);
    SkeletalAnimationPlayer::new().apply_frame(&sample, &mapping, &mut skeleton);

    let after = skeleton.world_position(head).context("head position")?;
    assert!((before - after).length() > 0.1, "head should swing forward with the spine");
    Ok(())
}

#[test]
fn skip_rotation_bones_keep_their_rest_pose() -> Result<()> {
    let rest = Quat::from_rotation_y(0.2);
    let mut skeleton = mixamo_skeleton(true, rest)?;
    let mapping = BoneNameMapping::resolve(&skeleton);
    let toe = bone_index(&skeleton, &mapping, "mixamorigLeftToeBase")?;

    SkeletalAnimationPlayer::new().apply_frame(&streamed_pose(), &mapping, &mut skeleton);
    let toe_bone = skeleton.bone(toe).context("toe bone")?;
    approx_quat(toe_bone.rotation, rest, 1e-6);
    Ok(())
}

#[test]
fn pose_correction_is_composed_after_the_sample() -> Result<()> {
    let mut skeleton = mixamo_skeleton(true, Quat::IDENTITY)?;
    let mapping = BoneNameMapping::resolve(&skeleton);
    let offset = Vec3::new(0.0, 0.0, 5.0);
    let corrections = PoseCorrectionTable::new().with_offset("mixamorigLeftArm", offset);

    let mut player = SkeletalAnimationPlayer::new();
    player.retarget(ModelKey::new("woman"), &corrections, &mapping, &mut skeleton);
    assert_eq!(player.corrector().active_model(), Some("woman"));

    let sample = streamed_pose();
    player.apply_frame(&sample, &mapping, &mut skeleton);
    let arm = bone_index(&skeleton, &mapping, "mixamorigLeftArm")?;
    let expected = sample.rotations["mixamorigLeftArm"] * euler_degrees_to_quat(offset);
    approx_quat(skeleton.world_rotation(arm), expected, 1e-5);
    Ok(())
}

#[test]
fn streamed_frame_is_held_and_reapplied_on_retarget() -> Result<()> {
    let mut first = mixamo_skeleton(true, Quat::IDENTITY)?;
    let first_map = BoneNameMapping::resolve(&first);
    let mut player = SkeletalAnimationPlayer::new();
    player.push_frame(streamed_pose());
    player.tick(0.016, &first_map, &mut first);
    player.tick(0.016, &first_map, &mut first);

    let mut second = mixamo_skeleton(false, Quat::from_rotation_x(0.3))?;
    let second_map = BoneNameMapping::resolve(&second);
    player.retarget(ModelKey::new("man"), &PoseCorrectionTable::new(), &second_map, &mut second);

    let head = bone_index(&second, &second_map, HEAD_BONE)?;
    approx_quat(second.world_rotation(head), Quat::from_rotation_z(-0.25), 1e-5);
    Ok(())
}

#[test]
fn motion_clip_uses_step_sampling_and_reports_completion() -> Result<()> {
    let mut skeleton = Skeleton::new();
    let bone_a = skeleton.add_bone("boneA", None, Vec3::ZERO, Quat::IDENTITY)?;
    let mapping = BoneNameMapping::from_pairs(&skeleton, [("A", "boneA")]);
    let clip = MotionClip::from_json_slice(
        br#"{ "A": { "rotation": { "0": [0, 0, 0, 1], "1": [0, 0.707, 0, 0.707] } } }"#,
    )?;
    assert_eq!(clip.last_timestamp(), Some(1.0));

    let mut player = SkeletalAnimationPlayer::new();
    assert_eq!(player.play_clip(clip), ClipProgress::Playing);

    assert_eq!(player.tick(0.5, &mapping, &mut skeleton), None);
    approx_quat(skeleton.bone(bone_a).context("boneA")?.rotation, Quat::IDENTITY, 1e-6);

    assert_eq!(player.tick(0.5, &mapping, &mut skeleton), None);
    let quarter_turn = Quat::from_xyzw(0.0, 0.707, 0.0, 0.707).normalize();
    approx_quat(skeleton.bone(bone_a).context("boneA")?.rotation, quarter_turn, 1e-5);

    assert_eq!(player.tick(0.2, &mapping, &mut skeleton), Some(ClipProgress::Finished));
    assert!(!player.is_playing_clip());
    Ok(())
}

#[test]
fn clip_bones_fall_back_to_exact_names() -> Result<()> {
    let mut skeleton = Skeleton::new();
    let root = skeleton.add_bone("Root", None, Vec3::ZERO, Quat::IDENTITY)?;
    let clip = MotionClip::from_json_slice(br#"{ "Root": { "position": { "0": [0, 2, 0] } } }"#)?;
    let mut player = SkeletalAnimationPlayer::new();
    player.play_clip(clip);
    player.tick(0.0, &BoneNameMapping::default(), &mut skeleton);
    let translation = skeleton.bone(root).context("root")?.translation;
    assert!((translation - Vec3::new(0.0, 2.0, 0.0)).length() < 1e-6);
    Ok(())
}

#[test]
fn clip_without_timestamps_is_already_finished() -> Result<()> {
    let clip = MotionClip::from_json_slice(br#"{ "A": { "rotation": { "soon": [0, 0, 0, 1] } }, "B": {} }"#)?;
    assert!(clip.is_empty());
    let mut player = SkeletalAnimationPlayer::new();
    assert_eq!(player.play_clip(clip), ClipProgress::Finished);
    assert!(!player.is_playing_clip());
    Ok(())
}

#[test]
fn degenerate_clip_rotations_leave_the_bone_alone() -> Result<()> {
    let mut skeleton = Skeleton::new();
    let bone_a = skeleton.add_bone("boneA", None, Vec3::ZERO, Quat::from_rotation_x(0.2))?;
    let child = skeleton.add_bone("child", Some(bone_a), Vec3::Y, Quat::IDENTITY)?;
    skeleton.update_world_matrices();
    let mapping = BoneNameMapping::from_pairs(&skeleton, [("A", "boneA")]);
    let payload = br#"{ "A": { "rotation": { "0": [0, 0, 0, 0], "1": [0, 0, 0, 1] } } }"#;
    let clip = MotionClip::from_json_slice(payload)?;
    assert_eq!(clip.timestamps(), &[1.0]);

    let mut player = SkeletalAnimationPlayer::new();
    player.play_clip(clip);
    assert_eq!(player.tick(0.1, &mapping, &mut skeleton), None);
    approx_quat(skeleton.bone(bone_a).context("boneA")?.rotation, Quat::from_rotation_x(0.2), 1e-6);
    assert!(skeleton.world_position(child).context("child")?.is_finite());
    Ok(())
}

#[test]
fn degenerate_frame_rotations_are_skipped() -> Result<()> {
    let mut skeleton = mixamo_skeleton(true, Quat::IDENTITY)?;
    let mapping = BoneNameMapping::resolve(&skeleton);
    let spine = bone_index(&skeleton, &mapping, "mixamorigSpine")?;
    let head = bone_index(&skeleton, &mapping, HEAD_BONE)?;
    let sample = FrameSample::new()
        .with_rotation("mixamorigSpine", Quat::from_xyzw(0.0, 0.0, 0.0, 0.0))
        .with_rotation("mixamorigNeck", Quat::from_xyzw(f32::NAN, 0.0, 0.0, 1.0))
        .with_rotation(HEAD_BONE, Quat::from_rotation_y(0.3))
        .with_root_position(Vec3::new(f32::INFINITY, 0.0, 0.0));

    let player = SkeletalAnimationPlayer::new();
    assert_eq!(player.apply_frame(&sample, &mapping, &mut skeleton), 1);
    approx_quat(skeleton.bone(spine).context("spine")?.rotation, Quat::IDENTITY, 1e-6);
    approx_quat(skeleton.world_rotation(head), Quat::from_rotation_y(0.3), 1e-5);
    assert!(skeleton.world_position(head).context("head")?.is_finite());
    Ok(())
}

#[test]
fn malformed_clip_payload_is_an_error() {
    assert!(MotionClip::from_json_slice(b"[1, 2, 3]").is_err());
}
