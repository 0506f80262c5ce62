mod common;

use anyhow::Result;
use avatar_rig::channels::ChannelStore;
use avatar_rig::config::ExpressionConfig;
use avatar_rig::expression::{
    keyframe, ExpressionLibrary, ExpressionPhase, ExpressionPlayer, ExpressionTemplate,
};
use avatar_rig::model::ModelKey;
use common::{approx, man_preset, woman_preset};

const STEP: f32 = 0.05;

fn player() -> ExpressionPlayer {
    let mut player = ExpressionPlayer::new(&ExpressionConfig::default(), ExpressionLibrary::builtin());
    player.retarget(ModelKey::new("woman"));
    player
}

/// Tick until the session ends, returning the finished name. Bails after `limit` seconds.
fn run_to_end(player: &mut ExpressionPlayer, channels: &mut ChannelStore, limit: f32) -> Option<String> {
    let mut elapsed = 0.0;
    while elapsed < limit {
        if let Some(done) = player.tick(STEP, channels) {
            return Some(done);
        }
        elapsed += STEP;
    }
    None
}

#[test]
fn happy_reaches_its_keyframe_value_and_restores_to_baseline() -> Result<()> {
    let mut channels = ChannelStore::new(&woman_preset().channel_map());
    let mut player = player();
    assert_eq!(player.play("happy", &channels)?, None);

    // Progress 0.3 of a 2000 ms template.
    for _ in 0..12 {
        player.tick(STEP, &mut channels);
    }
    approx(channels.weight("mouthSmileLeft"), 0.8, 1e-4);
    approx(channels.weight("mouthSmileRight"), 0.8, 1e-4);
    assert_eq!(player.current().map(|(_, phase)| phase), Some(ExpressionPhase::Playing));

    assert_eq!(run_to_end(&mut player, &mut channels, 5.0).as_deref(), Some("happy"));
    assert_eq!(channels.weight("mouthSmileLeft"), 0.0);
    assert_eq!(channels.weight("mouthSmileRight"), 0.0);
    assert_eq!(channels.weight("cheekSquintLeft"), 0.0);
    assert!(!player.is_playing());
    Ok(())
}

#[test]
fn restore_waits_for_the_delay_then_eases_back() -> Result<()> {
    let mut channels = ChannelStore::new(&woman_preset().channel_map());
    let mut player = player();
    player.play("happy", &channels)?;
    for _ in 0..41 {
        player.tick(STEP, &mut channels);
    }
    // Template done: holding at its last keyframe.
    assert_eq!(player.current().map(|(_, phase)| phase), Some(ExpressionPhase::Holding));
    approx(channels.weight("mouthSmileLeft"), 0.5, 1e-4);

    for _ in 0..6 {
        player.tick(STEP, &mut channels);
    }
    assert_eq!(player.current().map(|(_, phase)| phase), Some(ExpressionPhase::Restoring));
    let midway = channels.weight("mouthSmileLeft");
    assert!(midway < 0.5 && midway > 0.0, "restore should be between hold and baseline, got {midway}");
    Ok(())
}

#[test]
fn symmetric_channel_falls_back_to_bare_name() -> Result<()> {
    let mut channels = ChannelStore::new(&man_preset().channel_map());
    let mut player = player();
    player.play("happy", &channels)?;
    for _ in 0..12 {
        player.tick(STEP, &mut channels);
    }
    approx(channels.weight("mouthSmile"), 0.8, 1e-4);
    // Only the left side exists for cheekSquint on this model.
    approx(channels.weight("cheekSquintLeft"), 0.4, 1e-4);
    Ok(())
}

#[test]
fn gaze_channels_are_bit_identical_across_every_template() -> Result<()> {
    let mut library = ExpressionLibrary::builtin();
    library.insert(ExpressionTemplate::new(
        "stare",
        600.0,
        vec![
            keyframe(0.0, &[("eyeLookIn", 0.0), ("eyeTrackX", 0.0), ("eyeLookUp", 0.0), ("jawOpen", 0.0)]),
            keyframe(1.0, &[("eyeLookIn", 1.0), ("eyeTrackX", 1.0), ("eyeLookUp", 1.0), ("jawOpen", 0.6)]),
        ],
    )?);
    let mut player = ExpressionPlayer::new(&ExpressionConfig::default(), library);
    player.retarget(ModelKey::new("woman"));

    let mut channels = ChannelStore::new(&woman_preset().channel_map());
    let frozen = [
        ("eyeLookOutLeft", 0.42),
        ("eyeLookInRight", 0.42),
        ("eyeLookUpLeft", 0.13),
        ("eyeLookDownRight", 0.07),
        ("eyeTrackX", 0.3),
    ];
    for (name, weight) in frozen {
        channels.set(name, weight);
    }
    let gaze_bits = |channels: &ChannelStore| -> Vec<u32> {
        channels.iter().filter(|(name, _)| channels.is_gaze(name)).map(|(_, weight)| weight.to_bits()).collect()
    };
    let before = gaze_bits(&channels);
    assert_eq!(before.len(), 9);

    let names: Vec<String> = player.library().names().into_iter().map(str::to_string).collect();
    for name in names {
        player.play(&name, &channels)?;
        assert_eq!(run_to_end(&mut player, &mut channels, 10.0).as_deref(), Some(name.as_str()));
        assert_eq!(gaze_bits(&channels), before, "'{name}' touched a gaze channel");
    }
    assert!(player.baseline().is_some_and(|baseline| baseline.weight("eyeTrackX").is_none()));
    Ok(())
}

#[test]
fn playing_again_cancels_the_running_session() -> Result<()> {
    let mut channels = ChannelStore::new(&woman_preset().channel_map());
    let mut player = player();
    player.play("sad", &channels)?;
    for _ in 0..10 {
        player.tick(STEP, &mut channels);
    }
    let frown = channels.weight("mouthFrownLeft");
    assert!(frown > 0.0);

    assert_eq!(player.play("surprised", &channels)?.as_deref(), Some("sad"));
    assert_eq!(player.current().map(|(name, _)| name), Some("surprised"));
    // Cancelling leaves the old weights alone; the baseline from the first session is kept.
    assert_eq!(channels.weight("mouthFrownLeft"), frown);
    assert_eq!(player.baseline().and_then(|baseline| baseline.weight("mouthFrownLeft")), Some(0.0));

    assert_eq!(run_to_end(&mut player, &mut channels, 10.0).as_deref(), Some("surprised"));
    assert_eq!(channels.weight("mouthFrownLeft"), 0.0, "touched-by-baseline channel restored");
    Ok(())
}

#[test]
fn retarget_cancels_and_forgets_the_baseline() -> Result<()> {
    let channels = ChannelStore::new(&woman_preset().channel_map());
    let mut player = player();
    player.play("happy", &channels)?;
    assert!(player.baseline().is_some());

    assert_eq!(player.retarget(ModelKey::new("man")).as_deref(), Some("happy"));
    assert!(!player.is_playing());
    assert!(player.baseline().is_none());
    assert_eq!(player.target().map(ModelKey::name), Some("man"));
    Ok(())
}

#[test]
fn baseline_skips_visemes_and_blink() -> Result<()> {
    let mut channels = ChannelStore::new(&woman_preset().channel_map());
    channels.set("browInnerUp", 0.25);
    channels.set("viseme_aa", 0.5);
    channels.set("eyeBlinkLeft", 0.9);
    let mut player = player();
    player.play("thinking", &channels)?;
    let baseline = player.baseline().cloned().ok_or_else(|| anyhow::anyhow!("baseline captured"))?;
    assert_eq!(baseline.weight("browInnerUp"), Some(0.25));
    assert_eq!(baseline.weight("viseme_aa"), None);
    assert_eq!(baseline.weight("eyeBlinkLeft"), None);
    assert_eq!(baseline.weight("eyeLookOutLeft"), None);

    assert!(run_to_end(&mut player, &mut channels, 10.0).is_some());
    approx(channels.weight("browInnerUp"), 0.25, 1e-6);
    assert_eq!(channels.weight("viseme_aa"), 0.5, "visemes are left to lip sync");
    Ok(())
}

#[test]
fn unknown_template_is_an_error() {
    let channels = ChannelStore::new(&woman_preset().channel_map());
    let mut player = player();
    assert!(player.play("sneeze", &channels).is_err());
    assert!(!player.is_playing());
}

#[test]
fn releasing_eases_back_to_baseline_without_finishing() -> Result<()> {
    let mut channels = ChannelStore::new(&woman_preset().channel_map());
    channels.set("browInnerUp", 0.2);
    let mut player = player();
    player.play("happy", &channels)?;
    for _ in 0..12 {
        player.tick(STEP, &mut channels);
    }
    approx(channels.weight("mouthSmileLeft"), 0.8, 1e-4);

    assert_eq!(player.release(&channels).as_deref(), Some("happy"));
    assert_eq!(player.release(&channels), None, "already releasing");
    assert_eq!(player.current().map(|(_, phase)| phase), Some(ExpressionPhase::Restoring));

    player.tick(STEP, &mut channels);
    let easing = channels.weight("mouthSmileLeft");
    assert!(easing < 0.8 && easing > 0.0, "release eases rather than jumps, got {easing}");

    assert_eq!(run_to_end(&mut player, &mut channels, 2.0), None);
    assert!(!player.is_playing());
    assert_eq!(channels.weight("mouthSmileLeft"), 0.0);
    assert_eq!(channels.weight("mouthSmileRight"), 0.0);
    approx(channels.weight("browInnerUp"), 0.2, 1e-6);
    Ok(())
}

#[test]
fn playing_over_a_release_does_not_report_it_twice() -> Result<()> {
    let mut channels = ChannelStore::new(&woman_preset().channel_map());
    let mut player = player();
    player.play("sad", &channels)?;
    player.tick(STEP, &mut channels);
    assert_eq!(player.release(&channels).as_deref(), Some("sad"));
    assert_eq!(player.play("happy", &channels)?, None);
    assert_eq!(player.current(), Some(("happy", ExpressionPhase::Playing)));
    Ok(())
}
