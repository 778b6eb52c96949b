//! Channel pool behavior through a headless mixer.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use parking_lot::Mutex;
use std::sync::Arc;
use voxmix_audio::{
    Chunk, EffectOwner, Error, Fading, Loops, Mixer, MixerConfig, MixerEvent, Which,
    EVENT_QUEUE_CAPACITY,
};

fn cd_mixer(pool_size: usize) -> Mixer {
    Mixer::open(MixerConfig {
        frequency: 44100,
        channels: 2,
        buffer_frames: 512,
        pool_size,
        ..MixerConfig::default()
    })
    .unwrap()
}

fn small_mixer(pool_size: usize) -> Mixer {
    Mixer::open(MixerConfig {
        frequency: 1000,
        channels: 1,
        buffer_frames: 100,
        pool_size,
        ..MixerConfig::default()
    })
    .unwrap()
}

/// Record every finished channel, in order.
fn record_finished(mixer: &Mixer) -> Arc<Mutex<Vec<usize>>> {
    let finished = Arc::new(Mutex::new(Vec::new()));
    let sink = finished.clone();
    mixer.on_channel_finished(Some(Box::new(move |index: usize| sink.lock().push(index))));
    finished
}

#[test]
fn test_one_second_chunk_halts_after_87_cycles() {
    let mixer = cd_mixer(8);
    let config = mixer.query_spec();
    let chunk = Chunk::from_pcm(&vec![4000i16; 44100], 1, &config);
    assert_eq!(chunk.samples().len(), 88200);

    let channel = mixer.play_channel(None, &chunk, 0).unwrap();
    let mut out = vec![0i16; config.buffer_samples()];
    for _ in 0..86 {
        mixer.render(&mut out);
    }
    assert_eq!(mixer.playing(channel).unwrap(), 1);
    assert!(out.iter().all(|&s| s == 4000));

    mixer.render(&mut out);
    assert_eq!(mixer.playing(channel).unwrap(), 0);
    assert_eq!(mixer.try_recv_event(), Some(MixerEvent::ChannelFinished(channel)));
}

#[test]
fn test_full_pool_reclaims_oldest_before_new_audio() {
    let mixer = small_mixer(3);
    let finished = record_finished(&mixer);
    let quiet = Chunk::from_samples(vec![10; 10_000]);
    let loud = Chunk::from_samples(vec![1000; 10_000]);

    mixer.play_channel(None, &quiet, 0).unwrap();
    mixer.render_cycles(1);
    mixer.play_channel(None, &quiet, 0).unwrap();
    mixer.play_channel(None, &quiet, 0).unwrap();
    mixer.render_cycles(1);

    let reclaimed = mixer.play_channel(None, &loud, 0).unwrap();
    assert_eq!(reclaimed, 0);
    // The hook ran before the call returned, so before any sample of the
    // new chunk was rendered.
    assert_eq!(*finished.lock(), [0]);
    assert_eq!(mixer.playing(Which::All).unwrap(), 3);

    let out = mixer.render_cycles(1);
    assert!(out.iter().all(|&s| s == 1020));
}

#[test]
fn test_reserved_channels_are_not_reclaimed() {
    let mixer = small_mixer(3);
    let chunk = Chunk::from_samples(vec![1; 10_000]);
    mixer.reserve_channels(1).unwrap();
    mixer.play_channel(Some(0), &chunk, 0).unwrap();
    assert_eq!(mixer.play_channel(None, &chunk, 0).unwrap(), 1);
    assert_eq!(mixer.play_channel(None, &chunk, 0).unwrap(), 2);
    assert_eq!(mixer.play_channel(None, &chunk, 0).unwrap(), 1);
}

#[test]
fn test_explicit_channel_out_of_range() {
    let mixer = small_mixer(2);
    let chunk = Chunk::from_samples(vec![1; 10]);
    assert!(matches!(
        mixer.play_channel(Some(2), &chunk, 0),
        Err(Error::NoChannelAvailable)
    ));
    assert!(matches!(
        mixer.halt_channel(2usize),
        Err(Error::InvalidChannel(2))
    ));
}

#[test]
fn test_fade_out_halts_at_first_boundary_after_duration() {
    let mixer = cd_mixer(8);
    let chunk = Chunk::from_samples(vec![10_000; 1024]);
    let channel = mixer.play_channel(None, &chunk, Loops::Infinite).unwrap();
    assert_eq!(mixer.fade_out_channel(channel, 1000).unwrap(), 1);

    let samples = mixer.query_spec().buffer_samples();
    let mut gains = Vec::new();
    let mut out = vec![0i16; samples];
    for _ in 0..86 {
        mixer.render(&mut out);
        gains.push(out[0]);
    }
    // 86 cycles is 44032 frames, short of 44100.
    assert_eq!(mixer.playing(channel).unwrap(), 1);
    assert!(gains.windows(2).all(|w| w[1] <= w[0]));
    assert_eq!(gains[0], 10_000);
    assert!((i32::from(gains[43]) - 5000).abs() <= 100);
    assert!(gains[85] > 0);

    mixer.render(&mut out);
    assert_eq!(mixer.playing(channel).unwrap(), 0);
    assert_eq!(mixer.try_recv_event(), Some(MixerEvent::ChannelFinished(channel)));
}

#[test]
fn test_fade_in_reaches_volume() {
    let mixer = small_mixer(2);
    let chunk = Chunk::from_samples(vec![1280; 10_000]);
    let channel = mixer
        .fade_in_channel_timed(None, &chunk, 0, 400, None, Some(64))
        .unwrap();
    assert_eq!(mixer.channel_volume(channel).unwrap(), 64);

    let first = mixer.render_cycles(1);
    assert_eq!(first[0], 0);
    let second = mixer.render_cycles(1);
    assert_eq!(second[0], 160);
    mixer.render_cycles(2);
    assert_eq!(mixer.fading_channel(channel).unwrap(), voxmix_audio::Fading::None);
    assert!(mixer.render_cycles(1).iter().all(|&s| s == 640));
}

#[test]
fn test_fade_out_during_fade_in_starts_from_current_level() {
    let mixer = small_mixer(2);
    let chunk = Chunk::from_samples(vec![1280; 10_000]);
    let channel = mixer
        .fade_in_channel_timed(None, &chunk, 0, 1000, None, None)
        .unwrap();
    assert_eq!(mixer.render_cycles(1)[0], 0);
    assert_eq!(mixer.render_cycles(1)[0], 120);

    // A fifth of the way in, so the fade-out starts at a fifth.
    assert_eq!(mixer.fade_out_channel(channel, 1000).unwrap(), 1);
    assert_eq!(mixer.fading_channel(channel).unwrap(), Fading::Out);
    let mut levels = Vec::new();
    for _ in 0..9 {
        levels.push(mixer.render_cycles(1)[0]);
    }
    assert_eq!(levels[..2], [250, 230]);
    assert!(levels.windows(2).all(|w| w[1] <= w[0]));
    assert_eq!(mixer.playing(channel).unwrap(), 1);

    mixer.render_cycles(1);
    assert_eq!(mixer.playing(channel).unwrap(), 0);
}

#[test]
fn test_control_thread_races_render() {
    let mixer = small_mixer(4);
    let chunk = Chunk::from_samples(vec![100; 250]);
    let control = {
        let mixer = mixer.clone();
        let chunk = chunk.clone();
        std::thread::spawn(move || {
            for round in 0..2000usize {
                let channel = round % 4;
                mixer.play_channel(Some(channel), &chunk, 1).unwrap();
                mixer.volume(channel, i32::try_from(round % 129).unwrap()).unwrap();
                match round % 3 {
                    0 => {
                        mixer.fade_out_channel(channel, 50).unwrap();
                    }
                    1 => mixer.halt_channel(channel).unwrap(),
                    _ => {
                        mixer.expire_channel(channel, Some(20)).unwrap();
                    }
                }
            }
        })
    };

    let mut out = vec![0i16; mixer.query_spec().buffer_samples()];
    while !control.is_finished() {
        mixer.render(&mut out);
        // Four voices of 100 at most.
        assert!(out.iter().all(|&s| (0..=400).contains(&s)));
    }
    control.join().unwrap();

    mixer.halt_channel(Which::All).unwrap();
    assert_eq!(mixer.playing(Which::All).unwrap(), 0);
    assert!(mixer.render_cycles(1).iter().all(|&s| s == 0));
}

#[test]
fn test_unread_events_stay_bounded() {
    let mixer = small_mixer(2);
    let chunk = Chunk::from_samples(vec![1; 10]);
    for round in 0..10_000usize {
        mixer.play_channel(Some(round % 2), &chunk, 0).unwrap();
        mixer.render_cycles(1);
    }

    let events: Vec<MixerEvent> = mixer.events().try_iter().collect();
    assert!(events.len() <= EVENT_QUEUE_CAPACITY);
    assert!(mixer.dropped_events() > 0);
    // The oldest go first.
    assert_eq!(events.last(), Some(&MixerEvent::ChannelFinished(1)));
}

#[test]
fn test_effects_cost_scratch_copy_only_when_registered() {
    let mixer = small_mixer(2);
    let chunk = Chunk::from_samples(vec![100; 10_000]);
    mixer.play_channel(Some(0), &chunk, 0).unwrap();
    mixer.play_channel(Some(1), &chunk, 0).unwrap();

    mixer.render_cycles(2);
    assert_eq!(mixer.stats().scratch_copies, 0);

    mixer
        .register_effect(
            EffectOwner::Channel(1),
            Box::new(|_: EffectOwner, buf: &mut [i16]| buf.iter_mut().for_each(|s| *s *= 2)),
            None,
        )
        .unwrap();
    let out = mixer.render_cycles(1);
    assert_eq!(mixer.stats().scratch_copies, 1);
    assert!(out.iter().all(|&s| s == 300));
}

#[test]
fn test_effect_done_fires_when_channel_stops() {
    let mixer = small_mixer(2);
    let chunk = Chunk::from_samples(vec![1; 150]);
    let done = Arc::new(Mutex::new(Vec::new()));
    let sink = done.clone();
    let channel = mixer.play_channel(None, &chunk, 0).unwrap();
    mixer
        .register_effect(
            EffectOwner::Channel(channel),
            Box::new(|_: EffectOwner, _: &mut [i16]| {}),
            Some(Box::new(move |owner: EffectOwner| sink.lock().push(owner))),
        )
        .unwrap();

    mixer.render_cycles(1);
    assert!(done.lock().is_empty());
    mixer.render_cycles(1);
    assert_eq!(*done.lock(), [EffectOwner::Channel(channel)]);
    assert_eq!(mixer.effect_count(EffectOwner::Channel(channel)).unwrap(), 0);
}

#[test]
fn test_group_halt_leaves_others_untouched() {
    let mixer = small_mixer(8);
    let finished = record_finished(&mixer);
    let chunk = Chunk::from_samples(vec![1; 10_000]);
    for channel in 0..8 {
        mixer.play_channel(Some(channel), &chunk, 0).unwrap();
    }
    for channel in [2, 5, 7] {
        mixer.group_channel(channel, 9).unwrap();
    }
    assert_eq!(mixer.group_count(9).unwrap(), 3);

    assert_eq!(mixer.halt_group(9).unwrap(), 3);
    assert_eq!(*finished.lock(), [2, 5, 7]);
    for channel in 0..8usize {
        let expected = usize::from(![2, 5, 7].contains(&channel));
        assert_eq!(mixer.playing(channel).unwrap(), expected);
    }
    assert_eq!(mixer.group_available(9).unwrap(), Some(2));
    assert_eq!(mixer.group_oldest(9).unwrap(), None);
}

#[test]
fn test_volume_round_trip_and_clamp() {
    let mixer = small_mixer(4);
    for v in [0, 1, 64, 127, 128] {
        mixer.volume(3usize, v).unwrap();
        assert_eq!(i32::from(mixer.channel_volume(3).unwrap()), v);
    }
    assert_eq!(mixer.volume(3usize, 500).unwrap(), 128);
    assert_eq!(mixer.channel_volume(3).unwrap(), 128);
    mixer.volume(3usize, -20).unwrap();
    assert_eq!(mixer.channel_volume(3).unwrap(), 0);

    // Average of 128, 128, 128 and 0.
    assert_eq!(mixer.volume(Which::All, 100).unwrap(), 96);
    assert!(matches!(mixer.volume(4usize, 10), Err(Error::InvalidChannel(4))));
}

#[test]
fn test_pause_shifts_expiration() {
    let mixer = small_mixer(2);
    let chunk = Chunk::from_samples(vec![5; 100_000]);
    let channel = mixer
        .play_channel_timed(None, &chunk, 0, Some(500))
        .unwrap();

    mixer.render_cycles(2);
    mixer.pause(channel).unwrap();
    assert_eq!(mixer.paused(Which::All).unwrap(), 1);
    let silent = mixer.render_cycles(5);
    assert!(silent.iter().all(|&s| s == 0));
    mixer.resume(channel).unwrap();

    mixer.render_cycles(3);
    assert_eq!(mixer.playing(channel).unwrap(), 1);
    mixer.render_cycles(1);
    assert_eq!(mixer.playing(channel).unwrap(), 0);
}

#[test]
fn test_expire_and_cancel() {
    let mixer = small_mixer(2);
    let chunk = Chunk::from_samples(vec![5; 100_000]);
    mixer.play_channel(Some(0), &chunk, 0).unwrap();
    mixer.play_channel(Some(1), &chunk, 0).unwrap();

    assert_eq!(mixer.expire_channel(Which::All, Some(100)).unwrap(), 2);
    mixer.expire_channel(1usize, None).unwrap();
    mixer.render_cycles(2);
    assert_eq!(mixer.playing(0usize).unwrap(), 0);
    assert_eq!(mixer.playing(1usize).unwrap(), 1);
}

#[test]
fn test_free_chunk_halts_every_user() {
    let mixer = small_mixer(4);
    let shared = Chunk::from_samples(vec![1; 1000]);
    let other = Chunk::from_samples(vec![2; 1000]);
    mixer.play_channel(None, &shared, 0).unwrap();
    mixer.play_channel(None, &other, 0).unwrap();
    mixer.play_channel(None, &shared, 0).unwrap();

    assert_eq!(mixer.free_chunk(&shared).unwrap(), 2);
    assert_eq!(mixer.playing(Which::All).unwrap(), 1);
    assert!(mixer
        .chunk(1)
        .unwrap()
        .is_some_and(|c| Arc::ptr_eq(&c, &other)));
}

#[test]
fn test_panning_splits_stereo() {
    let mixer = cd_mixer(2);
    let chunk = Chunk::from_samples(vec![1000; 100_000]);
    let channel = mixer.play_channel(None, &chunk, 0).unwrap();
    mixer
        .set_panning(EffectOwner::Channel(channel), 255, 0)
        .unwrap();
    let out = mixer.render_cycles(1);
    assert!(out.chunks_exact(2).all(|f| f[0] == 1000 && f[1] == 0));

    mixer
        .set_reverse_stereo(EffectOwner::Channel(channel), true)
        .unwrap();
    let out = mixer.render_cycles(1);
    assert!(out.chunks_exact(2).all(|f| f[0] == 0 && f[1] == 1000));
}
