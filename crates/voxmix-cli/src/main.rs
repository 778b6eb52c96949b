//! voxmix - play files through the mixer on the default output device.

mod args;

use anyhow::{Context, Result};
use crossbeam_channel::RecvTimeoutError;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voxmix_audio::{
    load_chunk, output, AudioOutput, Loops, Mixer, MixerConfig, MixerEvent, MusicId,
    PrefetchDecoder, SymphoniaDecoder,
};

/// Audio decoded ahead of playback for each music stream.
const PREFETCH_SECONDS: usize = 2;

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voxmix=info,voxmix_audio=info".into()),
        )
        .init();

    let matches = args::build_cli().get_matches();

    if matches.get_flag("list-devices") {
        let default = output::default_device_name();
        for name in output::list_output_devices()? {
            let marker = if default.as_deref() == Some(name.as_str()) { "*" } else { " " };
            println!("{marker} {name}");
        }
        return Ok(());
    }

    let config = match matches.get_one::<String>("config") {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {path}"))?;
            MixerConfig::from_json_str(&text)?
        }
        None => MixerConfig::default(),
    };

    info!("Starting voxmix v{}", env!("CARGO_PKG_VERSION"));

    let mixer = Mixer::open(config.clone())?;
    let sink = AudioOutput::open(&mixer)?;
    info!("Output: {} ({:?})", sink.device_name(), sink.sample_format());

    let path = matches
        .get_one::<String>("FILE")
        .context("no music file given")?;
    let loops = Loops::from(*matches.get_one::<i32>("loops").unwrap_or(&0));
    let volume = *matches.get_one::<i32>("volume").unwrap_or(&128);

    let first = load_music(&mixer, &config, path)?;
    mixer.volume_music(first, volume)?;
    match matches.get_one::<u32>("fade-in") {
        Some(&ms) => mixer.fade_in_music(first, loops, ms)?,
        None => mixer.play_music(first, loops)?,
    }
    log_metadata(&mixer, first);

    if let Some(sfx) = matches.get_one::<String>("sfx") {
        let chunk = load_chunk(sfx, &config).with_context(|| format!("loading {sfx}"))?;
        let channel = mixer.play_channel(None, &chunk, 0)?;
        info!("Sound effect {sfx} on channel {channel}");
    }

    let mut current = first;
    if let Some(next_path) = matches.get_one::<String>("then") {
        let switch_after = *matches.get_one::<f64>("switch-after").unwrap_or(&10.0);
        let crossfade = *matches.get_one::<u32>("crossfade").unwrap_or(&3000);

        let next = load_music(&mixer, &config, next_path)?;
        mixer.volume_music(next, volume)?;

        if wait_for_finish(&mixer, first, Some(Duration::from_secs_f64(switch_after.max(0.0)))) {
            mixer.play_music(next, loops)?;
        } else {
            info!("Crossfading into {next_path} over {crossfade} ms");
            mixer.cross_fade_music(first, next, loops, crossfade, None, true)?;
        }
        log_metadata(&mixer, next);
        current = next;
    }

    wait_for_finish(&mixer, current, None);
    mixer.close();
    info!("Done");
    Ok(())
}

fn load_music(mixer: &Mixer, config: &MixerConfig, path: &str) -> Result<MusicId> {
    let decoder =
        SymphoniaDecoder::open(path, config).with_context(|| format!("opening {path}"))?;
    let prefetch_frames = config.frequency as usize * PREFETCH_SECONDS;
    let decoder = PrefetchDecoder::spawn(decoder, config, prefetch_frames)?;
    Ok(mixer.load_music(decoder)?)
}

fn log_metadata(mixer: &Mixer, id: MusicId) {
    let tags = mixer.music_tags(id).unwrap_or_default();
    let duration = mixer.music_duration(id).ok().flatten();
    info!(
        "Playing {}{} ({:?}, {})",
        tags.title.as_deref().unwrap_or("untitled"),
        tags.artist.map(|a| format!(" by {a}")).unwrap_or_default(),
        mixer.music_type(id).unwrap_or_default(),
        duration.map_or_else(|| "unknown length".to_string(), |d| format!("{d:.1}s")),
    );
}

/// Block until `id` finishes or `limit` elapses. Returns whether it finished.
fn wait_for_finish(mixer: &Mixer, id: MusicId, limit: Option<Duration>) -> bool {
    let events = mixer.events();
    let deadline = limit.map(|limit| Instant::now() + limit);
    loop {
        let timeout = deadline.map_or(Duration::from_millis(500), |d| {
            d.saturating_duration_since(Instant::now())
        });
        match events.recv_timeout(timeout) {
            Ok(MixerEvent::MusicFinished(finished)) if finished == id => return true,
            Ok(MixerEvent::DecoderFailed { music, message }) => {
                warn!("{music} failed: {message}");
            }
            Ok(_) => {}
            Err(RecvTimeoutError::Timeout) => {
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    return false;
                }
                if !mixer.playing_music(id).unwrap_or(false) {
                    return true;
                }
            }
            Err(RecvTimeoutError::Disconnected) => return true,
        }
    }
}
