//! Offline generation feeding static playback: analyze a song, load it back
//! through its sidecar and replay the track.

use std::f32::consts::PI;
use std::path::Path;
use std::time::Duration;

use lightshow::control::{control_path_for, generate_track, TrackReader};
use lightshow::params::{SpectralParams, TimingParams};
use lightshow::playlist::{sidecar_path, update_sidecar, Playlist, Song};
use lightshow::session::replay_track;

const SAMPLE_RATE: u32 = 8000;
const CHANNELS: usize = 4;

/// Two seconds of silence, then a 100 Hz tone swelling over two seconds
fn write_song(path: &Path) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    let half = SAMPLE_RATE as usize * 2;
    for _ in 0..half {
        writer.write_sample(0i16).unwrap();
    }
    for i in 0..half {
        let amplitude = 2000.0 + 14000.0 * i as f32 / half as f32;
        let s = (2.0 * PI * 100.0 * i as f32 / SAMPLE_RATE as f32).sin();
        writer.write_sample((s * amplitude) as i16).unwrap();
    }
    writer.finalize().unwrap();
}

#[test]
fn test_generated_track_drives_static_replay() {
    let dir = tempfile::tempdir().unwrap();
    let audio = dir.path().join("swell.wav");
    write_song(&audio);

    let generated = generate_track(&audio, CHANNELS, &SpectralParams::default()).unwrap();
    assert_eq!(generated.rows, 80);
    update_sidecar(&sidecar_path(&audio), generated.metadata()).unwrap();

    // The sidecar alone makes the song eligible and carries its timing
    let playlist = Playlist::scan_directory(dir.path()).unwrap();
    assert_eq!(playlist.len(), 1);
    let song = Song::load(&audio).unwrap();
    let quantum = song.quantum(Duration::from_millis(25));
    assert_eq!(quantum, Duration::from_millis(50));
    assert_eq!(song.duration(), Some(Duration::from_secs(4)));
    let thresholds = song.thresholds().unwrap().to_vec();
    assert_eq!(thresholds.len(), CHANNELS);

    let track = TrackReader::open(&control_path_for(&audio), CHANNELS, quantum).unwrap();
    assert_eq!(track.len(), 80);
    let timing = TimingParams::default();
    let commands = replay_track(track.clone(), &thresholds, &timing);
    assert_eq!(commands, replay_track(track, &thresholds, &timing));

    // The tone's bucket lights during the swell and never in the silence
    let first_on = commands
        .iter()
        .position(|c| c.changes().contains(&(2, true)))
        .unwrap();
    assert!(first_on >= 40, "bucket 2 lit at row {}", first_on);
    assert!(commands[..40].iter().all(|c| c.is_empty()));
    assert_eq!(commands.len(), 81);
}

#[test]
fn test_regenerating_keeps_existing_tags() {
    let dir = tempfile::tempdir().unwrap();
    let audio = dir.path().join("tagged.wav");
    write_song(&audio);
    std::fs::write(
        sidecar_path(&audio),
        r#"{"title":"Swell","artist":null,"msPerLine":25}"#,
    )
    .unwrap();

    let generated = generate_track(&audio, CHANNELS, &SpectralParams::default()).unwrap();
    update_sidecar(&sidecar_path(&audio), generated.metadata()).unwrap();

    let song = Song::load(&audio).unwrap();
    assert_eq!(song.title.as_deref(), Some("Swell"));
    assert_eq!(song.artist, None);
    assert_eq!(song.ms_per_line, Some(50.0));
}
