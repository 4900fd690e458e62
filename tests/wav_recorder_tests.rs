// Integration tests for the WAV file capture source
//
// These tests write short WAV fixtures and check that the recorder paces
// them out as PCM chunks and honors pause/stop.

use anyhow::Result;
use media_relay::{
    AudioFile, CaptureSource, MediaChunk, Recorder, RecorderSettings, RecorderState,
    WavFileRecorder, WavFileSource,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

const SETTINGS: RecorderSettings = RecorderSettings {
    audio_bitrate: 128_000,
    video_bitrate: 3_000_000,
};

fn write_wav(dir: &Path, name: &str, sample_rate: u32, channels: u16, samples: usize) -> Result<PathBuf> {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(&path, spec)?;
    for i in 0..samples {
        writer.write_sample((i % 1000) as i16)?;
    }
    writer.finalize()?;

    Ok(path)
}

async fn collect(mut rx: mpsc::Receiver<MediaChunk>) -> Vec<MediaChunk> {
    let mut chunks = Vec::new();
    while let Ok(Some(chunk)) = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
        chunks.push(chunk);
    }
    chunks
}

#[test]
fn test_audio_file_open() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = write_wav(temp_dir.path(), "tone.wav", 16000, 1, 8000)?;

    let audio = AudioFile::open(&path)?;

    assert_eq!(audio.sample_rate, 16000);
    assert_eq!(audio.channels, 1);
    assert_eq!(audio.samples.len(), 8000);
    assert!((audio.duration_seconds - 0.5).abs() < 0.001);
    assert!(audio.path.contains("tone.wav"));

    Ok(())
}

#[test]
fn test_audio_file_nonexistent() {
    let result = AudioFile::open("/nonexistent/path/to/audio.wav");

    assert!(result.is_err(), "Opening nonexistent file should fail");
}

#[test]
fn test_audio_file_rejects_non_16_bit() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("deep.wav");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 48000,
        bits_per_sample: 24,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec)?;
    writer.write_sample(0i32)?;
    writer.finalize()?;

    assert!(AudioFile::open(&path).is_err());

    Ok(())
}

#[test]
fn test_pcm_chunks_cover_timeslice() -> Result<()> {
    let temp_dir = TempDir::new()?;
    // 0.45s of 16kHz stereo
    let path = write_wav(temp_dir.path(), "stereo.wav", 16000, 2, 14400)?;
    let audio = AudioFile::open(&path)?;

    let chunks = audio.pcm_chunks(Duration::from_millis(100));

    // 100ms of 16kHz stereo = 3200 samples = 6400 bytes
    assert_eq!(chunks.len(), 5);
    assert!(chunks[..4].iter().all(|c| c.len() == 6400));
    assert_eq!(chunks[4].len(), 3200);

    // Little-endian PCM
    assert_eq!(&chunks[0][..4], &[0, 0, 1, 0]);

    Ok(())
}

#[tokio::test]
async fn test_recorder_relays_whole_file() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = write_wav(temp_dir.path(), "take.wav", 16000, 1, 8000)?;

    let recorder = WavFileRecorder::new(path, SETTINGS);
    assert_eq!(recorder.state(), RecorderState::Inactive);

    let rx = recorder.start(Duration::from_millis(100)).await?;
    assert_eq!(recorder.state(), RecorderState::Recording);

    let chunks = collect(rx).await;

    assert_eq!(chunks.len(), 5);
    assert_eq!(chunks.iter().map(|c| c.data.len()).sum::<usize>(), 16000);
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.sequence, i as u64);
        assert_eq!(chunk.timestamp_ms, i as u64 * 100);
    }

    // Source exhausted: production has ended on its own
    assert_eq!(recorder.state(), RecorderState::Inactive);
    recorder.stop().await?;

    Ok(())
}

#[tokio::test]
async fn test_recorder_start_fails_for_missing_file() {
    let recorder = WavFileRecorder::new(PathBuf::from("/nonexistent/take.wav"), SETTINGS);

    assert!(recorder.start(Duration::from_millis(250)).await.is_err());
    assert_eq!(recorder.state(), RecorderState::Inactive);
}

#[tokio::test]
async fn test_recorder_stop_ends_production() -> Result<()> {
    let temp_dir = TempDir::new()?;
    // 10 seconds of audio; far longer than the test runs
    let path = write_wav(temp_dir.path(), "long.wav", 16000, 1, 160_000)?;

    let recorder = WavFileRecorder::new(path, SETTINGS);
    let mut rx = recorder.start(Duration::from_millis(50)).await?;

    assert!(rx.recv().await.is_some());

    recorder.stop().await?;
    assert_eq!(recorder.state(), RecorderState::Inactive);

    // Channel closes once buffered chunks are drained
    let remaining = collect(rx).await;
    assert!(remaining.len() < 200);

    Ok(())
}

#[tokio::test]
async fn test_recorder_pause_and_resume() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = write_wav(temp_dir.path(), "long.wav", 16000, 1, 160_000)?;

    let recorder = WavFileRecorder::new(path, SETTINGS);
    let mut rx = recorder.start(Duration::from_millis(100)).await?;
    assert!(rx.recv().await.is_some());

    recorder.pause();
    assert_eq!(recorder.state(), RecorderState::Paused);

    // Drain anything sent just before the pause took effect
    tokio::time::sleep(Duration::from_millis(50)).await;
    let mut last_sequence = 0;
    while let Ok(chunk) = rx.try_recv() {
        last_sequence = chunk.sequence;
    }

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(rx.try_recv().is_err(), "No chunks while paused");

    recorder.resume();
    assert_eq!(recorder.state(), RecorderState::Recording);

    let next = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await?
        .expect("production should continue");
    assert!(next.sequence >= last_sequence);

    recorder.stop().await?;

    Ok(())
}

#[tokio::test]
async fn test_recorder_cannot_start_twice() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = write_wav(temp_dir.path(), "long.wav", 16000, 1, 160_000)?;

    let recorder = WavFileRecorder::new(path, SETTINGS);
    let _rx = recorder.start(Duration::from_millis(100)).await?;

    assert!(recorder.start(Duration::from_millis(100)).await.is_err());

    recorder.stop().await?;

    Ok(())
}

#[test]
fn test_wav_source_opens_inactive_recorders() {
    let source = WavFileSource::new("takes/intro.wav");

    let recorder = source.open_recorder(&SETTINGS).unwrap();

    assert_eq!(recorder.state(), RecorderState::Inactive);
    assert_eq!(source.path(), Path::new("takes/intro.wav"));
}
