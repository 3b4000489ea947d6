use super::*;
use crate::foundation::core::{Fps, PixelSize};

#[test]
fn read_full_reports_short_reads_at_end_of_stream() {
    let mut src = std::io::Cursor::new(vec![1u8, 2, 3, 4, 5]);
    let mut buf = [0u8; 4];
    assert_eq!(read_full(&mut src, &mut buf).unwrap(), 4);
    assert_eq!(buf, [1, 2, 3, 4]);
    assert_eq!(read_full(&mut src, &mut buf).unwrap(), 1);
    assert_eq!(read_full(&mut src, &mut buf).unwrap(), 0);
}

#[test]
fn temp_file_guard_removes_file_on_drop() {
    let path = temp_path("guard", "tmp");
    std::fs::write(&path, b"x").unwrap();
    {
        let _guard = TempFileGuard(Some(path.clone()));
    }
    assert!(!path.exists());
}

#[test]
fn encoder_names_follow_codec() {
    assert_eq!(video_encoder_name(VideoCodec::H264), "libx264");
    assert_eq!(video_encoder_name(VideoCodec::Hevc), "libx265");
}

#[test]
fn odd_output_size_fails_negotiation_before_touching_ffmpeg() {
    let mut w = FfmpegWriter::new(Path::new("unused.mp4"));
    let err = w
        .add_video_track(&VideoOutputConfig {
            codec: VideoCodec::H264,
            size: PixelSize::new(641, 360),
            frame_rate: Fps::new(30, 1).unwrap(),
            bitrate: 1_000_000,
        })
        .unwrap_err();
    assert!(matches!(err, VidmarkError::Negotiation(_)));
}

#[test]
fn audio_waits_for_video_unless_video_is_finished() {
    let mut w = FfmpegWriter::new(Path::new("unused.mp4"));
    w.audio_cfg = Some(AudioOutputConfig {
        codec: crate::media::backend::AudioCodec::Aac,
        sample_rate: 1_000,
        channels: 1,
        bitrate: 96_000,
    });
    w.pcm = Some(BufWriter::new(tempfile_sink()));

    w.audio_frames_written = 999;
    assert!(w.audio_ready());
    w.audio_frames_written = 1_000;
    assert!(!w.audio_ready());
    w.last_video_pts = 0.5;
    assert!(w.audio_ready());
    w.audio_frames_written = 5_000;
    assert!(!w.audio_ready());
    w.video_finished = true;
    assert!(w.audio_ready());

    w.cancel_writing();
    assert!(!w.audio_ready());
}

fn tempfile_sink() -> File {
    let path = temp_path("sink", "bin");
    let file = File::create(&path).unwrap();
    std::fs::remove_file(&path).ok();
    file
}

#[test]
fn slot_plan_repeats_previous_frame_across_a_gap() {
    assert_eq!(
        plan_slots(3, 6),
        SlotPlan {
            fill: 3,
            fill_with_current: false,
            write_current: true,
        }
    );
    assert_eq!(
        plan_slots(4, 4),
        SlotPlan {
            fill: 0,
            fill_with_current: false,
            write_current: true,
        }
    );
}

#[test]
fn slot_plan_drops_frames_for_filled_slots() {
    let plan = plan_slots(5, 4);
    assert!(!plan.write_current);
    assert_eq!(plan.fill, 0);
}

#[test]
fn late_first_frame_fills_leading_slots_with_itself() {
    let fps = Fps::new(30, 1).unwrap();
    let slot = fps.secs_to_frames_round(0.5);
    assert_eq!(slot, 15);
    assert_eq!(
        plan_slots(0, slot),
        SlotPlan {
            fill: 15,
            fill_with_current: true,
            write_current: true,
        }
    );
}

#[test]
fn audio_starting_after_origin_is_preceded_by_silence() {
    assert_eq!(silence_frames_before(0, 0.5, 48_000), 24_000);
    assert_eq!(silence_frames_before(24_000, 0.5, 48_000), 0);
    assert_eq!(silence_frames_before(25_024, 0.5 + 1024.0 / 48_000.0, 48_000), 0);
    assert_eq!(silence_frames_before(0, 0.0, 48_000), 0);
    assert_eq!(silence_frames_before(10, -1.0, 48_000), 0);
}

#[test]
fn spooled_audio_is_padded_to_its_start_time() {
    let mut w = FfmpegWriter::new(Path::new("unused.mp4"));
    w.audio_cfg = Some(AudioOutputConfig {
        codec: crate::media::backend::AudioCodec::Aac,
        sample_rate: 1_000,
        channels: 2,
        bitrate: 96_000,
    });
    w.pcm = Some(BufWriter::new(tempfile_sink()));

    w.append_audio(&AudioSample {
        pts_secs: 0.25,
        channels: 2,
        pcm: vec![7; 20],
    })
    .unwrap();
    assert_eq!(w.audio_frames_written, 260);

    w.append_audio(&AudioSample {
        pts_secs: 0.26,
        channels: 2,
        pcm: vec![7; 20],
    })
    .unwrap();
    assert_eq!(w.audio_frames_written, 270);
}

#[test]
fn encoder_write_error_carries_encoder_output() {
    let e = std::io::Error::from(std::io::ErrorKind::BrokenPipe);
    let msg = encoder_write_error(&e, "ffmpeg exited with status 1: Unknown encoder 'libx265'\n");
    assert!(msg.contains("failed to write frame"));
    assert!(msg.ends_with("Unknown encoder 'libx265'"));
    assert!(!encoder_write_error(&e, "  ").contains(';'));
}
