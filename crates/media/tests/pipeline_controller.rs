use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use streamer_media::gst::prelude::*;
use streamer_media::{
    has_elements, BuildError, GraphState, GraphTemplate, PipelineController, PropertyError,
    StreamerError,
};
use streamer_media::template::quote;

const TEST_PATTERN: &str = r#"
    videotestsrc name={{Input}} is-live=false !   # pattern
    videoconvert !
    videoscale !
    video/x-raw,width=320,height=240 !
    videorate name={{RateLimiter}} !
    videobalance name={{ColorBalance}} !
    jpegenc name={{FrameEncoder}} !
    appsink name={{AppOutput}} sync=true
"#;

const SMALL_PATTERN: &str = r#"
    videotestsrc name={{Input}} num-buffers=150 !
    video/x-raw,width=160,height=120,framerate=30/1 !
    videoconvert !
    jpegenc name={{FrameEncoder}} !
    appsink name={{AppOutput}} sync=true
"#;

/// One frame at the 30 fps `videotestsrc` default.
const FRAME_INTERVAL: Duration = Duration::from_nanos(33_333_334);

fn distance(a: Duration, b: Duration) -> Duration {
    if a > b {
        a - b
    } else {
        b - a
    }
}

fn engine_available(factories: &[&str]) -> bool {
    if has_elements(factories) {
        return true;
    }
    eprintln!("skipping: missing one of {factories:?}");
    false
}

fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    done()
}

#[test]
fn operations_without_a_pipeline_report_no_graph() -> anyhow::Result<()> {
    if !engine_available(&[]) {
        return Ok(());
    }
    let controller = PipelineController::new()?;
    assert!(controller.pipeline().is_none());
    assert!(matches!(controller.play(), Err(StreamerError::NoGraph)));
    assert!(matches!(
        controller.seek(Duration::from_secs(1)),
        Err(StreamerError::NoGraph)
    ));
    assert!(matches!(controller.set_max_rate(10), Err(StreamerError::NoGraph)));
    assert_eq!(controller.volume(), 0.0);
    assert_eq!(controller.contrast(), 0.0);
    assert_eq!(controller.video_size(), (0, 0));
    assert!(controller.frame().is_none());
    Ok(())
}

#[test]
fn pipeline_without_appsink_is_rejected() -> anyhow::Result<()> {
    if !engine_available(&["videotestsrc", "fakesink"]) {
        return Ok(());
    }
    let controller = PipelineController::new()?;
    let err = controller
        .set_pipeline_from_string("videotestsrc ! fakesink")
        .unwrap_err();
    assert!(matches!(
        err,
        StreamerError::Build(BuildError::MissingMandatoryOutput(_))
    ));

    let err = controller
        .set_pipeline_from_string("videotestsrc ! fakesink name={{AppOutput}}")
        .unwrap_err();
    assert!(matches!(
        err,
        StreamerError::Build(BuildError::OutputNotAppSink(_))
    ));
    assert!(controller.pipeline().is_none());
    Ok(())
}

#[test]
fn unknown_placeholder_fails_before_parsing() -> anyhow::Result<()> {
    if !engine_available(&[]) {
        return Ok(());
    }
    let controller = PipelineController::new()?;
    let err = controller
        .set_pipeline_from_string("videotestsrc name={{Camera}} ! appsink name={{AppOutput}}")
        .unwrap_err();
    assert!(matches!(err, StreamerError::Render(_)));
    Ok(())
}

#[test]
fn requesting_the_current_state_is_a_no_op() -> anyhow::Result<()> {
    if !engine_available(&["videotestsrc", "videoconvert", "jpegenc", "appsink"]) {
        return Ok(());
    }
    let controller = PipelineController::new()?;
    controller.set_pipeline_from_string(
        "videotestsrc ! videoconvert ! jpegenc ! appsink name={{AppOutput}}",
    )?;
    assert_eq!(controller.current_state(), Some(GraphState::Stopped));

    for state in GraphState::ALL {
        controller.request_state(state)?;
        let started = Instant::now();
        controller.request_state(state)?;
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(controller.current_state(), Some(state));
    }
    Ok(())
}

#[test]
fn plays_a_test_pattern() -> anyhow::Result<()> {
    if !engine_available(&[
        "videotestsrc",
        "videoconvert",
        "videoscale",
        "videorate",
        "videobalance",
        "jpegenc",
        "appsink",
    ]) {
        return Ok(());
    }
    let controller = PipelineController::new()?;
    let prerolls = Arc::new(AtomicUsize::new(0));
    let (frames_tx, frames_rx) = mpsc::channel();
    let (started_tx, started_rx) = mpsc::channel();
    {
        let prerolls = prerolls.clone();
        controller.set_on_pre_roll(move || {
            prerolls.fetch_add(1, Ordering::SeqCst);
        });
    }
    controller.set_on_new_frame(move |position| {
        let _ = frames_tx.send(position);
    });
    controller.set_on_start_playing(move || {
        let _ = started_tx.send(());
    });

    controller.set_pipeline_from_string(TEST_PATTERN)?;
    assert_eq!(controller.current_state(), Some(GraphState::Stopped));
    controller.play()?;
    assert!(controller.is_playing());
    assert_eq!(controller.video_size(), (320, 240));
    started_rx.recv_timeout(Duration::from_secs(2))?;

    let first = frames_rx.recv_timeout(Duration::from_secs(2))?;
    let mut last = first;
    let deadline = Instant::now() + Duration::from_secs(2);
    while last == Duration::ZERO && Instant::now() < deadline {
        last = frames_rx.recv_timeout(Duration::from_secs(1))?;
    }
    assert!(last > Duration::ZERO);
    assert!(last >= first);

    let frame = controller.frame().expect("a decoded frame");
    assert_eq!(frame.image.dimensions(), (320, 240));
    assert!(prerolls.load(Ordering::SeqCst) >= 1);
    assert_eq!(controller.frame_slot().decode_failures(), 0);
    Ok(())
}

#[test]
fn balance_writes_respect_ranges() -> anyhow::Result<()> {
    if !engine_available(&["videotestsrc", "videobalance", "videorate", "jpegenc", "appsink"]) {
        return Ok(());
    }
    let controller = PipelineController::new()?;
    controller.set_pipeline_from_string(TEST_PATTERN)?;

    let balance = controller.video_balance();
    assert_eq!(balance.contrast, 1.0);
    assert_eq!(balance.brightness, 0.0);
    assert_eq!(balance.hue, 0.0);
    assert_eq!(balance.saturation, 1.0);

    controller.set_contrast(1.5);
    assert_eq!(controller.contrast(), 1.5);
    controller.set_contrast(2.5);
    assert_eq!(controller.contrast(), 1.5);
    controller.set_brightness(-0.5);
    assert_eq!(controller.brightness(), -0.5);
    controller.set_hue(-3.0);
    assert_eq!(controller.hue(), 0.0);

    // No volume element in this graph.
    controller.set_volume(0.5);
    assert_eq!(controller.volume(), 0.0);
    assert!(!controller.is_muted());
    Ok(())
}

#[test]
fn rate_and_quality_reach_the_elements() -> anyhow::Result<()> {
    if !engine_available(&["videotestsrc", "videorate", "jpegenc", "appsink"]) {
        return Ok(());
    }
    let controller = PipelineController::new()?;
    controller.set_pipeline_from_string(TEST_PATTERN)?;

    controller.set_max_rate(10)?;
    assert_eq!(controller.max_rate(), 10);
    assert!(matches!(
        controller.set_max_rate(0),
        Err(StreamerError::Property(PropertyError::OutOfRange { .. }))
    ));

    controller.set_quality(40)?;
    assert_eq!(controller.quality(), 40);
    assert!(matches!(
        controller.set_quality(101),
        Err(StreamerError::Property(PropertyError::OutOfRange { .. }))
    ));

    let pipeline = controller.pipeline().expect("pipeline loaded");
    let appsink = pipeline
        .by_name("streamer-app")
        .expect("appsink by default name");
    assert_eq!(appsink.property::<i64>("max-lateness"), 100_000_000);
    let encoder = pipeline
        .by_name("streamer-imageencoder")
        .expect("encoder by default name");
    assert_eq!(encoder.property::<i32>("quality"), 40);
    Ok(())
}

#[test]
fn missing_rate_limiter_is_reported() -> anyhow::Result<()> {
    if !engine_available(&["videotestsrc", "jpegenc", "appsink"]) {
        return Ok(());
    }
    let controller = PipelineController::new()?;
    controller.set_pipeline_from_string(
        "videotestsrc ! jpegenc ! appsink name={{AppOutput}}",
    )?;
    assert!(matches!(
        controller.set_max_rate(15),
        Err(StreamerError::Property(PropertyError::RoleMissing(_)))
    ));
    Ok(())
}

#[test]
fn seeks_a_paused_pipeline() -> anyhow::Result<()> {
    if !engine_available(&["videotestsrc", "videoconvert", "jpegenc", "appsink"]) {
        return Ok(());
    }
    let controller = PipelineController::new()?;
    let paused = Arc::new(AtomicUsize::new(0));
    {
        let paused = paused.clone();
        controller.set_on_paused(move || {
            paused.fetch_add(1, Ordering::SeqCst);
        });
    }
    controller.set_pipeline_from_string(TEST_PATTERN)?;
    controller.pause()?;
    assert_eq!(controller.current_state(), Some(GraphState::Paused));
    assert!(wait_until(Duration::from_secs(1), || paused.load(Ordering::SeqCst) == 1));

    let target = Duration::from_secs(3);
    controller.seek(target)?;
    assert_eq!(controller.frame_position(), target);
    assert!(wait_until(Duration::from_secs(1), || {
        controller
            .current_position()
            .map(|p| distance(p, target) <= FRAME_INTERVAL)
            .unwrap_or(false)
    }));

    let appsink = controller
        .pipeline()
        .and_then(|p| p.by_name("streamer-app"))
        .expect("appsink by default name");
    assert!(wait_until(Duration::from_secs(1), || {
        appsink
            .property::<Option<streamer_media::gst::Sample>>("last-sample")
            .and_then(|sample| sample.buffer().and_then(|b| b.pts()))
            .map(|pts| distance(Duration::from_nanos(pts.nseconds()), target) <= FRAME_INTERVAL)
            .unwrap_or(false)
    }));
    assert!(controller.refresh_frame()?);
    Ok(())
}

/// Writes a half-second 30 fps MJPEG AVI and returns its path.
fn write_short_clip() -> anyhow::Result<std::path::PathBuf> {
    use streamer_media::gst;

    let path = std::env::temp_dir().join(format!("streamer-clip-{}.avi", std::process::id()));
    let description = format!(
        "videotestsrc num-buffers=15 ! video/x-raw,width=160,height=120,framerate=30/1 ! \
         videoconvert ! jpegenc ! avimux ! filesink location={}",
        quote(&path.to_string_lossy())
    );
    let pipeline = gst::parse::launch(&description)?;
    pipeline.set_state(gst::State::Playing)?;
    let bus = pipeline.bus().expect("pipeline bus");
    let msg = bus.timed_pop_filtered(
        gst::ClockTime::from_seconds(10),
        &[gst::MessageType::Eos, gst::MessageType::Error],
    );
    pipeline.set_state(gst::State::Null)?;
    match msg.as_ref().map(|m| m.view()) {
        Some(gst::MessageView::Eos(_)) => Ok(path),
        other => anyhow::bail!("clip not written: {other:?}"),
    }
}

#[test]
fn end_of_stream_fires_once_and_rewinds() -> anyhow::Result<()> {
    let needed = ["videotestsrc", "videoconvert", "jpegenc", "avimux", "avidemux", "appsink"];
    if !engine_available(&needed) {
        return Ok(());
    }
    let clip = write_short_clip()?;

    let controller = PipelineController::new()?;
    let eos = Arc::new(AtomicUsize::new(0));
    let (frames_tx, frames_rx) = mpsc::channel();
    {
        let eos = eos.clone();
        controller.set_on_eos(move || {
            eos.fetch_add(1, Ordering::SeqCst);
        });
    }
    controller.set_on_new_frame(move |position| {
        let _ = frames_tx.send(position);
    });
    controller.set_pipeline_from_template(
        &GraphTemplate::new(
            "filesrc name={{Input}} location={{location}} !
             avidemux name={{Decoder}} ! queue !
             appsink name={{AppOutput}} sync=true",
        )
        .param("location", quote(&clip.to_string_lossy())),
    )?;
    controller.play()?;

    assert!(wait_until(Duration::from_secs(5), || eos.load(Ordering::SeqCst) > 0));
    assert!(wait_until(Duration::from_secs(3), || {
        controller.current_state() == Some(GraphState::Paused)
            && controller.frame_position() == Duration::ZERO
    }));
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(eos.load(Ordering::SeqCst), 1);

    let duration = controller.duration()?;
    assert!(duration >= Duration::from_millis(450) && duration <= Duration::from_millis(550));

    while frames_rx.try_recv().is_ok() {}
    controller.play()?;
    let restarted = frames_rx.recv_timeout(Duration::from_secs(2))?;
    assert!(restarted < Duration::from_millis(250), "restarted at {restarted:?}");

    controller.close();
    let _ = std::fs::remove_file(&clip);
    Ok(())
}

#[test]
fn replacing_the_pipeline_drops_the_old_one() -> anyhow::Result<()> {
    if !engine_available(&["videotestsrc", "videoconvert", "jpegenc", "appsink"]) {
        return Ok(());
    }
    let controller = PipelineController::new()?;
    controller.set_pipeline_from_string(TEST_PATTERN)?;
    controller.play()?;
    let old = controller.pipeline().expect("first pipeline");

    controller.set_pipeline_from_string(SMALL_PATTERN)?;
    assert_eq!(old.current_state(), streamer_media::gst::State::Null);
    assert!(controller.frame().is_none());
    assert_eq!(controller.video_size(), (0, 0));
    assert_eq!(controller.current_state(), Some(GraphState::Stopped));

    controller.close();
    assert!(controller.pipeline().is_none());
    Ok(())
}

#[test]
fn replacing_while_playing_leaves_the_old_pipeline_stopped() -> anyhow::Result<()> {
    if !engine_available(&["videotestsrc", "videoconvert", "jpegenc", "appsink"]) {
        return Ok(());
    }
    let controller = PipelineController::new()?;
    for _ in 0..5 {
        controller.set_pipeline_from_string(TEST_PATTERN)?;
        let old = controller.pipeline().expect("first pipeline");

        std::thread::scope(|s| {
            s.spawn(|| {
                for _ in 0..3 {
                    let _ = controller.play();
                    let _ = controller.pause();
                }
            });
            s.spawn(|| {
                controller
                    .set_pipeline_from_string(SMALL_PATTERN)
                    .expect("replacement pipeline");
            });
        });

        assert_eq!(old.current_state(), streamer_media::gst::State::Null);
        assert_ne!(controller.pipeline().as_ref(), Some(&old));
    }
    controller.close();
    Ok(())
}

#[test]
fn reports_the_stream_title() -> anyhow::Result<()> {
    if !engine_available(&["videotestsrc", "taginject", "videoconvert", "jpegenc", "appsink"]) {
        return Ok(());
    }
    let controller = PipelineController::new()?;
    let (tx, rx) = mpsc::channel();
    controller.set_on_title(move |title| {
        let _ = tx.send(title);
    });
    controller.set_pipeline_from_string(
        r#"videotestsrc num-buffers=30 !
           taginject tags="title=calibration" !
           videoconvert ! jpegenc !
           appsink name={{AppOutput}} sync=false"#,
    )?;
    controller.play()?;
    assert_eq!(rx.recv_timeout(Duration::from_secs(3))?, "calibration");
    Ok(())
}
