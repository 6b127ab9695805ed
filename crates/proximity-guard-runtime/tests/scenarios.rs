use approx::assert_relative_eq;
use nalgebra::Point2;
use proximity_guard_core::{CameraIntrinsics, DepthSample, DistanceEstimate, PixelDetection};
use proximity_guard_runtime::sim::{
    simulate, RecordingEmitter, Scenario, ScenarioFrame, ScriptedLandmark, ScriptedPoint,
};
use proximity_guard_runtime::{
    depth_channel, detector_channel, DepthMap, DepthSampler, DetectorFrame, FixedCalibration,
    FrameOrchestrator, SensorError, SessionConfig, SessionError, ShutdownFlag,
};
use std::time::Duration;
use proximity_guard_safety::{CommandKind, SpeedCommand, SpeedMode};

const DEPTH_M: f32 = 0.5;

fn intrinsics() -> CameraIntrinsics {
    CameraIntrinsics::new(900.0, 900.0, 640.0, 360.0, 1280, 720)
}

fn at(distance_m: f64) -> ScenarioFrame {
    ScenarioFrame::lateral(&intrinsics(), DEPTH_M, distance_m)
}

fn replay(frames: Vec<ScenarioFrame>) -> (Vec<SpeedCommand>, proximity_guard_runtime::SessionReport) {
    let out = simulate(
        &Scenario::new(intrinsics(), frames),
        SessionConfig::default(),
        &ShutdownFlag::new(),
    )
    .expect("simulation");
    (out.commands, out.report)
}

fn session(
    frames: Vec<ScenarioFrame>,
    emitter: RecordingEmitter,
) -> FrameOrchestrator<
    proximity_guard_runtime::sim::ScriptedDetector,
    proximity_guard_runtime::sim::ScriptedDepth,
    RecordingEmitter,
> {
    let scenario = Scenario::new(intrinsics(), frames);
    FrameOrchestrator::start(
        &mut FixedCalibration(intrinsics()),
        scenario.detector(),
        scenario.depth(),
        emitter,
        SessionConfig::default(),
    )
    .expect("session start")
}

#[test]
fn clear_distance_runs_at_full_speed() {
    let (commands, report) = replay(vec![at(0.30)]);
    assert_eq!(commands[0].mode, SpeedMode::Normal);
    assert_eq!(commands[0].speed_pct, 100);
    assert_relative_eq!(
        commands[0].distance.meters().expect("measured"),
        0.30,
        epsilon = 1e-4
    );
    assert!(!commands[0].distance.is_approximate());
    assert_eq!(report.ticks, 1);
}

#[test]
fn caution_band_slows_with_one_transition() {
    let (commands, report) = replay(vec![at(0.22), at(0.22), at(0.22)]);
    assert_eq!(commands[0].mode, SpeedMode::Slow);
    assert_eq!(commands[0].speed_pct, 70);
    assert_eq!(report.entries_into(SpeedMode::Slow), 1);
    // Entered SLOW, then only the final stop.
    assert_eq!(commands.len(), 2);
}

#[test]
fn danger_band_stops() {
    let (commands, _) = replay(vec![at(0.30), at(0.15)]);
    assert_eq!(commands[1].mode, SpeedMode::Stopped);
    assert_eq!(commands[1].speed_pct, 0);
    assert_eq!(commands[1].kind, CommandKind::Entered);
}

#[test]
fn stop_is_held_until_the_hold_window_completes() {
    let hold = SessionConfig::default().safety.hysteresis_hold_frames as usize;
    let mut frames = vec![at(0.15)];
    frames.extend((0..hold).map(|_| at(0.30)));
    let mut s = session(frames, RecordingEmitter::new());

    assert_eq!(s.tick().expect("tick").mode, SpeedMode::Stopped);
    for _ in 0..hold - 1 {
        assert_eq!(s.tick().expect("tick").mode, SpeedMode::Stopped);
    }
    let released = s.tick().expect("tick");
    assert_eq!(released.mode, SpeedMode::Normal);
    let cmd = released.command.expect("release command");
    assert_eq!(cmd.speed_pct, 100);
}

#[test]
fn tool_depth_dropout_uses_learned_scale() {
    let mut frames = vec![at(0.30)];
    frames.extend((0..5).map(|_| at(0.30).without_tool_depth()));
    let mut s = session(frames, RecordingEmitter::new());

    let first = s.tick().expect("tick");
    assert!(!first.estimate.is_approximate());
    for _ in 0..5 {
        let outcome = s.tick().expect("tick");
        assert!(outcome.estimate.is_approximate());
        assert_relative_eq!(
            outcome.estimate.meters().expect("numeric"),
            0.30,
            epsilon = 1e-3
        );
        assert_eq!(outcome.mode, SpeedMode::Normal);
    }
    assert_eq!(s.report().fallback_ticks, 5);
}

#[test]
fn tool_depth_dropout_from_the_start_uses_default_scale() {
    let frames: Vec<_> = (0..5).map(|_| at(0.30).without_tool_depth()).collect();
    let mut s = session(frames, RecordingEmitter::new());
    for _ in 0..5 {
        let outcome = s.tick().expect("tick");
        // 540 px at the default 1.8 mm/px.
        assert_relative_eq!(
            outcome.estimate.meters().expect("numeric"),
            540.0 * 0.0018,
            epsilon = 1e-3
        );
    }
}

#[test]
fn losing_the_tool_stops_regardless_of_hand_distance() {
    let (commands, report) = replay(vec![at(0.30), at(0.30).without_tool()]);
    assert_eq!(commands[1].mode, SpeedMode::Stopped);
    assert_eq!(commands[1].distance, DistanceEstimate::Undefined);
    assert_eq!(report.undefined_ticks, 1);
}

#[test]
fn detector_timeout_feeds_the_fail_safe() {
    let (commands, report) = replay(vec![at(0.30), ScenarioFrame::timeout()]);
    assert_eq!(commands[1].mode, SpeedMode::Stopped);
    assert_eq!(report.detector_timeouts, 1);
    assert_eq!(report.ticks, 2);
}

#[test]
fn stale_depth_forces_the_fallback_path() {
    let tolerance = SessionConfig::default().timing.depth_staleness_tolerance_ms;
    let (commands, report) = replay(vec![at(0.30).with_depth_age(tolerance + 1)]);
    assert!(commands[0].distance.is_approximate());
    assert_eq!(report.stale_depth_samples, 2);

    let (commands, _) = replay(vec![at(0.30).with_depth_age(tolerance)]);
    assert!(!commands[0].distance.is_approximate());
}

#[test]
fn depth_timeout_counts_as_a_missing_tool() {
    let (commands, report) = replay(vec![at(0.30), at(0.30).with_depth_timeout(), at(0.30)]);
    assert_eq!(commands[0].mode, SpeedMode::Normal);
    assert_eq!(commands[1].mode, SpeedMode::Stopped);
    assert_eq!(commands[1].speed_pct, 0);
    assert_eq!(commands[1].distance, DistanceEstimate::Undefined);
    assert_eq!(report.undefined_ticks, 1);
    assert_eq!(report.depth_failures, 2);
    assert_eq!(report.fallback_ticks, 0);
}

struct LostDepth;

impl DepthSampler for LostDepth {
    fn sample(
        &mut self,
        _pixel: Point2<f32>,
        _timestamp_ms: u64,
        _timeout: Duration,
    ) -> Result<DepthSample, SensorError> {
        Err(SensorError::Disconnected)
    }
}

#[test]
fn lost_depth_stream_keeps_the_arm_stopped() {
    let scenario = Scenario::new(intrinsics(), vec![at(0.30), at(0.30)]);
    let mut s = FrameOrchestrator::start(
        &mut FixedCalibration(intrinsics()),
        scenario.detector(),
        LostDepth,
        RecordingEmitter::new(),
        SessionConfig::default(),
    )
    .expect("session start");

    for _ in 0..2 {
        let outcome = s.tick().expect("depth loss is not fatal");
        assert_eq!(outcome.estimate, DistanceEstimate::Undefined);
        assert_eq!(outcome.mode, SpeedMode::Stopped);
    }
    let report = s.run(&ShutdownFlag::new()).expect("run");
    assert_eq!(report.depth_failures, 4);
    assert!(s.emitter().commands().iter().all(|c| c.speed_pct == 0));
}

#[test]
fn approximate_landmark_inside_the_margin_stops_the_arm() {
    let k = intrinsics();
    let (cx, cy) = (k.cx as f32, k.cy as f32);
    // Landmark 8: measured, 0.21 m. Landmark 4: no depth, 387 px at the
    // learned 0.5/900 m/px = 0.215 m, 0.195 m once the margin is applied.
    let frame = ScenarioFrame {
        tool: Some(ScriptedPoint::new(cx, cy, Some(DEPTH_M))),
        hands: vec![
            ScriptedLandmark {
                landmark: 8,
                point: ScriptedPoint::new(cx + 378.0, cy, Some(DEPTH_M)),
            },
            ScriptedLandmark {
                landmark: 4,
                point: ScriptedPoint::new(cx - 387.0, cy, None),
            },
        ],
        ..ScenarioFrame::default()
    };
    let (commands, _) = replay(vec![frame]);

    let DistanceEstimate::Measured(m) = commands[0].distance else {
        panic!("expected a measurement");
    };
    assert_eq!(m.landmark, 4);
    assert!(m.approximate);
    assert_relative_eq!(m.meters, 0.215, epsilon = 1e-4);
    assert_eq!(commands[0].mode, SpeedMode::Stopped);
}

#[test]
fn estimator_config_is_validated_at_start() {
    let mut config = SessionConfig::default();
    config.estimator.fallback_scale_default = -0.0018;
    let scenario = Scenario::new(intrinsics(), vec![at(0.30).without_tool_depth()]);
    let result = FrameOrchestrator::start(
        &mut FixedCalibration(intrinsics()),
        scenario.detector(),
        scenario.depth(),
        RecordingEmitter::new(),
        config,
    );
    assert!(matches!(result, Err(SessionError::Config(_))));
}

#[test]
fn command_ticks_increase_monotonically() {
    let (commands, _) = replay(vec![
        at(0.30),
        at(0.22),
        at(0.15),
        ScenarioFrame::timeout(),
        at(0.30),
        at(0.30),
        at(0.30),
    ]);
    assert!(commands.len() >= 4);
    assert!(commands.windows(2).all(|w| w[0].tick < w[1].tick));
}

#[test]
fn session_ends_with_final_stop() {
    let (commands, report) = replay(vec![at(0.30), at(0.30)]);
    let last = commands.last().expect("final command");
    assert_eq!(last.kind, CommandKind::Final);
    assert_eq!(last.mode, SpeedMode::Stopped);
    assert_eq!(report.final_mode, SpeedMode::Stopped);
    assert_eq!(report.commands_sent, commands.len() as u64);
}

#[test]
fn raised_shutdown_only_sends_the_final_stop() {
    let shutdown = ShutdownFlag::new();
    shutdown.raise();
    let mut s = session(vec![at(0.30); 3], RecordingEmitter::new());
    let report = s.run(&shutdown).expect("run");
    assert_eq!(report.ticks, 0);
    assert_eq!(s.emitter().commands().len(), 1);
    assert_eq!(s.emitter().commands()[0].kind, CommandKind::Final);
}

#[test]
fn command_channel_failure_is_fatal_and_forces_stop() {
    let mut s = session(vec![at(0.30), at(0.15), at(0.30)], RecordingEmitter::failing_after(1));
    let err = s.run(&ShutdownFlag::new()).expect_err("channel failure");
    assert!(matches!(err, SessionError::CommandChannel(_)));
    assert!(err.is_fatal());
    assert_eq!(s.mode(), SpeedMode::Stopped);
    // NORMAL acknowledged, STOPPED failed, forced stop attempted.
    assert_eq!(s.emitter().attempts(), 3);
    assert_eq!(s.report().ticks, 2);
    assert!(s.report().error.is_some());
    assert!(matches!(s.tick(), Err(SessionError::Finished)));
}

#[test]
fn invalid_calibration_prevents_start() {
    let scenario = Scenario::new(intrinsics(), vec![at(0.30)]);
    let result = FrameOrchestrator::start(
        &mut FixedCalibration(CameraIntrinsics::new(0.0, 900.0, 640.0, 360.0, 1280, 720)),
        scenario.detector(),
        scenario.depth(),
        RecordingEmitter::new(),
        SessionConfig::default(),
    );
    assert!(matches!(result, Err(SessionError::Calibration(_))));
}

#[test]
fn inconsistent_thresholds_prevent_start() {
    let mut config = SessionConfig::default();
    config.safety.stop_threshold_m = 0.4;
    let scenario = Scenario::new(intrinsics(), vec![at(0.30)]);
    let result = FrameOrchestrator::start(
        &mut FixedCalibration(intrinsics()),
        scenario.detector(),
        scenario.depth(),
        RecordingEmitter::new(),
        config,
    );
    assert!(matches!(result, Err(SessionError::Config(_))));
}

#[test]
fn threaded_sensors_feed_the_session_through_mailboxes() {
    let k = intrinsics();
    let (frame_tx, detector) = detector_channel(8);
    let (depth_tx, depth) = depth_channel(8, 4);

    let sensors = std::thread::spawn(move || {
        for ts in [0u64, 33, 66] {
            depth_tx
                .send(DepthMap {
                    width: k.width as usize,
                    height: k.height as usize,
                    captured_at_ms: ts,
                    data: vec![DEPTH_M; (k.width * k.height) as usize],
                })
                .expect("depth send");
            frame_tx
                .send(DetectorFrame {
                    timestamp_ms: ts,
                    detections: vec![
                        PixelDetection::tool(640.0, 360.0, 0.9),
                        PixelDetection::hand(8, 1180.0, 360.0, 0.9),
                    ],
                })
                .expect("frame send");
        }
    });

    let mut config = SessionConfig::default();
    config.timing.detector_timeout_ms = 2_000;
    let mut s = FrameOrchestrator::start(
        &mut FixedCalibration(k),
        detector,
        depth,
        RecordingEmitter::new(),
        config,
    )
    .expect("session start");
    let report = s.run(&ShutdownFlag::new()).expect("run");
    sensors.join().expect("sensor thread");

    assert!(report.ticks >= 1);
    let commands = s.emitter().commands();
    assert_eq!(commands[0].mode, SpeedMode::Normal);
    assert!(!commands[0].distance.is_approximate());
    assert_eq!(commands.last().map(|c| c.kind), Some(CommandKind::Final));
}
