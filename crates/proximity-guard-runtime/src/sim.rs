//! Scripted collaborators for replaying a recorded or synthetic session.
//!
//! A [`Scenario`] lists frames with pixel positions and per-point depth; it
//! drives a [`ScriptedDetector`] and a [`ScriptedDepth`], while a
//! [`RecordingEmitter`] stands in for the arm link.

use crate::{
    ArmCommandEmitter, CalibrationProvider, CommandAck, CommandChannelError, ConfigIoError,
    DepthSampler, DetectorAdapter, DetectorFrame, FixedCalibration, FovCalibration,
    FrameOrchestrator, SensorError, SessionConfig, SessionError, SessionReport, ShutdownFlag,
};
use nalgebra::Point2;
use proximity_guard_core::{CameraIntrinsics, DepthSample, PixelDetection};
use proximity_guard_safety::SpeedCommand;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::{fs, path::Path, time::Duration};

fn default_frame_interval_ms() -> u64 {
    33
}

fn default_confidence() -> f32 {
    1.0
}

/// A scenario that cannot be replayed faithfully.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ScenarioError {
    #[error("frames {first} and {second} share timestamp {timestamp_ms} ms")]
    DuplicateTimestamp {
        timestamp_ms: u64,
        first: usize,
        second: usize,
    },
}

/// A scripted pixel with an optional depth reading (`None` = sensor dropout).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScriptedPoint {
    pub u: f32,
    pub v: f32,
    #[serde(default)]
    pub depth_m: Option<f32>,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

impl ScriptedPoint {
    pub fn new(u: f32, v: f32, depth_m: Option<f32>) -> Self {
        Self {
            u,
            v,
            depth_m,
            confidence: default_confidence(),
        }
    }

    fn pixel(&self) -> Point2<f32> {
        Point2::new(self.u, self.v)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScriptedLandmark {
    pub landmark: u32,
    #[serde(flatten)]
    pub point: ScriptedPoint,
}

/// One scripted detector frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioFrame {
    /// Defaults to `index * frame_interval_ms`.
    #[serde(default)]
    pub timestamp_ms: Option<u64>,
    #[serde(default)]
    pub tool: Option<ScriptedPoint>,
    #[serde(default)]
    pub hands: Vec<ScriptedLandmark>,
    /// The detector produces nothing for this frame.
    #[serde(default)]
    pub detector_timeout: bool,
    /// Gap between the depth frame and the color frame.
    #[serde(default)]
    pub depth_age_ms: u64,
    /// The depth sampler answers nothing for this frame.
    #[serde(default)]
    pub depth_timeout: bool,
}

impl ScenarioFrame {
    /// Tool at the principal point and one fingertip `distance_m` to its right,
    /// both at `depth_m`.
    pub fn lateral(intrinsics: &CameraIntrinsics, depth_m: f32, distance_m: f64) -> Self {
        let (cx, cy) = (intrinsics.cx as f32, intrinsics.cy as f32);
        let du = (distance_m * intrinsics.fx / depth_m as f64) as f32;
        Self {
            tool: Some(ScriptedPoint::new(cx, cy, Some(depth_m))),
            hands: vec![ScriptedLandmark {
                landmark: 8,
                point: ScriptedPoint::new(cx + du, cy, Some(depth_m)),
            }],
            ..Self::default()
        }
    }

    /// Tool visible, no hand in view.
    pub fn tool_only(u: f32, v: f32, depth_m: f32) -> Self {
        Self {
            tool: Some(ScriptedPoint::new(u, v, Some(depth_m))),
            ..Self::default()
        }
    }

    pub fn timeout() -> Self {
        Self {
            detector_timeout: true,
            ..Self::default()
        }
    }

    /// Drop the tool's depth reading.
    pub fn without_tool_depth(mut self) -> Self {
        if let Some(tool) = self.tool.as_mut() {
            tool.depth_m = None;
        }
        self
    }

    pub fn without_tool(mut self) -> Self {
        self.tool = None;
        self
    }

    pub fn with_depth_age(mut self, age_ms: u64) -> Self {
        self.depth_age_ms = age_ms;
        self
    }

    pub fn with_depth_timeout(mut self) -> Self {
        self.depth_timeout = true;
        self
    }

    fn detections(&self) -> Vec<PixelDetection> {
        let tool = self
            .tool
            .iter()
            .map(|t| PixelDetection::tool(t.u, t.v, t.confidence));
        let hands = self
            .hands
            .iter()
            .map(|h| PixelDetection::hand(h.landmark, h.point.u, h.point.v, h.point.confidence));
        tool.chain(hands).collect()
    }

    fn depth_points(&self) -> Vec<(Point2<f32>, Option<f32>)> {
        self.tool
            .iter()
            .chain(self.hands.iter().map(|h| &h.point))
            .map(|p| (p.pixel(), p.depth_m))
            .collect()
    }
}

/// A scripted session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Camera calibration; approximated from the default FOV when absent.
    #[serde(default)]
    pub intrinsics: Option<CameraIntrinsics>,
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
    #[serde(default)]
    pub frames: Vec<ScenarioFrame>,
}

impl Scenario {
    pub fn new(intrinsics: CameraIntrinsics, frames: Vec<ScenarioFrame>) -> Self {
        Self {
            intrinsics: Some(intrinsics),
            frame_interval_ms: default_frame_interval_ms(),
            frames,
        }
    }

    /// Load and validate a scenario.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigIoError> {
        let raw = fs::read_to_string(path)?;
        let scenario: Self = serde_json::from_str(&raw)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Depth readings are looked up by frame timestamp, so delivered frames
    /// must not share one.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        let mut seen: HashMap<u64, usize> = HashMap::new();
        for (i, frame) in self.frames.iter().enumerate() {
            if frame.detector_timeout {
                continue;
            }
            let ts = self.timestamp(i, frame);
            if let Some(&first) = seen.get(&ts) {
                return Err(ScenarioError::DuplicateTimestamp {
                    timestamp_ms: ts,
                    first,
                    second: i,
                });
            }
            seen.insert(ts, i);
        }
        Ok(())
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn calibration(&self) -> Box<dyn CalibrationProvider> {
        match self.intrinsics {
            Some(k) => Box::new(FixedCalibration(k)),
            None => Box::new(FovCalibration::default()),
        }
    }

    fn timestamp(&self, index: usize, frame: &ScenarioFrame) -> u64 {
        frame
            .timestamp_ms
            .unwrap_or(index as u64 * self.frame_interval_ms)
    }

    pub fn detector(&self) -> ScriptedDetector {
        let frames = self
            .frames
            .iter()
            .enumerate()
            .map(|(i, f)| {
                (!f.detector_timeout).then(|| DetectorFrame {
                    timestamp_ms: self.timestamp(i, f),
                    detections: f.detections(),
                })
            })
            .collect();
        ScriptedDetector { frames, pace: None }
    }

    pub fn depth(&self) -> ScriptedDepth {
        let frames = self
            .frames
            .iter()
            .enumerate()
            .filter(|(_, f)| !f.detector_timeout && !f.depth_timeout)
            .map(|(i, f)| {
                let ts = self.timestamp(i, f);
                (
                    ts,
                    ScriptedDepthFrame {
                        // Frames near t=0 have no older depth; the offset is applied forward.
                        captured_at_ms: ts
                            .checked_sub(f.depth_age_ms)
                            .unwrap_or(ts + f.depth_age_ms),
                        points: f.depth_points(),
                    },
                )
            })
            .collect();
        ScriptedDepth { frames }
    }
}

/// Replays scenario frames, then reports the stream as closed.
#[derive(Clone, Debug)]
pub struct ScriptedDetector {
    frames: VecDeque<Option<DetectorFrame>>,
    pace: Option<Duration>,
}

impl ScriptedDetector {
    /// Deliver frames no faster than one per `interval`, like a live camera.
    pub fn paced(mut self, interval: Duration) -> Self {
        self.pace = Some(interval);
        self
    }

    /// Frames not yet delivered.
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl DetectorAdapter for ScriptedDetector {
    fn poll(&mut self, timeout: Duration) -> Result<DetectorFrame, SensorError> {
        if let Some(interval) = self.pace.filter(|_| !self.frames.is_empty()) {
            std::thread::sleep(interval.min(timeout));
        }
        match self.frames.pop_front() {
            Some(Some(frame)) => Ok(frame),
            Some(None) => Err(SensorError::Timeout(timeout)),
            None => Err(SensorError::Disconnected),
        }
    }
}

#[derive(Clone, Debug)]
struct ScriptedDepthFrame {
    captured_at_ms: u64,
    points: Vec<(Point2<f32>, Option<f32>)>,
}

/// Answers depth queries from the scripted per-point readings.
///
/// Frames without readings (depth timeouts) answer with [`SensorError::Timeout`].
#[derive(Clone, Debug)]
pub struct ScriptedDepth {
    frames: HashMap<u64, ScriptedDepthFrame>,
}

impl DepthSampler for ScriptedDepth {
    fn sample(
        &mut self,
        pixel: Point2<f32>,
        timestamp_ms: u64,
        timeout: Duration,
    ) -> Result<DepthSample, SensorError> {
        let frame = self
            .frames
            .get(&timestamp_ms)
            .ok_or(SensorError::Timeout(timeout))?;
        let depth = frame
            .points
            .iter()
            .find(|(p, _)| nalgebra::distance(p, &pixel) < 0.5)
            .and_then(|(_, d)| *d);
        Ok(match depth {
            Some(d) => DepthSample::new(pixel, d, frame.captured_at_ms),
            None => DepthSample::invalid(pixel, frame.captured_at_ms),
        })
    }
}

/// Arm link double that records every acknowledged command.
#[derive(Clone, Debug, Default)]
pub struct RecordingEmitter {
    commands: Vec<SpeedCommand>,
    attempts: usize,
    fail_after: Option<usize>,
}

impl RecordingEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acknowledge `n` commands, then behave as a lost link.
    pub fn failing_after(n: usize) -> Self {
        Self {
            fail_after: Some(n),
            ..Self::default()
        }
    }

    /// Acknowledged commands, in delivery order.
    pub fn commands(&self) -> &[SpeedCommand] {
        &self.commands
    }

    /// Every send, including failed ones.
    pub fn attempts(&self) -> usize {
        self.attempts
    }
}

impl ArmCommandEmitter for RecordingEmitter {
    fn send(
        &mut self,
        command: &SpeedCommand,
        _ack_timeout: Duration,
    ) -> Result<CommandAck, CommandChannelError> {
        self.attempts += 1;
        if self.fail_after.is_some_and(|n| self.commands.len() >= n) {
            return Err(CommandChannelError::Disconnected);
        }
        log::debug!(
            "arm <- tick {} {} {}%",
            command.tick,
            command.mode,
            command.speed_pct
        );
        self.commands.push(*command);
        Ok(CommandAck { tick: command.tick })
    }
}

/// Result of replaying a scenario to the end.
#[derive(Clone, Debug)]
pub struct SimulationOutput {
    pub report: SessionReport,
    pub commands: Vec<SpeedCommand>,
}

/// Replay `scenario` through a full session, ending with the final STOPPED.
pub fn simulate(
    scenario: &Scenario,
    config: SessionConfig,
    shutdown: &ShutdownFlag,
) -> Result<SimulationOutput, SessionError> {
    let mut calibration = scenario.calibration();
    let mut session = FrameOrchestrator::start(
        calibration.as_mut(),
        scenario.detector(),
        scenario.depth(),
        RecordingEmitter::new(),
        config,
    )?;
    let report = session.run(shutdown)?;
    Ok(SimulationOutput {
        report,
        commands: session.emitter().commands().to_vec(),
    })
}
