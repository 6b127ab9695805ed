use super::{SessionError, ShutdownFlag, TickOutcome};
use crate::{
    ArmCommandEmitter, CalibrationProvider, DepthSampler, DetectorAdapter, SensorError,
    SessionConfig, SessionReport, TimingParams,
};
use proximity_guard_core::{
    select_targets, CameraIntrinsics, DepthSample, DistanceEstimator, Observation, PixelDetection,
};
use proximity_guard_safety::{SafetyStateMachine, SpeedCommand, SpeedMode};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// State owned by a session and threaded through every tick.
#[derive(Debug)]
struct SessionContext {
    tick: u64,
    estimator: DistanceEstimator,
    machine: SafetyStateMachine,
    report: SessionReport,
    finished: bool,
}

#[derive(Default)]
struct DepthStats {
    failures: usize,
    stale: usize,
}

/// Drives one monitoring session: detector -> depth -> estimate -> state machine -> arm.
pub struct FrameOrchestrator<D, S, E> {
    detector: D,
    depth: S,
    emitter: E,
    timing: TimingParams,
    context: SessionContext,
}

impl<D, S, E> FrameOrchestrator<D, S, E>
where
    D: DetectorAdapter,
    S: DepthSampler,
    E: ArmCommandEmitter,
{
    /// Load calibration, validate the configuration and build a session.
    ///
    /// Fails without touching the arm when calibration cannot be loaded.
    pub fn start<C: CalibrationProvider + ?Sized>(
        calibration: &mut C,
        detector: D,
        depth: S,
        emitter: E,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let intrinsics = calibration.load()?;
        log::info!(
            "session start: {}x{} fx={:.1} fy={:.1}, stop <= {:.2} m, slow <= {:.2} m",
            intrinsics.width,
            intrinsics.height,
            intrinsics.fx,
            intrinsics.fy,
            config.safety.stop_threshold_m,
            config.safety.slow_threshold_m
        );

        Ok(Self {
            detector,
            depth,
            emitter,
            timing: config.timing,
            context: SessionContext {
                tick: 0,
                estimator: DistanceEstimator::new(intrinsics, config.estimator)
                    .with_approximate_margin(config.safety.approximate_margin_m),
                machine: SafetyStateMachine::new(config.safety),
                report: SessionReport::default(),
                finished: false,
            },
        })
    }

    #[inline]
    pub fn intrinsics(&self) -> &CameraIntrinsics {
        self.context.estimator.intrinsics()
    }

    #[inline]
    pub fn mode(&self) -> SpeedMode {
        self.context.machine.mode()
    }

    #[inline]
    pub fn machine(&self) -> &SafetyStateMachine {
        &self.context.machine
    }

    /// Number of tick ids handed out so far.
    #[inline]
    pub fn ticks(&self) -> u64 {
        self.context.tick
    }

    #[inline]
    pub fn report(&self) -> &SessionReport {
        &self.context.report
    }

    #[inline]
    pub fn emitter(&self) -> &E {
        &self.emitter
    }

    /// Run one atomic tick.
    ///
    /// Sensor timeouts count as missing detections; a closed detector stream ends the session
    /// and a failed command channel is fatal after a best-effort stop.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn tick(&mut self) -> Result<TickOutcome, SessionError> {
        if self.context.finished {
            return Err(SessionError::Finished);
        }

        let polled = self.detector.poll(self.timing.detector_timeout());
        let (frame, detector_timed_out) = match polled {
            Ok(frame) => (Some(frame), false),
            Err(SensorError::Timeout(waited)) => {
                log::warn!(
                    "tick {}: no detector frame within {waited:?}, treating as no detections",
                    self.context.tick + 1
                );
                (None, true)
            }
            Err(SensorError::Disconnected) => return Err(SessionError::DetectorClosed),
        };
        let tick = self.next_tick();

        let mut stats = DepthStats::default();
        let (tool, hands) = match &frame {
            Some(frame) => {
                let targets = select_targets(
                    &frame.detections,
                    self.context.estimator.intrinsics(),
                    self.context.estimator.params(),
                );
                let tool = targets
                    .tool
                    .and_then(|det| self.observe(&det, frame.timestamp_ms, &mut stats));
                let hands: Vec<Observation> = targets
                    .hands
                    .iter()
                    .filter_map(|det| self.observe(det, frame.timestamp_ms, &mut stats))
                    .collect();
                (tool, hands)
            }
            None => (None, Vec::new()),
        };
        if stats.failures > 0 {
            log::warn!(
                "tick {tick}: depth sampler gave no answer for {} detection(s), dropping them",
                stats.failures
            );
        }

        let estimate = self.context.estimator.estimate(tool.as_ref(), &hands);
        let previous = self.context.machine.mode();
        let command = self.context.machine.update(estimate, tick);

        let outcome = TickOutcome {
            tick,
            frame_timestamp_ms: frame.as_ref().map(|f| f.timestamp_ms),
            estimate,
            mode: self.context.machine.mode(),
            command,
            detector_timed_out,
            depth_failures: stats.failures,
            stale_depth_samples: stats.stale,
        };
        self.context.report.record_tick(previous, &outcome);

        if let Some(command) = command {
            self.forward(command)?;
        }
        Ok(outcome)
    }

    /// Tick until `shutdown` is raised or the detector stream closes, then stop the arm.
    ///
    /// On a fatal error the arm has already been sent a best-effort stop and
    /// the error is returned; [`report`](Self::report) still holds the counters.
    pub fn run(&mut self, shutdown: &ShutdownFlag) -> Result<SessionReport, SessionError> {
        loop {
            if shutdown.is_raised() {
                log::info!("shutdown requested after {} tick(s)", self.context.tick);
                break;
            }
            match self.tick() {
                Ok(_) => {}
                Err(SessionError::DetectorClosed) => {
                    log::info!("detector stream closed, ending session");
                    break;
                }
                Err(err) => return Err(err),
            }
        }
        self.shutdown()
    }

    /// Send the final STOPPED command and wait (bounded) for its acknowledgement.
    ///
    /// Calling it again after a successful shutdown only returns the report.
    pub fn shutdown(&mut self) -> Result<SessionReport, SessionError> {
        if !self.context.finished {
            self.context.finished = true;
            let tick = self.next_tick();
            let stop = self.context.machine.force_stop(tick);
            self.context.report.final_mode = SpeedMode::Stopped;
            match self.emitter.send(&stop, self.timing.command_ack_timeout()) {
                Ok(ack) => {
                    self.context.report.record_command(&stop);
                    log::info!("final STOPPED acknowledged (tick {})", ack.tick);
                }
                Err(err) => {
                    log::error!("final STOPPED not acknowledged: {err}");
                    self.context.report.error = Some(err.to_string());
                    return Err(err.into());
                }
            }
            proximity_guard_core::set_log_tick(0);
        }
        Ok(self.context.report.clone())
    }

    fn next_tick(&mut self) -> u64 {
        self.context.tick += 1;
        proximity_guard_core::set_log_tick(self.context.tick);
        self.context.tick
    }

    /// Sample depth for one detection and locate it.
    ///
    /// An invalid or stale sample leaves the detection in pixel space. A
    /// sampler timeout or a lost depth stream drops the detection for this
    /// tick, so a missing tool ends up as an undefined distance.
    fn observe(
        &mut self,
        detection: &PixelDetection,
        frame_ms: u64,
        stats: &mut DepthStats,
    ) -> Option<Observation> {
        let sample = match self.depth.sample(
            detection.position,
            frame_ms,
            self.timing.depth_timeout(),
        ) {
            Ok(sample) => self.fresh(sample, frame_ms, stats),
            Err(err) => {
                log::debug!(
                    "{:?} landmark {}: no depth ({err}), treated as not detected",
                    detection.class,
                    detection.landmark
                );
                stats.failures += 1;
                return None;
            }
        };
        Some(self.context.estimator.locate(detection, sample.as_ref()))
    }

    fn fresh(&self, sample: DepthSample, frame_ms: u64, stats: &mut DepthStats) -> Option<DepthSample> {
        let age = sample.age_ms(frame_ms);
        if age > self.timing.depth_staleness_tolerance_ms {
            log::debug!(
                "depth sample {age} ms away from frame (tolerance {} ms), ignoring",
                self.timing.depth_staleness_tolerance_ms
            );
            stats.stale += 1;
            return None;
        }
        Some(sample)
    }

    /// Deliver a command; on failure stop the arm (best effort) and fail the session.
    fn forward(&mut self, command: SpeedCommand) -> Result<(), SessionError> {
        let timeout = self.timing.command_ack_timeout();
        match self.emitter.send(&command, timeout) {
            Ok(ack) => {
                if ack.tick != command.tick {
                    log::debug!("ack for tick {} while sending tick {}", ack.tick, command.tick);
                }
                self.context.report.record_command(&command);
                Ok(())
            }
            Err(err) => {
                log::error!("tick {}: command channel failed: {err}", command.tick);
                self.context.finished = true;
                self.context.report.error = Some(err.to_string());
                let tick = self.next_tick();
                let stop = self.context.machine.force_stop(tick);
                self.context.report.final_mode = SpeedMode::Stopped;
                if let Err(stop_err) = self.emitter.send(&stop, timeout) {
                    log::error!("forced STOPPED also failed: {stop_err}");
                }
                Err(err.into())
            }
        }
    }
}
