//! Channel-backed adapters between sensor threads and the orchestrator.
//!
//! Sensor threads push whole frames into bounded channels; the orchestrator
//! pulls them at the start of a tick. A frame is only visible once it has been
//! sent in full, so a tick never observes partial sensor state.

use crate::{DepthSampler, DetectorAdapter, DetectorFrame, SensorError};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use nalgebra::Point2;
use proximity_guard_core::DepthSample;
use std::collections::VecDeque;
use std::time::Duration;

/// Create a detector mailbox holding at most `capacity` pending frames.
pub fn detector_channel(capacity: usize) -> (Sender<DetectorFrame>, ChannelDetector) {
    let (tx, rx) = bounded(capacity.max(1));
    (tx, ChannelDetector { rx })
}

/// Create a depth mailbox; the sampler keeps `history` recent depth maps.
pub fn depth_channel(capacity: usize, history: usize) -> (Sender<DepthMap>, DepthMapSampler) {
    let (tx, rx) = bounded(capacity.max(1));
    (tx, DepthMapSampler::new(rx, history))
}

/// Detector adapter reading frames pushed by a detector thread.
///
/// Frames that queued up while a tick was running are skipped; only the
/// newest one is processed.
#[derive(Debug)]
pub struct ChannelDetector {
    rx: Receiver<DetectorFrame>,
}

impl DetectorAdapter for ChannelDetector {
    fn poll(&mut self, timeout: Duration) -> Result<DetectorFrame, SensorError> {
        let mut frame = self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => SensorError::Timeout(timeout),
            RecvTimeoutError::Disconnected => SensorError::Disconnected,
        })?;

        let mut skipped = 0usize;
        while let Ok(newer) = self.rx.try_recv() {
            frame = newer;
            skipped += 1;
        }
        if skipped > 0 {
            log::debug!("skipped {skipped} queued detector frame(s)");
        }
        Ok(frame)
    }
}

/// Dense depth image aligned to the color stream, in meters.
#[derive(Clone, Debug, PartialEq)]
pub struct DepthMap {
    pub width: usize,
    pub height: usize,
    pub captured_at_ms: u64,
    /// Row-major, `len = width * height`. Zero marks a dropout.
    pub data: Vec<f32>,
}

impl DepthMap {
    /// Depth at the pixel nearest to `p`, if inside the map.
    pub fn at(&self, p: Point2<f32>) -> Option<f32> {
        let x = p.x.round();
        let y = p.y.round();
        if !x.is_finite() || !y.is_finite() || x < 0.0 || y < 0.0 {
            return None;
        }
        let (x, y) = (x as usize, y as usize);
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data.get(y * self.width + x).copied()
    }
}

/// Depth sampler over a short history of depth maps received from a channel.
#[derive(Debug)]
pub struct DepthMapSampler {
    rx: Receiver<DepthMap>,
    history: VecDeque<DepthMap>,
    capacity: usize,
    disconnected: bool,
}

impl DepthMapSampler {
    pub fn new(rx: Receiver<DepthMap>, history: usize) -> Self {
        let capacity = history.max(1);
        Self {
            rx,
            history: VecDeque::with_capacity(capacity),
            capacity,
            disconnected: false,
        }
    }

    fn push(&mut self, map: DepthMap) {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(map);
    }

    fn drain(&mut self) {
        loop {
            match self.rx.try_recv() {
                Ok(map) => self.push(map),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.disconnected = true;
                    break;
                }
            }
        }
    }

    fn closest(&self, timestamp_ms: u64) -> Option<&DepthMap> {
        self.history
            .iter()
            .min_by_key(|m| m.captured_at_ms.abs_diff(timestamp_ms))
    }
}

impl DepthSampler for DepthMapSampler {
    fn sample(
        &mut self,
        pixel: Point2<f32>,
        timestamp_ms: u64,
        timeout: Duration,
    ) -> Result<DepthSample, SensorError> {
        self.drain();
        if self.history.is_empty() {
            if self.disconnected {
                return Err(SensorError::Disconnected);
            }
            match self.rx.recv_timeout(timeout) {
                Ok(map) => self.push(map),
                Err(RecvTimeoutError::Timeout) => return Err(SensorError::Timeout(timeout)),
                Err(RecvTimeoutError::Disconnected) => {
                    self.disconnected = true;
                    return Err(SensorError::Disconnected);
                }
            }
        }

        let map = self.closest(timestamp_ms).ok_or(SensorError::Timeout(timeout))?;
        Ok(match map.at(pixel) {
            Some(depth) => DepthSample::new(pixel, depth, map.captured_at_ms),
            None => DepthSample::invalid(pixel, map.captured_at_ms),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proximity_guard_core::PixelDetection;

    fn flat_map(depth: f32, captured_at_ms: u64) -> DepthMap {
        DepthMap {
            width: 8,
            height: 6,
            captured_at_ms,
            data: vec![depth; 48],
        }
    }

    #[test]
    fn detector_keeps_newest_frame() {
        let (tx, mut det) = detector_channel(4);
        for ts in [10, 20, 30] {
            tx.send(DetectorFrame {
                timestamp_ms: ts,
                detections: vec![PixelDetection::tool(1.0, 1.0, 0.9)],
            })
            .expect("send");
        }
        let frame = det.poll(Duration::from_millis(10)).expect("frame");
        assert_eq!(frame.timestamp_ms, 30);
    }

    #[test]
    fn detector_times_out_and_reports_disconnect() {
        let (tx, mut det) = detector_channel(1);
        assert_eq!(
            det.poll(Duration::from_millis(5)),
            Err(SensorError::Timeout(Duration::from_millis(5)))
        );
        drop(tx);
        assert_eq!(
            det.poll(Duration::from_millis(5)),
            Err(SensorError::Disconnected)
        );
    }

    #[test]
    fn detector_receives_frames_from_another_thread() {
        let (tx, mut det) = detector_channel(2);
        let handle = std::thread::spawn(move || {
            tx.send(DetectorFrame {
                timestamp_ms: 7,
                detections: Vec::new(),
            })
            .expect("send");
        });
        let frame = det.poll(Duration::from_secs(2)).expect("frame");
        assert_eq!(frame.timestamp_ms, 7);
        handle.join().expect("sender thread");
    }

    #[test]
    fn depth_sampler_picks_closest_map() {
        let (tx, mut sampler) = depth_channel(4, 3);
        tx.send(flat_map(0.4, 100)).expect("send");
        tx.send(flat_map(0.6, 133)).expect("send");
        let s = sampler
            .sample(Point2::new(2.0, 2.0), 130, Duration::from_millis(5))
            .expect("sample");
        assert!(s.valid);
        assert_relative_eq!(s.depth_m, 0.6);
        assert_eq!(s.captured_at_ms, 133);

        let s = sampler
            .sample(Point2::new(2.0, 2.0), 101, Duration::from_millis(5))
            .expect("sample");
        assert_relative_eq!(s.depth_m, 0.4);
    }

    #[test]
    fn depth_sampler_flags_dropouts_and_out_of_bounds() {
        let (tx, mut sampler) = depth_channel(2, 2);
        let mut map = flat_map(0.5, 0);
        map.data[2 * 8 + 3] = 0.0;
        tx.send(map).expect("send");

        let hole = sampler
            .sample(Point2::new(3.2, 1.8), 0, Duration::from_millis(5))
            .expect("sample");
        assert!(!hole.valid);

        let outside = sampler
            .sample(Point2::new(50.0, 2.0), 0, Duration::from_millis(5))
            .expect("sample");
        assert!(!outside.valid);
    }

    #[test]
    fn depth_sampler_history_is_bounded() {
        let (tx, mut sampler) = depth_channel(8, 2);
        for ts in [0, 10, 20, 30] {
            tx.send(flat_map(ts as f32 / 100.0 + 0.1, ts)).expect("send");
        }
        let s = sampler
            .sample(Point2::new(0.0, 0.0), 0, Duration::from_millis(5))
            .expect("sample");
        // Maps at 0 and 10 ms were evicted.
        assert_eq!(s.captured_at_ms, 20);
    }

    #[test]
    fn depth_sampler_times_out_without_maps() {
        let (_tx, mut sampler) = depth_channel(1, 1);
        assert_eq!(
            sampler.sample(Point2::new(0.0, 0.0), 0, Duration::from_millis(2)),
            Err(SensorError::Timeout(Duration::from_millis(2)))
        );
    }
}
