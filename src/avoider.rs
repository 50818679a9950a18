//! Frame-cycle orchestrator.
//!
//! One cycle: capture, then either detect features (when uninitialized) or track the
//! reference points into the new frame. Tracked pairs are handed to the estimator and
//! the renderer on two scoped worker threads; both are joined before the cycle ends,
//! so cycles never overlap.

use anyhow::{anyhow, Result};
use image::{GrayImage, RgbImage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::config::AvoiderConfig;
use crate::frame::{FeaturePairs, Frame, Point};
use crate::ingest::FrameSource;
use crate::render::TrackRenderer;
use crate::sink::AvoidanceSink;
use crate::ttc::{EstimateOutcome, TtcEstimator, TtcTriple};
use crate::vision::{DelaunayTriangulator, FeatureTracker, TrackOutcome};

/// Externally visible orchestrator state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AvoiderState {
    Uninitialized,
    Tracking,
}

/// Reference frame and points carried between tracking cycles.
struct Reference {
    gray: GrayImage,
    points: Vec<Point>,
}

enum CycleState {
    Uninitialized,
    Tracking(Reference),
}

impl CycleState {
    fn public(&self) -> AvoiderState {
        match self {
            CycleState::Uninitialized => AvoiderState::Uninitialized,
            CycleState::Tracking(_) => AvoiderState::Tracking,
        }
    }
}

/// What one cycle did.
#[derive(Clone, Debug, PartialEq)]
pub struct CycleReport {
    pub before: AvoiderState,
    pub after: AvoiderState,
    /// Good point pairs this cycle (detected points when initializing).
    pub points: usize,
    /// Triple emitted this cycle, if a median window completed.
    pub triple: Option<TtcTriple>,
}

pub struct Avoider {
    source: Box<dyn FrameSource>,
    tracker: Box<dyn FeatureTracker>,
    sink: Box<dyn AvoidanceSink>,
    estimator: TtcEstimator,
    renderer: TrackRenderer,
    state: CycleState,
    min_period: Duration,
    cycles: u64,
}

impl Avoider {
    pub fn new(
        config: &AvoiderConfig,
        source: Box<dyn FrameSource>,
        tracker: Box<dyn FeatureTracker>,
        sink: Box<dyn AvoidanceSink>,
    ) -> Self {
        Self {
            source,
            tracker,
            sink,
            estimator: TtcEstimator::new(&config.estimator, Box::new(DelaunayTriangulator::new())),
            renderer: TrackRenderer::new(config.trail_size, config.features.max_corners),
            state: CycleState::Uninitialized,
            min_period: config.min_period,
            cycles: 0,
        }
    }

    /// Build an avoider and run it on a dedicated thread.
    pub fn spawn(
        config: &AvoiderConfig,
        source: Box<dyn FrameSource>,
        tracker: Box<dyn FeatureTracker>,
        sink: Box<dyn AvoidanceSink>,
    ) -> Result<AvoiderHandle> {
        Self::new(config, source, tracker, sink).start()
    }

    pub fn start(mut self) -> Result<AvoiderHandle> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_thread = stop.clone();
        let join = std::thread::Builder::new()
            .name("avoider".to_string())
            .spawn(move || self.run(&stop_thread))?;
        Ok(AvoiderHandle {
            stop,
            join: Some(join),
        })
    }

    pub fn state(&self) -> AvoiderState {
        self.state.public()
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Run cycles until `stop` is set or the source is exhausted. The camera is released
    /// on every exit path.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<()> {
        log::info!("avoider started (tracker: {})", self.tracker.name());
        let result = self.run_loop(stop);
        if let Err(err) = self.source.release() {
            log::warn!("camera release failed: {}", err);
        }
        match &result {
            Ok(()) => log::info!("avoider stopped after {} cycles", self.cycles),
            Err(err) => log::error!("avoider failed after {} cycles: {}", self.cycles, err),
        }
        result
    }

    fn run_loop(&mut self, stop: &AtomicBool) -> Result<()> {
        while !stop.load(Ordering::SeqCst) {
            let started = Instant::now();
            let Some(report) = self.run_cycle()? else {
                log::info!("camera stream exhausted");
                break;
            };
            if report.before != report.after {
                log::info!(
                    "avoider {:?} -> {:?} ({} points)",
                    report.before,
                    report.after,
                    report.points
                );
            }
            let elapsed = started.elapsed();
            if elapsed < self.min_period {
                std::thread::sleep(self.min_period - elapsed);
            }
        }
        Ok(())
    }

    /// Execute exactly one cycle. `Ok(None)` means the source is exhausted.
    pub fn run_cycle(&mut self) -> Result<Option<CycleReport>> {
        let started = Instant::now();
        let Some(color) = self.source.next_frame()? else {
            return Ok(None);
        };
        let frame = Frame::new(color);
        self.cycles += 1;
        let before = self.state.public();
        let state = std::mem::replace(&mut self.state, CycleState::Uninitialized);
        let (next, points, triple) = match state {
            CycleState::Uninitialized => self.initialize(frame, started)?,
            CycleState::Tracking(reference) => self.track(reference, frame, started)?,
        };
        self.state = next;
        Ok(Some(CycleReport {
            before,
            after: self.state.public(),
            points,
            triple,
        }))
    }

    /// Detect features on `frame`; the TTC clock restarts at the cycle's start time.
    fn initialize(
        &mut self,
        frame: Frame,
        started: Instant,
    ) -> Result<(CycleState, usize, Option<TtcTriple>)> {
        let points = self.tracker.detect_features(frame.gray())?;
        self.emit_frame(frame.color());
        if points.is_empty() {
            log::debug!("no features detected; staying uninitialized");
            return Ok((CycleState::Uninitialized, 0, None));
        }
        self.renderer.reset(frame.width(), frame.height());
        self.estimator.reset(started);
        let count = points.len();
        let (_, gray) = frame.into_parts();
        Ok((CycleState::Tracking(Reference { gray, points }), count, None))
    }

    fn track(
        &mut self,
        reference: Reference,
        frame: Frame,
        now: Instant,
    ) -> Result<(CycleState, usize, Option<TtcTriple>)> {
        let outcome = self
            .tracker
            .track(&reference.gray, frame.gray(), &reference.points)?;
        let TrackOutcome::Tracked { new_points, status } = outcome else {
            log::debug!("all tracks lost; re-initializing");
            self.emit_frame(frame.color());
            return Ok((CycleState::Uninitialized, 0, None));
        };
        let pairs = FeaturePairs::from_tracking(&reference.points, &new_points, &status);
        let width = frame.width();

        let estimator = &mut self.estimator;
        let renderer = &mut self.renderer;
        let (estimate, composed) = std::thread::scope(|scope| {
            let estimate = scope.spawn(|| estimator.estimate(&pairs, width, now));
            let render = scope.spawn(|| renderer.render(frame.color(), &pairs));
            (estimate.join(), render.join())
        });
        let estimate = estimate.map_err(|_| anyhow!("estimator worker panicked"))?;
        let composed = composed.map_err(|_| anyhow!("renderer worker panicked"))?;

        let count = pairs.len();
        let (next, triple) = match estimate {
            EstimateOutcome::InsufficientInformation => {
                log::debug!("insufficient scale information; re-initializing");
                (CycleState::Uninitialized, None)
            }
            outcome => {
                let (_, gray) = frame.into_parts();
                let points = pairs.into_new_points();
                let triple = match outcome {
                    EstimateOutcome::Ready(triple) => Some(triple),
                    _ => None,
                };
                (CycleState::Tracking(Reference { gray, points }), triple)
            }
        };

        self.emit_frame(&composed);
        if let Some(triple) = triple {
            self.emit_triple(&triple);
        }
        Ok((next, count, triple))
    }

    fn emit_frame(&mut self, frame: &RgbImage) {
        if let Err(err) = self.sink.on_frame(frame) {
            log::warn!("frame sink failed: {}", err);
        }
    }

    fn emit_triple(&mut self, triple: &TtcTriple) {
        let hint = triple.balance_hint();
        log::info!(
            "ttc min={:.3}s left={:.3}s right={:.3}s steer={:?}",
            triple.min,
            triple.left,
            triple.right,
            hint.steer()
        );
        if let Err(err) = self.sink.on_min_ttc(triple.min) {
            log::warn!("ttc sink failed: {}", err);
            return;
        }
        if let Err(err) = self.sink.on_balance_hint(hint) {
            log::warn!("balance sink failed: {}", err);
        }
    }
}

/// Handle to an avoider running on its own thread.
#[derive(Debug)]
pub struct AvoiderHandle {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<Result<()>>>,
}

impl AvoiderHandle {
    /// True once the loop has exited on its own or after a stop request.
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, |join| join.is_finished())
    }

    /// Request a stop at the next cycle boundary and wait for the loop to exit.
    pub fn stop(self) -> Result<()> {
        self.stop.store(true, Ordering::SeqCst);
        self.join()
    }

    /// Wait for the loop to exit and return its result.
    pub fn join(mut self) -> Result<()> {
        match self.join.take() {
            Some(join) => join
                .join()
                .map_err(|_| anyhow!("avoider thread panicked"))?,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::SyntheticCamera;
    use crate::ttc::BalanceHint;
    use crate::vision::{FeatureParams, ScaledScene, SyntheticTracker};
    use std::sync::Mutex;

    #[derive(Clone, Debug, PartialEq)]
    enum Event {
        Frame,
        MinTtc(f64),
        Hint(BalanceHint),
    }

    #[derive(Clone, Default)]
    struct RecordingSink {
        events: Arc<Mutex<Vec<Event>>>,
    }

    impl RecordingSink {
        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }
    }

    impl AvoidanceSink for RecordingSink {
        fn on_frame(&mut self, _frame: &RgbImage) -> Result<()> {
            self.events.lock().unwrap().push(Event::Frame);
            Ok(())
        }

        fn on_min_ttc(&mut self, ttc: f64) -> Result<()> {
            self.events.lock().unwrap().push(Event::MinTtc(ttc));
            Ok(())
        }

        fn on_balance_hint(&mut self, hint: BalanceHint) -> Result<()> {
            self.events.lock().unwrap().push(Event::Hint(hint));
            Ok(())
        }
    }

    /// Tracker that loses every point on the nth `track` call.
    struct LosingTracker {
        inner: SyntheticTracker,
        lose_on: usize,
        calls: usize,
    }

    impl FeatureTracker for LosingTracker {
        fn name(&self) -> &'static str {
            "losing"
        }

        fn detect_features(&mut self, gray: &GrayImage) -> Result<Vec<Point>> {
            self.inner.detect_features(gray)
        }

        fn track(&mut self, old: &GrayImage, new: &GrayImage, points: &[Point]) -> Result<TrackOutcome> {
            self.calls += 1;
            if self.calls == self.lose_on {
                return Ok(TrackOutcome::Lost);
            }
            self.inner.track(old, new, points)
        }
    }

    /// Tracker whose detection step takes a fixed time.
    struct SlowDetectTracker {
        inner: SyntheticTracker,
        delay: Duration,
    }

    impl FeatureTracker for SlowDetectTracker {
        fn name(&self) -> &'static str {
            "slow-detect"
        }

        fn detect_features(&mut self, gray: &GrayImage) -> Result<Vec<Point>> {
            std::thread::sleep(self.delay);
            self.inner.detect_features(gray)
        }

        fn track(&mut self, old: &GrayImage, new: &GrayImage, points: &[Point]) -> Result<TrackOutcome> {
            self.inner.track(old, new, points)
        }
    }

    struct FailingSource;

    impl FrameSource for FailingSource {
        fn next_frame(&mut self) -> Result<Option<RgbImage>> {
            anyhow::bail!("device unplugged")
        }
    }

    fn scene(scale: f32) -> ScaledScene {
        ScaledScene::new(160, 120, scale)
    }

    fn config() -> AvoiderConfig {
        let mut cfg = AvoiderConfig::default();
        cfg.camera.width = 160;
        cfg.camera.height = 120;
        cfg.features.max_corners = 36;
        cfg.min_period = Duration::ZERO;
        cfg
    }

    fn avoider(scale: f32, frames: u64, sink: RecordingSink) -> Avoider {
        let cfg = config();
        Avoider::new(
            &cfg,
            Box::new(SyntheticCamera::new(scene(scale)).with_frame_limit(frames)),
            Box::new(SyntheticTracker::new(scene(scale), cfg.features.clone())),
            Box::new(sink),
        )
    }

    #[test]
    fn first_cycle_initializes_then_tracks() {
        let sink = RecordingSink::default();
        let mut avoider = avoider(0.95, 10, sink.clone());
        let first = avoider.run_cycle().unwrap().unwrap();
        assert_eq!(first.before, AvoiderState::Uninitialized);
        assert_eq!(first.after, AvoiderState::Tracking);
        assert_eq!(first.points, 36);

        let second = avoider.run_cycle().unwrap().unwrap();
        assert_eq!(second.before, AvoiderState::Tracking);
        assert_eq!(second.after, AvoiderState::Tracking);
        assert!(second.triple.is_none());
        assert_eq!(sink.events(), vec![Event::Frame, Event::Frame]);
    }

    #[test]
    fn triple_emitted_once_window_completes() {
        let sink = RecordingSink::default();
        let mut avoider = avoider(0.95, 10, sink.clone());
        let mut reports = Vec::new();
        for _ in 0..6 {
            reports.push(avoider.run_cycle().unwrap().unwrap());
        }
        assert!(reports[..5].iter().all(|r| r.triple.is_none()));
        let triple = reports[5].triple.expect("window of five tracking cycles");
        assert!(triple.min.is_finite() && triple.min >= 0.0);

        let events = sink.events();
        let tail = &events[events.len() - 3..];
        assert_eq!(tail[0], Event::Frame);
        assert_eq!(tail[1], Event::MinTtc(triple.min));
        assert_eq!(tail[2], Event::Hint(triple.balance_hint()));
    }

    #[test]
    fn expanding_scene_reinitializes_every_cycle() {
        let sink = RecordingSink::default();
        let mut avoider = avoider(1.05, 10, sink.clone());
        avoider.run_cycle().unwrap().unwrap();
        let report = avoider.run_cycle().unwrap().unwrap();
        assert_eq!(report.before, AvoiderState::Tracking);
        assert_eq!(report.after, AvoiderState::Uninitialized);
        assert!(report.triple.is_none());
        // The insufficient-information cycle still renders, but reports no TTC.
        assert_eq!(sink.events(), vec![Event::Frame, Event::Frame]);
    }

    #[test]
    fn ttc_clock_includes_detection_time() {
        let cfg = config();
        let sink = RecordingSink::default();
        let tracker = SlowDetectTracker {
            inner: SyntheticTracker::new(scene(0.95), cfg.features.clone()),
            delay: Duration::from_millis(200),
        };
        let mut avoider = Avoider::new(
            &cfg,
            Box::new(SyntheticCamera::new(scene(0.95)).with_frame_limit(10)),
            Box::new(tracker),
            Box::new(sink),
        );
        let mut last = None;
        for _ in 0..6 {
            last = avoider.run_cycle().unwrap().unwrap().triple;
        }
        let triple = last.expect("window of five tracking cycles");
        // Scale per cycle is 1/0.95 - 1; the 200ms detection spreads over five samples.
        let min_delta = 0.2 / 5.0;
        let scale = 1.0 / 0.95 - 1.0;
        assert!(triple.min >= 0.9 * min_delta / scale, "min ttc {}", triple.min);
    }

    #[test]
    fn lost_tracks_emit_raw_frame_and_reinitialize() {
        let cfg = config();
        let sink = RecordingSink::default();
        let tracker = LosingTracker {
            inner: SyntheticTracker::new(scene(0.95), cfg.features.clone()),
            lose_on: 2,
            calls: 0,
        };
        let mut avoider = Avoider::new(
            &cfg,
            Box::new(SyntheticCamera::new(scene(0.95)).with_frame_limit(10)),
            Box::new(tracker),
            Box::new(sink.clone()),
        );
        for _ in 0..2 {
            avoider.run_cycle().unwrap();
        }
        let lost = avoider.run_cycle().unwrap().unwrap();
        assert_eq!(lost.after, AvoiderState::Uninitialized);
        assert_eq!(lost.points, 0);
        let recovered = avoider.run_cycle().unwrap().unwrap();
        assert_eq!(recovered.after, AvoiderState::Tracking);
        assert_eq!(sink.events().len(), 4);
    }

    #[test]
    fn exhausted_source_ends_run() {
        let mut avoider = avoider(0.95, 3, RecordingSink::default());
        avoider.run(&AtomicBool::new(false)).unwrap();
        assert_eq!(avoider.cycles(), 3);
    }

    #[test]
    fn stop_flag_is_checked_between_cycles() {
        let mut avoider = avoider(0.95, 10, RecordingSink::default());
        avoider.run(&AtomicBool::new(true)).unwrap();
        assert_eq!(avoider.cycles(), 0);
    }

    #[test]
    fn capture_failure_is_returned_from_join() {
        let cfg = config();
        let handle = Avoider::spawn(
            &cfg,
            Box::new(FailingSource),
            Box::new(SyntheticTracker::new(scene(0.95), FeatureParams::default())),
            Box::new(RecordingSink::default()),
        )
        .unwrap();
        let err = handle.join().unwrap_err();
        assert!(err.to_string().contains("device unplugged"));
    }

    #[test]
    fn handle_stop_joins_running_loop() {
        let mut cfg = config();
        cfg.min_period = Duration::from_millis(5);
        let sink = RecordingSink::default();
        let handle = Avoider::spawn(
            &cfg,
            Box::new(SyntheticCamera::new(scene(0.95))),
            Box::new(SyntheticTracker::new(scene(0.95), cfg.features.clone())),
            Box::new(sink.clone()),
        )
        .unwrap();
        std::thread::sleep(Duration::from_millis(50));
        handle.stop().unwrap();
        assert!(!sink.events().is_empty());
    }
}
