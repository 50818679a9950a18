//! Monocular time-to-collision (TTC) avoider
//!
//! This crate estimates time-to-collision for a moving platform from a single camera
//! and distributes the annotated video and the TTC values to remote viewers.
//!
//! # Architecture
//!
//! Each frame cycle runs through:
//!
//! 1. **Capture**: a `FrameSource` yields a color frame; grayscale is derived from it.
//! 2. **Track**: a `FeatureTracker` detects features or follows them into the new frame.
//! 3. **Estimate**: local scales over Delaunay neighbourhoods are thresholded,
//!    aggregated for the whole frame and each half, and median-smoothed into TTC.
//! 4. **Render**: tracks are drawn as fading trails over the frame.
//! 5. **Distribute**: frames and TTC triples are pushed to subscribers with
//!    latest-value semantics over length-prefixed TCP streams.
//!
//! Estimation and rendering run concurrently and are joined before the next capture.
//!
//! # Module Structure
//!
//! - `frame`: frames, points and tracked point pairs
//! - `ingest`: camera sources (synthetic, OpenCV)
//! - `vision`: feature tracking and triangulation backends
//! - `ttc`: local-scale estimator, median filter, steering hints
//! - `render`: motion-trail renderer
//! - `avoider`: frame-cycle orchestrator
//! - `sink`: avoider output consumers
//! - `transport`: framing, TTC codecs, push servers and clients
//! - `config`: runtime configuration

pub mod avoider;
pub mod config;
pub mod frame;
pub mod ingest;
pub mod render;
pub mod sink;
pub mod transport;
pub mod ttc;
pub mod vision;

pub use avoider::{Avoider, AvoiderHandle, AvoiderState, CycleReport};
pub use config::AvoiderConfig;
pub use frame::{FeaturePairs, Frame, Point};
pub use ingest::{CameraConfig, CameraSource, FrameSource};
pub use render::TrackRenderer;
pub use sink::{AvoidanceSink, NetworkSink};
pub use ttc::{BalanceHint, Steer, TtcTriple};
pub use vision::{FeatureTracker, TrackerBackend, Triangulator};
