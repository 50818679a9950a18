//! Consumers of avoider output.

use anyhow::Result;
use image::RgbImage;

use crate::transport::{FramePublisher, TtcPublisher};
use crate::ttc::{BalanceHint, TtcTriple};

/// Receives the composed frame every cycle and TTC values whenever a median window
/// completes. `on_min_ttc` is always called before the matching `on_balance_hint`.
pub trait AvoidanceSink: Send {
    fn on_frame(&mut self, frame: &RgbImage) -> Result<()>;

    fn on_min_ttc(&mut self, ttc: f64) -> Result<()>;

    fn on_balance_hint(&mut self, hint: BalanceHint) -> Result<()>;
}

/// Publishes frames to the frame channel and triples to the TTC channel.
pub struct NetworkSink {
    frames: FramePublisher,
    ttc: TtcPublisher,
    last_min: f64,
}

impl NetworkSink {
    pub fn new(frames: FramePublisher, ttc: TtcPublisher) -> Self {
        Self {
            frames,
            ttc,
            last_min: f64::INFINITY,
        }
    }
}

impl AvoidanceSink for NetworkSink {
    fn on_frame(&mut self, frame: &RgbImage) -> Result<()> {
        self.frames.publish(frame)?;
        Ok(())
    }

    fn on_min_ttc(&mut self, ttc: f64) -> Result<()> {
        self.last_min = ttc;
        Ok(())
    }

    fn on_balance_hint(&mut self, hint: BalanceHint) -> Result<()> {
        let triple = TtcTriple {
            min: self.last_min,
            left: hint.left_ttc,
            right: hint.right_ttc,
        };
        self.ttc.publish(&triple)?;
        Ok(())
    }
}
