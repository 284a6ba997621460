//! Linear fade element.

use crate::element::{Element, ElementContext, JobStatus, SoundInfo};
use crate::elements::forward;
use crate::error::Result;
use std::fmt;

/// Direction of a fade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FadeMode {
    /// Ramp from silence to full level, then pass through.
    #[default]
    FadeIn,
    /// Ramp from full level to silence, then stay silent.
    FadeOut,
}

impl fmt::Display for FadeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FadeMode::FadeIn => write!(f, "fade-in"),
            FadeMode::FadeOut => write!(f, "fade-out"),
        }
    }
}

/// Configuration for [`Fade`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FadeConfig {
    /// Initial fade direction.
    pub mode: FadeMode,
    /// Length of the ramp in milliseconds.
    pub transit_ms: u32,
    /// Format of the processed audio.
    pub info: SoundInfo,
}

impl Default for FadeConfig {
    fn default() -> Self {
        Self {
            mode: FadeMode::FadeIn,
            transit_ms: 500,
            info: SoundInfo::new(48_000, 16, 2),
        }
    }
}

impl FadeConfig {
    /// Set the fade direction.
    pub fn with_mode(mut self, mode: FadeMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the ramp length.
    pub fn with_transit_ms(mut self, ms: u32) -> Self {
        self.transit_ms = ms;
        self
    }

    /// Set the audio format.
    pub fn with_info(mut self, info: SoundInfo) -> Self {
        self.info = info;
        self
    }
}

/// Applies a linear gain ramp to interleaved 16-bit PCM.
///
/// The gain is updated per frame. Once the ramp completes a fade-in passes
/// audio through unchanged and a fade-out emits silence. Changing the mode
/// or calling [`reset`](Fade::reset) restarts the ramp.
///
/// Samples are scaled in place on the input payload, which is then handed
/// to the output port (shared or copied, as the port is configured).
#[derive(Debug)]
pub struct Fade {
    config: FadeConfig,
    /// Frames processed since the ramp started.
    position: u64,
}

impl Fade {
    /// Create a fade.
    pub fn new(config: FadeConfig) -> Self {
        Self {
            config,
            position: 0,
        }
    }

    /// Change direction and restart the ramp.
    pub fn set_mode(&mut self, mode: FadeMode) {
        self.config.mode = mode;
        self.position = 0;
    }

    /// Current direction.
    pub fn mode(&self) -> FadeMode {
        self.config.mode
    }

    /// Restart the ramp.
    pub fn reset(&mut self) {
        self.position = 0;
    }

    fn ramp_frames(&self) -> u64 {
        self.config.info.sample_rate as u64 * self.config.transit_ms as u64 / 1000
    }

    /// Scale `data` in place, advancing the ramp.
    fn apply(&mut self, data: &mut [u8]) {
        let channels = self.config.info.channels.max(1) as usize;
        let total = self.ramp_frames();
        for frame in data.chunks_exact_mut(2 * channels) {
            let step = self.position.min(total);
            let (num, den) = match (self.config.mode, total) {
                (FadeMode::FadeIn, 0) => (1, 1),
                (FadeMode::FadeOut, 0) => (0, 1),
                (FadeMode::FadeIn, _) => (step, total),
                (FadeMode::FadeOut, _) => (total - step, total),
            };
            if num != den {
                for sample in frame.chunks_exact_mut(2) {
                    let v = i16::from_le_bytes([sample[0], sample[1]]) as i64;
                    let scaled = (v * num as i64 / den as i64) as i16;
                    sample.copy_from_slice(&scaled.to_le_bytes());
                }
            }
            self.position += 1;
        }
    }
}

impl Default for Fade {
    fn default() -> Self {
        Self::new(FadeConfig::default())
    }
}

impl Element for Fade {
    fn open(&mut self, ctx: &mut ElementContext) -> JobStatus {
        if ctx.in_port().is_none() || ctx.out_ports().is_empty() {
            tracing::error!("{}: needs an input and an output port", ctx.name());
            return JobStatus::Fail;
        }
        if self.config.info.bits != 16 {
            tracing::error!(
                "{}: only 16-bit audio is supported, got {}",
                ctx.name(),
                self.config.info
            );
            return JobStatus::Fail;
        }
        self.position = 0;
        ctx.report_info(self.config.info);
        tracing::debug!(
            "{}: {} over {} ms ({})",
            ctx.name(),
            self.config.mode,
            self.config.transit_ms,
            self.config.info
        );
        JobStatus::Ok
    }

    fn process(&mut self, ctx: &mut ElementContext) -> JobStatus {
        let (Some(input), outs) = ctx.ports_mut() else {
            return JobStatus::Fail;
        };
        let Some(out) = outs.first_mut() else {
            return JobStatus::Fail;
        };
        let wait = input.wait();
        let mut payload = match input.acquire_in(0, wait) {
            Ok(p) => p,
            Err(e) => return e.into(),
        };
        let done = payload.is_done();
        let valid = payload.valid_size();
        self.apply(&mut payload.as_mut_slice()[..valid]);

        let out_wait = out.wait();
        let forwarded = forward(out, &mut payload, out_wait);
        let released = input.release_in(payload, wait);
        if let Err(e) = forwarded.and(released) {
            return e.into();
        }
        match (done, valid) {
            (true, _) => JobStatus::Done,
            (false, 0) => JobStatus::Ok,
            (false, n) => JobStatus::Produced(n),
        }
    }

    fn close(&mut self, _ctx: &mut ElementContext) -> Result<()> {
        self.position = 0;
        Ok(())
    }

    fn on_sound_info(&mut self, ctx: &mut ElementContext, info: SoundInfo) {
        if info.bits != 16 {
            tracing::warn!("{}: cannot fade {}", ctx.name(), info);
            return;
        }
        self.config.info = info;
        ctx.report_info(info);
    }

    fn kind(&self) -> &'static str {
        "fade"
    }
}
