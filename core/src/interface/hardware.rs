use crate::prelude::{Channel, ChannelSet, Frame, PipelineResult};
use serde::{Deserialize, Serialize};

/// Triggered sampling of the hydrophone channels.
///
/// `trigger_delay` is measured from the start of the current period. Frames
/// returned by one `sample_all_channels` call must share their start time.
pub trait Acquisition {
    fn sample_channel(&mut self, channel: Channel, trigger_delay: f64) -> PipelineResult<Frame>;

    fn sample_all_channels(&mut self, trigger_delay: f64) -> PipelineResult<ChannelSet<Frame>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GainDirection {
    Increase,
    Decrease,
}

/// Programmable-gain amplifier shared by all channels.
pub trait GainControl {
    fn adjust_gain(&mut self, direction: GainDirection);
}

/// Blocks until the next pulse period begins.
pub trait PeriodTimer {
    fn wait_until_next_period(&mut self, prt: f64);
}
