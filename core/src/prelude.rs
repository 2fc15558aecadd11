use serde::{Deserialize, Serialize};

/// Number of hydrophones in the square array.
pub const CHANNEL_COUNT: usize = 4;

/// Hydrophone channel, numbered as in the array layout (1 at +y, 2 at +x).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    One,
    Two,
    Three,
    Four,
}

impl Channel {
    pub const ALL: [Channel; CHANNEL_COUNT] =
        [Channel::One, Channel::Two, Channel::Three, Channel::Four];

    /// Channels paired against channel 1 for time-delay estimation.
    pub const PAIRED: [Channel; CHANNEL_COUNT - 1] = [Channel::Two, Channel::Three, Channel::Four];

    pub fn index(self) -> usize {
        match self {
            Channel::One => 0,
            Channel::Two => 1,
            Channel::Three => 2,
            Channel::Four => 3,
        }
    }

    pub fn number(self) -> usize {
        self.index() + 1
    }
}

/// One acquisition window of a single channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Acquisition-clock time of the first sample, in seconds.
    pub start_time: f64,
    pub samples: Vec<f64>,
}

impl Frame {
    pub fn new(start_time: f64, samples: Vec<f64>) -> Self {
        Self {
            start_time,
            samples,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Exactly one value per hydrophone channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSet<T> {
    items: [T; CHANNEL_COUNT],
}

impl<T> ChannelSet<T> {
    pub fn new(items: [T; CHANNEL_COUNT]) -> Self {
        Self { items }
    }

    pub fn from_vec(items: Vec<T>) -> PipelineResult<Self> {
        let count = items.len();
        let items: [T; CHANNEL_COUNT] = items.try_into().map_err(|_| {
            PipelineError::InvalidInput(format!(
                "expected {} channels, got {}",
                CHANNEL_COUNT, count
            ))
        })?;
        Ok(Self { items })
    }

    pub fn get(&self, channel: Channel) -> &T {
        &self.items[channel.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Channel, &T)> {
        Channel::ALL.into_iter().zip(self.items.iter())
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> ChannelSet<U> {
        ChannelSet {
            items: self.items.map(f),
        }
    }

    pub fn into_inner(self) -> [T; CHANNEL_COUNT] {
        self.items
    }
}

impl ChannelSet<Frame> {
    /// Checks that every frame shares the start time and length of channel 1.
    pub fn validate(&self, expected_len: usize) -> PipelineResult<()> {
        let reference = self.get(Channel::One);
        for (channel, frame) in self.iter() {
            if frame.len() != expected_len {
                return Err(PipelineError::InvalidInput(format!(
                    "channel {} frame has {} samples, expected {}",
                    channel.number(),
                    frame.len(),
                    expected_len
                )));
            }
            if frame.start_time != reference.start_time {
                return Err(PipelineError::InvalidInput(format!(
                    "channel {} frame starts at {:.9} s, channel 1 at {:.9} s",
                    channel.number(),
                    frame.start_time,
                    reference.start_time
                )));
            }
        }
        Ok(())
    }
}

/// Common error type for pipeline execution.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("numerical fault in {stage}: {detail}")]
    Numerical { stage: &'static str, detail: String },
    #[error("acquisition failure: {0}")]
    Acquisition(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
