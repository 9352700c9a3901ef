//! Per-callback metadata passed into the engine by the audio backend

bitflags::bitflags! {
    /// Stream condition reported for one callback
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StreamStatus: u32 {
        /// Input samples were lost before this block
        const INPUT_OVERFLOW = 0b0000_0001;
        /// Input block was not fully available (filled with silence)
        const INPUT_UNDERFLOW = 0b0000_0010;
        /// Output was not delivered in time
        const OUTPUT_UNDERFLOW = 0b0000_0100;
        /// Output data was discarded by the device
        const OUTPUT_OVERFLOW = 0b0000_1000;
        /// Stream is priming; output is not heard yet
        const PRIMING_OUTPUT = 0b0001_0000;
        /// The device reported a stream error since the last block
        const STREAM_ERROR = 0b0010_0000;
    }
}

impl StreamStatus {
    /// Flags that make the block's audio untrustworthy
    pub const XRUN: StreamStatus = StreamStatus::INPUT_OVERFLOW
        .union(StreamStatus::INPUT_UNDERFLOW)
        .union(StreamStatus::OUTPUT_UNDERFLOW)
        .union(StreamStatus::OUTPUT_OVERFLOW)
        .union(StreamStatus::STREAM_ERROR);

    #[inline]
    pub fn is_xrun(self) -> bool {
        self.intersects(Self::XRUN)
    }
}

/// Stream clock readings for one callback, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CallbackTiming {
    /// Stream time when the callback was invoked
    pub current_time: f64,
    /// When the first input frame was captured
    pub input_adc_time: f64,
    /// When the first output frame will be heard
    pub output_dac_time: f64,
}

impl CallbackTiming {
    /// Output latency implied by this callback
    pub fn output_latency(&self) -> f64 {
        (self.output_dac_time - self.current_time).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xrun_detection() {
        assert!(!StreamStatus::empty().is_xrun());
        assert!(!StreamStatus::PRIMING_OUTPUT.is_xrun());
        assert!(StreamStatus::INPUT_UNDERFLOW.is_xrun());
        assert!((StreamStatus::OUTPUT_UNDERFLOW | StreamStatus::PRIMING_OUTPUT).is_xrun());
    }

    #[test]
    fn test_stream_error_is_its_own_flag() {
        assert!(StreamStatus::STREAM_ERROR.is_xrun());
        assert!(!StreamStatus::STREAM_ERROR.contains(StreamStatus::OUTPUT_UNDERFLOW));
        assert!(!StreamStatus::XRUN.contains(StreamStatus::PRIMING_OUTPUT));
    }

    #[test]
    fn test_output_latency() {
        let timing = CallbackTiming {
            current_time: 1.0,
            input_adc_time: 0.99,
            output_dac_time: 1.005,
        };
        assert!((timing.output_latency() - 0.005).abs() < 1e-9);
        assert_eq!(CallbackTiming::default().output_latency(), 0.0);
    }
}
