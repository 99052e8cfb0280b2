// Two-channel filter as used by the filter tool. Each channel owns a biquad section and its
// own kernel strategy (a JIT session per channel, never shared), so the channels can be
// moved to different threads independently. Changing the design recomputes the
// coefficients, clears the delay lines and recreates both kernels.
//
// Interleaved buffers are handled by channel count: mono runs through the left channel;
// stereo is split into left and right sample runs that go through each channel's buffer
// kernel and are interleaved back, with a trailing odd sample going through the left
// channel; wider layouts send even channel slots to the left channel and odd slots to the
// right channel, one sample at a time.

//! Stereo filter.

use super::biquad::Biquad;
use super::design::FilterDesign;
use crate::core::config::JitConfig;
use crate::core::error::{JitError, JitResult};
use crate::kernel::BiquadKernel;

/// Channel selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Left,
    Right,
}

/// A biquad section and the kernel that runs it.
#[derive(Debug)]
pub struct FilterChannel {
    pub biquad: Biquad,
    kernel: BiquadKernel,
}

impl FilterChannel {
    pub fn new(biquad: Biquad, config: &JitConfig) -> Self {
        let kernel = BiquadKernel::select(&biquad.coeffs, config);
        Self { biquad, kernel }
    }

    pub fn kernel(&self) -> &BiquadKernel {
        &self.kernel
    }

    /// Filter one sample, including the wet/dry mix.
    pub fn process_sample(&mut self, x: f64) -> f64 {
        let y = self
            .kernel
            .process_one(&self.biquad.coeffs, &mut self.biquad.state, x);
        self.biquad.mix(x, y)
    }

    /// Filter `data` in place, including the wet/dry mix.
    pub fn process(&mut self, data: &mut [f64]) -> JitResult<()> {
        if self.biquad.is_fully_wet() {
            return self
                .kernel
                .process_in_place(&self.biquad.coeffs, &mut self.biquad.state, data);
        }
        for sample in data.iter_mut() {
            *sample = self.process_sample(*sample);
        }
        Ok(())
    }
}

/// Left/right filter pair sharing one design.
#[derive(Debug)]
pub struct StereoFilter {
    design: FilterDesign,
    sample_rate: f64,
    config: JitConfig,
    left: FilterChannel,
    right: FilterChannel,
}

impl StereoFilter {
    pub fn new(design: FilterDesign, sample_rate: f64, config: &JitConfig) -> JitResult<Self> {
        let coeffs = design.coefficients(sample_rate)?;
        let left = FilterChannel::new(Biquad::with_coefficients(coeffs), config);
        let right = FilterChannel::new(Biquad::with_coefficients(coeffs), config);
        log::debug!(
            "{} filter at {} Hz: left kernel {}, right kernel {}",
            design.name(),
            sample_rate,
            left.kernel().name(),
            right.kernel().name()
        );
        Ok(Self {
            design,
            sample_rate,
            config: config.clone(),
            left,
            right,
        })
    }

    pub fn design(&self) -> FilterDesign {
        self.design
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn channel(&self, channel: Channel) -> &FilterChannel {
        match channel {
            Channel::Left => &self.left,
            Channel::Right => &self.right,
        }
    }

    fn channel_mut(&mut self, channel: Channel) -> &mut FilterChannel {
        match channel {
            Channel::Left => &mut self.left,
            Channel::Right => &mut self.right,
        }
    }

    /// Switch to `design`, resetting both channels and recreating their kernels.
    pub fn update(&mut self, design: FilterDesign) -> JitResult<()> {
        let coeffs = design.coefficients(self.sample_rate)?;
        // The old sessions are dropped before the new ones are created.
        for channel in [Channel::Left, Channel::Right] {
            let slot = self.channel_mut(channel);
            slot.kernel = BiquadKernel::Reference;
            slot.biquad.coeffs = coeffs;
            slot.biquad.flush_delays();
        }
        self.left.kernel = BiquadKernel::select(&coeffs, &self.config);
        self.right.kernel = BiquadKernel::select(&coeffs, &self.config);
        self.design = design;
        Ok(())
    }

    /// Filter one channel's samples in place.
    pub fn process_channel(&mut self, channel: Channel, data: &mut [f64]) -> JitResult<()> {
        self.channel_mut(channel).process(data)
    }

    /// Filter an interleaved buffer of `channels` channels in place.
    pub fn process_interleaved(&mut self, data: &mut [f64], channels: usize) -> JitResult<()> {
        match channels {
            0 => Err(JitError::InvalidArgument {
                reason: "interleaved buffer with zero channels".to_string(),
            }),
            1 => self.left.process(data),
            2 => self.process_stereo(data),
            _ => {
                for (i, sample) in data.iter_mut().enumerate() {
                    let slot = if (i % channels) % 2 == 0 {
                        &mut self.left
                    } else {
                        &mut self.right
                    };
                    *sample = slot.process_sample(*sample);
                }
                Ok(())
            }
        }
    }

    fn process_stereo(&mut self, data: &mut [f64]) -> JitResult<()> {
        let frames = data.len() / 2;
        let mut left: Vec<f64> = data.iter().step_by(2).take(frames).copied().collect();
        let mut right: Vec<f64> = data.iter().skip(1).step_by(2).copied().collect();

        self.left.process(&mut left)?;
        self.right.process(&mut right)?;

        for (frame, (l, r)) in data.chunks_exact_mut(2).zip(left.iter().zip(&right)) {
            frame[0] = *l;
            frame[1] = *r;
        }
        if data.len() % 2 == 1 {
            let last = data.len() - 1;
            data[last] = self.left.process_sample(data[last]);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_config() -> JitConfig {
        JitConfig::default().with_enabled(false)
    }

    #[test]
    fn test_zero_channels_is_rejected() {
        let mut filter = StereoFilter::new(
            FilterDesign::LowPass { frequency: 1000.0 },
            44_100.0,
            &reference_config(),
        )
        .unwrap();
        let mut data = [0.5; 4];
        assert!(filter.process_interleaved(&mut data, 0).is_err());
        assert_eq!(data, [0.5; 4]);
    }

    #[test]
    fn test_odd_stereo_tail_goes_left() {
        let design = FilterDesign::LowPass { frequency: 1000.0 };
        let mut filter = StereoFilter::new(design, 44_100.0, &reference_config()).unwrap();
        let mut data = [1.0, -1.0, 0.5];
        filter.process_interleaved(&mut data, 2).unwrap();

        let mut left = StereoFilter::new(design, 44_100.0, &reference_config()).unwrap();
        let mut expected = [1.0, 0.5];
        left.process_channel(Channel::Left, &mut expected).unwrap();
        assert_eq!(data[0], expected[0]);
        assert_eq!(data[2], expected[1]);
    }
}
