// The filters built on top of the kernels: the biquad section with its wet/dry mix, the
// coefficient designs of the filter tool (Butterworth high-pass and low-pass, constant-Q
// parametric EQ) and the two-channel filter that runs each channel on its own kernel
// strategy and handles mono, stereo and wider interleaved buffers.

//! Filter consumers of the biquad kernels.

pub mod biquad;
pub mod design;
pub mod stereo;

pub use biquad::Biquad;
pub use design::FilterDesign;
pub use stereo::{Channel, FilterChannel, StereoFilter};
