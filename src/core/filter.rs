//! Filter data model shared by the reference kernel and the compiled kernels.
//!
//! Coefficients are supplied fresh on every invocation; the compiled program
//! never captures them. The delay state belongs to the host filter channel.

/// Biquad coefficients: `a0..a2` feed forward, `b1`/`b2` feed back.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FilterCoefficients {
    pub a0: f64,
    pub a1: f64,
    pub a2: f64,
    pub b1: f64,
    pub b2: f64,
}

impl FilterCoefficients {
    pub const fn new(a0: f64, a1: f64, a2: f64, b1: f64, b2: f64) -> Self {
        Self { a0, a1, a2, b1, b2 }
    }

    /// Pass-through filter (`y[n] = x[n]`).
    pub const fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0, 0.0)
    }

    pub fn is_finite(&self) -> bool {
        [self.a0, self.a1, self.a2, self.b1, self.b2]
            .iter()
            .all(|c| c.is_finite())
    }
}

/// Delay line of one filter channel.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FilterState {
    /// x[n-1]
    pub x1: f64,
    /// x[n-2]
    pub x2: f64,
    /// y[n-1]
    pub y1: f64,
    /// y[n-2]
    pub y2: f64,
}

impl FilterState {
    /// Number of slots in the packed representation passed to compiled code.
    pub const SLOTS: usize = 4;

    pub const fn new(x1: f64, x2: f64, y1: f64, y2: f64) -> Self {
        Self { x1, x2, y1, y2 }
    }

    /// Shift the delay line after producing `y` from input `x`.
    #[inline]
    pub fn push(&mut self, x: f64, y: f64) {
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
    }

    /// Zero every delay element.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Packed slot order: `[x[n-1], x[n-2], y[n-1], y[n-2]]`.
    pub fn to_array(&self) -> [f64; Self::SLOTS] {
        [self.x1, self.x2, self.y1, self.y2]
    }

    pub fn from_array(slots: [f64; Self::SLOTS]) -> Self {
        let [x1, x2, y1, y2] = slots;
        Self { x1, x2, y1, y2 }
    }
}
