/// Chart colors, RGBA in linear 0..1.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Theme {
    pub background: [f32; 4],
    pub up: [f32; 4],
    pub down: [f32; 4],
    pub grid: [f32; 4],
    pub crosshair: [f32; 4],
    pub text: [f32; 4],
    pub tooltip_background: [f32; 4],
    /// Straight-alpha opacity applied to the volume strip.
    pub volume_opacity: f32,
}

impl Theme {
    pub fn dark() -> Self {
        Self {
            background: [0.051, 0.059, 0.078, 1.0],
            up: [0.149, 0.651, 0.604, 1.0],
            down: [0.937, 0.325, 0.314, 1.0],
            grid: [1.0, 1.0, 1.0, 0.07],
            crosshair: [0.65, 0.65, 0.7, 0.9],
            text: [0.85, 0.85, 0.88, 1.0],
            tooltip_background: [0.10, 0.11, 0.14, 0.92],
            volume_opacity: 0.45,
        }
    }

    pub fn light() -> Self {
        Self {
            background: [0.988, 0.988, 0.992, 1.0],
            up: [0.101, 0.592, 0.533, 1.0],
            down: [0.898, 0.224, 0.208, 1.0],
            grid: [0.0, 0.0, 0.0, 0.08],
            crosshair: [0.35, 0.35, 0.4, 0.9],
            text: [0.13, 0.13, 0.16, 1.0],
            tooltip_background: [1.0, 1.0, 1.0, 0.95],
            volume_opacity: 0.5,
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::dark()
    }
}
