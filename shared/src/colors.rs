pub type Rgb = (u8, u8, u8);

/// Sequential choropleth ramp, low to high.
pub const RAMP_STOPS: &[(f64, Rgb)] = &[
    (0.00, (237, 248, 251)),
    (0.25, (179, 205, 227)),
    (0.50, (140, 150, 198)),
    (0.75, (136, 86, 167)),
    (1.00, (129, 15, 124)),
];

pub const TONE_POSITIVE: Rgb = (46, 160, 67);
pub const TONE_NEGATIVE: Rgb = (207, 34, 46);
pub const TONE_NEUTRAL: Rgb = (110, 118, 129);

fn lerp_u8(a: u8, b: u8, t: f64) -> u8 {
    let t = t.clamp(0.0, 1.0);
    let value = a as f64 + (b as f64 - a as f64) * t;
    value.round().clamp(0.0, 255.0) as u8
}

/// Colour of a normalized value (0 = legend min, 1 = legend max). Out-of-range input is clamped.
pub fn ramp_color(intensity: f64) -> Rgb {
    let intensity = if intensity.is_finite() {
        intensity.clamp(0.0, 1.0)
    } else {
        0.0
    };
    for window in RAMP_STOPS.windows(2) {
        let (left_pos, left) = window[0];
        let (right_pos, right) = window[1];
        if intensity >= left_pos && intensity <= right_pos {
            let span = (right_pos - left_pos).max(f64::EPSILON);
            let t = (intensity - left_pos) / span;
            return (
                lerp_u8(left.0, right.0, t),
                lerp_u8(left.1, right.1, t),
                lerp_u8(left.2, right.2, t),
            );
        }
    }
    RAMP_STOPS
        .last()
        .map(|(_, color)| *color)
        .unwrap_or((129, 15, 124))
}

/// Position of `value` inside `[min, max]`. A zero-width range maps everything to the middle.
pub fn normalize(value: f64, min: f64, max: f64) -> f64 {
    let span = max - min;
    if !span.is_finite() || span.abs() < f64::EPSILON {
        return 0.5;
    }
    ((value - min) / span).clamp(0.0, 1.0)
}

pub fn rgba_css((r, g, b): Rgb, a: f64) -> String {
    format!("rgba({r},{g},{b},{a})")
}
