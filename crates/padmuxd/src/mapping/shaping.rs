use padmux_workspace::Shaping;

const THUMB_MAX: f32 = i16::MAX as f32;
const TRIGGER_MAX: f32 = u8::MAX as f32;

/// Apply dead zone, anti dead zone and linear blend to a stick value.
pub fn shape_thumb(value: i32, shaping: &Shaping) -> i32 {
    if value == 0 || shaping.is_identity() {
        return value;
    }
    let normalized = (value as f32 / THUMB_MAX).clamp(-1.0, 1.0);
    let shaped = shape_unit(normalized.abs(), shaping);
    let out = (shaped * THUMB_MAX).round() as i32;
    if value < 0 {
        -out
    } else {
        out
    }
}

/// Trigger variant of [`shape_thumb`] on the `0..=255` scale.
pub fn shape_trigger(value: i32, shaping: &Shaping) -> i32 {
    if value <= 0 || shaping.is_identity() {
        return value.max(0);
    }
    let normalized = (value as f32 / TRIGGER_MAX).min(1.0);
    (shape_unit(normalized, shaping) * TRIGGER_MAX).round() as i32
}

/// Shape a magnitude in `0.0..=1.0`.
///
/// Magnitudes below the dead zone are zero. The rest is remapped to start
/// at the anti dead zone. The linear blend then moves the remapped value by
/// `linear`% of the difference between it and the same remap applied a
/// second time.
fn shape_unit(magnitude: f32, shaping: &Shaping) -> f32 {
    let dead_zone = percent(shaping.dead_zone);
    let floor = percent(shaping.anti_dead_zone);
    if magnitude < dead_zone || dead_zone >= 1.0 {
        return 0.0;
    }
    let remapped = remap(magnitude, dead_zone, floor);
    if shaping.linear == 0 {
        return remapped;
    }

    let doubly = remap(remapped, dead_zone, floor);
    let blend = (f32::from(shaping.linear) / 100.0).clamp(-1.0, 1.0);
    (remapped + (remapped - doubly) * blend).clamp(0.0, 1.0)
}

#[inline]
fn remap(magnitude: f32, dead_zone: f32, floor: f32) -> f32 {
    if magnitude < dead_zone {
        return 0.0;
    }
    (floor + (magnitude - dead_zone) / (1.0 - dead_zone) * (1.0 - floor)).clamp(0.0, 1.0)
}

#[inline]
fn percent(value: u8) -> f32 {
    f32::from(value.min(100)) / 100.0
}
