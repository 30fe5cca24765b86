use padmux_gamepad::LogicalGamepad;

use crate::mapping::larger_magnitude;

/// Merge the mapped states of every device assigned to one slot.
///
/// Buttons are ORed, triggers take the maximum and each stick axis keeps
/// the value with the largest magnitude, so the result does not depend on
/// device order.
pub fn combine_slot(states: &[LogicalGamepad]) -> LogicalGamepad {
    match states {
        [] => LogicalGamepad::NEUTRAL,
        [single] => *single,
        [first, rest @ ..] => rest.iter().fold(*first, |acc, next| merge(&acc, next)),
    }
}

pub fn merge(a: &LogicalGamepad, b: &LogicalGamepad) -> LogicalGamepad {
    LogicalGamepad {
        buttons: a.buttons.union(b.buttons),
        left_trigger: a.left_trigger.max(b.left_trigger),
        right_trigger: a.right_trigger.max(b.right_trigger),
        thumb_lx: thumb(a.thumb_lx, b.thumb_lx),
        thumb_ly: thumb(a.thumb_ly, b.thumb_ly),
        thumb_rx: thumb(a.thumb_rx, b.thumb_rx),
        thumb_ry: thumb(a.thumb_ry, b.thumb_ry),
    }
}

#[inline]
fn thumb(a: i16, b: i16) -> i16 {
    larger_magnitude(i32::from(a), i32::from(b)) as i16
}
