use crate::mode::Mode;

pub type Position = [f32; 3];

/// Id reserved for the sentinel records; never handed out by queries.
pub const INVALID_ID: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Entity {
    pub id: u32,
    pub mode: Mode,
    pub pos: Position,
}

impl Entity {
    pub(crate) fn sentinel() -> Self {
        Self {
            id: INVALID_ID,
            mode: Mode::empty(),
            pos: [0.0; 3],
        }
    }
}

/// Axis-aligned box test: every axis within `range` of `center`.
#[inline(always)]
pub fn in_view(pos: &Position, center: &Position, range: &Position) -> bool {
    (pos[0] - center[0]).abs() <= range[0]
        && (pos[1] - center[1]).abs() <= range[1]
        && (pos[2] - center[2]).abs() <= range[2]
}

#[cfg(test)]
mod tests {
    use super::in_view;

    #[test]
    fn box_test_is_inclusive_per_axis() {
        let range = [4.0, 4.0, 0.0];
        assert!(in_view(&[42.0, 0.0, 0.0], &[40.0, 4.0, 0.0], &range));
        assert!(in_view(&[44.0, 8.0, 0.0], &[40.0, 4.0, 0.0], &range));
        assert!(!in_view(&[44.5, 4.0, 0.0], &[40.0, 4.0, 0.0], &range));
        assert!(!in_view(&[40.0, 4.0, 1.0], &[40.0, 4.0, 0.0], &range));
    }
}
