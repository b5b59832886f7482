use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AoiError {
    InvalidMapSize { axis: usize, value: f32 },
    InvalidParamSize { axis: usize, value: f32 },
    TooManyTowers { count: u64 },
}

pub type AoiResult<T> = Result<T, AoiError>;

impl fmt::Display for AoiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AoiError::InvalidMapSize { axis, value } => {
                write!(
                    f,
                    "map size must be finite and non-negative (axis: {}, value: {})",
                    axis, value
                )
            }
            AoiError::InvalidParamSize { axis, value } => {
                write!(
                    f,
                    "view/tower size must be finite and non-negative (axis: {}, value: {})",
                    axis, value
                )
            }
            AoiError::TooManyTowers { count } => {
                write!(
                    f,
                    "grid would need {} towers, more than a u32 index can address",
                    count
                )
            }
        }
    }
}

impl std::error::Error for AoiError {}
