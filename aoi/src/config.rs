use crate::entity::Position;
use crate::error::{AoiError, AoiResult};

/// Which spatial index backs a [`Space`](crate::Space).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Backend {
    /// Three sorted per-axis lists; `param_size` is the view half-extent.
    #[default]
    CrossLink,
    /// Uniform tower grid; `param_size` is the tower size.
    Grid,
}

/// When enter/leave notifications reach the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Dispatch {
    /// Handler runs in the middle of index maintenance.
    #[default]
    Inline,
    /// Events of one call are queued and handed over once the index is settled.
    Deferred,
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    pub map_size: Position,
    pub param_size: Position,
    pub backend: Backend,
    pub dispatch: Dispatch,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            map_size: [100.0, 100.0, 100.0],
            param_size: [4.5, 4.5, 4.5],
            backend: Backend::CrossLink,
            dispatch: Dispatch::Inline,
        }
    }
}

impl Config {
    pub fn cross_link(map_size: Position, view_size: Position) -> Self {
        Config {
            map_size,
            param_size: view_size,
            backend: Backend::CrossLink,
            ..Config::default()
        }
    }

    pub fn grid(map_size: Position, tower_size: Position) -> Self {
        Config {
            map_size,
            param_size: tower_size,
            backend: Backend::Grid,
            ..Config::default()
        }
    }

    #[must_use]
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn validate(&self) -> AoiResult<()> {
        for axis in 0..3 {
            let value = self.map_size[axis];
            if !value.is_finite() || value < 0.0 {
                return Err(AoiError::InvalidMapSize { axis, value });
            }
            let value = self.param_size[axis];
            if !value.is_finite() || value < 0.0 {
                return Err(AoiError::InvalidParamSize { axis, value });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn rejects_negative_and_nan_sizes() {
        let config = Config::cross_link([100.0, -1.0, 100.0], [4.5, 4.5, 4.5]);
        assert_eq!(
            config.validate(),
            Err(AoiError::InvalidMapSize {
                axis: 1,
                value: -1.0
            })
        );

        let config = Config::grid([100.0, 100.0, 100.0], [3.0, 3.0, f32::NAN]);
        assert!(matches!(
            config.validate(),
            Err(AoiError::InvalidParamSize { axis: 2, .. })
        ));
    }

    #[test]
    fn zero_axis_is_allowed() {
        let config = Config::grid([100.0, 100.0, 0.0], [3.0, 3.0, 0.0]);
        assert!(config.validate().is_ok());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserializes_partial_config() {
        let config: Config =
            serde_json::from_str(r#"{"backend":"grid","param_size":[3.0,3.0,3.0]}"#).unwrap();
        assert_eq!(config.backend, Backend::Grid);
        assert_eq!(config.param_size, [3.0, 3.0, 3.0]);
        assert_eq!(config.map_size, [100.0, 100.0, 100.0]);
        assert_eq!(config.dispatch, Dispatch::Inline);
    }
}
