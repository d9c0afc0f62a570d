use thiserror::Error;

/// Error type for invalid tank dimensions.
///
/// A geometry that fails validation is refused at the boundary; the engine
/// never computes a volume from it, so NaN or negative volumes cannot reach
/// the consumer.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryError {
    #[error("tank length must be positive")]
    NonPositiveLength,

    #[error("tank width must be positive")]
    NonPositiveWidth,

    #[error("tank dimensions must be finite")]
    NotFinite,
}
