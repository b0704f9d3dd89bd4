pub mod clahe;
pub mod image;
pub mod text;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PreprocessError {
    #[error("Text cannot be empty")]
    EmptyText,
    #[error("Text is too short (minimum {0} characters)")]
    TextTooShort(usize),
    #[error("Text is too long (maximum {0} characters)")]
    TextTooLong(usize),
    #[error("Image is missing")]
    MissingImage,
    #[error("Image is too small (minimum {0}x{0} pixels)")]
    ImageTooSmall(u32),
    #[error("Image is too large (maximum {0}MB)")]
    ImageTooLarge(u32),
    #[error("Invalid image: {0}")]
    Decode(String),
    #[error("Unexpected tensor shape: {0}")]
    Shape(String),
}
