//! Value types for light state parameters.

mod brightness;
mod color;

pub use brightness::Brightness;
pub use color::{Color, Xy};
