//! Kinetic Core
//!
//! Value types shared by the kinetic animation crates:
//!
//! - [`Value`]: numbers, strings, lists, and maps an animated node resolves to
//! - [`Color`]: CSS color parsing and `rgba()` serialization
//! - [`PropertyMap`]: flattened values handed to renderer adapters

pub mod color;
pub mod error;
pub mod value;

pub use color::{named_color, named_color_keywords, Color};
pub use error::ColorParseError;
pub use value::{format_number, PropertyMap, Value, ValueKind};
