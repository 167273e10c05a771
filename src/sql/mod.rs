//! Safe SQL builder: identifiers from the schema cache only, values as parameters.

mod builder;
mod complex;
pub mod params;
pub use builder::*;
pub use complex::*;
pub use params::*;
