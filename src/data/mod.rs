//! Raw tabular data: the shared frame type and the CSV source.

pub mod frame;
pub mod loader;

pub use frame::{Cell, Frame};
pub use loader::read_csv;
