//! Offline training: stratified split, pipeline fitting and held-out evaluation

pub mod evaluation;
pub mod split;
pub mod trainer;

pub use evaluation::ModelMetrics;
pub use split::{stratified_split, SplitIndices};
pub use trainer::Trainer;
