//! Type definitions for the deposit prediction pipeline

pub mod customer;
pub mod prediction;

pub use customer::Customer;
pub use prediction::{ErrorReply, PredictionRequest, PredictionResponse};
