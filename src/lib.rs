//! Deposit Predictor Library
//!
//! Trains a binary classifier predicting term-deposit subscription from
//! customer records, persists it as a versioned artifact set, and serves
//! predictions through the same feature transform used in training.

pub mod artifacts;
pub mod config;
pub mod consumer;
pub mod data;
pub mod error;
pub mod metrics;
pub mod models;
pub mod preprocessor;
pub mod producer;
pub mod train;
pub mod types;

pub use artifacts::{ArtifactSet, ArtifactStore};
pub use config::AppConfig;
pub use consumer::RequestConsumer;
pub use error::{Error, Result};
pub use models::inference::ServingContext;
pub use producer::ReplyPublisher;
pub use train::Trainer;
pub use types::{Customer, ErrorReply, PredictionRequest, PredictionResponse};
