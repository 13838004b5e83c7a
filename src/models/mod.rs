//! Classifiers, the fitted pipeline and serving-side inference

pub mod boosting;
pub mod classifier;
pub mod inference;
pub mod label_encoder;
pub mod loader;
pub mod logistic;
pub mod pipeline;

pub use classifier::{Classifier, Model, ModelType};
pub use inference::{HealthStatus, ServingContext};
pub use label_encoder::LabelEncoder;
pub use loader::ModelLoader;
pub use pipeline::TrainedPipeline;
