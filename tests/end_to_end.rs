//! Train on a synthetic imbalanced dataset, persist, reload and serve.

use deposit_predictor::artifacts::{load_label_encoder, load_pipeline, ArtifactStore};
use deposit_predictor::config::AppConfig;
use deposit_predictor::data::read_csv;
use deposit_predictor::error::TrainError;
use deposit_predictor::models::loader::load_serving_context;
use deposit_predictor::train::Trainer;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use std::fmt::Write as _;
use std::path::Path;
use tempfile::TempDir;

const JOBS: &[&str] = &["admin.", "blue-collar", "management", "retired", "student", "technician"];
const MONTHS: &[&str] = &["jan", "may", "jun", "aug", "nov"];

/// Bank-marketing shaped data with roughly 12% positives, driven mostly by
/// call duration. Every 50th balance is left empty.
fn write_dataset(path: &Path, rows: usize) {
    let mut rng = StdRng::seed_from_u64(7);
    let mut csv = String::from(
        "age;job;marital;education;default;balance;housing;loan;contact;day;month;duration;campaign;pdays;previous;poutcome;y\n",
    );

    for i in 0..rows {
        let duration: i64 = rng.gen_range(0..1500);
        let subscribed = (duration > 1200 && rng.gen_bool(0.5)) || rng.gen_bool(0.02);
        let balance = if i % 50 == 0 {
            String::new()
        } else {
            format!("{:.2}", rng.gen_range(-500.0..8000.0))
        };

        writeln!(
            csv,
            "{};\"{}\";{};{};no;{};{};no;cellular;{};{};{};{};-1;0;unknown;{}",
            rng.gen_range(18..90),
            JOBS[rng.gen_range(0..JOBS.len())],
            if rng.gen_bool(0.6) { "married" } else { "single" },
            if rng.gen_bool(0.5) { "secondary" } else { "tertiary" },
            balance,
            if rng.gen_bool(0.5) { "yes" } else { "no" },
            rng.gen_range(1..=28),
            MONTHS[rng.gen_range(0..MONTHS.len())],
            duration,
            rng.gen_range(1..6),
            if subscribed { "yes" } else { "no" },
        )
        .unwrap();
    }

    std::fs::write(path, csv).unwrap();
}

fn write_config(dir: &Path, model: &str, params: &str) -> AppConfig {
    let data = dir.join("bank.csv");
    if !data.exists() {
        write_dataset(&data, 1200);
    }

    let yaml = format!(
        r#"
data:
  file_path: {data}
  target: y
csv:
  separator: ";"
  quotechar: '"'
features:
  numerical: [age, balance, duration, campaign, pdays, previous, day]
  categorical: [job, marital, education, default, housing, loan, contact, month, poutcome]
model:
  type: {model}
  params: {params}
split:
  test_size: 0.2
  random_state: 42
artifacts:
  dir: {artifacts}
  model_subdir: models
  metrics_subdir: metrics
serving:
  model_path: {artifacts}/models/latest_model.json
  label_encoder_path: {artifacts}/models/latest_label_encoder.json
"#,
        data = data.display(),
        artifacts = dir.join("artifacts").display(),
    );

    let path = dir.join(format!("{model}.yaml"));
    std::fs::write(&path, yaml).unwrap();
    AppConfig::load_from_path(&path).unwrap()
}

fn store(config: &AppConfig) -> ArtifactStore {
    ArtifactStore::new(config.artifacts.model_dir(), config.artifacts.metrics_dir())
}

fn customer(job: &str, duration: i64) -> Value {
    json!({
        "age": 44, "balance": 1500.0, "duration": duration, "campaign": 2,
        "pdays": -1, "previous": 0, "day": 14,
        "job": job, "marital": "Married", "education": " tertiary ",
        "default": "no", "housing": "yes", "loan": "no",
        "contact": "cellular", "month": "may", "poutcome": "unknown"
    })
}

#[test]
fn test_boosting_train_persist_promote_serve() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        dir.path(),
        "xgb",
        "{n_estimators: 40, learning_rate: 0.2, max_depth: 3}",
    );

    let set = Trainer::new(config.clone()).run().unwrap();
    assert_eq!(set.label_encoder.classes(), &["no", "yes"]);
    assert!(set.metrics.roc_auc > 0.75, "roc_auc = {}", set.metrics.roc_auc);
    assert!((0.0..=1.0).contains(&set.metrics.pr_auc));

    let store = store(&config);
    let paths = store.persist(&set).unwrap();
    assert_eq!(store.latest_run().unwrap(), set.run_id);
    store.promote(&set.run_id).unwrap();

    // persisted artifacts reload to the exact fitted pipeline
    assert_eq!(load_pipeline(&paths.model).unwrap(), set.pipeline);
    assert_eq!(load_label_encoder(&paths.label_encoder).unwrap(), set.label_encoder);

    let context = load_serving_context(&config).unwrap();
    assert_eq!(context.health().run_id, set.run_id);

    // Train/serve parity on the raw training rows, target column included
    let mut frame = read_csv(&config.data.file_path, &config.csv).unwrap();
    let rows = frame.select_rows(&[0, 1, 2, 3, 4]);
    let served = context.predict_frame(&rows, 0.5).unwrap();
    frame.take_column("y");
    let direct = set.pipeline.positive_proba(&frame.select_rows(&[0, 1, 2, 3, 4])).unwrap();
    assert_eq!(served.probabilities, direct.to_vec());

    // A long call is scored more likely to subscribe than a short one
    let payload = serde_json::to_vec(&json!({
        "customers": [customer("management", 30), customer("management", 1450)]
    }))
    .unwrap();
    let response = context.handle(&payload).unwrap();
    assert_eq!(response.len(), 2);
    assert!(response.probabilities[1] > response.probabilities[0]);
}

#[test]
fn test_invalid_record_rejects_whole_batch() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "lr", "{C: 1.0, max_iter: 300}");

    let set = Trainer::new(config.clone()).run().unwrap();
    let store = store(&config);
    store.persist(&set).unwrap();
    store.promote(&set.run_id).unwrap();
    let context = load_serving_context(&config).unwrap();

    let payload = serde_json::to_vec(&json!({
        "customers": [
            customer("technician", 200),
            customer("astronaut", 200),
            customer("retired", 200)
        ]
    }))
    .unwrap();

    let reply = context.handle(&payload).unwrap_err();
    assert_eq!(reply.error.kind, "validation");
    assert_eq!(reply.error.field.as_deref(), Some("customers[1].job"));

    let health = serde_json::to_value(context.health()).unwrap();
    assert_eq!(health["model_type"], "lr");
    assert_eq!(health["status"], "ok");
}

#[test]
fn test_training_is_deterministic() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "lr", "{max_iter: 200}");
    let frame = read_csv(&config.data.file_path, &config.csv).unwrap();

    let trainer = Trainer::new(config);
    let a = trainer.train_on(frame.clone(), "run".to_string()).unwrap();
    let b = trainer.train_on(frame, "run".to_string()).unwrap();

    assert_eq!(a.pipeline, b.pipeline);
    assert_eq!(a.metrics, b.metrics);
}

#[test]
fn test_unknown_model_fails_before_reading_data() {
    let dir = TempDir::new().unwrap();
    let mut config = write_config(dir.path(), "lr", "{}");
    config.model.model_type = "rf".to_string();
    config.data.file_path = dir.path().join("missing.csv");

    match Trainer::new(config).run() {
        Err(TrainError::UnknownModelType(key)) => assert_eq!(key, "rf"),
        other => panic!("expected an unknown model type, got {other:?}"),
    }
}

#[test]
fn test_serving_without_promoted_artifacts_fails() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "lr", "{}");

    assert!(load_serving_context(&config).is_err());
}
