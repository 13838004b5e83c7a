//! Test Prediction Requester
//!
//! Generates random customer batches, sends them to the prediction service
//! over NATS request/reply and logs the replies.

use deposit_predictor::types::customer::{
    Categorical, Contact, Customer, Education, Job, Marital, Month, Poutcome, YesNo,
};
use rand::rngs::ThreadRng;
use rand::Rng;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, warn};

/// Customer generator for testing
struct CustomerGenerator {
    rng: ThreadRng,
}

impl CustomerGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
        }
    }

    fn pick<T: Categorical>(&mut self) -> T {
        T::ALL[self.rng.gen_range(0..T::ALL.len())]
    }

    /// Generate a random customer inside the schema bounds
    fn generate(&mut self) -> Customer {
        let contacted_before = self.rng.gen_bool(0.2);

        Customer {
            age: self.rng.gen_range(18..90),
            balance: (self.rng.gen_range(-2_000.0..20_000.0_f64) * 100.0).round() / 100.0,
            duration: self.rng.gen_range(0..1_500),
            campaign: self.rng.gen_range(1..10),
            pdays: if contacted_before {
                self.rng.gen_range(1..400)
            } else {
                -1
            },
            previous: if contacted_before {
                self.rng.gen_range(1..6)
            } else {
                0
            },
            day: self.rng.gen_range(1..=31),
            job: self.pick::<Job>(),
            marital: self.pick::<Marital>(),
            education: self.pick::<Education>(),
            default: self.pick::<YesNo>(),
            housing: self.pick::<YesNo>(),
            loan: self.pick::<YesNo>(),
            contact: self.pick::<Contact>(),
            month: self.pick::<Month>(),
            poutcome: if contacted_before {
                self.pick::<Poutcome>()
            } else {
                Poutcome::Unknown
            },
        }
    }

    /// Generate a record that the service must reject
    fn generate_invalid(&mut self) -> anyhow::Result<Value> {
        let mut record = serde_json::to_value(self.generate())?;
        match self.rng.gen_range(0..3) {
            0 => record["job"] = json!("astronaut"),
            1 => record["age"] = json!(7),
            _ => {
                if let Some(obj) = record.as_object_mut() {
                    obj.remove("month");
                }
            }
        }
        Ok(record)
    }

    /// Build a request body of `size` records
    fn batch(&mut self, size: usize, invalid_rate: f64) -> anyhow::Result<(Value, bool)> {
        let invalid = self.rng.gen_bool(invalid_rate);
        let mut records = (0..size)
            .map(|_| serde_json::to_value(self.generate()))
            .collect::<Result<Vec<_>, _>>()?;
        if invalid {
            let slot = self.rng.gen_range(0..size);
            records[slot] = self.generate_invalid()?;
        }
        Ok((json!({ "customers": records }), invalid))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("test_requester=info".parse()?),
        )
        .init();

    info!("Starting Test Prediction Requester");

    let args: Vec<String> = std::env::args().collect();
    let nats_url = args.get(1).map(|s| s.as_str()).unwrap_or("nats://localhost:4222");
    let subject = args.get(2).map(|s| s.as_str()).unwrap_or("deposit.predict");
    let count: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(20);
    let batch_size: usize = args
        .get(4)
        .and_then(|s| s.parse().ok())
        .unwrap_or(5)
        .max(1);
    let invalid_rate: f64 = args
        .get(5)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.1_f64)
        .clamp(0.0, 1.0);
    let delay_ms: u64 = args.get(6).and_then(|s| s.parse().ok()).unwrap_or(100);

    info!(
        nats_url = %nats_url,
        subject = %subject,
        count = count,
        batch_size = batch_size,
        invalid_rate = invalid_rate,
        delay_ms = delay_ms,
        "Configuration loaded"
    );

    let client = match async_nats::connect(nats_url).await {
        Ok(c) => {
            info!("Connected to NATS");
            c
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            return run_dry_mode(count, batch_size, invalid_rate, delay_ms).await;
        }
    };

    let mut generator = CustomerGenerator::new();
    let (mut answered, mut rejected, mut positives, mut records) = (0u64, 0u64, 0u64, 0u64);

    for i in 0..count {
        let (body, invalid) = generator.batch(batch_size, invalid_rate)?;
        let payload = serde_json::to_vec(&body)?;

        let reply = match client.request(subject.to_string(), payload.into()).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(batch = i + 1, error = %e, "Request failed");
                continue;
            }
        };
        let reply: Value = serde_json::from_slice(&reply.payload)?;

        if let Some(error) = reply.get("error") {
            rejected += 1;
            info!(batch = i + 1, expected = invalid, error = %error, "Batch rejected");
        } else {
            answered += 1;
            let predictions = reply["predictions"].as_array().map(Vec::len).unwrap_or(0);
            records += predictions as u64;
            positives += reply["predictions"]
                .as_array()
                .map(|p| p.iter().filter(|v| v.as_u64() == Some(1)).count() as u64)
                .unwrap_or(0);
            info!(batch = i + 1, reply = %reply, "Batch scored");
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    info!(
        "Completed! {} batches answered ({} records, {} positive), {} rejected",
        answered, records, positives, rejected
    );

    Ok(())
}

async fn run_dry_mode(
    count: u64,
    batch_size: usize,
    invalid_rate: f64,
    delay_ms: u64,
) -> anyhow::Result<()> {
    info!("Running in dry-run mode (no NATS connection)");

    let mut generator = CustomerGenerator::new();

    for i in 0..count {
        let (body, invalid) = generator.batch(batch_size, invalid_rate)?;
        let json = serde_json::to_string_pretty(&body)?;

        if (i + 1) % 10 == 0 || i == 0 || invalid {
            info!("Sample batch {} (invalid: {}):\n{}", i + 1, invalid, json);
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    Ok(())
}
