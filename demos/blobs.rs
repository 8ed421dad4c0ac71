/// Synthetic blob classification example for striate.
///
/// Each 12x12 single-channel image holds one bright Gaussian blob in one of
/// four quadrants; the class is the quadrant.
///
/// Architecture: conv 8@5x5 → relu → maxpool 3/2 → rnorm 5 → fc 4 → softmax
/// Scheduler:    smooth (stops once the trailing validation accuracy drops)
/// Batch size:   32
///
/// Run with:
///   cargo run --example blobs --release

use std::sync::mpsc;
use std::thread;

use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;

use striate::{
    Context,
    DataBatch,
    Matrix,
    Network,
    NetworkSpec,
    SchedulerKind,
    TrainConfig,
    Trainer,
};

const SIZE: usize = 12;
const BATCH: usize = 32;
const CLASSES: usize = 4;

// ---------------------------------------------------------------------------
// Data generation
// ---------------------------------------------------------------------------

/// Draws one batch of blob images. Column `n` is image `n`, row-major pixels.
fn blob_batch(rng: &mut StdRng) -> DataBatch {
    let mut data = Matrix::zeros(SIZE * SIZE, BATCH);
    let mut labels = Vec::with_capacity(BATCH);
    let half = (SIZE / 2) as f32;
    for n in 0..BATCH {
        let class = rng.gen_range(0..CLASSES);
        let cx = rng.gen_range(1.0..half - 1.0) + if class % 2 == 1 { half } else { 0.0 };
        let cy = rng.gen_range(1.0..half - 1.0) + if class / 2 == 1 { half } else { 0.0 };
        for y in 0..SIZE {
            for x in 0..SIZE {
                let d2 = (x as f32 - cx).powi(2) + (y as f32 - cy).powi(2);
                let noise: f32 = rng.gen_range(-0.1..0.1);
                data.set(y * SIZE + x, n, (-d2 / 4.0).exp() + noise);
            }
        }
        labels.push(class);
    }
    DataBatch::new(data, labels)
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> striate::Result<()> {
    let spec: NetworkSpec = serde_json::from_str(&format!(
        r#"{{
            "name": "blobs",
            "inputShape": [{BATCH}, 1, {SIZE}, {SIZE}],
            "layers": [
                {{"name": "conv1", "type": "conv", "numFilter": 8, "filterSize": 5, "padding": 2,
                  "initW": 0.1, "epsW": 0.05, "epsB": 0.1}},
                {{"name": "relu1", "type": "neuron", "neuron": {{"type": "relu"}}}},
                {{"name": "pool1", "type": "pool", "poolSize": 3, "stride": 2}},
                {{"name": "rnorm1", "type": "rnorm", "size": 5, "scale": 0.001}},
                {{"name": "fc1", "type": "fc", "outputSize": {CLASSES}, "initW": 0.05, "epsW": 0.05, "epsB": 0.1}},
                {{"name": "probs", "type": "softmax"}}
            ]
        }}"#
    ))?;

    let ctx = Context::seeded(2024);
    let network = Network::from_spec(&ctx, &spec)?;

    let mut rng = StdRng::seed_from_u64(7);
    let train: Vec<DataBatch> = (0..20).map(|_| blob_batch(&mut rng)).collect();
    let test = vec![blob_batch(&mut rng)];

    let (tx, rx) = mpsc::channel();
    let mut config = TrainConfig::new(40, BATCH, SchedulerKind::Smooth).with_test_freq(10);
    config.progress_tx = Some(tx);
    config.learning_rate_decay = Some(0.95);

    // Print epoch summaries as they arrive.
    let printer = thread::spawn(move || {
        for stats in rx {
            let test_error = stats.test_error.map_or("-".to_string(), |e| format!("{:.3}", e));
            println!(
                "epoch {:>2}/{}  train cost {:.4}  train error {:.3}  test error {}  ({} ms)",
                stats.epoch, stats.total_epochs, stats.train_cost, stats.train_error, test_error, stats.elapsed_ms
            );
        }
    });

    let mut trainer = Trainer::new(network, config)?;
    let outcome = trainer.train(&train, &test)?;
    let mut network = trainer.into_network();
    let _ = printer.join();

    println!("stopped after {} epochs ({:?})", outcome.epochs, outcome.reason);

    let held_out = blob_batch(&mut rng);
    let stats = network.evaluate(&held_out.data, &held_out.labels);
    println!(
        "held-out batch: cost {:.4}, {}/{} correct",
        stats.cost,
        network.batch_correct(),
        BATCH
    );

    network.save_json("trained_blobs.json")?;
    println!("Model saved to trained_blobs.json");
    Ok(())
}
