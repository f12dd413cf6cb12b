//! Online Recall with Memory Write-back
//!
//! Demonstrates the full runtime loop on a toy intent classifier:
//! token embeddings from a caller-owned table, SGD training, attention
//! recall that remembers its own answers, k-NN recall as the opt-in
//! alternative, kernel-scheduled work, checkpointing and the audit trail.
//!
//! Run: RUST_LOG=mnemo=debug cargo run --example online_recall

use mnemo::embedding::{embed, EmbeddingTable};
use mnemo::{RecallMode, Runtime, RuntimeConfig, Task};
use tracing_subscriber::EnvFilter;

const WIDTH: usize = 16;

/// (tokens, intent one-hot: [billing, technical])
fn dataset() -> Vec<(&'static [&'static str], [f32; 2])> {
    vec![
        (&["invoice", "charge", "refund"] as &[&str], [1.0, 0.0]),
        (&["payment", "card", "declined"] as &[&str], [1.0, 0.0]),
        (&["refund", "late", "fee"] as &[&str], [1.0, 0.0]),
        (&["server", "timeout", "error"] as &[&str], [0.0, 1.0]),
        (&["login", "crash", "error"] as &[&str], [0.0, 1.0]),
        (&["api", "latency", "timeout"] as &[&str], [0.0, 1.0]),
    ]
}

fn label(y: &[f32]) -> &'static str {
    if y[0] >= y[1] {
        "billing"
    } else {
        "technical"
    }
}

fn main() -> mnemo::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let work = std::env::temp_dir().join("mnemo-online-recall");
    let config = RuntimeConfig::new()
        .with_memory(64, WIDTH)
        .with_audit_dir(work.join("audit"));

    let mut table = EmbeddingTable::new(WIDTH, 7);
    let (inputs, targets): (Vec<Vec<f32>>, Vec<Vec<f32>>) = dataset()
        .into_iter()
        .map(|(tokens, y)| (embed(&mut table, tokens), y.to_vec()))
        .unzip();

    println!("=== Attention recall (default) ===");
    let rt = Runtime::new("demo", config.clone())?;
    let model = rt.create_model("intent", "linear", WIDTH, 2)?;
    let report = rt.train(&model, "tickets-v1", &inputs, &targets)?;
    println!(
        "trained {} samples for {} epochs, final mse {:.4}",
        report.samples, report.epochs, report.final_loss
    );

    let queries: [&[&str]; 3] = [
        &["refund", "charge"],
        &["timeout", "error"],
        &["card", "error"],
    ];
    for q in queries {
        let x = embed(&mut table, q);
        let best = rt.score(&model, &x)?.unwrap_or(f32::NEG_INFINITY);
        let y = rt.infer(&model, &x)?;
        println!("{:<24} -> {:<9} {:?} (closest distance {:.3})", q.join(" "), label(&y), y, -best);
    }
    println!("memory now holds {} records", model.read().memory().len());

    // The same ambiguous query, asked repeatedly, drifts toward its own answers
    let ambiguous = embed(&mut table, &["card", "error"]);
    for round in 1..=3 {
        let y = rt.infer(&model, &ambiguous)?;
        println!("repeat {round}: {:?}", y);
    }

    let why = rt.explain(&model, &ambiguous)?;
    println!("forward pass alone: {:?}", why.forward);
    for c in why.contributions.iter().take(3) {
        println!("  record #{:<3} weight {:.3} similarity {:.3}", c.position, c.weight, c.similarity);
    }

    println!("\n=== Nearest-neighbour recall (opt-in) ===");
    let knn = Runtime::new(
        "demo-knn",
        config.clone().with_recall(RecallMode::NearestNeighbors { k: 2 }),
    )?;
    let knn_model = knn.create_model("intent", "linear", WIDTH, 2)?;
    knn.train(&knn_model, "tickets-v1", &inputs, &targets)?;
    if let Err(e) = knn.infer(&knn_model, &ambiguous) {
        println!("before indexing: {e}");
    }
    knn.index_memory(&knn_model);
    let y = knn.infer(&knn_model, &ambiguous)?;
    println!("after indexing: {} {:?}", label(&y), y);

    println!("\n=== Kernel-scheduled work ===");
    let x = embed(&mut table, &["invoice", "fee"]);
    rt.kernel().run_on(&model, "recall-invoice", move |m| {
        let engine = mnemo::InferenceEngine::default();
        if let Ok(y) = engine.infer(m, &x) {
            println!("task saw {} -> {:?}", label(&y), y);
        }
    })?;
    rt.kernel().run(Task::new("noop", || {}))?;
    while let Ok(name) = rt.kernel().step() {
        println!("stepped {name}");
    }
    println!("{}", rt.kernel().introspect());

    println!("\n=== Checkpoint and audit ===");
    let path = work.join("intent.mnemo");
    rt.checkpoint(&model, &path)?;
    let restored = rt.load_model(&path)?;
    {
        let m = restored.read();
        println!("restored {} fingerprint {}", m.version_string(), &m.fingerprint_hex()[..16]);
    }

    rt.retrain(&model, "tickets-v2", &inputs, &targets)?;
    let log = rt.core().log_for("intent");
    for entry in log.entries()? {
        println!("{:<8} {:<12} {}", entry.op.as_str(), entry.dataset_id, &entry.hash_hex()[..16]);
    }
    println!("chain verifies over {} entries", log.verify()?);

    let removed = rt.erase("tickets-v1")?;
    println!("erased {removed} entries for tickets-v1, chain still verifies: {}", log.verify().is_ok());

    let record = rt.audit(&restored.read().version_string());
    println!("audit {} = {}", record.target_id, &record.hash_hex()[..16]);

    rt.shutdown()?;
    knn.shutdown()?;
    std::fs::remove_dir_all(&work).ok();
    Ok(())
}
