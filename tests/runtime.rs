//! End-to-end properties of the runtime: persistence round trips, ring
//! eviction, recall behaviour, integrity failures and kernel concurrency.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use mnemo::persist::{decode, encode, MAGIC};
use mnemo::{
    InferenceEngine, MemoryConfig, MnemoError, Model, OpTag, RecallMode, Runtime, RuntimeConfig,
    Task,
};
use parking_lot::RwLock;

fn runtime(dir: &tempfile::TempDir, capacity: usize) -> Runtime {
    let cfg = RuntimeConfig::new()
        .with_memory(capacity, 8)
        .with_audit_dir(dir.path().join("audit"));
    Runtime::new("it", cfg).unwrap()
}

#[test]
fn fresh_model_round_trips_through_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let rt = runtime(&dir, 16);

    for (input, output) in [(1, 1), (3, 2), (8, 8), (2, 12)] {
        let m = rt.create_model("fresh", "linear", input, output).unwrap();
        let path = dir.path().join(format!("fresh-{input}x{output}.mnemo"));
        rt.save_model(&m, &path).unwrap();

        let back = rt.load_model(&path).unwrap();
        let (a, b) = (m.read(), back.read());
        assert_eq!(a.id(), b.id());
        assert_eq!(a.model_type(), b.model_type());
        assert_eq!(a.input_size(), b.input_size());
        assert_eq!(a.output_size(), b.output_size());
        assert_eq!(a.weights(), b.weights());
        assert!(b.memory().is_empty());
    }
}

#[test]
fn ring_keeps_exactly_the_last_capacity_records() {
    let dir = tempfile::tempdir().unwrap();
    let cap = 7;
    let rt = runtime(&dir, cap);
    let m = rt.create_model("ring", "linear", 1, 1).unwrap();

    for k in [1, cap, 2 * cap + 3] {
        m.write().memory_mut().clear();
        let total = cap + k;
        for i in 0..total {
            let id = format!("r{i}");
            rt.add_memory(&m, &[i as f32], &[i as f32], Some(id.as_str())).unwrap();
            assert!(m.read().memory().len() <= cap);
        }

        let model = m.read();
        let ids: Vec<String> = model
            .memory()
            .iter()
            .map(|r| r.id().unwrap().to_string())
            .collect();
        let expected: Vec<String> = (total - cap..total).map(|i| format!("r{i}")).collect();
        assert_eq!(ids, expected);

        // Every one of the surviving records is distinct, so all slots rotated
        let mut firsts: Vec<i64> = model.memory().iter().map(|r| r.embedding()[0] as i64).collect();
        firsts.dedup();
        assert_eq!(firsts.len(), cap);
    }
}

#[test]
fn empty_memory_infers_pure_linear_map() {
    let dir = tempfile::tempdir().unwrap();
    let rt = runtime(&dir, 16);
    let m = rt.create_model("lin", "linear", 3, 2).unwrap();

    let x = [0.5, -1.0, 2.0];
    let expected = m.read().forward(&x).unwrap();
    assert_eq!(rt.infer(&m, &x).unwrap(), expected);
}

#[test]
fn two_point_pair_converges() {
    let dir = tempfile::tempdir().unwrap();
    let rt = runtime(&dir, 16);
    let m = rt.create_model("xor", "linear", 2, 1).unwrap();

    rt.train(&m, "pair", &[[0.0f32, 0.0], [1.0, 1.0]], &[[0.0f32], [1.0]])
        .unwrap();
    let y = rt.infer(&m, &[1.0, 1.0]).unwrap();
    assert!(y[0] > 0.5, "got {}", y[0]);
}

#[test]
fn any_flipped_byte_before_the_hash_is_rejected() {
    let mut m = Model::new("flip", "linear", 2, 2, MemoryConfig { capacity: 4, embed_width: 4 }).unwrap();
    m.init_weights(1.0, 3);
    m.add_memory(&[1.0, 2.0], &[3.0], Some("x")).unwrap();
    let bytes = encode(&m).unwrap();

    for i in 0..bytes.len() - 32 {
        for bit in [0x01u8, 0x80] {
            let mut bad = bytes.clone();
            bad[i] ^= bit;
            assert!(decode(&bad).is_err(), "byte {i} bit {bit:#x} accepted");
        }
    }
    assert!(decode(&bytes).is_ok());
}

#[test]
fn bad_magic_and_version_fail_before_hash_check() {
    let m = Model::new("hdr", "linear", 1, 1, MemoryConfig::default()).unwrap();
    let bytes = encode(&m).unwrap();

    // Corrupt both the header and the hash: the header error must win
    let mut bad_magic = bytes.clone();
    bad_magic[0] ^= 0xff;
    *bad_magic.last_mut().unwrap() ^= 0xff;
    assert!(matches!(decode(&bad_magic), Err(MnemoError::InvalidMagic)));

    let mut bad_version = bytes.clone();
    bad_version[MAGIC.len()..MAGIC.len() + 4].copy_from_slice(&99u32.to_le_bytes());
    *bad_version.last_mut().unwrap() ^= 0xff;
    assert!(matches!(
        decode(&bad_version),
        Err(MnemoError::UnsupportedVersion(99))
    ));
}

#[test]
fn concurrent_kernel_use_loses_nothing() {
    const THREADS: usize = 6;
    const ROUNDS: usize = 150;

    let dir = tempfile::tempdir().unwrap();
    let rt = runtime(&dir, 16);
    let kernel = rt.kernel();
    let ran = Arc::new(AtomicUsize::new(0));
    let mine: Vec<_> = (0..THREADS)
        .map(|i| {
            Arc::new(RwLock::new(
                Model::new(&format!("k{i}"), "linear", 1, 1, MemoryConfig::default()).unwrap(),
            ))
        })
        .collect();

    // Producers and consumers at the same time
    std::thread::scope(|s| {
        for h in &mine {
            let ran = Arc::clone(&ran);
            s.spawn(move || {
                for _ in 0..ROUNDS {
                    kernel.register_model(h).unwrap();
                    let ran = Arc::clone(&ran);
                    kernel
                        .run(Task::new("count", move || {
                            ran.fetch_add(1, Ordering::SeqCst);
                        }))
                        .unwrap();
                    kernel.unregister_model(h).unwrap();
                }
            });
            s.spawn(move || {
                for _ in 0..ROUNDS {
                    match kernel.step() {
                        Ok(_) | Err(MnemoError::NoTask) => {}
                        Err(e) => panic!("step failed: {e}"),
                    }
                }
            });
        }
    });

    let leftover = kernel.drain().unwrap();
    let snap = kernel.audit_snapshot();
    assert_eq!(ran.load(Ordering::SeqCst), THREADS * ROUNDS);
    assert_eq!(snap.steps_executed, (THREADS * ROUNDS) as u64);
    assert_eq!(snap.tasks_pending, 0);
    assert!(leftover <= THREADS * ROUNDS);
    assert_eq!(snap.models_registered, 0);
    assert!(matches!(kernel.step(), Err(MnemoError::NoTask)));
}

#[test]
fn nearest_neighbour_mode_is_explicit() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = RuntimeConfig::new()
        .with_audit_dir(dir.path())
        .with_recall(RecallMode::NearestNeighbors { k: 1 });
    let rt = Runtime::new("knn", cfg).unwrap();
    let m = rt.create_model("m", "linear", 2, 1).unwrap();
    rt.add_memory(&m, &[1.0, 0.0], &[7.0], None).unwrap();

    assert_eq!(rt.engine().mode(), RecallMode::NearestNeighbors { k: 1 });
    assert!(matches!(rt.infer(&m, &[1.0, 0.0]), Err(MnemoError::InvalidArgument(_))));

    rt.index_memory(&m);
    let y = rt.infer(&m, &[2.0, 0.0]).unwrap();
    assert!((y[0] - 7.0).abs() < 1e-5);

    // The same memory under attention blends with the forward pass instead
    let attention = InferenceEngine::default();
    let blended = attention.predict(&m.read(), &[1.0, 0.0]).unwrap();
    assert!(blended[0] < 7.0);
}

#[test]
fn audit_trail_survives_erase() {
    let dir = tempfile::tempdir().unwrap();
    let rt = runtime(&dir, 16);
    let m = rt.create_model("aud", "linear", 1, 1).unwrap();
    let data = ([[1.0f32]], [[2.0f32]]);

    rt.train(&m, "a", &data.0, &data.1).unwrap();
    rt.train(&m, "b", &data.0, &data.1).unwrap();
    rt.retrain(&m, "a", &data.0, &data.1).unwrap();
    rt.untrain(&m, "b").unwrap();

    let log = rt.core().log_for("aud");
    assert_eq!(log.verify().unwrap(), 4);

    assert_eq!(rt.erase("a").unwrap(), 2);
    let entries = log.entries().unwrap();
    let ops: Vec<(OpTag, &str)> = entries.iter().map(|e| (e.op, e.dataset_id.as_str())).collect();
    assert_eq!(
        ops,
        vec![(OpTag::Train, "b"), (OpTag::Untrain, "b"), (OpTag::Erase, "a")]
    );
    assert_eq!(log.verify().unwrap(), 3);
}

#[test]
fn model_state_is_shared_between_runtime_and_kernel_tasks() {
    let dir = tempfile::tempdir().unwrap();
    let rt = runtime(&dir, 16);
    let m = rt.create_model("shared", "linear", 2, 1).unwrap();

    rt.kernel()
        .run_on(&m, "remember", |model| {
            model.add_memory(&[1.0, 1.0], &[1.0], Some("from-task")).unwrap();
        })
        .unwrap();
    assert!(m.read().memory().get("from-task").is_none());

    rt.kernel().step().unwrap();
    assert!(m.read().memory().get("from-task").is_some());
    assert_eq!(rt.score(&m, &[1.0, 1.0]).unwrap(), Some(0.0));
}

#[test]
fn concurrent_training_ops_share_one_valid_chain() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 50;

    let dir = tempfile::tempdir().unwrap();
    let rt = runtime(&dir, 16);
    let core = rt.core();

    std::thread::scope(|s| {
        for t in 0..THREADS {
            s.spawn(move || {
                for i in 0..ROUNDS {
                    core.train_op("m", &format!("ds-{t}-{i}")).unwrap();
                }
            });
        }
    });

    assert_eq!(core.log_for("m").verify().unwrap(), THREADS * ROUNDS);
}

#[test]
fn training_is_not_applied_without_its_audit_entry() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("audit-file");
    std::fs::write(&blocker, b"").unwrap();
    let rt = Runtime::new("it", RuntimeConfig::new().with_audit_dir(&blocker)).unwrap();
    let m = rt.create_model("m", "linear", 2, 1).unwrap();
    let fingerprint = m.read().fingerprint();

    let res = rt.train(&m, "d", &[[1.0f32, 0.0]], &[[1.0f32]]);
    assert!(res.is_err());
    let model = m.read();
    assert_eq!(model.version(), 0);
    assert!(model.memory().is_empty());
    assert_eq!(model.fingerprint(), fingerprint);
}

#[test]
fn nearest_neighbour_explanation_agrees_with_score() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = RuntimeConfig::new()
        .with_memory(8, 3)
        .with_audit_dir(dir.path())
        .with_recall(RecallMode::NearestNeighbors { k: 2 });
    let rt = Runtime::new("knn", cfg).unwrap();
    let m = rt.create_model("m", "linear", 2, 1).unwrap();
    rt.add_memory(&m, &[1.0, 0.0, 5.0], &[2.0], Some("a")).unwrap();
    rt.add_memory(&m, &[1.0, 1.0, -5.0], &[6.0], Some("b")).unwrap();
    rt.index_memory(&m);

    let query = [1.0, 0.5];
    let why = rt.explain(&m, &query).unwrap();
    let best = rt.score(&m, &query).unwrap().unwrap();
    assert!((why.contributions[0].similarity - best).abs() < 1e-6);

    // Weights follow the two-dimensional cosines, not the stored third axis
    let ca = 1.0 / 1.25f32.sqrt();
    let cb = 1.5 / (1.25f32.sqrt() * 2.0f32.sqrt());
    let expected = (ca * 2.0 + cb * 6.0) / (ca + cb);
    assert!((why.output[0] - expected).abs() < 1e-5);
    assert_eq!(rt.infer(&m, &query).unwrap(), why.output);
}
