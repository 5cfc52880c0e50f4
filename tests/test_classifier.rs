//! Integration tests for the classifier adapter.
//!
//! Tests cover:
//! - Placeholder determinism and output invariants
//! - Loader fallback order and load-once behavior
//! - Degradation to an unknown prediction on bad input or output

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::*;
use lesionscan::CLASS_LABELS;
use lesionscan::error::Result;
use lesionscan::preprocess::preprocess_image;

fn lesion_tensor() -> lesionscan::PreprocessedTensor {
    preprocess_image(&disc_image(64, 20.0), (32, 32)).expect("preprocess")
}

#[test]
fn test_placeholder_is_deterministic() -> anyhow::Result<()> {
    let tensor = lesion_tensor();

    let first = Classifier::placeholder(42).predict(&tensor);
    let second = Classifier::placeholder(42).predict(&tensor);
    assert_eq!(first, second);

    let other_seed = Classifier::placeholder(7).predict(&tensor);
    assert_ne!(first.probabilities(), other_seed.probabilities());

    Ok(())
}

#[test]
fn test_prediction_invariants() -> anyhow::Result<()> {
    let classifier = Classifier::placeholder(42);

    for img in [white_image(), disc_image(48, 10.0), gray_image(30), rgba_image()] {
        let tensor = preprocess_image(&img, (32, 32))?;
        let prediction = classifier.predict(&tensor);
        let diagnosis = prediction.diagnosis().expect("placeholder always answers");

        assert!((0.0..=100.0).contains(&diagnosis.confidence));
        assert_eq!(diagnosis.label, CLASS_LABELS[diagnosis.class_index]);
        assert_eq!(diagnosis.model, ModelKind::Placeholder);

        let total: f32 = prediction.probabilities().values().sum();
        assert!((total - 1.0).abs() < 1e-4);
        let best = prediction.probabilities()[diagnosis.label];
        assert!((f64::from(best) * 100.0 - diagnosis.confidence).abs() <= 0.005 + 1e-6);
    }

    Ok(())
}

#[test]
fn test_failing_loaders_fall_back_to_placeholder() -> anyhow::Result<()> {
    let classifier = Classifier::new(vec![Box::new(FailingLoader), Box::new(FailingLoader)], 42);
    assert!(!classifier.is_loaded());

    let prediction = classifier.predict(&lesion_tensor());
    assert!(classifier.is_loaded());
    assert_eq!(classifier.model_kind(), ModelKind::Placeholder);
    assert_eq!(prediction, Classifier::placeholder(42).predict(&lesion_tensor()));

    Ok(())
}

#[test]
fn test_missing_model_dir_uses_placeholder() -> anyhow::Result<()> {
    let dir = temp_dir();
    let classifier = Classifier::from_model_dir(dir.path().join("no-models"), 42);
    assert!(classifier.model_kind().is_placeholder());

    Ok(())
}

#[test]
fn test_first_working_loader_wins() -> anyhow::Result<()> {
    let classifier = Classifier::new(
        vec![
            Box::new(FailingLoader),
            Box::new(FixedLoader(peaked_distribution(3, 0.9))),
            Box::new(FixedLoader(peaked_distribution(0, 0.9))),
        ],
        42,
    );

    let prediction = classifier.predict(&lesion_tensor());
    let diagnosis = prediction.diagnosis().unwrap();
    assert_eq!(diagnosis.label, "melanoma");
    assert_eq!(diagnosis.class_index, 3);
    assert_eq!(diagnosis.confidence, 90.0);
    assert_eq!(diagnosis.model, ModelKind::Onnx);

    Ok(())
}

struct CountingLoader(Arc<AtomicUsize>);

impl ModelLoader for CountingLoader {
    fn name(&self) -> &str {
        "counting"
    }

    fn load(&self) -> Result<Box<dyn LesionModel>> {
        self.0.fetch_add(1, Ordering::SeqCst);
        FixedLoader(peaked_distribution(4, 0.6)).load()
    }
}

#[test]
fn test_model_loads_once_across_threads() -> anyhow::Result<()> {
    let loads = Arc::new(AtomicUsize::new(0));
    let classifier = Arc::new(Classifier::new(vec![Box::new(CountingLoader(loads.clone()))], 42));
    let tensor = Arc::new(lesion_tensor());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let classifier = classifier.clone();
            let tensor = tensor.clone();
            std::thread::spawn(move || classifier.predict(&tensor))
        })
        .collect();

    for handle in handles {
        let prediction = handle.join().expect("thread panicked");
        assert_eq!(prediction.label(), "nevus");
    }
    assert_eq!(loads.load(Ordering::SeqCst), 1);

    Ok(())
}

#[test]
fn test_logits_are_normalized() -> anyhow::Result<()> {
    let logits = vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 5.0, 0.0];
    let classifier = Classifier::new(vec![Box::new(FixedLoader(logits))], 42);

    let prediction = classifier.predict(&lesion_tensor());
    assert_eq!(prediction.label(), "squamous cell carcinoma");
    let total: f32 = prediction.probabilities().values().sum();
    assert!((total - 1.0).abs() < 1e-4);

    Ok(())
}

#[test]
fn test_bad_output_becomes_unknown() -> anyhow::Result<()> {
    let classifier = Classifier::new(vec![Box::new(FixedLoader(vec![0.5, 0.5]))], 42);

    let prediction = classifier.predict(&lesion_tensor());
    assert!(matches!(prediction, Prediction::Unknown { .. }));
    assert_eq!(prediction.label(), "unknown");
    assert_eq!(prediction.class_index(), -1);
    assert_eq!(prediction.confidence(), 0.0);
    assert!(prediction.probabilities().is_empty());

    let json = serde_json::to_value(&prediction)?;
    assert_eq!(json["prediction"], "unknown");
    assert!(json["error"].is_string());

    Ok(())
}

#[test]
fn test_bad_tensor_shape_becomes_unknown() -> anyhow::Result<()> {
    let classifier = Classifier::placeholder(42);

    let wrong_channels = ndarray::Array4::<f32>::zeros((1, 32, 32, 4));
    assert!(classifier.predict(&wrong_channels).error().is_some());

    let batch_of_two = ndarray::Array4::<f32>::zeros((2, 32, 32, 3));
    assert!(classifier.predict(&batch_of_two).error().is_some());

    let too_small = ndarray::Array4::<f32>::zeros((1, 2, 2, 3));
    assert_eq!(classifier.predict(&too_small).class_index(), -1);

    Ok(())
}
