//! End-to-end smoke test: train a tiny sequential net on a synthetic
//! dataset, then predict the test partition and write the submission file.

use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};

use masknet::backend::TrainingBackend;
use masknet::model::{Architecture, ModelConfig, SequentialConfig};
use masknet::training::{run_training, TrainOptions, TrainingConfig};

fn write_image(path: &Path, shade: u8) {
    let img = RgbImage::from_pixel(16, 16, Rgb([shade, shade / 2, 255 - shade]));
    img.save(path).unwrap();
}

fn build_dataset(root: &Path) {
    std::fs::create_dir_all(root.join("training")).unwrap();
    std::fs::create_dir_all(root.join("test")).unwrap();

    let mut labels = String::from("{");
    let mut id = 0;
    for class in 0..3usize {
        for i in 0..8 {
            let name = format!("{:05}.png", 10000 + id);
            write_image(&root.join("training").join(&name), (class * 60 + i * 5) as u8);
            if id > 0 {
                labels.push(',');
            }
            labels.push_str(&format!("\"{}\": {}", name, class));
            id += 1;
        }
    }
    labels.push('}');
    std::fs::write(root.join("train_gt.json"), labels).unwrap();

    for i in 0..3 {
        write_image(&root.join("test").join(format!("{:05}.png", 20000 + i)), 80);
    }
}

fn tiny_options(data_dir: PathBuf, output_dir: PathBuf) -> TrainOptions {
    let mut model = ModelConfig::new(Architecture::Sequential(SequentialConfig::doubling(2, 4)));
    model.image_size = 32;

    TrainOptions {
        data_dir,
        output_dir,
        model,
        training: TrainingConfig {
            epochs: 2,
            batch_size: 4,
            learning_rate: 1e-3,
            validation_fraction: 0.25,
            seed: 1234,
            augmentation: true,
            early_stopping: None,
            reduce_lr: None,
        },
    }
}

#[test]
fn train_predict_export_roundtrip() {
    let root = std::env::temp_dir().join("masknet_smoke_test");
    let _ = std::fs::remove_dir_all(&root);
    let data_dir = root.join("data");
    let output_dir = root.join("output");
    build_dataset(&data_dir);

    let options = tiny_options(data_dir.clone(), output_dir);
    let run_dir = run_training::<TrainingBackend>(&options).unwrap();

    // Run artifacts
    assert!(run_dir.join("model.json").exists());
    assert!(run_dir.join("model.mpk").exists());
    assert!(run_dir.join("history.json").exists());
    assert!(run_dir.join("metrics.json").exists());
    assert!(run_dir.join("ckpts").join("cp_01.mpk").exists());
    assert!(run_dir.join("ckpts").join("cp_02.mpk").exists());

    let history = masknet::training::TrainingHistory::load(&run_dir.join("history.json")).unwrap();
    assert_eq!(history.len(), 2);

    // Predict the test partition and export
    let predictions = masknet::inference::predict_test_set::<masknet::backend::DefaultBackend>(
        &data_dir, &run_dir, 4,
    )
    .unwrap();
    assert_eq!(predictions.len(), 3);

    let submission = root.join("predictions.csv");
    masknet::inference::write_submission(&submission, &predictions).unwrap();

    let text = std::fs::read_to_string(&submission).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "Id,Category");
    for (line, expected) in lines[1..].iter().zip(["20000", "20001", "20002"]) {
        let (filename, class) = line.split_once(',').unwrap();
        assert_eq!(filename, format!("{}.png", expected));
        let class: usize = class.parse().unwrap();
        assert!(class < 3);
    }

    std::fs::remove_dir_all(&root).ok();
}
