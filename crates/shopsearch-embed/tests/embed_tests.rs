use std::fs;
use tempfile::TempDir;

use image::{Rgb, RgbImage};
use shopsearch_core::traits::Embedder;
use shopsearch_core::types::EmbedInput;
use shopsearch_embed::{l2_normalize, FakeEmbedder, CLIP_DIM};

fn write_png(dir: &std::path::Path, name: &str, color: [u8; 3]) -> std::path::PathBuf {
    let path = dir.join(name);
    let img = RgbImage::from_fn(32, 32, |x, y| if (x + y) % 2 == 0 { Rgb(color) } else { Rgb([255, 255, 255]) });
    img.save(&path).unwrap();
    path
}

fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

#[test]
fn fake_embedder_text_shapes_and_determinism() {
    let embedder = FakeEmbedder::new(CLIP_DIM);
    let v1 = embedder.encode(&EmbedInput::Text("rechargeable batteries")).expect("encode");
    let v2 = embedder.encode(&EmbedInput::Text("rechargeable batteries")).expect("encode");

    assert_eq!(v1.len(), CLIP_DIM);
    assert!((norm(&v1) - 1.0).abs() <= 1e-3, "vector is L2-normalized");
    assert_eq!(v1, v2, "deterministic for same input");
}

#[test]
fn fake_embedder_images_identical_files_match() {
    let tmp = TempDir::new().unwrap();
    let a = write_png(tmp.path(), "a.png", [200, 10, 10]);
    let b = write_png(tmp.path(), "b.png", [200, 10, 10]);
    let c = write_png(tmp.path(), "c.png", [10, 10, 200]);

    let embedder = FakeEmbedder::new(64);
    let va = embedder.encode(&EmbedInput::Image(&a)).unwrap();
    let vb = embedder.encode(&EmbedInput::Image(&b)).unwrap();
    let vc = embedder.encode(&EmbedInput::Image(&c)).unwrap();

    assert_eq!(va.len(), 64);
    assert_eq!(va, vb);
    assert_ne!(va, vc);
}

#[test]
fn corrupt_image_is_encoding_error() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("broken.jpg");
    fs::write(&path, b"definitely not a jpeg").unwrap();

    let err = FakeEmbedder::new(8).encode(&EmbedInput::Image(&path)).unwrap_err();
    assert!(err.is_encoding(), "got {err:?}");
}

#[test]
fn missing_image_is_encoding_error() {
    let tmp = TempDir::new().unwrap();
    let err = FakeEmbedder::new(8)
        .encode(&EmbedInput::Image(&tmp.path().join("nope.png")))
        .unwrap_err();
    assert!(err.is_encoding());
}

#[test]
fn l2_normalize_leaves_zero_vector_alone() {
    assert_eq!(l2_normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
    let v = l2_normalize(vec![3.0, 4.0]);
    assert!((v[0] - 0.6).abs() < 1e-6 && (v[1] - 0.8).abs() < 1e-6);
}

#[test]
fn clip_preprocessing_produces_nchw_tensor() {
    let tmp = TempDir::new().unwrap();
    let path = write_png(tmp.path(), "p.png", [0, 128, 255]);
    let img = shopsearch_embed::preprocess::load_image(&path).unwrap();
    let t = shopsearch_embed::preprocess::to_clip_tensor(&img, 224, &candle_core::Device::Cpu).unwrap();
    assert_eq!(t.dims(), &[1, 3, 224, 224]);
}
