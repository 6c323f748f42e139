//! Shared fixtures for the integration tests
#![allow(dead_code)]

use gesture_annotator::{AnnotationWorkflow, AppConfig};
use image::{Rgb, RgbImage};
use std::io::Cursor;
use tempfile::TempDir;

/// A workflow rooted in a fresh temporary data directory
pub fn workflow() -> (TempDir, AnnotationWorkflow) {
    let dir = tempfile::tempdir().unwrap();
    let workflow = AnnotationWorkflow::open(AppConfig::from_data_dir(dir.path())).unwrap();
    (dir, workflow)
}

/// PNG bytes for a `width` x `height` gradient image
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

/// Files directly inside the published crops directory
pub fn published_crops(workflow: &AnnotationWorkflow) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(&workflow.config().crops_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

/// Files waiting in the staging directory
pub fn staged_crops(workflow: &AnnotationWorkflow) -> usize {
    let staging = workflow.config().crops_dir.join(".staging");
    match std::fs::read_dir(staging) {
        Ok(entries) => entries.filter_map(|e| e.ok()).count(),
        Err(_) => 0,
    }
}
