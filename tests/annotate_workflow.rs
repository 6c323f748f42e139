//! End-to-end tests for upload -> annotate -> cascade

mod common;

use gesture_annotator::{AnnotateRequest, AnnotatorError, Region};
use image::GenericImageView;

const ICON_NOTES: &str = r#"{
    "image": {"source": "Monastery archive", "location": "Mount Sinai"},
    "icon": {"title": "Christ Pantocrator", "culture_period": "Byzantine", "materials": ["encaustic"]},
    "icon_image": {"image_url": "https://example.org/pantocrator.jpg"},
    "icon_inscriptions": [{"text": "IC"}, {"text": "XC"}]
}"#;

#[test]
fn test_upload_records_image() {
    let (_dir, workflow) = common::workflow();
    let uploaded = workflow
        .upload(&common::png_bytes(40, 30), "my scan (1).png")
        .unwrap();

    assert_eq!(uploaded.filename, "my_scan_1.png");
    let path = workflow.config().uploads_dir.join(&uploaded.filename);
    assert!(path.exists());

    let image = workflow.library().get_image(uploaded.image_id).unwrap().unwrap();
    assert_eq!(image.filename, "my_scan_1.png");
    assert!(!image.upload_timestamp.is_empty());
    assert_eq!(workflow.config().upload_file("my_scan_1.png").unwrap(), path);
}

#[test]
fn test_upload_rejects_unusable_filename() {
    let (_dir, workflow) = common::workflow();
    let err = workflow.upload(b"bytes", "../..").unwrap_err();
    assert!(matches!(err, AnnotatorError::Validation { .. }));
    assert_eq!(workflow.library().image_count().unwrap(), 0);
}

#[test]
fn test_annotate_negative_drag_on_1200x800() {
    let (_dir, mut workflow) = common::workflow();
    let uploaded = workflow.upload(&common::png_bytes(1200, 800), "icon.png").unwrap();

    let region = Region::new(300.0, 200.0, -100.0, 50.0);
    let saved = workflow
        .annotate(&AnnotateRequest::new(uploaded.image_id, region))
        .unwrap();

    assert!(!saved.cropped_image_path.is_empty());
    let crop_path = workflow.config().crop_file(&saved.cropped_image_path).unwrap();
    let crop = image::open(crop_path).unwrap();
    // box (400, 400, 600, 500)
    assert_eq!(crop.dimensions(), (200, 100));

    let instance = workflow
        .library()
        .get_gesture_instance(saved.gesture_instance_id)
        .unwrap()
        .unwrap();
    assert_eq!(instance.region_coordinates, region);
    assert_eq!(instance.cropped_image_path, saved.cropped_image_path);
    assert_eq!(common::staged_crops(&workflow), 0);
}

#[test]
fn test_missing_fields_are_validation_errors() {
    let (_dir, mut workflow) = common::workflow();
    let uploaded = workflow.upload(&common::png_bytes(60, 40), "a.png").unwrap();

    let request = AnnotateRequest {
        image_id: Some(uploaded.image_id),
        ..AnnotateRequest::default()
    };
    let err = workflow.annotate(&request).unwrap_err();
    assert_eq!(err.category(), "validation");
    assert!(err.is_client_error());
    assert_eq!(workflow.library().gesture_instance_count().unwrap(), 0);
}

#[test]
fn test_unknown_gesture_is_invalid_reference() {
    let (_dir, mut workflow) = common::workflow();
    let uploaded = workflow.upload(&common::png_bytes(60, 40), "a.png").unwrap();

    let request = AnnotateRequest::new(uploaded.image_id, Region::new(0.0, 0.0, 300.0, 200.0))
        .with_gesture(42);
    let err = workflow.annotate(&request).unwrap_err();
    assert!(matches!(err, AnnotatorError::InvalidReference { field: "gesture_id", id: 42 }));
    assert_eq!(workflow.library().gesture_instance_count().unwrap(), 0);
    assert!(common::published_crops(&workflow).is_empty());
}

#[test]
fn test_unknown_image_is_not_found() {
    let (_dir, mut workflow) = common::workflow();
    let err = workflow
        .annotate(&AnnotateRequest::new(7, Region::new(0.0, 0.0, 10.0, 10.0)))
        .unwrap_err();
    assert!(matches!(err, AnnotatorError::NotFound { .. }));
    assert_eq!(err.status_code(), 404);
}

#[test]
fn test_unreadable_source_rolls_back() {
    let (_dir, mut workflow) = common::workflow();
    let uploaded = workflow.upload(b"not an image", "broken.png").unwrap();

    let err = workflow
        .annotate(&AnnotateRequest::new(uploaded.image_id, Region::new(0.0, 0.0, 100.0, 100.0)))
        .unwrap_err();
    assert_eq!(err.category(), "image_decode");
    assert!(!err.is_client_error());
    assert_eq!(workflow.library().gesture_instance_count().unwrap(), 0);
}

#[test]
fn test_classified_annotation_with_plain_notes() {
    let (_dir, mut workflow) = common::workflow();
    let gesture = workflow.add_gesture("Blessing", Some("Raised right hand")).unwrap();
    let uploaded = workflow.upload(&common::png_bytes(600, 400), "a.png").unwrap();

    let request = AnnotateRequest::new(uploaded.image_id, Region::new(10.0, 10.0, 50.0, 50.0))
        .with_gesture(gesture.id)
        .with_notes("{ this is not json, just a brace");
    let saved = workflow.annotate(&request).unwrap();

    let instance = workflow
        .library()
        .get_gesture_instance(saved.gesture_instance_id)
        .unwrap()
        .unwrap();
    assert_eq!(instance.gesture_id, Some(gesture.id));
    assert_eq!(instance.notes.as_deref(), Some("{ this is not json, just a brace"));
    assert_eq!(workflow.library().icon_counts().unwrap(), (0, 0, 0));
}

#[test]
fn test_metadata_notes_cascade_into_catalogue() {
    let (_dir, mut workflow) = common::workflow();
    let uploaded = workflow.upload(&common::png_bytes(600, 400), "a.png").unwrap();

    let request = AnnotateRequest::new(uploaded.image_id, Region::new(0.0, 0.0, 300.0, 200.0))
        .with_notes(ICON_NOTES);
    let saved = workflow.annotate(&request).unwrap();

    let library = workflow.library();
    assert_eq!(library.icon_counts().unwrap(), (1, 1, 2));
    let icon = &library.list_icons().unwrap()[0];
    assert_eq!(icon.title, "Christ Pantocrator");
    assert_eq!(library.icon_images_for(icon.id).unwrap().len(), 1);
    assert_eq!(library.inscriptions_for(icon.id).unwrap().len(), 2);

    let image = library.get_image(uploaded.image_id).unwrap().unwrap();
    assert_eq!(image.source.as_deref(), Some("Monastery archive"));
    assert_eq!(image.location.as_deref(), Some("Mount Sinai"));

    // notes are stored as submitted
    let instance = library.get_gesture_instance(saved.gesture_instance_id).unwrap().unwrap();
    assert_eq!(instance.notes.as_deref(), Some(ICON_NOTES));
}

#[test]
fn test_reannotating_creates_independent_icon_subtree() {
    let (_dir, mut workflow) = common::workflow();
    let uploaded = workflow.upload(&common::png_bytes(600, 400), "a.png").unwrap();
    let request = AnnotateRequest::new(uploaded.image_id, Region::new(0.0, 0.0, 300.0, 200.0))
        .with_notes(ICON_NOTES);

    let first = workflow.annotate(&request).unwrap();
    let second = workflow.annotate(&request).unwrap();

    assert_ne!(first.gesture_instance_id, second.gesture_instance_id);
    assert_ne!(first.cropped_image_path, second.cropped_image_path);

    let library = workflow.library();
    assert_eq!(library.icon_counts().unwrap(), (2, 2, 4));
    let icons = library.list_icons().unwrap();
    assert_ne!(icons[0].id, icons[1].id);
    for icon in &icons {
        assert_eq!(library.inscriptions_for(icon.id).unwrap().len(), 2);
    }
    assert_eq!(common::published_crops(&workflow).len(), 2);
}

#[test]
fn test_failed_cascade_leaves_no_rows_and_no_crop() {
    let (_dir, mut workflow) = common::workflow();
    let uploaded = workflow.upload(&common::png_bytes(600, 400), "a.png").unwrap();

    // icon without a title violates the catalogue's NOT NULL constraint
    let request = AnnotateRequest::new(uploaded.image_id, Region::new(0.0, 0.0, 300.0, 200.0))
        .with_notes(r#"{"image": {"source": "changed"}, "icon": {"culture_period": "Cretan"}}"#);
    let err = workflow.annotate(&request).unwrap_err();

    assert_eq!(err.category(), "storage");
    assert_eq!(err.status_code(), 500);
    let library = workflow.library();
    assert_eq!(library.gesture_instance_count().unwrap(), 0);
    assert_eq!(library.icon_counts().unwrap(), (0, 0, 0));
    assert_eq!(library.get_image(uploaded.image_id).unwrap().unwrap().source, None);
    assert!(common::published_crops(&workflow).is_empty());
    assert_eq!(common::staged_crops(&workflow), 0);
}

#[test]
fn test_zero_area_region_is_rejected() {
    let (_dir, mut workflow) = common::workflow();
    let uploaded = workflow.upload(&common::png_bytes(600, 400), "a.png").unwrap();
    let err = workflow
        .annotate(&AnnotateRequest::new(uploaded.image_id, Region::new(10.0, 10.0, 0.0, 30.0)))
        .unwrap_err();
    assert_eq!(err.category(), "validation");
    assert_eq!(workflow.library().gesture_instance_count().unwrap(), 0);
}

#[test]
fn test_folder_import_skips_non_images() {
    let (dir, workflow) = common::workflow();
    let folder = dir.path().join("incoming");
    std::fs::create_dir_all(folder.join("nested")).unwrap();
    std::fs::write(folder.join("one.png"), common::png_bytes(10, 10)).unwrap();
    std::fs::write(folder.join("nested").join("two.PNG"), common::png_bytes(10, 10)).unwrap();
    std::fs::write(folder.join("readme.txt"), b"skip me").unwrap();

    let summary = workflow.import_folder(&folder);
    assert_eq!(summary.imported.len(), 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(workflow.library().image_count().unwrap(), 2);
}

#[test]
fn test_gesture_vocabulary() {
    let (_dir, workflow) = common::workflow();
    workflow.add_gesture("Orans", Some("Both hands raised")).unwrap();
    workflow.add_gesture("Blessing", None).unwrap();
    assert!(workflow.add_gesture("Blessing", None).is_err());
    assert!(matches!(
        workflow.add_gesture("  ", None),
        Err(AnnotatorError::Validation { .. })
    ));

    let names: Vec<String> = workflow
        .list_gestures()
        .unwrap()
        .into_iter()
        .map(|g| g.name)
        .collect();
    assert_eq!(names, vec!["Orans", "Blessing"]);
}

#[test]
fn test_scalar_metadata_values_still_cascade() {
    let (_dir, mut workflow) = common::workflow();
    let uploaded = workflow.upload(&common::png_bytes(600, 400), "a.png").unwrap();

    let request = AnnotateRequest::new(uploaded.image_id, Region::new(0.0, 0.0, 300.0, 200.0))
        .with_notes(r#"{"image": {"source": "Archive"}, "icon": {"title": "Hodegetria", "dimensions_mm": 420}}"#);
    workflow.annotate(&request).unwrap();

    let library = workflow.library();
    assert_eq!(library.icon_counts().unwrap(), (1, 0, 0));
    assert_eq!(library.list_icons().unwrap()[0].dimensions_mm.as_deref(), Some("420"));
    let image = library.get_image(uploaded.image_id).unwrap().unwrap();
    assert_eq!(image.source.as_deref(), Some("Archive"));
}

#[test]
fn test_null_inscriptions_still_create_icon() {
    let (_dir, mut workflow) = common::workflow();
    let uploaded = workflow.upload(&common::png_bytes(600, 400), "a.png").unwrap();

    let request = AnnotateRequest::new(uploaded.image_id, Region::new(0.0, 0.0, 300.0, 200.0))
        .with_notes(r#"{"icon": {"title": "Hodegetria", "iconographic_variant_id": "41"}, "icon_inscriptions": null}"#);
    workflow.annotate(&request).unwrap();

    let library = workflow.library();
    assert_eq!(library.icon_counts().unwrap(), (1, 0, 0));
    assert_eq!(library.list_icons().unwrap()[0].iconographic_variant_id, Some(41));
}

#[test]
fn test_huge_region_is_rejected_without_allocating() {
    let (_dir, mut workflow) = common::workflow();
    let uploaded = workflow.upload(&common::png_bytes(100, 100), "a.png").unwrap();

    let err = workflow
        .annotate(&AnnotateRequest::new(uploaded.image_id, Region::new(0.0, 0.0, 6.0e6, 4.0e6)))
        .unwrap_err();
    assert_eq!(err.category(), "validation");
    assert_eq!(workflow.library().gesture_instance_count().unwrap(), 0);
    assert!(common::published_crops(&workflow).is_empty());
}

#[test]
fn test_region_wider_than_u32_is_rejected() {
    let (_dir, mut workflow) = common::workflow();
    let uploaded = workflow.upload(&common::png_bytes(600, 400), "a.png").unwrap();

    let region = Region::new(0.0, 0.0, 4_294_967_306.0, 10.0);
    let err = workflow
        .annotate(&AnnotateRequest::new(uploaded.image_id, region))
        .unwrap_err();
    assert_eq!(err.category(), "validation");
    assert_eq!(workflow.library().gesture_instance_count().unwrap(), 0);
}

#[test]
fn test_region_hanging_off_canvas_is_padded() {
    let (_dir, mut workflow) = common::workflow();
    let uploaded = workflow.upload(&common::png_bytes(600, 400), "a.png").unwrap();

    let saved = workflow
        .annotate(&AnnotateRequest::new(
            uploaded.image_id,
            Region::new(-300.0, -200.0, 600.0, 400.0),
        ))
        .unwrap();
    let crop = image::open(workflow.config().crop_file(&saved.cropped_image_path).unwrap()).unwrap();
    assert_eq!(crop.dimensions(), (600, 400));
}
