//! End-to-end layer handling for a single contribution: resolve the
//! project, describe the overlay, apply the upper layer, drop the storage.

use std::fs;

use ::common::prelude::*;

#[test]
fn test_contribution_round_trip() {
    let temp = tempfile::tempdir().unwrap();
    let sandbox = temp.path().join("playground");
    let storage = temp.path().join("contributions");

    let project = resolve_strict(&sandbox, "alice/web").unwrap();
    fs::create_dir_all(project.join("css")).unwrap();
    fs::write(project.join("index.html"), "v1").unwrap();
    fs::write(project.join("css/site.css"), "body {}").unwrap();
    let project = confine_existing(&sandbox, &project).unwrap();

    let layers = storage.join("abc123");
    let upper = layers.join("upper");
    let work = layers.join("work");
    fs::create_dir_all(upper.join("js")).unwrap();
    fs::create_dir_all(&work).unwrap();

    let overlay = OverlayMount::new(&project, &upper, &work, "/global/alice/web").unwrap();
    assert!(overlay
        .mount_options()
        .contains(&format!("upperdir={}", upper.display())));

    // Contributor edits: one change, one new file.
    fs::write(upper.join("index.html"), "v2").unwrap();
    fs::write(upper.join("js/app.js"), "main()").unwrap();

    let stats = apply_upper_layer(overlay.upper(), overlay.lower()).unwrap();
    assert_eq!(stats.files, 2);
    assert_eq!(fs::read_to_string(project.join("index.html")).unwrap(), "v2");
    assert_eq!(fs::read_to_string(project.join("js/app.js")).unwrap(), "main()");
    assert_eq!(fs::read_to_string(project.join("css/site.css")).unwrap(), "body {}");

    assert!(remove_layer_tree(&storage, &layers).unwrap());
    assert!(!layers.exists());
    assert!(!remove_layer_tree(&storage, &layers).unwrap());
}

#[test]
fn test_storage_removal_is_confined() {
    let temp = tempfile::tempdir().unwrap();
    let storage = temp.path().join("contributions");
    fs::create_dir_all(&storage).unwrap();

    assert!(matches!(
        remove_layer_tree(&storage, &storage),
        Err(LayerError::OutsideStorage { .. })
    ));
    assert!(matches!(
        remove_layer_tree(&storage, temp.path()),
        Err(LayerError::OutsideStorage { .. })
    ));
    assert!(storage.exists());
}

#[test]
fn test_escaping_project_paths_are_refused() {
    let temp = tempfile::tempdir().unwrap();
    let err = resolve_strict(temp.path(), "alice/../../etc").unwrap_err();
    assert!(matches!(err, SandboxError::Traversal { .. }));
}
