//! # Image Folder Scanning

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// File extensions treated as images; matched case-insensitively.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp"];

/// One labeled image.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageItem {
    /// Path to the image file.
    pub path: String,

    /// Class index; position of the class in [`ImageFolderIndex::classes`].
    pub label: usize,
}

/// Result of scanning an image folder.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageFolderIndex {
    /// The scanned root.
    pub root: PathBuf,

    /// Class names, sorted.
    pub classes: Vec<String>,

    /// Items, sorted by ``(label, path)``.
    pub items: Vec<ImageItem>,
}

impl ImageFolderIndex {
    /// Number of classes.
    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// Look up the label of a class name.
    pub fn label_of(
        &self,
        class: &str,
    ) -> Option<usize> {
        self.classes.iter().position(|c| c == class)
    }

    /// Number of items per class, in label order.
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.num_classes()];
        for item in &self.items {
            counts[item.label] += 1;
        }
        counts
    }
}

fn image_glob() -> String {
    format!("*/*.{{{}}}", IMAGE_EXTENSIONS.join(","))
}

/// Scan ``root/<class>/<file>`` for images.
///
/// Files directly under `root`, deeper files, and files with other
/// extensions are ignored.
///
/// # Errors
///
/// If `root` is not a readable directory, or it holds no images.
pub fn scan_image_folder<P: AsRef<Path>>(root: P) -> anyhow::Result<ImageFolderIndex> {
    let root = root.as_ref();
    if !root.is_dir() {
        bail!("image folder root {} is not a directory", root.display());
    }

    let walker = globwalk::GlobWalkerBuilder::from_patterns(root, &[image_glob()])
        .case_insensitive(true)
        .max_depth(2)
        .build()
        .with_context(|| format!("failed to build image glob for {}", root.display()))?;

    let mut by_class: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for entry in walker {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let class = path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .with_context(|| format!("no class directory for {}", path.display()))?;

        by_class
            .entry(class.to_string())
            .or_default()
            .push(path.to_string_lossy().into_owned());
    }

    if by_class.is_empty() {
        bail!(
            "no images ({}) found under {}/<class>/",
            IMAGE_EXTENSIONS.join(", "),
            root.display()
        );
    }

    let classes: Vec<String> = by_class.keys().cloned().collect();
    let items: Vec<ImageItem> = by_class
        .into_values()
        .enumerate()
        .flat_map(|(label, mut paths)| {
            paths.sort();
            paths.into_iter().map(move |path| ImageItem { path, label })
        })
        .collect();

    tracing::info!(
        root = %root.display(),
        num_classes = classes.len(),
        num_items = items.len(),
        "scanned image folder"
    );

    Ok(ImageFolderIndex {
        root: root.to_path_buf(),
        classes,
        items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{write_image_folder, write_solid_png};
    use hamcrest::prelude::*;

    #[test]
    fn test_image_glob() {
        assert_eq!(image_glob(), "*/*.{png,jpg,jpeg,gif,bmp}");
    }

    #[test]
    fn test_scan_image_folder() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_image_folder(
            root,
            &[("dog", 2, [0, 0, 255]), ("cat", 3, [255, 0, 0])],
        );
        // Ignored: wrong extension, top level file, too deep.
        std::fs::write(root.join("cat").join("notes.txt"), "meow").unwrap();
        write_solid_png(&root.join("stray.png"), 2, 2, [0, 0, 0]);
        write_solid_png(&root.join("dog").join("nested").join("x.png"), 2, 2, [0, 0, 0]);

        let index = scan_image_folder(root).unwrap();

        assert_that!(index.classes.clone(), is(equal_to(vec!["cat".to_string(), "dog".to_string()])));
        assert_that!(index.num_classes(), is(equal_to(2)));
        assert_that!(index.class_counts(), is(equal_to(vec![3, 2])));
        assert_eq!(index.label_of("dog"), Some(1));
        assert_eq!(index.label_of("cow"), None);

        assert_eq!(index.items.len(), 5);
        assert!(index.items[0].path.ends_with("0.png"));
        assert_eq!(index.items[0].label, 0);
        assert_eq!(index.items[4].label, 1);
    }

    #[test]
    fn test_scan_uppercase_extension() {
        let dir = tempfile::tempdir().unwrap();
        write_solid_png(&dir.path().join("a").join("IMG.PNG"), 2, 2, [1, 2, 3]);

        let index = scan_image_folder(dir.path()).unwrap();
        assert_eq!(index.items.len(), 1);
    }

    #[test]
    fn test_scan_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("empty_class")).unwrap();

        let err = scan_image_folder(dir.path()).unwrap_err();
        assert!(err.to_string().contains("no images"), "{err}");
    }

    #[test]
    fn test_scan_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let err = scan_image_folder(dir.path().join("missing")).unwrap_err();
        assert!(err.to_string().contains("not a directory"), "{err}");
    }
}
