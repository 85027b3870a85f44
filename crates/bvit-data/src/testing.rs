//! Filesystem fixtures for tests.

use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};

/// Write a solid color PNG, creating parent directories.
pub fn write_solid_png(
    path: &Path,
    width: u32,
    height: u32,
    color: [u8; 3],
) -> PathBuf {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create fixture dir");
    }
    RgbImage::from_pixel(width, height, Rgb(color))
        .save(path)
        .expect("write fixture image");
    path.to_path_buf()
}

/// Build ``root/<class>/<i>.png`` for each ``(class, count, color)``.
pub fn write_image_folder(
    root: &Path,
    classes: &[(&str, usize, [u8; 3])],
) {
    for (class, count, color) in classes {
        for i in 0..*count {
            write_solid_png(&root.join(class).join(format!("{i}.png")), 6, 4, *color);
        }
    }
}
