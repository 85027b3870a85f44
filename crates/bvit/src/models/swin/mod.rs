//! # The Swin Transformer Family
//!
//! * [`v1`] - Swin Transformer, pre-norm with a learned bias table.
//! * [`v2`] - Swin Transformer V2, post-norm with cosine attention and a continuous bias.
//!
//! Both share the window machinery in [`windowing`], [`attention_mask`] and [`pos_grid`].

pub mod attention_mask;
pub mod layer_config;
pub mod merging;
pub mod pos_grid;
pub mod v1;
pub mod v2;
pub mod windowing;

/// Clamp the window to the feature map.
///
/// When the feature map is no larger than the window, the whole map becomes
/// a single window and shifting is disabled.
///
/// # Returns
///
/// ``(window_size, shift_size)``
pub fn effective_window(
    input_resolution: [usize; 2],
    window_size: usize,
    shift_size: usize,
) -> (usize, usize) {
    let min_side = input_resolution[0].min(input_resolution[1]);
    if min_side <= window_size {
        (min_side, 0)
    } else {
        (window_size, shift_size)
    }
}

/// Check a Swin stage hierarchy against an input resolution.
///
/// Every stage must tile into whole (clamped) windows, and every stage
/// followed by patch merging must have an even resolution.
///
/// # Errors
///
/// A description of the first stage that does not fit.
pub fn check_swin_geometry(
    input_resolution: [usize; 2],
    patch_size: usize,
    num_layers: usize,
    window_size: usize,
) -> Result<(), String> {
    let [h, w] = input_resolution;
    if patch_size == 0 || h % patch_size != 0 || w % patch_size != 0 {
        return Err(format!(
            "input_resolution {input_resolution:?} is not a multiple of patch_size {patch_size}"
        ));
    }

    let mut resolution = [h / patch_size, w / patch_size];
    for stage in 0..num_layers {
        let (window, _) = effective_window(resolution, window_size, 0);
        if resolution[0] % window != 0 || resolution[1] % window != 0 {
            return Err(format!(
                "stage {stage} resolution {resolution:?} is not a multiple of window_size {window}"
            ));
        }
        if stage + 1 < num_layers {
            if resolution[0] % 2 != 0 || resolution[1] % 2 != 0 {
                return Err(format!(
                    "stage {stage} resolution {resolution:?} can not be merged 2x2"
                ));
            }
            resolution = [resolution[0] / 2, resolution[1] / 2];
        }
    }
    Ok(())
}
