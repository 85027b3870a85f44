//! # Shifted Window Attention Masks
//!
//! After a cyclic shift, a window at the bottom/right edge of the feature map
//! holds tokens from up to four spatially unrelated regions. The mask blocks
//! attention between tokens from different regions.
//!
//! See: [Swin Transformer](https://arxiv.org/pdf/2103.14030), section 3.2.

use crate::models::swin::windowing::window_partition;
use bimm_contracts::unpack_shape_contract;
use burn::prelude::{Backend, Bool, Int, Tensor, TensorData};

/// Score added to masked attention logits before the softmax.
pub const MASK_MIN: f64 = -100.0;

/// Label the shifted-window regions of a feature map.
///
/// Each axis is cut at ``[0..size-window_size, size-window_size..size-shift, size-shift..size]``;
/// the region id is ``row_band * 3 + col_band``.
///
/// # Returns
///
/// ``[height, width]`` int tensor of region ids in ``0..9``.
///
/// # Panics
///
/// If `shift_size >= window_size`, or the input is smaller than a window.
pub fn shifted_window_region_map<B: Backend>(
    input_shape: [usize; 2],
    window_size: usize,
    shift_size: usize,
    device: &B::Device,
) -> Tensor<B, 2, Int> {
    let [height, width] = input_shape;
    assert!(
        shift_size < window_size,
        "shift_size ({shift_size}) must be less than window_size ({window_size})"
    );
    assert!(
        height >= window_size && width >= window_size,
        "input_shape {input_shape:?} is smaller than window_size {window_size}"
    );

    let band = |idx: usize, size: usize| -> i64 {
        if idx < size - window_size {
            0
        } else if idx < size - shift_size {
            1
        } else {
            2
        }
    };

    let mut labels = Vec::with_capacity(height * width);
    for h in 0..height {
        for w in 0..width {
            labels.push(band(h, height) * 3 + band(w, width));
        }
    }

    Tensor::from_data(TensorData::new(labels, [height, width]), device)
}

/// Create a shifted window attention mask.
///
/// # Arguments
///
/// - `input_shape`: ``[height, width]`` of the feature map.
/// - `window_size`: the window edge length.
/// - `shift_size`: the cyclic shift.
/// - `device`: the device on which the tensor will be created.
///
/// # Returns
///
/// ``[num_windows, window_size*window_size, window_size*window_size]`` bool tensor;
/// `true` where the two tokens must not attend to each other.
pub fn sw_attn_mask<B: Backend>(
    input_shape: [usize; 2],
    window_size: usize,
    shift_size: usize,
    device: &B::Device,
) -> Tensor<B, 3, Bool> {
    let [height, width] = input_shape;
    let region_map = shifted_window_region_map::<B>(input_shape, window_size, shift_size, device);

    let mask_windows = window_partition(region_map.reshape([1, height, width, 1]), window_size);
    // nW, ws, ws, 1

    let window_area = window_size * window_size;
    let num_windows = mask_windows.dims()[0];
    let mask_windows = mask_windows.reshape([num_windows, window_area]);

    let mask =
        mask_windows.clone().unsqueeze_dim::<3>(1) - mask_windows.unsqueeze_dim::<3>(2);

    mask.not_equal_elem(0)
}

/// Apply a shifted-window mask to attention logits.
///
/// # Arguments
///
/// - `attn`: ``[batch*num_windows, heads, tokens, tokens]`` logits.
/// - `mask`: ``[num_windows, tokens, tokens]`` bool mask.
///
/// # Returns
///
/// The logits, with [`MASK_MIN`] added at masked positions.
pub fn apply_attention_mask<B: Backend>(
    attn: Tensor<B, 4>,
    mask: Tensor<B, 3, Bool>,
) -> Tensor<B, 4> {
    let [num_windows, tokens, _] = mask.dims();
    let [b_nw, heads] = unpack_shape_contract!(
        ["b_nw", "heads", "tokens", "tokens"],
        &attn.dims(),
        &["b_nw", "heads"],
        &[("tokens", tokens)],
    );
    assert_eq!(
        b_nw % num_windows,
        0,
        "attention batch {b_nw} is not a multiple of {num_windows} windows"
    );
    let batch = b_nw / num_windows;

    let penalty = mask
        .float()
        .mul_scalar(MASK_MIN)
        .reshape([1, num_windows, 1, tokens, tokens]);

    let attn = attn.reshape([batch, num_windows, heads, tokens, tokens]) + penalty;

    attn.reshape([b_nw, heads, tokens, tokens])
}
