//! # 2x2 Patch Gathering
//!
//! Shared first step of both patch merging variants.

use bimm_contracts::unpack_shape_contract;
use burn::prelude::{Backend, Tensor};

/// Concatenate each 2x2 neighborhood of tokens into one token.
///
/// Channel order is ``[x(2i, 2j), x(2i+1, 2j), x(2i, 2j+1), x(2i+1, 2j+1)]``.
///
/// # Arguments
///
/// - `x`: ``[batch, height*width, channels]``.
/// - `input_resolution`: ``[height=2*out_height, width=2*out_width]``.
///
/// # Returns
///
/// ``[batch, out_height*out_width, 4*channels]``
///
/// # Panics
///
/// If the resolution is odd or does not match the token count.
pub fn gather_2x2_patches<B: Backend>(
    x: Tensor<B, 3>,
    input_resolution: [usize; 2],
) -> Tensor<B, 3> {
    let [height, width] = input_resolution;
    assert!(
        height % 2 == 0 && width % 2 == 0,
        "input_resolution {input_resolution:?} is not a multiple of 2"
    );
    let [out_height, out_width] = [height / 2, width / 2];

    let [batch, channels] = unpack_shape_contract!(
        ["batch", "tokens", "channels"],
        &x.dims(),
        &["batch", "channels"],
        &[("tokens", height * width)],
    );

    x.reshape([batch, out_height, 2, out_width, 2, channels])
        // [b, oh, dy, ow, dx, c] -> [b, oh, ow, dx, dy, c]
        .permute([0, 1, 3, 4, 2, 5])
        .reshape([batch, out_height * out_width, 4 * channels])
}
