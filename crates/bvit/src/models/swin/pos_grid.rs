//! # Relative Position Grids
//!
//! Non-learned index tensors shared by the Swin attention variants.
//!
//! For a ``[wh, ww]`` window, two tokens differ by an offset
//! ``(dy, dx)`` with ``dy in -(wh-1)..=(wh-1)`` and ``dx in -(ww-1)..=(ww-1)``;
//! there are ``(2wh-1) * (2ww-1)`` distinct offsets. Offsets are numbered
//! row-major: ``(dy + wh - 1) * (2ww - 1) + (dx + ww - 1)``.

use burn::prelude::{Backend, Int, Tensor};

/// Number of distinct relative offsets in a window.
pub fn num_relative_offsets(window_shape: [usize; 2]) -> usize {
    let [wh, ww] = window_shape;
    (2 * wh - 1) * (2 * ww - 1)
}

/// ``(y, x)`` coordinates of every token in a window, in row-major token order.
///
/// # Returns
///
/// ``[wh*ww, 2]`` int tensor.
pub fn window_token_coords<B: Backend>(
    window_shape: [usize; 2],
    device: &B::Device,
) -> Tensor<B, 2, Int> {
    let [wh, ww] = window_shape;
    let n = wh * ww;

    let ys = Tensor::<B, 1, Int>::arange(0..wh as i64, device)
        .reshape([wh, 1])
        .repeat_dim(1, ww)
        .reshape([n, 1]);
    let xs = Tensor::<B, 1, Int>::arange(0..ww as i64, device)
        .reshape([1, ww])
        .repeat_dim(0, wh)
        .reshape([n, 1]);

    Tensor::cat(vec![ys, xs], 1)
}

/// Relative position index of every (query, key) token pair.
///
/// # Returns
///
/// ``[wh*ww, wh*ww]`` int tensor with values in ``0..num_relative_offsets``.
pub fn relative_position_index<B: Backend>(
    window_shape: [usize; 2],
    device: &B::Device,
) -> Tensor<B, 2, Int> {
    let [wh, ww] = window_shape;
    let n = wh * ww;

    let coords = window_token_coords::<B>(window_shape, device);
    // rel[i, j] = coords[i] - coords[j]
    let rel: Tensor<B, 3, Int> =
        coords.clone().unsqueeze_dim::<3>(1) - coords.unsqueeze_dim::<3>(0);

    let dy = rel
        .clone()
        .slice([0..n, 0..n, 0..1])
        .reshape([n, n])
        .add_scalar(wh as i64 - 1);
    let dx = rel
        .slice([0..n, 0..n, 1..2])
        .reshape([n, n])
        .add_scalar(ww as i64 - 1);

    dy.mul_scalar(2 * ww as i64 - 1) + dx
}

/// Every relative offset ``(dy, dx)``, in offset-index order.
///
/// # Returns
///
/// ``[(2wh-1)*(2ww-1), 2]`` float tensor.
pub fn relative_offset_table<B: Backend>(
    window_shape: [usize; 2],
    device: &B::Device,
) -> Tensor<B, 2> {
    let [wh, ww] = window_shape;
    let rows = 2 * wh - 1;
    let cols = 2 * ww - 1;

    let dys = Tensor::<B, 1, Int>::arange(-(wh as i64 - 1)..wh as i64, device)
        .float()
        .reshape([rows, 1])
        .repeat_dim(1, cols);
    let dxs = Tensor::<B, 1, Int>::arange(-(ww as i64 - 1)..ww as i64, device)
        .float()
        .reshape([1, cols])
        .repeat_dim(0, rows);

    Tensor::stack::<3>(vec![dys, dxs], 2).reshape([rows * cols, 2])
}

/// Log-spaced relative coordinates, the input of the Swin-V2 position bias MLP.
///
/// Offsets are normalized to ``[-1, 1]`` by ``(w - 1)``, scaled by 8, and mapped through
/// ``sign(x) * log2(|x| + 1) / log2(8)``.
///
/// See: [Swin-V2](https://arxiv.org/abs/2111.09883), section 3.3.
///
/// # Returns
///
/// ``[(2wh-1)*(2ww-1), 2]`` float tensor.
pub fn log_spaced_relative_coords<B: Backend>(
    window_shape: [usize; 2],
    device: &B::Device,
) -> Tensor<B, 2> {
    let [wh, ww] = window_shape;
    let n = num_relative_offsets(window_shape);

    let table = relative_offset_table::<B>(window_shape, device);

    // A 1-wide window only has the zero offset; avoid 0/0.
    let norm = Tensor::<B, 1>::from_floats(
        [wh.saturating_sub(1).max(1) as f32, ww.saturating_sub(1).max(1) as f32],
        device,
    )
    .reshape([1, 2]);

    let table = (table / norm).mul_scalar(8.0);

    table
        .clone()
        .sign()
        .mul(table.abs().log1p().div_scalar(8f64.ln()))
        .reshape([n, 2])
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::prelude::TensorData;
    use burn::tensor::Tolerance;

    type B = NdArray<f32>;

    #[test]
    fn test_num_relative_offsets() {
        assert_eq!(num_relative_offsets([2, 2]), 9);
        assert_eq!(num_relative_offsets([7, 7]), 169);
        assert_eq!(num_relative_offsets([2, 3]), 15);
    }

    #[test]
    fn test_window_token_coords() {
        let device = Default::default();
        window_token_coords::<B>([2, 3], &device).to_data().assert_eq(
            &TensorData::from([[0i64, 0], [0, 1], [0, 2], [1, 0], [1, 1], [1, 2]]),
            false,
        );
    }

    #[test]
    fn test_relative_position_index() {
        let device = Default::default();

        relative_position_index::<B>([2, 2], &device)
            .to_data()
            .assert_eq(
                &TensorData::from([
                    [4i64, 3, 1, 0],
                    [5, 4, 2, 1],
                    [7, 6, 4, 3],
                    [8, 7, 5, 4],
                ]),
                false,
            );
    }

    #[test]
    fn test_relative_position_index_range() {
        let device = Default::default();
        let window_shape = [3, 4];

        let idx = relative_position_index::<B>(window_shape, &device);
        assert_eq!(idx.dims(), [12, 12]);

        let values = idx.to_data().convert::<i64>().to_vec::<i64>().unwrap();
        let max = *values.iter().max().unwrap();
        let min = *values.iter().min().unwrap();
        assert_eq!(min, 0);
        assert_eq!(max as usize, num_relative_offsets(window_shape) - 1);

        // The zero offset sits at the center of the table.
        let center = (num_relative_offsets(window_shape) / 2) as i64;
        for i in 0..12 {
            assert_eq!(values[i * 12 + i], center);
            for j in 0..12 {
                assert_eq!(values[i * 12 + j] + values[j * 12 + i], 2 * center);
            }
        }
    }

    #[test]
    fn test_relative_offset_table() {
        let device = Default::default();
        relative_offset_table::<B>([2, 2], &device)
            .to_data()
            .assert_eq(
                &TensorData::from([
                    [-1.0f32, -1.0],
                    [-1.0, 0.0],
                    [-1.0, 1.0],
                    [0.0, -1.0],
                    [0.0, 0.0],
                    [0.0, 1.0],
                    [1.0, -1.0],
                    [1.0, 0.0],
                    [1.0, 1.0],
                ]),
                true,
            );
    }

    #[test]
    fn test_log_spaced_relative_coords() {
        let device = Default::default();

        let coords = log_spaced_relative_coords::<B>([2, 2], &device);
        assert_eq!(coords.dims(), [9, 2]);

        // |offset| == w - 1 maps to log2(9) / log2(8).
        let edge = (9f32).ln() / (8f32).ln();
        coords.to_data().assert_approx_eq::<f32>(
            &TensorData::from([
                [-edge, -edge],
                [-edge, 0.0],
                [-edge, edge],
                [0.0, -edge],
                [0.0, 0.0],
                [0.0, edge],
                [edge, -edge],
                [edge, 0.0],
                [edge, edge],
            ]),
            Tolerance::default(),
        );
    }

    #[test]
    fn test_log_spaced_relative_coords_is_odd() {
        let device = Default::default();

        let coords = log_spaced_relative_coords::<B>([4, 3], &device);
        let n = num_relative_offsets([4, 3]);

        // Row k and row n-1-k hold opposite offsets.
        let flipped = coords.clone().flip([0]);
        (coords + flipped)
            .to_data()
            .assert_approx_eq::<f32>(
                &Tensor::<B, 2>::zeros([n, 2], &device).to_data(),
                Tolerance::default(),
            );
    }

    #[test]
    fn test_single_token_window() {
        let device = Default::default();
        let coords = log_spaced_relative_coords::<B>([1, 1], &device);
        coords
            .to_data()
            .assert_eq(&TensorData::from([[0.0f32, 0.0]]), true);
    }
}
