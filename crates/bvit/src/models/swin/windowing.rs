//! # Window Partitioning
//!
//! Swin attention operates on non-overlapping ``window_size x window_size``
//! windows of a ``[batch, height, width, channels]`` feature map.
//! [`window_partition`] and [`window_reverse`] move between the two layouts;
//! [`cyclic_shift`] and [`reverse_cyclic_shift`] implement the shifted-window
//! offset with a torus roll.

use bimm_contracts::unpack_shape_contract;
use burn::prelude::{Backend, Tensor};
use burn::tensor::BasicOps;

/// Partition a feature map into windows.
///
/// # Arguments
///
/// - `x`: ``[batch, height=h_wins*window_size, width=w_wins*window_size, channels]``.
/// - `window_size`: the window edge length.
///
/// # Returns
///
/// ``[batch*h_wins*w_wins, window_size, window_size, channels]``
///
/// # Panics
///
/// If the height or width is not a multiple of `window_size`.
pub fn window_partition<B: Backend, K: BasicOps<B>>(
    x: Tensor<B, 4, K>,
    window_size: usize,
) -> Tensor<B, 4, K> {
    let [batch, h_wins, w_wins, channels] = unpack_shape_contract!(
        [
            "batch",
            "height" = "h_wins" * "window_size",
            "width" = "w_wins" * "window_size",
            "channels"
        ],
        &x.dims(),
        &["batch", "h_wins", "w_wins", "channels"],
        &[("window_size", window_size)],
    );

    x.reshape([batch, h_wins, window_size, w_wins, window_size, channels])
        .permute([0, 1, 3, 2, 4, 5])
        .reshape([batch * h_wins * w_wins, window_size, window_size, channels])
}

/// Reverse [`window_partition`].
///
/// # Arguments
///
/// - `windows`: ``[batch*h_wins*w_wins, window_size, window_size, channels]``.
/// - `window_size`: the window edge length.
/// - `height`: ``h_wins*window_size``.
/// - `width`: ``w_wins*window_size``.
///
/// # Returns
///
/// ``[batch, height, width, channels]``
pub fn window_reverse<B: Backend, K: BasicOps<B>>(
    windows: Tensor<B, 4, K>,
    window_size: usize,
    height: usize,
    width: usize,
) -> Tensor<B, 4, K> {
    let h_wins = height / window_size;
    let w_wins = width / window_size;
    let windows_per_image = h_wins * w_wins;

    let [total_windows, channels] = unpack_shape_contract!(
        ["total_windows", "window_size", "window_size", "channels"],
        &windows.dims(),
        &["total_windows", "channels"],
        &[("window_size", window_size)],
    );
    assert!(
        h_wins * window_size == height
            && w_wins * window_size == width
            && total_windows % windows_per_image == 0,
        "{total_windows} windows of size {window_size} do not tile [{height}, {width}]"
    );
    let batch = total_windows / windows_per_image;

    windows
        .reshape([batch, h_wins, w_wins, window_size, window_size, channels])
        .permute([0, 1, 3, 2, 4, 5])
        .reshape([batch, height, width, channels])
}

/// Roll a tensor along one dimension.
///
/// Elements shifted beyond the last position re-enter at the first;
/// ``out[i] = x[(i - shift) mod size]``.
pub fn roll_dim<B: Backend, const D: usize, K: BasicOps<B>>(
    x: Tensor<B, D, K>,
    shift: isize,
    dim: usize,
) -> Tensor<B, D, K> {
    let size = x.dims()[dim];
    if size == 0 {
        return x;
    }
    let shift = shift.rem_euclid(size as isize) as usize;
    if shift == 0 {
        return x;
    }

    let head = x.clone().narrow(dim, size - shift, shift);
    let tail = x.narrow(dim, 0, size - shift);
    Tensor::cat(vec![head, tail], dim)
}

/// Roll a tensor along several dimensions.
///
/// # Panics
///
/// If `shifts` and `dims` differ in length.
pub fn roll<B: Backend, const D: usize, K: BasicOps<B>>(
    x: Tensor<B, D, K>,
    shifts: &[isize],
    dims: &[usize],
) -> Tensor<B, D, K> {
    assert_eq!(
        shifts.len(),
        dims.len(),
        "shifts ({shifts:?}) and dims ({dims:?}) must have the same length"
    );
    shifts
        .iter()
        .zip(dims.iter())
        .fold(x, |acc, (&shift, &dim)| roll_dim(acc, shift, dim))
}

/// Shift a ``[batch, height, width, channels]`` map toward the origin by `shift`.
pub fn cyclic_shift<B: Backend, K: BasicOps<B>>(
    x: Tensor<B, 4, K>,
    shift: usize,
) -> Tensor<B, 4, K> {
    let shift = shift as isize;
    roll(x, &[-shift, -shift], &[1, 2])
}

/// Reverse [`cyclic_shift`].
pub fn reverse_cyclic_shift<B: Backend, K: BasicOps<B>>(
    x: Tensor<B, 4, K>,
    shift: usize,
) -> Tensor<B, 4, K> {
    let shift = shift as isize;
    roll(x, &[shift, shift], &[1, 2])
}

/// Run a window-local operation over a feature map.
///
/// Applies the (optional) cyclic shift, partitions into windows, flattens each
/// window into a token sequence, calls `op`, and undoes all of it.
///
/// # Arguments
///
/// - `x`: ``[batch, height, width, channels]``.
/// - `window_size`: the window edge length.
/// - `shift_size`: the cyclic shift; ``0`` for regular windows.
/// - `op`: maps ``[batch*num_windows, window_size*window_size, channels]`` to the same shape.
///
/// # Returns
///
/// ``[batch, height, width, channels]``
pub fn shifted_window_apply<B: Backend, F>(
    x: Tensor<B, 4>,
    window_size: usize,
    shift_size: usize,
    op: F,
) -> Tensor<B, 4>
where
    F: FnOnce(Tensor<B, 3>) -> Tensor<B, 3>,
{
    let [_, height, width, channels] = x.dims();

    let x = if shift_size > 0 {
        cyclic_shift(x, shift_size)
    } else {
        x
    };

    let windows = window_partition(x, window_size);
    let num_windows = windows.dims()[0];
    let tokens = windows.reshape([num_windows, window_size * window_size, channels]);

    let tokens = op(tokens);

    let windows = tokens.reshape([num_windows, window_size, window_size, channels]);
    let x = window_reverse(windows, window_size, height, width);

    if shift_size > 0 {
        reverse_cyclic_shift(x, shift_size)
    } else {
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::prelude::{Int, TensorData};

    type B = NdArray<f32>;

    #[test]
    fn test_window_partition() {
        let device = Default::default();

        // [1, 4, 4, 1], values 0..16 in row-major order.
        let x: Tensor<B, 4, Int> = Tensor::arange(0..16, &device).reshape([1, 4, 4, 1]);

        let windows = window_partition(x, 2);
        assert_eq!(windows.dims(), [4, 2, 2, 1]);

        windows.reshape([4, 4]).to_data().assert_eq(
            &TensorData::from([
                [0, 1, 4, 5],
                [2, 3, 6, 7],
                [8, 9, 12, 13],
                [10, 11, 14, 15],
            ]),
            false,
        );
    }

    #[test]
    fn test_window_reverse_inverts_partition() {
        let device = Default::default();

        let x: Tensor<B, 4> = Tensor::arange(0..(2 * 6 * 4 * 3), &device)
            .float()
            .reshape([2, 6, 4, 3]);

        let windows = window_partition(x.clone(), 2);
        assert_eq!(windows.dims(), [12, 2, 2, 3]);

        let y = window_reverse(windows, 2, 6, 4);
        y.to_data().assert_eq(&x.to_data(), true);
    }

    #[test]
    #[should_panic]
    fn test_window_partition_panic() {
        let device = Default::default();
        let x: Tensor<B, 4> = Tensor::zeros([1, 5, 4, 1], &device);
        window_partition(x, 2);
    }

    #[test]
    fn test_roll_dim() {
        let device = Default::default();
        let x: Tensor<B, 1, Int> = Tensor::arange(0..5, &device);

        roll_dim(x.clone(), 2, 0)
            .to_data()
            .assert_eq(&TensorData::from([3, 4, 0, 1, 2]), false);

        roll_dim(x.clone(), -1, 0)
            .to_data()
            .assert_eq(&TensorData::from([1, 2, 3, 4, 0]), false);

        roll_dim(x.clone(), 5, 0)
            .to_data()
            .assert_eq(&x.to_data(), false);
    }

    #[test]
    fn test_roll_multi_dim() {
        let device = Default::default();
        let x: Tensor<B, 2, Int> = Tensor::arange(0..6, &device).reshape([2, 3]);

        roll(x, &[1, -1], &[0, 1])
            .to_data()
            .assert_eq(&TensorData::from([[4, 5, 3], [1, 2, 0]]), false);
    }

    #[test]
    fn test_shifted_window_apply_identity() {
        let device = Default::default();

        let x: Tensor<B, 4> = Tensor::arange(0..(2 * 4 * 4 * 3), &device)
            .float()
            .reshape([2, 4, 4, 3]);

        let y = shifted_window_apply(x.clone(), 2, 1, |tokens| {
            assert_eq!(tokens.dims(), [8, 4, 3]);
            tokens
        });
        y.to_data().assert_eq(&x.to_data(), true);
    }

    #[test]
    fn test_shifted_window_apply_is_window_local() {
        let device = Default::default();

        let x: Tensor<B, 4> = Tensor::arange(0..16, &device)
            .float()
            .reshape([1, 4, 4, 1]);

        // Replace every token with its window mean.
        let y = shifted_window_apply(x, 2, 0, |tokens| {
            let [n, t, c] = tokens.dims();
            tokens.mean_dim(1).repeat_dim(1, t).reshape([n, t, c])
        });

        y.reshape([4, 4]).to_data().assert_eq(
            &TensorData::from([
                [2.5f32, 2.5, 4.5, 4.5],
                [2.5, 2.5, 4.5, 4.5],
                [10.5, 10.5, 12.5, 12.5],
                [10.5, 10.5, 12.5, 12.5],
            ]),
            true,
        );
    }

    #[test]
    fn test_cyclic_shift_roundtrip() {
        let device = Default::default();

        let x: Tensor<B, 4> = Tensor::arange(0..(6 * 6), &device)
            .float()
            .reshape([1, 6, 6, 1]);

        let shifted = cyclic_shift(x.clone(), 2);
        let first_row = shifted.clone().slice([0..1, 0..1, 0..6, 0..1]).reshape([6]);
        first_row
            .to_data()
            .assert_eq(&TensorData::from([14.0, 15.0, 16.0, 17.0, 12.0, 13.0]), false);

        reverse_cyclic_shift(shifted, 2)
            .to_data()
            .assert_eq(&x.to_data(), true);
    }
}
