//! # Stage Layout Config

use burn::config::Config;

/// Layout of one Swin stage: how many blocks, and how many heads.
#[derive(Config, Debug, Copy)]
pub struct LayerConfig {
    /// Number of transformer blocks in the stage.
    pub depth: usize,

    /// Number of attention heads in the stage.
    pub num_heads: usize,
}

/// Total number of blocks across `layers`.
pub fn total_depth(layers: &[LayerConfig]) -> usize {
    layers.iter().map(|layer| layer.depth).sum()
}

/// Split a per-block schedule into one slice per stage.
pub fn split_per_stage(
    layers: &[LayerConfig],
    schedule: &[f64],
) -> Vec<Vec<f64>> {
    assert_eq!(
        total_depth(layers),
        schedule.len(),
        "schedule length does not match total depth"
    );
    let mut offset = 0;
    layers
        .iter()
        .map(|layer| {
            let stage = schedule[offset..offset + layer.depth].to_vec();
            offset += layer.depth;
            stage
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_per_stage() {
        let layers = vec![LayerConfig::new(2, 3), LayerConfig::new(1, 6), LayerConfig::new(3, 12)];
        assert_eq!(total_depth(&layers), 6);

        let schedule = [0.0, 0.1, 0.2, 0.3, 0.4, 0.5];
        assert_eq!(
            split_per_stage(&layers, &schedule),
            vec![vec![0.0, 0.1], vec![0.2], vec![0.3, 0.4, 0.5]]
        );
    }

    #[test]
    #[should_panic(expected = "schedule length")]
    fn test_split_per_stage_panic() {
        split_per_stage(&[LayerConfig::new(2, 3)], &[0.0]);
    }
}
