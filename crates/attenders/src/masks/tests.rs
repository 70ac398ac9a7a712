use super::*;
use crate::core::AttentionError;
use candle_core::{Device, Tensor};

#[test]
fn mask_from_lengths_masks_tail() -> Result<(), AttentionError> {
    let device = Device::Cpu;
    let mask = Mask::from_lengths(&device, &[2, 5], 4)?;
    assert_eq!(mask.validity().dims(), &[2, 4]);
    assert_eq!(mask.batch_size(), 2);
    assert_eq!(mask.seq_len(), 4);

    let values = mask.validity().to_vec2::<f32>()?;
    assert_eq!(values[0], vec![1.0, 1.0, 0.0, 0.0]);
    // Length clamped to seq_len, so nothing padded.
    assert_eq!(values[1], vec![1.0; 4]);
    assert_eq!(mask.padded_positions(), 2);
    assert!(mask.is_valid(0, 1));
    assert!(!mask.is_valid(0, 2));
    assert!(!mask.is_valid(7, 0));
    Ok(())
}

#[test]
fn mask_from_booleans_respects_flags() -> Result<(), AttentionError> {
    let device = Device::Cpu;
    let padding = vec![vec![false, true, false], vec![true, true, false]];
    let mask = Mask::from_booleans(&device, &padding)?;

    let values = mask.validity().to_vec2::<f32>()?;
    assert_eq!(values[0], vec![1.0, 0.0, 1.0]);
    assert_eq!(values[1], vec![0.0, 0.0, 1.0]);
    assert_eq!(mask.padded_positions(), 3);
    Ok(())
}

#[test]
fn ragged_boolean_rows_are_rejected() {
    let device = Device::Cpu;
    let padding = vec![vec![false, true], vec![false]];
    let err = Mask::from_booleans(&device, &padding).unwrap_err();
    assert!(matches!(err, AttentionError::InvalidShape { .. }));
}

#[test]
fn fully_padded_rows_are_degenerate() {
    let device = Device::Cpu;
    let err = Mask::from_lengths(&device, &[3, 0], 3).unwrap_err();
    assert!(matches!(err, AttentionError::DegenerateMask { batch_index: 1 }));

    let validity = Tensor::new(&[[0f32, 0.0], [1.0, 0.0]], &device).unwrap();
    let err = Mask::from_validity(&validity).unwrap_err();
    assert!(matches!(err, AttentionError::DegenerateMask { batch_index: 0 }));
}

#[test]
fn additive_bias_only_touches_padding() -> Result<(), AttentionError> {
    let device = Device::Cpu;
    let mask = Mask::from_lengths(&device, &[1, 2], 2)?;

    let bias = mask.additive_bias(MASK_BIAS)?.to_vec2::<f32>()?;
    assert_eq!(bias, vec![vec![0.0, -100.0], vec![0.0, 0.0]]);

    let lattice = mask.additive_bias(LATTICE_MASK_BIAS)?.to_vec2::<f32>()?;
    assert_eq!(lattice[0][0], 0.0);
    assert!(lattice[0][1] <= -1e9);
    Ok(())
}

#[test]
fn add_to_scores_skips_unpadded_batches() -> Result<(), AttentionError> {
    let device = Device::Cpu;
    let scores = Tensor::new(&[[0.5f32, 1.5], [2.0, -1.0]], &device)?;

    let full = Mask::from_lengths(&device, &[2, 2], 2)?;
    assert!(!full.has_padding());
    let untouched = full.add_to_scores(&scores, MASK_BIAS)?;
    assert_eq!(untouched.to_vec2::<f32>()?, scores.to_vec2::<f32>()?);

    let padded = Mask::from_lengths(&device, &[2, 1], 2)?;
    let biased = padded.add_to_scores(&scores, MASK_BIAS)?.to_vec2::<f32>()?;
    assert_eq!(biased[0], vec![0.5, 1.5]);
    assert_eq!(biased[1], vec![2.0, -101.0]);

    let wrong = Tensor::zeros((3, 2), MASK_DTYPE, &device)?;
    assert!(padded.add_to_scores(&wrong, MASK_BIAS).is_err());
    Ok(())
}

#[test]
fn truncate_keeps_leading_rows() -> Result<(), AttentionError> {
    let device = Device::Cpu;
    let mask = Mask::from_lengths(&device, &[3, 3, 1], 3)?;
    assert_eq!(mask.padded_positions(), 2);

    let head = mask.truncate(2)?;
    assert_eq!(head.batch_size(), 2);
    assert!(!head.has_padding());
    assert_eq!(head.validity().dims(), &[2, 3]);
    assert!(mask.truncate(4).is_err());
    Ok(())
}

#[test]
fn lattice_padding_matches_lattice_mask_bias() {
    assert_eq!(f64::from(LATTICE_PADDING_BIAS), f64::from(LATTICE_MASK_BIAS as f32));
    assert!(LATTICE_PADDING_BIAS <= -1e10);
}
