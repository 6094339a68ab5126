use candle_core::{DType, Device, Tensor};
use lore_embed::masked_mean_l2;

fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

#[test]
fn padding_tokens_do_not_shift_the_mean() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    // Row 0: tokens [3,0] and [1,0], no padding -> mean [2,0].
    // Row 1: token [0,5] plus a padding token [9,9] -> mean [0,5].
    let hidden = Tensor::from_slice(&[3.0f32, 0.0, 1.0, 0.0, 0.0, 5.0, 9.0, 9.0], (2, 2, 2), &dev)?;
    let mask = Tensor::from_slice(&[1u32, 1, 1, 0], (2, 2), &dev)?;

    let pooled: Vec<Vec<f32>> = masked_mean_l2(&hidden, &mask)?.to_vec2()?;

    assert_eq!(pooled.len(), 2);
    assert!((pooled[0][0] - 1.0).abs() < 1e-5 && pooled[0][1].abs() < 1e-5);
    assert!(pooled[1][0].abs() < 1e-5 && (pooled[1][1] - 1.0).abs() < 1e-5);
    Ok(())
}

#[test]
fn output_rows_are_unit_length() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let hidden = Tensor::from_slice(&[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], (1, 2, 3), &dev)?;
    let mask = Tensor::ones((1, 2), DType::F32, &dev)?;

    let pooled: Vec<Vec<f32>> = masked_mean_l2(&hidden, &mask)?.to_vec2()?;
    assert!((norm(&pooled[0]) - 1.0).abs() < 1e-5);
    Ok(())
}

#[test]
fn fully_padded_row_stays_finite() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let hidden = Tensor::ones((1, 3, 4), DType::F32, &dev)?;
    let mask = Tensor::zeros((1, 3), DType::F32, &dev)?;

    let pooled: Vec<Vec<f32>> = masked_mean_l2(&hidden, &mask)?.to_vec2()?;
    assert!(pooled[0].iter().all(|x| x.is_finite()));
    Ok(())
}

#[test]
fn flat_input_is_rejected() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let hidden = Tensor::zeros((2, 4), DType::F32, &dev)?;
    let mask = Tensor::ones((2, 4), DType::F32, &dev)?;
    assert!(masked_mean_l2(&hidden, &mask).is_err());
    Ok(())
}
