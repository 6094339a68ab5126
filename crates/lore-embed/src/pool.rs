use anyhow::{Context, Result, ensure};
use candle_core::Tensor;

/// Sentence embedding from token states: average over unmasked tokens, then
/// scale to unit length. `hidden` is `[batch, tokens, hidden]`, the mask
/// `[batch, tokens]`; the result is `[batch, hidden]`.
pub fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let (batch, _, width) = hidden.dims3().context("token states must be [batch, tokens, hidden]")?;
    let mask = attention_mask.to_device(hidden.device())?.to_dtype(hidden.dtype())?.unsqueeze(2)?;

    let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
    // All-padding rows divide by one instead of zero.
    let counts = mask.sum(1)?.maximum(1.0)?;
    let mean = summed.broadcast_div(&counts)?;

    let norm = mean.sqr()?.sum_keepdim(1)?.sqrt()?.maximum(1e-6)?;
    let pooled = mean.broadcast_div(&norm)?;
    ensure!(pooled.dims() == [batch, width], "pooled shape {:?}, expected [{batch}, {width}]", pooled.dims());
    Ok(pooled)
}
