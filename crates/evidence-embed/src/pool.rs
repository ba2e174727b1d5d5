use anyhow::{ensure, Result};
use candle_core::{DType, Tensor};

/// Mean over unmasked tokens followed by L2 normalization.
/// `hidden` is `[B, T, H]`, `attention_mask` is `[B, T]`; returns `[B, H]`.
pub fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let (batch, _tokens, hidden_dim) = hidden.dims3()?;
    let mask = attention_mask.to_device(hidden.device())?.to_dtype(hidden.dtype())?;

    let summed = hidden.broadcast_mul(&mask.unsqueeze(2)?)?.sum(1)?;
    let counts = mask.sum_keepdim(1)?;
    let mean = summed.broadcast_div(&counts)?;

    let eps = match hidden.dtype() { DType::F16 | DType::BF16 => 1e-6, _ => 1e-12 };
    let norms = mean.sqr()?.sum_keepdim(1)?.sqrt()?.affine(1.0, eps)?;
    let pooled = mean.broadcast_div(&norms)?;
    ensure!(pooled.dims() == [batch, hidden_dim], "pooled shape {:?} != [{batch}, {hidden_dim}]", pooled.dims());
    Ok(pooled)
}
