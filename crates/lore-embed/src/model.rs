use anyhow::{Context, Result, anyhow, ensure};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use lore_core::traits::Embedder;

use crate::pool::masked_mean_l2;

const MAX_LEN: usize = 256;
/// XLM-RoBERTa `<pad>`.
const PAD_ID: u32 = 1;

/// BGE-M3 (XLM-RoBERTa) sentence embedder running locally through candle.
pub struct BgeM3Embedder {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
    id: String,
}

impl BgeM3Embedder {
    /// Load tokenizer, config and weights from `model_dir`, or from the first
    /// existing default location when `None`.
    pub fn load(model_dir: Option<&Path>, dim: usize) -> Result<Self> {
        let device = select_device();
        let model_dir = resolve_model_dir(model_dir)?;
        info!("loading BGE-M3 model from {}", model_dir.display());

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;

        let config_path = model_dir.join("config.json");
        let config: XLMRobertaConfig = serde_json::from_str(
            &std::fs::read_to_string(&config_path).with_context(|| format!("reading {}", config_path.display()))?,
        )?;

        let weights = load_weights(&model_dir, &device)?;
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = XLMRobertaModel::new(&config, vb)?;
        info!(dim, "BGE-M3 model loaded");
        Ok(Self { model, tokenizer, device, dim, id: format!("bge-m3:d{dim}") })
    }

    /// Token ids and attention mask, each `[1, MAX_LEN]`, truncated or padded.
    fn encode(&self, text: &str) -> Result<(Tensor, Tensor)> {
        let encoding = self.tokenizer.encode(text, true).map_err(|e| anyhow!("Tokenization failed: {e}"))?;
        let used = encoding.get_ids().len().min(MAX_LEN);
        let mut ids = vec![PAD_ID; MAX_LEN];
        let mut mask = vec![0u32; MAX_LEN];
        ids[..used].copy_from_slice(&encoding.get_ids()[..used]);
        mask[..used].copy_from_slice(&encoding.get_attention_mask()[..used]);
        let input_ids = Tensor::from_vec(ids, (1, MAX_LEN), &self.device)?;
        let attention_mask = Tensor::from_vec(mask, (1, MAX_LEN), &self.device)?;
        Ok((input_ids, attention_mask))
    }

    fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let (input_ids, attention_mask) = self.encode(text)?;
        let token_type_ids = Tensor::zeros((1, MAX_LEN), DType::I64, &self.device)?;
        let hidden_states = self.model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?;
        let pooled = masked_mean_l2(&hidden_states, &attention_mask)?;
        let emb = pooled.to_device(&Device::Cpu)?.squeeze(0)?.to_vec1::<f32>()?;
        ensure!(emb.len() == self.dim, "model produced {} dimensions, configured for {}", emb.len(), self.dim);
        if start.elapsed().as_millis() > 100 { debug!(elapsed_ms = start.elapsed().as_millis() as u64, "slow embedding"); }
        Ok(emb)
    }
}

impl Embedder for BgeM3Embedder {
    fn embedder_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { MAX_LEN }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed_text(t)).collect()
    }
}

fn select_device() -> Device {
    #[cfg(feature = "metal")]
    match Device::new_metal(0) {
        Ok(device) => {
            info!("embedding on Metal");
            return device;
        }
        Err(e) => warn!("Metal unavailable, falling back to CPU: {e}"),
    }
    info!("embedding on CPU");
    Device::Cpu
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<HashMap<String, Tensor>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        return Ok(candle_core::safetensors::load(&safetensors, device)?);
    }
    let pickle = model_dir.join("pytorch_model.bin");
    let weights = candle_core::pickle::read_all(&pickle).with_context(|| format!("reading {}", pickle.display()))?;
    Ok(weights.into_iter().collect())
}

fn resolve_model_dir(configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = configured {
        if p.exists() { return Ok(p.to_path_buf()); }
        warn!("configured model dir {} does not exist", p.display());
    }
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) {
            let p = PathBuf::from(&dir);
            if p.exists() { debug!("using {var}: {}", p.display()); return Ok(p); }
        }
    }
    for candidate in ["models/bge-m3", "../models/bge-m3"] {
        let p = Path::new(candidate);
        if p.exists() { return Ok(p.to_path_buf()); }
    }
    Err(anyhow!("Could not locate BGE-M3 model directory"))
}
