use tch::{Kind, Tensor};

use super::EngineError;
use crate::model::GenerationOptions;

/// Repetition penalty, then greedy argmax or a temperature / top-k / top-p draw.
#[derive(Debug, Clone)]
pub struct LogitsSampler {
    do_sample: bool,
    temperature: f64,
    top_k: i64,
    top_p: f64,
    repetition_penalty: f64,
}

impl LogitsSampler {
    pub fn new(options: &GenerationOptions) -> Result<Self, EngineError> {
        if options.do_sample && options.temperature <= 0.0 {
            return Err(EngineError::InvalidOptions(format!(
                "temperature ({}) must be strictly positive when sampling; set do_sample to false for greedy decoding",
                options.temperature
            )));
        }
        Ok(Self {
            do_sample: options.do_sample,
            temperature: options.temperature,
            top_k: i64::from(options.top_k.max(1)),
            top_p: options.top_p,
            repetition_penalty: options.repetition_penalty,
        })
    }

    /// `logits` is the float `[vocab]` row of the last position, on any device.
    pub fn next_token(&self, logits: &Tensor, history: &[i64]) -> Result<i64, EngineError> {
        let vocab = logits
            .size1()
            .map_err(|e| EngineError::Execution(format!("expected a [vocab] logits row: {e}")))?;
        if vocab == 0 {
            return Err(EngineError::Execution("empty logits row".into()));
        }

        let logits = self.apply_repetition_penalty(logits, history, vocab);
        if !self.do_sample {
            return Ok(logits.argmax(0, false).int64_value(&[]));
        }

        let scaled = logits / self.temperature;
        let (top_logits, top_ids) = scaled.topk(self.top_k.min(vocab), -1, true, true);
        let probs = top_logits.softmax(-1, Kind::Float);

        // Keep the smallest prefix whose mass reaches top_p; the best token always stays.
        let preceding = probs.cumsum(-1, Kind::Float) - &probs;
        let keep = preceding.lt(self.top_p).logical_or(&preceding.le(0.0));
        let filtered = probs.masked_fill(&keep.logical_not(), 0.0);

        let pick = filtered.multinomial(1, false).int64_value(&[0]);
        Ok(top_ids.int64_value(&[pick]))
    }

    fn apply_repetition_penalty(&self, logits: &Tensor, history: &[i64], vocab: i64) -> Tensor {
        let seen: Vec<i64> = history
            .iter()
            .copied()
            .filter(|id| (0..vocab).contains(id))
            .collect();
        if self.repetition_penalty == 1.0 || seen.is_empty() {
            return logits.shallow_clone();
        }

        // Duplicate ids read the original score, so each is penalized once.
        let index = Tensor::from_slice(&seen).to_device(logits.device());
        let score = logits.gather(0, &index, false);
        let penalized = (&score * self.repetition_penalty)
            .where_self(&score.lt(0.0), &(&score / self.repetition_penalty));
        logits.scatter(0, &index, &penalized)
    }
}
