//! Inference: the linear forward pass blended with memory recall.
//!
//! Two recall policies exist and exactly one is active per engine:
//!
//! - [`RecallMode::Attention`] (default): every stored record is scored by
//!   negative L2 distance to the query over the first
//!   `d = min(output_size, E, input_len)` dimensions, the scores are
//!   softmaxed, and the attention-weighted recalled output is averaged 50/50
//!   with `ŷ = W x`. With an empty memory the result is exactly `ŷ`.
//!
//! - [`RecallMode::NearestNeighbors`]: the top `min(k, len)` records by
//!   positive cosine similarity over the first `min(input_len, E)`
//!   dimensions are averaged, weighted by similarity. This mode needs the
//!   memory index built by [`InferenceEngine::index_memory`] and fails
//!   otherwise. With no positive neighbour the result is `ŷ`.
//!
//! In both modes dimensions beyond the memory output width pass `ŷ`
//! through unchanged, and every successful [`InferenceEngine::infer`] writes
//! `(input, output)` back into the model's memory.
//!
//! [`InferenceEngine::explain`] reports the per-record weights behind an
//! answer and [`InferenceEngine::rank`] orders query rows by how closely
//! memory matches them.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MnemoError, Result};
use crate::linalg::{Metric, Similarity};
use crate::memory::{now_nanos, MemoryRecord};
use crate::model::Model;

/// Default neighbour count for [`RecallMode::NearestNeighbors`].
pub const DEFAULT_K: usize = 3;

/// Which recall policy an [`InferenceEngine`] uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RecallMode {
    /// Softmax attention over all stored records.
    #[default]
    Attention,
    /// Similarity-weighted average of the `k` closest records.
    NearestNeighbors { k: usize },
}

impl RecallMode {
    /// k-NN with the default neighbour count.
    pub const fn nearest() -> Self {
        RecallMode::NearestNeighbors { k: DEFAULT_K }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RecallMode::Attention => "attention",
            RecallMode::NearestNeighbors { .. } => "nearest_neighbors",
        }
    }
}

/// One stored record's share in an answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contribution {
    /// Position in memory, oldest first.
    pub position: usize,
    pub id: Option<String>,
    /// Similarity to the query under the active policy's metric.
    pub similarity: f32,
    /// Weight of this record's output in the recalled value. Weights sum to 1.
    pub weight: f32,
}

/// What an answer from [`InferenceEngine::predict`] was built from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Explanation {
    pub mode: RecallMode,
    /// The linear prediction `ŷ` before blending.
    pub forward: Vec<f32>,
    pub output: Vec<f32>,
    /// Records that shaped the answer, heaviest first. Empty when the
    /// answer is `ŷ` alone.
    pub contributions: Vec<Contribution>,
}

struct Hit<'a> {
    position: usize,
    record: &'a MemoryRecord,
    similarity: f32,
    weight: f32,
}

/// Stateless inference driver; all mutable state lives in the [`Model`].
#[derive(Debug, Clone, Copy, Default)]
pub struct InferenceEngine {
    mode: RecallMode,
}

impl InferenceEngine {
    /// A neighbour count of zero is raised to one.
    pub fn new(mode: RecallMode) -> Self {
        let mode = match mode {
            RecallMode::NearestNeighbors { k } => RecallMode::NearestNeighbors { k: k.max(1) },
            other => other,
        };
        Self { mode }
    }

    /// The active recall policy.
    pub fn mode(&self) -> RecallMode {
        self.mode
    }

    /// Build the unit-norm memory index that nearest-neighbour recall reads.
    ///
    /// Safe to call in attention mode too; the index is simply unused there.
    pub fn index_memory(&self, model: &mut Model) {
        model.memory_mut().build_index();
        debug!(
            model = model.id(),
            records = model.memory().len(),
            "memory index built"
        );
    }

    /// Blended prediction without touching memory.
    pub fn predict(&self, model: &Model, input: &[f32]) -> Result<Vec<f32>> {
        let y_hat = model.forward(input)?;
        let hits = self.recall(model, input)?;
        Ok(self.blend(model, y_hat, &hits))
    }

    /// Blended prediction, written back into the model's memory.
    ///
    /// The stored embedding is the input truncated to the memory's embedding
    /// width; the stored output is the result truncated to the memory's
    /// output width.
    pub fn infer(&self, model: &mut Model, input: &[f32]) -> Result<Vec<f32>> {
        let output = self.predict(model, input)?;

        let store = model.memory();
        let embedding = &input[..input.len().min(store.embed_width())];
        let recalled = &output[..store.output_width()];
        model
            .memory_mut()
            .add(embedding, recalled, now_nanos(), None)?;

        Ok(output)
    }

    /// Run [`infer`](Self::infer) on each row in order. Every row's write-back
    /// is visible to the rows after it.
    ///
    /// All rows are width-checked before the first one runs.
    pub fn infer_batch<I: AsRef<[f32]>>(&self, model: &mut Model, inputs: &[I]) -> Result<Vec<Vec<f32>>> {
        check_rows(model, inputs)?;
        inputs.iter().map(|x| self.infer(model, x.as_ref())).collect()
    }

    /// Best similarity between `input` and any stored record under the active
    /// policy's metric. `None` when memory is empty. Never mutates.
    pub fn score(&self, model: &Model, input: &[f32]) -> Result<Option<f32>> {
        if input.len() != model.input_size() {
            return Err(MnemoError::DimensionMismatch {
                expected: model.input_size(),
                got: input.len(),
            });
        }

        let store = model.memory();
        let best = match self.mode {
            RecallMode::Attention => {
                let d = attention_width(model, input);
                store
                    .iter()
                    .map(|r| Similarity::compute(&input[..d], &r.embedding()[..d], Metric::NegEuclidean))
                    .fold(None, max_option)
            }
            RecallMode::NearestNeighbors { .. } => {
                let d = input.len().min(store.embed_width());
                store
                    .iter()
                    .map(|r| Similarity::cosine(&input[..d], &r.embedding()[..d]))
                    .fold(None, max_option)
            }
        };
        Ok(best)
    }

    /// Row indices ordered by [`score`](Self::score), best match first.
    ///
    /// Ties keep input order; with an empty memory that is the whole order.
    pub fn rank<I: AsRef<[f32]>>(&self, model: &Model, inputs: &[I]) -> Result<Vec<usize>> {
        check_rows(model, inputs)?;
        let mut scored = Vec::with_capacity(inputs.len());
        for (i, x) in inputs.iter().enumerate() {
            let best = self.score(model, x.as_ref())?;
            scored.push((i, best.unwrap_or(f32::NEG_INFINITY)));
        }
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        Ok(scored.into_iter().map(|(i, _)| i).collect())
    }

    /// [`predict`](Self::predict) together with the records behind it.
    pub fn explain(&self, model: &Model, input: &[f32]) -> Result<Explanation> {
        let forward = model.forward(input)?;
        let hits = self.recall(model, input)?;
        let output = self.blend(model, forward.clone(), &hits);

        let mut contributions: Vec<Contribution> = hits
            .iter()
            .map(|h| Contribution {
                position: h.position,
                id: h.record.id().map(str::to_string),
                similarity: h.similarity,
                weight: h.weight,
            })
            .collect();
        contributions.sort_by(|a, b| b.weight.total_cmp(&a.weight));

        Ok(Explanation {
            mode: self.mode,
            forward,
            output,
            contributions,
        })
    }

    fn recall<'a>(&self, model: &'a Model, input: &[f32]) -> Result<Vec<Hit<'a>>> {
        match self.mode {
            RecallMode::Attention => Ok(attention(model, input)),
            RecallMode::NearestNeighbors { k } => nearest(model, input, k),
        }
    }

    /// Mix the recalled value into `ŷ` over the memory output width.
    fn blend(&self, model: &Model, mut y_hat: Vec<f32>, hits: &[Hit<'_>]) -> Vec<f32> {
        if hits.is_empty() {
            return y_hat;
        }

        let mut recalled = vec![0.0f32; model.memory().output_width()];
        for hit in hits {
            for (acc, &o) in recalled.iter_mut().zip(hit.record.output()) {
                *acc += hit.weight * o;
            }
        }

        for (y, r) in y_hat.iter_mut().zip(&recalled) {
            *y = match self.mode {
                RecallMode::Attention => 0.5 * *y + 0.5 * r,
                RecallMode::NearestNeighbors { .. } => *r,
            };
        }
        y_hat
    }
}

fn check_rows<I: AsRef<[f32]>>(model: &Model, inputs: &[I]) -> Result<()> {
    match inputs.iter().find(|x| x.as_ref().len() != model.input_size()) {
        Some(bad) => Err(MnemoError::DimensionMismatch {
            expected: model.input_size(),
            got: bad.as_ref().len(),
        }),
        None => Ok(()),
    }
}

fn max_option(acc: Option<f32>, s: f32) -> Option<f32> {
    Some(acc.map_or(s, |a| a.max(s)))
}

fn attention_width(model: &Model, input: &[f32]) -> usize {
    model
        .output_size()
        .min(model.memory().embed_width())
        .min(input.len())
}

fn attention<'a>(model: &'a Model, input: &[f32]) -> Vec<Hit<'a>> {
    let store = model.memory();
    if store.is_empty() {
        return Vec::new();
    }

    let d = attention_width(model, input);
    let scores: Vec<f32> = store
        .iter()
        .map(|r| Similarity::compute(&input[..d], &r.embedding()[..d], Metric::NegEuclidean))
        .collect();
    let attn = Similarity::softmax(&scores);

    store
        .iter()
        .zip(scores.into_iter().zip(attn))
        .enumerate()
        .map(|(position, (record, (similarity, weight)))| Hit {
            position,
            record,
            similarity,
            weight,
        })
        .collect()
}

fn nearest<'a>(model: &'a Model, input: &[f32], k: usize) -> Result<Vec<Hit<'a>>> {
    let store = model.memory();
    let indexed = store.indexed().ok_or_else(|| {
        MnemoError::InvalidArgument(
            "nearest-neighbour recall requires index_memory first".to_string(),
        )
    })?;

    // Over the full embedding width the unit index already holds the
    // record side of the cosine; over a prefix it has to be recomputed.
    let d = input.len().min(store.embed_width());
    let full_width = d == store.embed_width();
    let query = Similarity::normalized(&input[..d]);

    let mut hits: Vec<Hit<'a>> = indexed
        .enumerate()
        .map(|(position, (record, unit))| {
            let similarity = if full_width {
                Similarity::dot(&query, unit)
            } else {
                Similarity::cosine(&input[..d], &record.embedding()[..d])
            };
            Hit {
                position,
                record,
                similarity,
                weight: 0.0,
            }
        })
        .filter(|h| h.similarity > 0.0)
        .collect();

    hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    hits.truncate(k);

    let total: f32 = hits.iter().map(|h| h.similarity).sum();
    for hit in &mut hits {
        hit.weight = hit.similarity / total;
    }
    Ok(hits)
}
