use crate::embedding::{cosine_similarity, EmbeddingVector, EncodeError, ImageEncoder};
use image::ImageReader;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

/// Dense symmetric pairwise cosine-similarity matrix over one batch.
pub struct SimilarityMatrix {
    n: usize,
    values: Vec<f32>,
}

impl SimilarityMatrix {
    /// Computes the full matrix for a batch of embeddings.
    pub fn from_embeddings(embeddings: &[EmbeddingVector]) -> Self {
        let n = embeddings.len();
        let mut values = vec![0.0; n * n];
        for i in 0..n {
            values[i * n + i] = 1.0;
            for j in (i + 1)..n {
                let sim = cosine_similarity(&embeddings[i], &embeddings[j]);
                values[i * n + j] = sim;
                values[j * n + i] = sim;
            }
        }
        Self { n, values }
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn get(&self, i: usize, j: usize) -> f32 {
        self.values[i * self.n + j]
    }
}

/// An unordered pair of paths whose similarity met the duplicate threshold.
/// Edges are scoped to the coarse bucket they were computed in.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityEdge {
    pub a: PathBuf,
    pub b: PathBuf,
    pub score: f32,
}

/// Refines one coarse bucket into similarity edges.
///
/// Re-opens every member; decode failures are logged and shrink the bucket.
/// If fewer than two members remain decodable the bucket contributes nothing.
/// The survivors are embedded in a single batched encode call, scored
/// pairwise, and every unordered pair at or above `threshold` becomes an
/// edge. The cancellation flag is polled between decodes and between scoring
/// rows; once set, an empty edge list is returned.
pub fn refine_bucket(
    paths: &[PathBuf],
    encoder: &dyn ImageEncoder,
    threshold: f32,
    cancel: &AtomicBool,
) -> Result<Vec<SimilarityEdge>, EncodeError> {
    let mut images = Vec::new();
    let mut decodable = Vec::new();
    for path in paths {
        if cancel.load(Ordering::Relaxed) {
            return Ok(Vec::new());
        }
        match ImageReader::open(path).map_err(image::ImageError::IoError).and_then(|r| r.decode()) {
            Ok(image) => {
                images.push(image);
                decodable.push(path.clone());
            }
            Err(err) => {
                log::warn!("could not open {} for embedding: {err}", path.display());
            }
        }
    }

    if images.len() < 2 {
        return Ok(Vec::new());
    }

    let embeddings = encoder.encode_batch(&images)?;
    drop(images);
    let matrix = SimilarityMatrix::from_embeddings(&embeddings);

    let mut edges = Vec::new();
    for i in 0..matrix.len() {
        if cancel.load(Ordering::Relaxed) {
            return Ok(Vec::new());
        }
        for j in (i + 1)..matrix.len() {
            let score = matrix.get(i, j);
            if score >= threshold {
                edges.push(SimilarityEdge {
                    a: decodable[i].clone(),
                    b: decodable[j].clone(),
                    score,
                });
            }
        }
    }
    Ok(edges)
}
