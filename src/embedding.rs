use image::imageops::FilterType;
use image::DynamicImage;
use thiserror::Error;

/// Fixed-dimension semantic representation of one image.
pub type EmbeddingVector = Vec<f32>;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("cannot encode an empty batch")]
    EmptyBatch,

    #[error("encoder backend failed: {0}")]
    Backend(String),
}

/// Produces embedding vectors for a batch of decoded images.
///
/// Encoding is batched so a backend can amortize per-call overhead; callers
/// pass every image of a candidate group in one call. All vectors in one
/// batch share the same dimension.
pub trait ImageEncoder: Send + Sync {
    fn encode_batch(&self, images: &[DynamicImage]) -> Result<Vec<EmbeddingVector>, EncodeError>;
}

/// Default encoder: a downscaled, mean-centered luminance grid, L2-normalized.
///
/// Deterministic and model-free. It separates visually unrelated images well
/// and scores re-encoded or rescaled copies near 1.0, which is all the
/// refinement stage needs after the perceptual-hash prefilter. A learned
/// encoder can be substituted through the `ImageEncoder` trait.
pub struct PixelGridEncoder {
    grid: u32,
}

impl PixelGridEncoder {
    pub fn new(grid: u32) -> Self {
        Self { grid: grid.max(2) }
    }

    fn encode_one(&self, image: &DynamicImage) -> EmbeddingVector {
        let small = image
            .resize_exact(self.grid, self.grid, FilterType::Triangle)
            .to_luma8();
        let mut values: Vec<f32> = small.pixels().map(|p| p.0[0] as f32 / 255.0).collect();

        let mean = values.iter().sum::<f32>() / values.len() as f32;
        for v in values.iter_mut() {
            *v -= mean;
        }

        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 1e-6 {
            for v in values.iter_mut() {
                *v /= norm;
            }
        } else {
            // Uniform image; fall back to a fixed unit vector so cosine
            // similarity stays well defined.
            let uniform = 1.0 / (values.len() as f32).sqrt();
            for v in values.iter_mut() {
                *v = uniform;
            }
        }
        values
    }
}

impl Default for PixelGridEncoder {
    fn default() -> Self {
        Self::new(16)
    }
}

impl ImageEncoder for PixelGridEncoder {
    fn encode_batch(&self, images: &[DynamicImage]) -> Result<Vec<EmbeddingVector>, EncodeError> {
        if images.is_empty() {
            return Err(EncodeError::EmptyBatch);
        }
        Ok(images.iter().map(|img| self.encode_one(img)).collect())
    }
}

/// Cosine of the angle between two vectors, in [-1, 1]. Zero-length input
/// degenerates to 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
