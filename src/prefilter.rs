use image::ImageReader;
use image_hasher::{HashAlg, Hasher, HasherConfig};
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

/// Builds the perceptual hasher used for coarse bucketing: a DCT-preprocessed
/// mean hash, robust to rescaling and re-encoding artifacts.
pub fn perceptual_hasher() -> Hasher {
    HasherConfig::new()
        .hash_alg(HashAlg::Mean)
        .preproc_dct()
        .to_hasher()
}

/// Hashes every path and buckets those sharing an identical hash.
///
/// This is the cheap O(n) pass: buckets with a single member carry no
/// duplicate risk and are dropped, bounding the expensive refinement to the
/// surviving buckets. Paths that fail to open or decode are logged and
/// excluded. Hashing runs in parallel; the cancellation flag is checked per
/// file, and remaining files are skipped once it is set.
///
/// Bucket keys are opaque; iteration order over the result is unspecified.
pub fn prefilter_by_hash(
    paths: &[PathBuf],
    cancel: &AtomicBool,
) -> HashMap<String, Vec<PathBuf>> {
    let hasher = perceptual_hasher();

    let hashed: Vec<(String, PathBuf)> = paths
        .par_iter()
        .filter_map(|path| {
            if cancel.load(Ordering::Relaxed) {
                return None;
            }
            let image = match ImageReader::open(path) {
                Ok(reader) => match reader.decode() {
                    Ok(image) => image,
                    Err(err) => {
                        log::warn!("could not decode {}: {err}", path.display());
                        return None;
                    }
                },
                Err(err) => {
                    log::warn!("could not open {}: {err}", path.display());
                    return None;
                }
            };
            let key = hasher.hash_image(&image).to_base64();
            Some((key, path.clone()))
        })
        .collect();

    // Sequential fold keeps within-bucket order equal to input order.
    let mut buckets: HashMap<String, Vec<PathBuf>> = HashMap::new();
    for (key, path) in hashed {
        buckets.entry(key).or_default().push(path);
    }
    buckets.retain(|_, members| members.len() >= 2);
    buckets
}
