use crate::cluster::cluster_edges;
use crate::discovery::{discover_images, DiscoveryError, DiscoveryOptions};
use crate::embedding::{EncodeError, ImageEncoder, PixelGridEncoder};
use crate::prefilter::prefilter_by_hash;
use crate::refine::refine_bucket;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;

/// Similarity at or above which two images in the same bucket count as
/// duplicates.
pub const DEFAULT_THRESHOLD: f32 = 0.98;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("embedding failed: {0}")]
    Encode(#[from] EncodeError),
}

/// Events streamed from the detection worker to its single consumer.
///
/// `Done` is emitted exactly once per run, after everything else, on every
/// outcome including cancellation and failure. A consumer may block on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PipelineEvent {
    /// Human-readable progress narration at phase boundaries.
    Status(String),
    /// One fully-formed duplicate cluster, always two or more paths.
    DuplicateGroup(Vec<PathBuf>),
    /// Terminal signal.
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelinePhase {
    Idle,
    Discovering,
    Hashing,
    Refining,
    Completed,
    Cancelled,
    Failed,
}

#[derive(Clone)]
pub struct DetectorConfig {
    pub threshold: f32,
    pub discovery: DiscoveryOptions,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            discovery: DiscoveryOptions::default(),
        }
    }
}

/// Drives discovery → hash prefilter → per-bucket refinement and clustering,
/// streaming results incrementally.
///
/// The run is blocking and intended for a dedicated worker (see [`spawn`]);
/// the consumer stays responsive on its own task. Groups are emitted as soon
/// as their bucket is clustered — a bucket's groups form an atomic batch, but
/// the consumer never waits for later buckets. Cancellation is cooperative:
/// the flag is polled between buckets and inside the decode and scoring
/// loops, and a cancelled run still delivers the terminal `Done`.
///
/// [`spawn`]: DetectionPipeline::spawn
pub struct DetectionPipeline {
    config: DetectorConfig,
    encoder: Arc<dyn ImageEncoder>,
    cancel: Arc<AtomicBool>,
    phase: Mutex<PipelinePhase>,
}

impl DetectionPipeline {
    pub fn new(config: DetectorConfig) -> Self {
        Self::with_encoder(config, Arc::new(PixelGridEncoder::default()))
    }

    pub fn with_encoder(config: DetectorConfig, encoder: Arc<dyn ImageEncoder>) -> Self {
        Self {
            config,
            encoder,
            cancel: Arc::new(AtomicBool::new(false)),
            phase: Mutex::new(PipelinePhase::Idle),
        }
    }

    pub fn cancellation_token(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Requests cooperative cancellation; the worker stops at its next
    /// checkpoint.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn phase(&self) -> PipelinePhase {
        *self.phase.lock().unwrap()
    }

    fn enter(&self, phase: PipelinePhase) {
        *self.phase.lock().unwrap() = phase;
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Runs the pipeline to completion on the current thread, emitting events
    /// on `events`. Always ends by emitting `Done` and returns the terminal
    /// phase.
    pub fn run(&self, root: &Path, events: &mpsc::UnboundedSender<PipelineEvent>) -> PipelinePhase {
        let terminal = match self.run_inner(root, events) {
            Ok(phase) => phase,
            Err(err) => {
                log::error!("detection failed: {err}");
                let _ = events.send(PipelineEvent::Status(format!("error during detection: {err}")));
                PipelinePhase::Failed
            }
        };
        self.enter(terminal);
        let _ = events.send(PipelineEvent::Done);
        terminal
    }

    /// Runs on a blocking worker task; returns the event receiver and a
    /// handle resolving to the terminal phase.
    pub fn spawn(
        self: Arc<Self>,
        root: PathBuf,
    ) -> (
        mpsc::UnboundedReceiver<PipelineEvent>,
        tokio::task::JoinHandle<PipelinePhase>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::task::spawn_blocking(move || self.run(&root, &tx));
        (rx, handle)
    }

    fn run_inner(
        &self,
        root: &Path,
        events: &mpsc::UnboundedSender<PipelineEvent>,
    ) -> Result<PipelinePhase, PipelineError> {
        let send_status = |text: String| {
            let _ = events.send(PipelineEvent::Status(text));
        };

        self.enter(PipelinePhase::Discovering);
        send_status(format!("discovering image files under {}", root.display()));
        let paths = discover_images(root, &self.config.discovery)?;
        if self.is_cancelled() {
            return Ok(PipelinePhase::Cancelled);
        }
        if paths.is_empty() {
            send_status("no image files found".to_string());
            return Ok(PipelinePhase::Completed);
        }
        send_status(format!("found {} image files", paths.len()));

        self.enter(PipelinePhase::Hashing);
        send_status("computing perceptual hashes".to_string());
        let buckets = prefilter_by_hash(&paths, &self.cancel);
        if self.is_cancelled() {
            return Ok(PipelinePhase::Cancelled);
        }
        if buckets.is_empty() {
            send_status("no candidate duplicates after pre-filtering".to_string());
            return Ok(PipelinePhase::Completed);
        }
        send_status(format!(
            "pre-filtered into {} candidate groups",
            buckets.len()
        ));

        self.enter(PipelinePhase::Refining);
        send_status("computing embeddings and pairwise similarity".to_string());
        let mut groups_emitted = 0usize;
        for bucket in buckets.values() {
            if self.is_cancelled() {
                return Ok(PipelinePhase::Cancelled);
            }
            let edges = refine_bucket(bucket, &*self.encoder, self.config.threshold, &self.cancel)?;
            if self.is_cancelled() {
                return Ok(PipelinePhase::Cancelled);
            }
            // All edges of this bucket are in hand; its groups go out as one
            // batch, each as soon as it is formed.
            for group in cluster_edges(&edges) {
                let _ = events.send(PipelineEvent::DuplicateGroup(group));
                groups_emitted += 1;
            }
        }

        if self.is_cancelled() {
            return Ok(PipelinePhase::Cancelled);
        }
        send_status(format!("identified {groups_emitted} duplicate groups"));
        Ok(PipelinePhase::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingVector;
    use image::{ImageBuffer, Rgb};
    use std::path::Path;
    use tempfile::TempDir;

    fn write_pattern_image(path: &Path, step_x: u32, step_y: u32) {
        let img = ImageBuffer::from_fn(64, 64, |x, y| {
            let v = ((x * step_x + y * step_y) % 256) as u8;
            Rgb([v, v, v])
        });
        img.save(path).unwrap();
    }

    fn checkerboard_image(path: &Path, cell: u32) {
        let img = ImageBuffer::from_fn(64, 64, |x, y| {
            let on = ((x / cell) + (y / cell)) % 2 == 0;
            let v: u8 = if on { 255 } else { 0 };
            Rgb([v, v, v])
        });
        img.save(path).unwrap();
    }

    async fn collect_events(
        pipeline: Arc<DetectionPipeline>,
        root: PathBuf,
    ) -> (Vec<PipelineEvent>, PipelinePhase) {
        let (mut rx, handle) = pipeline.spawn(root);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        let phase = handle.await.unwrap();
        (events, phase)
    }

    fn groups(events: &[PipelineEvent]) -> Vec<Vec<PathBuf>> {
        events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::DuplicateGroup(paths) => Some(paths.clone()),
                _ => None,
            })
            .collect()
    }

    fn done_count(events: &[PipelineEvent]) -> usize {
        events.iter().filter(|e| **e == PipelineEvent::Done).count()
    }

    #[tokio::test]
    async fn empty_directory_completes_with_no_groups() {
        let temp_dir = TempDir::new().unwrap();
        let pipeline = Arc::new(DetectionPipeline::new(DetectorConfig::default()));
        let (events, phase) =
            collect_events(pipeline, temp_dir.path().to_path_buf()).await;

        assert_eq!(phase, PipelinePhase::Completed);
        assert!(groups(&events).is_empty());
        assert_eq!(done_count(&events), 1);
        assert_eq!(events.last(), Some(&PipelineEvent::Done));
    }

    #[tokio::test]
    async fn dissimilar_images_emit_no_groups() {
        // Scenario: five images, none visually similar.
        let temp_dir = TempDir::new().unwrap();
        write_pattern_image(&temp_dir.path().join("h.png"), 4, 0);
        write_pattern_image(&temp_dir.path().join("v.png"), 0, 4);
        write_pattern_image(&temp_dir.path().join("d.png"), 8, 8);
        checkerboard_image(&temp_dir.path().join("c8.png"), 8);
        checkerboard_image(&temp_dir.path().join("c16.png"), 16);

        let pipeline = Arc::new(DetectionPipeline::new(DetectorConfig::default()));
        let (events, phase) =
            collect_events(pipeline, temp_dir.path().to_path_buf()).await;

        assert_eq!(phase, PipelinePhase::Completed);
        assert!(groups(&events).is_empty());
        assert_eq!(done_count(&events), 1);
    }

    #[tokio::test]
    async fn near_identical_pair_forms_exactly_one_group() {
        // Scenario: A and B identical, C unrelated. C must not appear in any
        // event.
        let temp_dir = TempDir::new().unwrap();
        let a = temp_dir.path().join("a.png");
        let b = temp_dir.path().join("b.png");
        let c = temp_dir.path().join("c.png");
        write_pattern_image(&a, 4, 0);
        write_pattern_image(&b, 4, 0);
        checkerboard_image(&c, 8);

        let pipeline = Arc::new(DetectionPipeline::new(DetectorConfig::default()));
        let (events, phase) =
            collect_events(pipeline, temp_dir.path().to_path_buf()).await;

        assert_eq!(phase, PipelinePhase::Completed);
        let found = groups(&events);
        assert_eq!(found.len(), 1);
        let mut members = found[0].clone();
        members.sort();
        assert_eq!(members, vec![a, b]);
        assert!(!found.iter().flatten().any(|p| *p == c));
        assert_eq!(done_count(&events), 1);
    }

    #[tokio::test]
    async fn transitive_similarity_merges_into_one_group() {
        // Scenario: three hash-identical files, but only adjacent pairs clear
        // the similarity threshold. The stub encoder pins down the scores.
        struct FanEncoder;
        impl ImageEncoder for FanEncoder {
            fn encode_batch(
                &self,
                images: &[image::DynamicImage],
            ) -> Result<Vec<EmbeddingVector>, EncodeError> {
                let t = 0.985_f32.acos();
                Ok((0..images.len())
                    .map(|i| {
                        let angle = t * i as f32;
                        vec![angle.cos(), angle.sin()]
                    })
                    .collect())
            }
        }

        let temp_dir = TempDir::new().unwrap();
        let paths: Vec<PathBuf> = ["a.png", "b.png", "c.png"]
            .iter()
            .map(|name| {
                let p = temp_dir.path().join(name);
                write_pattern_image(&p, 4, 0);
                p
            })
            .collect();

        let pipeline = Arc::new(DetectionPipeline::with_encoder(
            DetectorConfig::default(),
            Arc::new(FanEncoder),
        ));
        let (events, phase) =
            collect_events(pipeline, temp_dir.path().to_path_buf()).await;

        assert_eq!(phase, PipelinePhase::Completed);
        let found = groups(&events);
        assert_eq!(found.len(), 1);
        let mut members = found[0].clone();
        members.sort();
        assert_eq!(members, paths);
    }

    #[tokio::test]
    async fn cancelled_run_emits_done_and_no_groups() {
        let temp_dir = TempDir::new().unwrap();
        let a = temp_dir.path().join("a.png");
        let b = temp_dir.path().join("b.png");
        write_pattern_image(&a, 4, 0);
        write_pattern_image(&b, 4, 0);

        let pipeline = Arc::new(DetectionPipeline::new(DetectorConfig::default()));
        pipeline.cancel();
        let (events, phase) =
            collect_events(pipeline.clone(), temp_dir.path().to_path_buf()).await;

        assert_eq!(phase, PipelinePhase::Cancelled);
        assert_eq!(pipeline.phase(), PipelinePhase::Cancelled);
        assert!(groups(&events).is_empty());
        assert_eq!(done_count(&events), 1);
        assert_eq!(events.last(), Some(&PipelineEvent::Done));
    }

    #[tokio::test]
    async fn encoder_failure_fails_the_run_but_still_signals_done() {
        struct BrokenEncoder;
        impl ImageEncoder for BrokenEncoder {
            fn encode_batch(
                &self,
                _images: &[image::DynamicImage],
            ) -> Result<Vec<EmbeddingVector>, EncodeError> {
                Err(EncodeError::Backend("model unavailable".to_string()))
            }
        }

        let temp_dir = TempDir::new().unwrap();
        write_pattern_image(&temp_dir.path().join("a.png"), 4, 0);
        write_pattern_image(&temp_dir.path().join("b.png"), 4, 0);

        let pipeline = Arc::new(DetectionPipeline::with_encoder(
            DetectorConfig::default(),
            Arc::new(BrokenEncoder),
        ));
        let (events, phase) =
            collect_events(pipeline, temp_dir.path().to_path_buf()).await;

        assert_eq!(phase, PipelinePhase::Failed);
        assert!(groups(&events).is_empty());
        assert_eq!(done_count(&events), 1);
        assert!(events.iter().any(|e| matches!(
            e,
            PipelineEvent::Status(text) if text.contains("error during detection")
        )));
        assert_eq!(events.last(), Some(&PipelineEvent::Done));
    }

    #[tokio::test]
    async fn status_narration_covers_every_phase() {
        let temp_dir = TempDir::new().unwrap();
        write_pattern_image(&temp_dir.path().join("a.png"), 4, 0);
        write_pattern_image(&temp_dir.path().join("b.png"), 4, 0);

        let pipeline = Arc::new(DetectionPipeline::new(DetectorConfig::default()));
        let (events, _) = collect_events(pipeline, temp_dir.path().to_path_buf()).await;

        let statuses: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::Status(text) => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert!(statuses.iter().any(|s| s.contains("discovering")));
        assert!(statuses.iter().any(|s| s.contains("perceptual hashes")));
        assert!(statuses.iter().any(|s| s.contains("identified")));
    }
}
