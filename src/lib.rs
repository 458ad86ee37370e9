//! Near-duplicate image detection and culling.
//!
//! The detection side is a funnel: [`discovery`] walks a directory tree for
//! image files, [`prefilter`] buckets them by identical perceptual hash,
//! [`refine`] scores each bucket pairwise with embedding cosine similarity,
//! and [`cluster`] merges the resulting edges into duplicate groups with a
//! union-find. [`pipeline::DetectionPipeline`] orchestrates the stages on a
//! blocking worker, streaming groups to the consumer as they form and
//! supporting cooperative cancellation.
//!
//! The resolution side, [`resolve::ResolutionController`], tracks emitted
//! groups and applies keep-one / delete-all / skip decisions, optionally
//! fully automatically.

pub mod cluster;
pub mod discovery;
pub mod disjoint_set;
pub mod embedding;
pub mod pipeline;
pub mod prefilter;
pub mod refine;
pub mod resolve;

pub use cluster::cluster_edges;
pub use discovery::{discover_images, DiscoveryError, DiscoveryOptions, IMAGE_EXTENSIONS};
pub use disjoint_set::DisjointSet;
pub use embedding::{
    cosine_similarity, EmbeddingVector, EncodeError, ImageEncoder, PixelGridEncoder,
};
pub use pipeline::{
    DetectionPipeline, DetectorConfig, PipelineError, PipelineEvent, PipelinePhase,
    DEFAULT_THRESHOLD,
};
pub use prefilter::{perceptual_hasher, prefilter_by_hash};
pub use refine::{refine_bucket, SimilarityEdge, SimilarityMatrix};
pub use resolve::{
    DuplicateGroup, GroupId, GroupStatus, KeepFirst, KeepPolicy, Resolution,
    ResolutionController, ResolveError,
};
