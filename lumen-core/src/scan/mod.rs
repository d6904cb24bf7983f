//! Index passes: walk, classify, hash, build and persist.

pub mod analyzer;
pub mod hashing;
pub mod ignore;
pub mod path_scanner;
pub mod pipeline;
pub mod processor;

pub use analyzer::{ChangeAnalyzer, HashResolution};
pub use hashing::{HashOutcome, HashingPool, hash_file};
pub use ignore::{
    IgnoreMatcher, IgnoreRule, IgnoreRuleSource, PatternType, RuleType,
    StaticIgnoreRules,
};
pub use path_scanner::DirectoryListing;
pub use pipeline::{IndexPipeline, PipelineParts};
pub use processor::{
    AssetProcessor, BuiltAsset, CodecProvider, FolderMapping, ImageCodec,
    ImageCrateCodecs, ImageProbe, ProcessOutcome,
};
