//! Template-driven photo/video import engine.
//!
//! A host application wires four pieces together: compile naming
//! templates ([`template`]), pick one per file ([`resolver`]), scan the
//! source directories into a proposed destination tree ([`scan`],
//! [`tree`]), let the user edit the tree, then copy or move everything
//! ([`transfer`]). All long-running operations report progress through
//! callbacks and honor a shared [`model::CancelToken`].

pub mod error;
pub mod metadata;
pub mod model;
pub mod path_norm;
pub mod resolver;
pub mod scan;
pub mod template;
pub mod transfer;
pub mod tree;

pub use error::AppError;
pub use metadata::{ExifMetadataProvider, KnownFileTypes, MetadataError, MetadataProvider};
pub use model::{
    insert_alias, AliasTable, CancelToken, ConflictPolicy, FileKind, FileMetadata, LogSeverity, ScanFilter,
    ScanProgress, ScanStatus, ScanWarning, SourceDir, TransferLogEntry, TransferMode,
    TransferProgress, TransferReport,
};
pub use resolver::TemplateResolver;
pub use scan::{destination_inside_sources, validate_sources, ScanResult, Scanner};
pub use template::{RenderedName, Template, TemplateError};
pub use transfer::{Filesystem, StdFilesystem, TransferRequest};
pub use tree::{FileTree, LeafData, NodeId, TreeError, TreeSummary};
