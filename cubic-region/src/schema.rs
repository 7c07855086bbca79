//! Names and versions that make up the on-disk layout of a region file.

/// Schema this engine writes.
pub const CURRENT_VERSION: i64 = 2;

/// Oldest schema that can still be migrated forward.
pub const OLDEST_READABLE_VERSION: i64 = 1;

pub const METADATA_TREE: &str = "metadata";
pub const CHUNKS_TREE: &str = "chunks";
pub const TOPOGRAPHY_TREE: &str = "topography";

pub const VERSION_KEY: &str = "version";
pub const MIMETYPE_KEY: &str = "mimetype";
pub const CREATED_AT_KEY: &str = "created_at";

pub const REGION_MIMETYPE: &str = "application/x-cubic-region";

/// Name of the header file inside a region directory.
pub const HEADER_FILE: &str = "region.header";
