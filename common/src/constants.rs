pub const MAX_FILE_NAME_LEN: usize = 1024;

pub const DATA_DIR_NAME: &str = "data";
pub const METADATA_DIR_NAME: &str = "metadata";
pub const TMP_DIR_NAME: &str = "tmp";

pub const METADATA_EXT: &str = "meta";

/// Hex characters of the name digest kept in a blob name.
pub const BLOB_NAME_DIGEST_LEN: usize = 16;

/// Set on writes forwarded by a peer's propagator; such writes are not propagated again.
pub const REPLICATED_FROM_HEADER: &str = "x-replicated-from";

pub const FILE_NAME_HEADER: &str = "x-file-name";
pub const SERVED_BY_HEADER: &str = "x-served-by";
