//! Snapshot configuration files
//!
//! A project file lists every historized target:
//!
//! ```yaml
//! config_version: 1
//! snapshots:
//!   - target: dim_customers
//!     unique_key: id
//!     updated_at: updated_at
//!     tracked_columns: [name, tier]
//!     invalidate_hard_deletes: true
//!     checks:
//!       - test: not_null
//!         column: name
//! ```

mod parser;

pub use parser::{parse_config_file, parse_config_str, SnapshotProject, CONFIG_VERSION};
