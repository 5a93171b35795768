//! Domain models for SCD Type-2 historization
//!
//! - [`RawRow`]: one incoming row, as read from a source
//! - [`NormalizedRecord`]: the single current representation of a natural key
//! - [`HistorizedRecord`]: one validity interval of a natural key

pub mod historized;
pub mod record;
pub mod timestamp;

pub use historized::{scd_id, HistorizedRecord};
pub use record::{render_key, Attributes, NormalizedRecord, RawRow};
pub use timestamp::{parse_timestamp, truncate_micros};
