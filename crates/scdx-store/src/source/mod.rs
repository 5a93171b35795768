//! Row sources
//!
//! A [`RowSource`] produces the raw batch for one run. Rows keep the order
//! they were read in; that order breaks ties between rows sharing a key and
//! timestamp.

mod json_file;
mod sqlite_query;

pub use json_file::{parse_json_rows, JsonFileSource};
pub use sqlite_query::{read_query_rows, SqliteQuerySource};

use scdx_core::RawRow;

use crate::errors::Result;

/// Anything that can produce one raw batch
pub trait RowSource {
    /// Short description used in logs
    fn describe(&self) -> String;

    /// Read the whole batch
    ///
    /// # Errors
    ///
    /// Returns `Io`/`Persistence` when the source cannot be read and
    /// `Validation` when its content is not a list of row objects.
    fn read(&self) -> Result<Vec<RawRow>>;
}
