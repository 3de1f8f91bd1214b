//! Core abstractions shared by the migration components.
//!
//! - [`schema`]: column and primary key metadata
//! - [`value`]: the canonical row representation and the batch buffer
//! - [`stream`]: the forward-only row cursor
//! - [`traits`]: source and target collaborator traits

pub mod schema;
pub mod stream;
pub mod traits;
pub mod value;

pub use schema::{ColumnDescriptor, PrimaryKey, TableSchema};
pub use stream::{RowStream, ROW_CHANNEL_CAPACITY};
pub use traits::{SourceReader, TargetWriter};
pub use value::{Batch, Row, SqlValue};
