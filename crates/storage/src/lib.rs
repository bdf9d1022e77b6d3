pub mod conformance;
mod csv_store;
mod error;
mod memory;
mod record;
mod schema;
mod traits;

pub use csv_store::{CsvRecordStore, UpgradeReport};
pub use error::StoreError;
pub use memory::MemoryRecordStore;
pub use record::{round_to, truncate_details, Record, ServerInfo, Status};
pub use schema::{
    format_timestamp, parse_timestamp, SchemaVersion, CURRENT_COLUMNS, LEGACY_COLUMNS,
};
pub use traits::{RecordStore, Records, StoreStats};
