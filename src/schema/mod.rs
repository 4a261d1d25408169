pub mod definition;
pub mod export;
pub mod initializer;
pub mod migration;

pub use definition::{ColumnDefinition, ManagedTable, MANAGED_TABLES, USERS_TABLE};
pub use export::{ExportSnapshot, Exporter, RowRecord};
pub use initializer::{InitResult, TableInitializer, TableMismatch};
pub use migration::{MigrationResult, Migrator};
