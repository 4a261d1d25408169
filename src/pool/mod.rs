//! Connection pool cache
//!
//! One administrative pool for catalog and DDL work, plus one pool per
//! tenant schema whose connections run with that schema on `search_path`.

mod manager;

pub use manager::{PoolManager, SchemaClient, SchemaPool};
