//! Lendbase DB - PostgreSQL Repository Protocol
//!
//! The database side of the Lendbase data-access layer:
//!
//! - `config`: connection pool and repository configuration
//! - `param`: typed SQL parameters for dynamic statements
//! - `translate`: structured predicates to parameterised SQL, with the
//!   descriptor whitelist as the trust boundary
//! - `record` / `patch`: the per-entity persistence contract and the
//!   explicit partial-update set
//! - `backend`: the abstract query executor port and its Postgres
//!   implementation
//! - `repo`: the cache-coherent repository protocol (read-through,
//!   write-invalidating, batch-coalescing, negative-caching)
//! - `view`: fixed-projection join views
//! - `entities`: the back-office entity specialisations
//!
//! No raw SQL crosses the crate boundary: callers supply structured
//! predicates and patches only.

pub mod backend;
pub mod config;
pub mod entities;
pub mod param;
pub mod patch;
pub mod record;
pub mod repo;
pub mod translate;
pub mod view;

pub use backend::{Backend, PgBackend};
pub use config::{DbConfig, RepoConfig};
pub use param::SqlParam;
pub use patch::Patch;
pub use record::Record;
pub use repo::{PageResult, Repository};
pub use view::{PgViews, ViewDef, ViewRecord};
