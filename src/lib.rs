//! # Category Attributes
//!
//! Resolves the effective attribute definitions of a marketplace category by
//! walking its ancestor chain, merging inherited and global definitions with
//! the category's own, and memoizing the result in a tag-invalidated cache.
//! Store access runs on `may` coroutines over `may_postgres`.
//!
//! ```no_run
//! use category_attributes::{AppConfig, AttributeResolver, ResolveFlags};
//!
//! let config = AppConfig::load()?;
//! let resolver = AttributeResolver::connect(&config)?;
//! let set = resolver.resolve("laptops", ResolveFlags::default())?;
//! for attribute in &set.attributes {
//!     println!("{} ({})", attribute.attribute_key, attribute.attribute_type);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod ancestors;
pub mod cache;
pub mod cancel;
pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod fetch;
pub mod merge;
pub mod metrics;
pub mod model;
pub mod normalize;
pub mod resolver;
pub mod scope;
pub mod store;

pub use cache::{CacheKey, CacheRegion, CacheTag, NoCache, TagCache, Tagged};
pub use cancel::CancelToken;
pub use config::{AppConfig, DatabaseConfig, ResolverSettings};
pub use error::{ResolveError, StoreError};
pub use model::{
    AttributeDefinition, AttributeType, CategoryId, InheritScope, ResolveFlags,
    ResolvedAttributeSet,
};
pub use resolver::AttributeResolver;
pub use store::memory::{MemoryAttributeStore, MemoryCategoryStore};
pub use store::{AttributeQuery, AttributeRecord, AttributeStore, CategoryStore, Projection, StoredRow};
