// Canonical bucket model + versioned release catalog
//
// - buckets: the fixed (sex, age bracket) categories and their ordering
// - releases: how each published extract names the columns feeding them

pub mod buckets;
pub mod releases;

pub use buckets::{AgeBracket, Bucket, Sex};
pub use releases::{BucketAliases, IdentityColumns, ReleaseCatalog, ReleaseSchema};
