//! Provenance storage
//!
//! The engine persists record + signature pairs through the
//! [`ProvenanceRepository`] trait, so the storage backend can be swapped.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        ProvenanceRepository             │
//! │  (id-addressed pairs + LATEST pointer)  │
//! └──────────────┬──────────────────────────┘
//!                │
//!        ┌───────┴────────┐
//!        │                │
//! ┌──────▼───────┐  ┌─────▼──────┐
//! │FileRepository│  │InMemoryRepo│
//! │- one dir/id  │  │- tests     │
//! │- atomic swap │  │- embedding │
//! └──────────────┘  └────────────┘
//! ```

pub mod file;
pub mod memory;
pub mod traits;

pub use file::FileProvenanceRepository;
pub use memory::InMemoryProvenanceRepository;
pub use traits::{ProvenanceRepository, StoredProvenance};
