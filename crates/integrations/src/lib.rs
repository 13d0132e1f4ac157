//! Integration flow resources: REST client, paginated enumeration, bulk export/import
//! and the override engine used to promote definitions between environments.

/// REST client for integrations, auth configs and connections.
pub mod client;
/// Definition document model.
pub mod definition;
/// Cursor-paginated enumeration.
pub mod enumerate;
/// Versioned file naming.
pub mod naming;
/// Override extraction and merge.
pub mod overrides;
/// Bulk export and import.
pub mod pipeline;
/// Resource descriptors and transfer jobs.
pub mod resource;

#[cfg(test)]
mod testing;
