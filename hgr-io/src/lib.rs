//! Readers and writers for the file formats around hypergraph
//! partitioning: the hMetis-like `.hgr` hypergraph format and plain-text
//! partition files.

pub mod hmetis;
pub mod partition;
