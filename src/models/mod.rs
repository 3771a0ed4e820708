//! Data carried through a single upload.
//!
//! Nothing here is persisted by this service: an `UploadRequest` lives for one
//! HTTP request, an `ObjectDescriptor` until the storage call returns, and a
//! `StoredObject` is whatever the storage backend reports back.

pub mod object;
pub mod upload;
