pub mod credentials;
pub mod storage_backend;
pub mod upload_events;
pub mod upload_service;
