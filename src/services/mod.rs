pub mod analysis;
pub mod backend;
pub mod coordinator;
pub mod direct_upload;
pub mod presigned_upload;
pub mod session;
pub mod transport;
pub mod worker;
