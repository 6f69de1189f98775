pub mod link;
pub mod version;
