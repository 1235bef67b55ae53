pub mod manifest;
pub mod network;
