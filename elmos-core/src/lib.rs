pub mod config;
pub mod error;

// Module discovery and metadata
pub mod info;
pub mod registry;

// make invocation and batch policy
pub mod build;

// Insmod/rmmod queue and its file format
pub mod queue;
pub mod queue_file;

// Dashboard
pub mod status;
