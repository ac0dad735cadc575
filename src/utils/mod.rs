pub mod devlog;
pub mod docpath;
pub mod paths;
