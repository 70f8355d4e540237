pub mod config;
pub mod driver;
pub mod recognizer;
pub mod region;
pub mod stamp;
pub mod video_source;
pub mod writer;
