pub mod density;
pub mod frame_extractor;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
