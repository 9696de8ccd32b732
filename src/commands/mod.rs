pub mod playback;
pub mod reader;
pub mod settings;
