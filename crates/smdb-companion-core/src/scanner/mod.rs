pub mod walk;

pub use walk::{collect_audio_files, is_audio_file, AUDIO_EXTENSIONS};
