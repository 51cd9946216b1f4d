//! Novel Core - configuration and reply segmentation shared by the engine
//! and the Telegram interface.
//!
//! - **config**: state paths and the environment-driven [`BotConfig`]
//! - **segmenter**: split raw assistant replies into deliverable [`Segment`]s
//!
//! [`Segment`]: novel_models::Segment

pub mod config;
pub mod segmenter;

pub use config::{
    assistant_id_file, cache_dir, config_dir, ensure_all_dirs, env_file, image_cache_dir,
    runtime_state_dir, sessions_dir, state_dir, BotConfig, ConfigError,
};
pub use segmenter::{plain_text, scene_number, segment};
