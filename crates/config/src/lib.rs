//! Configuration: schema, file discovery, env substitution and overlay.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{discover_and_load, load_config, overlay_env, set_config_dir},
    schema::WaygateConfig,
};
