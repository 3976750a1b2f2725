use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod schema;
pub mod songplays;
pub mod timestamp;
