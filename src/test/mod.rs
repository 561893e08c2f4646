pub mod utils;

mod api;
mod metadata;
mod sessions;
mod students;
