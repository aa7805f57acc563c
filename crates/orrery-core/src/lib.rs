pub mod config;
pub mod consts;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod process;
pub mod queue;
pub mod store;
pub mod timelapse;
pub mod workspace;
