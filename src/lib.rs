pub mod acta;
pub mod api;
pub mod attendance;
pub mod capabilities;
pub mod config;
pub mod grading;
pub mod guard;
pub mod ipc;
pub mod pagination;
pub mod section;
