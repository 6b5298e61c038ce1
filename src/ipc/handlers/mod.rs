pub mod attendance;
pub mod cash;
pub mod core;
pub mod grades;
pub mod pagination;
pub mod sections;
