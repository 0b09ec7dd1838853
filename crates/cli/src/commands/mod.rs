pub mod config_cmd;
pub mod doctor;
pub mod orchestrate;
pub mod serve;
pub mod tools;
