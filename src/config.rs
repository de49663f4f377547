pub mod cli;
pub mod tool_config;
