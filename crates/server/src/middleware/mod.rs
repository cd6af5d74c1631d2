pub mod logging_configuration;
pub mod request_context;
pub mod request_logging;
