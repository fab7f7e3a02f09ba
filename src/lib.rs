pub mod arg_parser;
pub mod config;
pub mod controller;
pub mod device;
pub mod devices_manager;
pub mod diagnostics;
pub mod errors;
pub mod fan_curve;
pub mod hwmon;
pub mod logger;
pub mod sensor;
