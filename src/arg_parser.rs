use std::path::PathBuf;

use argparse::{ArgumentParser, Print, Store, StoreOption, StoreTrue};

pub struct ArgsOptions {
    pub curve_file_path: PathBuf,
    pub config_file_path: Option<PathBuf>,
    pub verbose: bool,
}

impl ArgsOptions {
    pub fn parse() -> Self {
        let mut options = ArgsOptions::default();

        {
            let mut parser = ArgumentParser::new();
            parser.set_description(
                "Drive the fan controllers from the CPU temperature using a fan curve",
            );

            // Fan curve path
            parser.refer(&mut options.curve_file_path).add_option(
                &["-c", "--curve"],
                Store,
                "The CSV file holding the temperature,duty fan curve",
            );

            // Configuration file path
            parser.refer(&mut options.config_file_path).add_option(
                &["--config"],
                StoreOption,
                "The Json configuration file of the daemon",
            );

            parser.refer(&mut options.verbose).add_option(
                &["-v", "--verbose"],
                StoreTrue,
                "Log debug messages",
            );

            // Show daemon version
            parser.add_option(
                &["-V", "--version"],
                Print(env!("CARGO_PKG_VERSION").to_string()),
                "Show the daemon version",
            );

            parser.parse_args_or_exit();
        }

        options
    }
}

impl Default for ArgsOptions {
    fn default() -> Self {
        Self {
            curve_file_path: PathBuf::from("fan_curve.csv"),
            config_file_path: None,
            verbose: false,
        }
    }
}
