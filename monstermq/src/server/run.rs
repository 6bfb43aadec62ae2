// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

use clap::{Arg, ArgAction};
use std::path::Path;
use tokio::runtime::Runtime;

use super::ServerContext;
use crate::config::Config;
use crate::error::{Error, ErrorKind};
use crate::log::init_log;

pub const DEFAULT_CONFIG: &str = "/etc/monstermq/monstermq.toml";
const OPT_CONFIG: &str = "config";
const OPT_RELOAD: &str = "reload";
const OPT_STOP: &str = "stop";
const OPT_TEST: &str = "test";

/// Entry point of the server binary.
///
/// # Errors
///
/// Returns error if the config is invalid or the server fails to start.
pub fn run_server() -> Result<(), Error> {
    let matches = clap::Command::new("MonsterMQ")
        .version(env!("CARGO_PKG_VERSION"))
        .about("MQTT 3.1.1 / 5.0 broker with persistent sessions and archival")
        .arg(
            Arg::new(OPT_CONFIG)
                .short('c')
                .long(OPT_CONFIG)
                .value_name("config_file")
                .help("Specify config file path"),
        )
        .arg(
            Arg::new(OPT_RELOAD)
                .short('r')
                .long(OPT_RELOAD)
                .action(ArgAction::SetTrue)
                .help("Reload users and acl of a running broker"),
        )
        .arg(
            Arg::new(OPT_STOP)
                .short('s')
                .long(OPT_STOP)
                .action(ArgAction::SetTrue)
                .help("Stop a running broker"),
        )
        .arg(
            Arg::new(OPT_TEST)
                .short('t')
                .long(OPT_TEST)
                .action(ArgAction::SetTrue)
                .help("Test config file and exit"),
        )
        .get_matches();

    let config_file = match matches.get_one::<String>(OPT_CONFIG) {
        Some(config_file) => Some(config_file.as_str()),
        None if Path::new(DEFAULT_CONFIG).exists() => Some(DEFAULT_CONFIG),
        None => None,
    };

    let config = if let Some(config_file) = config_file {
        let config_content = std::fs::read_to_string(config_file)?;
        let config: Config = toml::from_str(&config_content).map_err(|err| {
            Error::from_string(ErrorKind::ConfigError, format!("Invalid config: {err}"))
        })?;

        config.validate()?;

        if matches.get_flag(OPT_TEST) {
            println!("The configuration file {config_file} syntax is Ok");
            return Ok(());
        }
        config
    } else {
        Config::default()
    };

    init_log(config.log())?;

    let mut server = ServerContext::new(config);

    if matches.get_flag(OPT_RELOAD) {
        return server.send_reload_signal();
    }
    if matches.get_flag(OPT_STOP) {
        return server.send_stop_signal();
    }

    let runtime = Runtime::new()?;
    server.run_loop(&runtime)
}

/// Run the server with a predefined config, used by integration tests.
///
/// # Errors
///
/// Returns error if the server fails to start.
pub fn run_server_with_config(config: Config) -> Result<(), Error> {
    init_log(config.log())?;
    let mut server = ServerContext::new(config);
    let runtime = Runtime::new()?;
    server.run_loop(&runtime)
}
