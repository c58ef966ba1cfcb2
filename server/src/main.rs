use clap::{App, Arg};
use crucible::net::endpoint::Endpoint;
use crucibled::config::ServerConfig;
use flint::logging;
use std::path::Path;

const SERVER_CFG_NAME: &str = "crucibled.toml";
const LOG_CFG_NAME: &str = "crucibled.log.toml";

pub fn main() {
    let matches = App::new("Crucible Server")
        .version("1.0")
        .author("Bush Hammer Industries")
        .about("Runs the crucible key-value server.")
        .arg(Arg::with_name("CONFIG_FILE").help("Path to the config file"))
        .get_matches();

    let config_path = matches.value_of("CONFIG_FILE").unwrap_or(SERVER_CFG_NAME);

    let config = match Path::new(config_path).exists() {
        true => ServerConfig::load(config_path),
        false => ServerConfig::default(),
    };

    // Initialize logging from the deployed config, falling back to a plain
    // terminal logger.
    let logger = match Path::new(LOG_CFG_NAME).exists() {
        true => logging::from_toml_file(LOG_CFG_NAME),
        false => logging::init(),
    };

    let address = config.address();

    logging::info!(
        logger,
        "starting key-value server";
        "address" => &address,
        "max_clients" => config.server.max_clients
    );

    let mut endpoint = Endpoint::new(&address, config.server.max_clients as usize, &logger)
        .expect("Error binding server endpoint");

    endpoint.run();
}
