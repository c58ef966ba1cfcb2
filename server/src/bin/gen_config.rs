use clap::{App, Arg};
use crucibled::config::ServerConfig;
use serdeconv;

fn main() {
    let matches = App::new("Config Generator")
        .version("1.0")
        .author("Bush Hammer Industries")
        .about("Generates a default server configuration file.")
        .arg(
            Arg::with_name("CONFIG_FILE")
                .help("Path to the config file")
                .required(true),
        )
        .get_matches();

    let config_file_path = matches.value_of("CONFIG_FILE").unwrap();

    serdeconv::to_toml_file(&ServerConfig::default(), config_file_path)
        .expect("Config serialization failed");
}
