use slog::Drain;
#[macro_use]
extern crate slog;

use mesh_transport::stack::{RecvError, SendError};
use std::convert::TryFrom;

pub mod commands;
pub mod helper;
pub enum CLIError {
    IOError(String, std::io::Error),
    Clap(clap::Error),
    SerdeJSON(serde_json::Error),
    Send(SendError),
    Recv(RecvError),
    OtherMessage(String),
}
impl From<SendError> for CLIError {
    fn from(e: SendError) -> Self {
        CLIError::Send(e)
    }
}
impl From<RecvError> for CLIError {
    fn from(e: RecvError) -> Self {
        CLIError::Recv(e)
    }
}

fn main() {
    let app = clap::App::new("Bluetooth Mesh transport CLI")
        .version(clap::crate_version!())
        .about("Encode, decode and inspect Bluetooth Mesh network PDUs")
        .arg(
            clap::Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .multiple(true)
                .max_values(5)
                .help("Set the amount of logging from level 0 up to level 5"),
        )
        .arg(
            clap::Arg::with_name("network")
                .short("n")
                .long("network")
                .value_name("FILE")
                .help("Specifies the network .json file"),
        )
        .subcommand(commands::crypto::sub_command())
        .subcommand(commands::encode::sub_command())
        .subcommand(commands::decode::sub_command());
    let matches = app.get_matches();

    let log_level = slog::Level::from_usize(
        1 + usize::try_from(matches.occurrences_of("verbose"))
            .expect("verbose usize overflow (how??)"),
    )
    .expect("verbose limit set too low");
    let drain = slog_term::PlainSyncDecorator::new(std::io::stderr());
    let drain = slog_term::FullFormat::new(drain)
        .build()
        .filter_level(log_level)
        .fuse();
    let root = slog::Logger::root(drain, o!());
    trace!(root, "main");
    let sub_cmd = matches.subcommand().0;
    let get_network_path = || -> &str {
        match matches.value_of("network") {
            Some(path) => path,
            None => clap::Error::with_description(
                "missing 'network.json` path",
                clap::ErrorKind::ArgumentNotFound,
            )
            .exit(),
        }
    };
    debug!(root, "arg_match"; "sub_command" => sub_cmd);
    if let Err(e) = (|| -> Result<(), CLIError> {
        match matches.subcommand() {
            ("", None) => error!(root, "no command given"),
            ("crypto", Some(crypto_matches)) => {
                commands::crypto::crypto_matches(&root, crypto_matches)?
            }
            ("encode", Some(encode_matches)) => {
                commands::encode::encode_matches(&root, get_network_path(), encode_matches)?
            }
            ("decode", Some(decode_matches)) => {
                commands::decode::decode_matches(&root, get_network_path(), decode_matches)?
            }
            _ => unreachable!("unhandled sub_command"),
        }
        debug!(root, "matches_done");
        Ok(())
    })() {
        match e {
            CLIError::IOError(path, error) => {
                eprintln!("io error {:?} with path '{}'", error, path)
            }
            CLIError::Clap(error) => eprintln!("{}", &error.message),
            CLIError::SerdeJSON(error) => eprintln!("json error {}", error),
            CLIError::Send(error) => eprintln!("send error: {}", error),
            CLIError::Recv(error) => eprintln!("receive error: {}", error),
            CLIError::OtherMessage(msg) => eprintln!("error: {}", &msg),
        };
        std::process::exit(1);
    }
}
