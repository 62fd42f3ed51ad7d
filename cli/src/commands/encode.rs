use crate::helper::{self, HexSlice};
use crate::CLIError;
use mesh_transport::access::Opcode;
use mesh_transport::mesh::AppKeyIndex;
use mesh_transport::models::generic::OnOffMessage;
use mesh_transport::models::generic_access::GenericAccessMessage;
use mesh_transport::models::{MeshMessage, MessageKey, ModelMessage};
use mesh_transport::stack::registry::NodeRegistry;
use mesh_transport::stack::transport::MeshTransport;
use mesh_transport::stack::{SendError, TransportConfig};
use std::str::FromStr;

fn app_index_arg() -> clap::Arg<'static, 'static> {
    clap::Arg::with_name("app_index")
        .short("a")
        .long("app_index")
        .value_name("INDEX")
        .default_value("0")
        .help("appkey index to encrypt with")
        .validator(helper::is_u16_validator)
}
fn dst_arg() -> clap::Arg<'static, 'static> {
    clap::Arg::with_name("dst")
        .help("destination address in hex")
        .required(true)
        .value_name("DST")
        .validator(helper::is_address_validator)
}

pub fn sub_command() -> clap::App<'static, 'static> {
    clap::SubCommand::with_name("encode")
        .about("Encrypt a message from the network's provisioner into network PDUs")
        .subcommand(
            clap::SubCommand::with_name("onoff")
                .about("Generic OnOff Set")
                .arg(dst_arg())
                .arg(
                    clap::Arg::with_name("on")
                        .required(true)
                        .value_name("ON")
                        .validator(helper::is_bool_validator),
                )
                .arg(
                    clap::Arg::with_name("unacknowledged")
                        .short("u")
                        .long("unacknowledged")
                        .takes_value(false),
                )
                .arg(
                    clap::Arg::with_name("tid")
                        .short("t")
                        .long("tid")
                        .value_name("TID")
                        .help("transaction identifier, defaults to the low byte of the sequence number"),
                )
                .arg(app_index_arg()),
        )
        .subcommand(
            clap::SubCommand::with_name("raw")
                .about("Any access message")
                .arg(dst_arg())
                .arg(
                    clap::Arg::with_name("opcode")
                        .help("1, 2 or 3 opcode bytes in hex")
                        .required(true)
                        .value_name("OPCODE_HEX")
                        .validator(helper::is_hex_validator),
                )
                .arg(
                    clap::Arg::with_name("parameters")
                        .value_name("PARAMETERS_HEX")
                        .default_value("")
                        .validator(helper::is_hex_validator),
                )
                .arg(
                    clap::Arg::with_name("device")
                        .short("d")
                        .long("device")
                        .help("encrypt with the destination's device key")
                        .takes_value(false),
                )
                .arg(app_index_arg()),
        )
}

fn app_index(matches: &clap::ArgMatches) -> AppKeyIndex {
    AppKeyIndex(
        matches
            .value_of("app_index")
            .expect("has default")
            .parse()
            .expect("validated by clap"),
    )
}
fn bad_value(message: String) -> CLIError {
    CLIError::Clap(clap::Error::with_description(
        &message,
        clap::ErrorKind::InvalidValue,
    ))
}

pub fn encode_matches(
    logger: &slog::Logger,
    network_path: &str,
    matches: &clap::ArgMatches,
) -> Result<(), CLIError> {
    let mut file = helper::load_network_file(network_path)?;
    let network = file.to_network()?;
    let src = helper::unicast(file.provisioner.address)?;
    let (dst, message) = match matches.subcommand() {
        ("onoff", Some(onoff_matches)) => {
            let on = bool::from_str(onoff_matches.value_of("on").expect("required by clap"))
                .expect("validated by clap");
            let on_off = if onoff_matches.is_present("unacknowledged") {
                OnOffMessage::set_unacknowledged(on)
            } else {
                OnOffMessage::set(on)
            };
            let tid = match onoff_matches.value_of("tid") {
                Some(tid) => u8::from_str(tid).map_err(|_| bad_value(format!("'{}' is not a TID", tid)))?,
                None => network
                    .provisioner(src)
                    .map_or(0, |p| (p.sequence_number() & 0xFF) as u8),
            };
            let mut message =
                MeshMessage::generic(app_index(onoff_matches), ModelMessage::OnOff(on_off));
            message.fill_tid(tid);
            (helper::address_arg(onoff_matches, "dst"), message)
        }
        ("raw", Some(raw_matches)) => {
            let opcode_bytes = helper::hex_to_bytes(raw_matches.value_of("opcode").expect("required by clap"))
                .expect("validated by clap");
            let opcode = Opcode::unpack_from(&opcode_bytes)
                .ok()
                .filter(|o| o.byte_len() == opcode_bytes.len())
                .ok_or_else(|| bad_value("invalid opcode".to_owned()))?;
            let parameters = helper::hex_to_bytes(raw_matches.value_of("parameters").expect("has default"))
                .expect("validated by clap");
            let key = if raw_matches.is_present("device") {
                MessageKey::Device
            } else {
                MessageKey::Application(app_index(raw_matches))
            };
            let message =
                GenericAccessMessage::new(opcode, parameters, key).map_err(SendError::from)?;
            (
                helper::address_arg(raw_matches, "dst"),
                MeshMessage::GenericAccess(message),
            )
        }
        _ => {
            error!(logger, "no_encode_subcommand");
            return Ok(());
        }
    };
    let transport = MeshTransport::new(logger, TransportConfig::default());
    let built = transport.create_message_for(&network, src, dst, &message)?;
    debug!(logger, "encoded"; "dst" => %dst, "seq" => built.seq().value(), "pdus" => built.network_pdus().len());
    for pdu in built.outgoing() {
        println!("{:x}", HexSlice(&pdu.pdu));
    }
    file.update_from(&network)?;
    helper::write_network_file(network_path, &file)
}
