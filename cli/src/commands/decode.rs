use crate::helper::{self, HexSlice};
use crate::CLIError;
use mesh_transport::models::StatusMessage;
use mesh_transport::net::PduType;
use mesh_transport::stack::messages::Message;
use mesh_transport::stack::transport::{MeshTransport, ParsedPdu};
use mesh_transport::stack::TransportConfig;

pub fn sub_command() -> clap::App<'static, 'static> {
    clap::SubCommand::with_name("decode")
        .about("Decrypt network PDUs with the network's keys. Segments of one message may be given together")
        .arg(
            clap::Arg::with_name("pdus")
                .help("network PDUs in hex")
                .required(true)
                .multiple(true)
                .value_name("PDU_HEX")
                .validator(helper::is_hex_validator),
        )
        .arg(
            clap::Arg::with_name("proxy")
                .short("p")
                .long("proxy")
                .help("PDUs are proxy configuration messages")
                .takes_value(false),
        )
}

fn print_message(message: &Message) {
    match message {
        Message::Access(m) => {
            println!(
                "access src: {} dst: {} seq: {} ttl: {} opcode: {}",
                m.src,
                m.dst,
                m.seq.value(),
                m.ttl,
                m.opcode
            );
            println!("parameters: {:x}", HexSlice(&m.parameters));
            match StatusMessage::unpack(m.opcode, &m.parameters) {
                Ok(StatusMessage::Raw { .. }) => (),
                Ok(status) => println!("status: {:?}", status),
                Err(e) => println!("status: unparsable ({})", e),
            }
        }
        Message::Control(m) => {
            println!(
                "control src: {} dst: {} seq: {} ttl: {} opcode: {:#04x}",
                m.src,
                m.dst,
                m.seq.value(),
                m.ttl,
                m.opcode
            );
            println!("parameters: {:x}", HexSlice(&m.parameters));
        }
    }
}

pub fn decode_matches(
    logger: &slog::Logger,
    network_path: &str,
    matches: &clap::ArgMatches,
) -> Result<(), CLIError> {
    let network = helper::load_network_file(network_path)?.to_network()?;
    let pdu_type = if matches.is_present("proxy") {
        PduType::ProxyConfiguration
    } else {
        PduType::Network
    };
    let mut transport = MeshTransport::new(logger, TransportConfig::default());
    for pdu_hex in matches.values_of("pdus").expect("required by clap") {
        let pdu = helper::hex_to_bytes(pdu_hex).expect("validated by clap");
        trace!(logger, "decoding"; "len" => pdu.len());
        match transport.parse_pdu(&network, &pdu, pdu_type)? {
            ParsedPdu::Complete { message, .. } => print_message(&message),
            ParsedPdu::Incomplete { key, block_ack, .. } => println!(
                "segment from {} seq_zero: {} block_ack: {:#010x}",
                key.src,
                key.seq_zero.value(),
                block_ack.0
            ),
            ParsedPdu::Duplicate { key, .. } => println!(
                "duplicate segment from {} seq_zero: {}",
                key.src,
                key.seq_zero.value()
            ),
            ParsedPdu::Ack { src, ack } => println!(
                "segment ack from {} seq_zero: {} block_ack: {:#010x}",
                src,
                ack.seq_zero.value(),
                ack.block_ack.0
            ),
        }
    }
    Ok(())
}
