use crate::helper::{self, HexSlice};
use crate::CLIError;
use mesh_transport::crypto::key::{AppKey, NetKey};
use mesh_transport::crypto::materials::NetworkKeys;
use mesh_transport::crypto::{s1, NetworkID};

pub fn sub_command() -> clap::App<'static, 'static> {
    clap::SubCommand::with_name("crypto")
        .about("Derive mesh key material")
        .subcommand(
            clap::SubCommand::with_name("netkey")
                .about("show NID, encryption key, privacy key and Network ID of a netkey")
                .arg(
                    clap::Arg::with_name("key_hex")
                        .help("128-bit big endian key hex")
                        .required(true)
                        .value_name("KEY_HEX")
                        .validator(helper::is_128_bit_hex_str_validator),
                ),
        )
        .subcommand(
            clap::SubCommand::with_name("appkey")
                .about("show the AID of an appkey")
                .arg(
                    clap::Arg::with_name("key_hex")
                        .help("128-bit big endian key hex")
                        .required(true)
                        .value_name("KEY_HEX")
                        .validator(helper::is_128_bit_hex_str_validator),
                ),
        )
        .subcommand(
            clap::SubCommand::with_name("s1")
                .about("salt generation function s1 of a string")
                .arg(
                    clap::Arg::with_name("input")
                        .required(true)
                        .value_name("INPUT"),
                ),
        )
}

pub fn crypto_matches(
    logger: &slog::Logger,
    matches: &clap::ArgMatches,
) -> Result<(), CLIError> {
    trace!(logger, "crypto_matches");
    match matches.subcommand() {
        ("netkey", Some(netkey_matches)) => {
            let net_key = NetKey::from_hex(netkey_matches.value_of("key_hex").expect("required by clap"))
                .expect("validated by clap");
            let keys = NetworkKeys::from(&net_key);
            println!("nid: {}", keys.nid());
            println!("encryption key: {:x}", keys.encryption_key().key());
            println!("privacy key: {:x}", keys.privacy_key().key());
            println!("network id: {:016x}", NetworkID::from(&net_key).0);
        }
        ("appkey", Some(appkey_matches)) => {
            let app_key = AppKey::from_hex(appkey_matches.value_of("key_hex").expect("required by clap"))
                .expect("validated by clap");
            println!("aid: {}", app_key.aid());
        }
        ("s1", Some(s1_matches)) => {
            let input = s1_matches.value_of("input").expect("required by clap");
            println!("{:x}", HexSlice(s1(input).as_ref()));
        }
        _ => error!(logger, "no_crypto_subcommand"),
    }
    Ok(())
}
