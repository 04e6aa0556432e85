//! `wspubsub token`

use wspubsub_protocol::{NONCE_LEN, authorization_value, derive_connection_nonce};

use crate::error::{CliError, CliResult};

fn nonce(name: &'static str, value: &str) -> CliResult<[u8; NONCE_LEN]> {
    let bytes = hex::decode(value.trim())?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| CliError::NonceLength { name, len })
}

/// Authorization value for `counter` on the connection keyed by both nonces.
pub fn mint(subscriber_nonce: &str, broadcaster_nonce: &str, counter: i64) -> CliResult<String> {
    let subscriber = nonce("subscriber nonce", subscriber_nonce)?;
    let broadcaster = nonce("broadcaster nonce", broadcaster_nonce)?;
    Ok(authorization_value(
        &derive_connection_nonce(&subscriber, &broadcaster),
        counter,
    ))
}

/// Prints the authorization value to stdout.
pub fn run(subscriber_nonce: &str, broadcaster_nonce: &str, counter: i64) -> CliResult<()> {
    println!("{}", mint(subscriber_nonce, broadcaster_nonce, counter)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counting_nonce(start: u8) -> String {
        hex::encode((start..start + 32).collect::<Vec<u8>>())
    }

    #[test]
    fn first_subscriber_token() {
        assert_eq!(
            mint(&counting_nonce(0), &counting_nonce(32), -1).unwrap(),
            "websocket:_eq5rPNxA2K9JljNyaKej5x1f8-YEWA6jER80dkVEQg:-1"
        );
    }

    #[test]
    fn short_nonce_is_rejected() {
        assert!(matches!(
            mint("00", &counting_nonce(32), 1),
            Err(CliError::NonceLength { len: 1, .. })
        ));
    }
}
