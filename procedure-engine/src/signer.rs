use std::str::FromStr;

use hex::FromHex;
use snafu::ResultExt;
use subxt_signer::sr25519::Keypair;
use subxt_signer::SecretUri;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::error::*;

/// Load an sr25519 signing key from a file.
///
/// The file holds either a hex encoded 32 byte seed or a secret URI such as `//Alice`
/// or a mnemonic phrase with optional derivation junctions.
pub async fn load_signing_key(file_path: &str) -> Result<Keypair> {
    let mut file = File::open(file_path).await.context(KeyFileReadSnafu {
        path: file_path.to_string(),
    })?;

    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .await
        .context(KeyFileReadSnafu {
            path: file_path.to_string(),
        })?;

    parse_signing_key(contents.trim())
}

/// Parse a hex seed or a secret URI into a keypair.
pub fn parse_signing_key(key: &str) -> Result<Keypair> {
    if key.starts_with("//") || key.contains(char::is_whitespace) {
        let uri = SecretUri::from_str(key).map_err(|err| Error::KeypairCreation {
            message: err.to_string(),
        })?;
        return Keypair::from_uri(&uri).map_err(|err| Error::KeypairCreation {
            message: err.to_string(),
        });
    }

    let key_bytes = Vec::from_hex(key.trim_start_matches("0x")).context(KeyParseSnafu)?;
    let length = key_bytes.len();
    let seed: [u8; 32] = key_bytes
        .try_into()
        .map_err(|_| Error::InvalidKeyLength { length })?;

    Keypair::from_secret_key(seed).map_err(|err| Error::KeypairCreation {
        message: err.to_string(),
    })
}
