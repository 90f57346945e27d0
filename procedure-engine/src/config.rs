use std::time::Duration;

use clap::Args;
use log::info;
use snafu::ResultExt;
use subxt::backend::rpc::reconnecting_rpc_client::{PingConfig, RpcClient};
use subxt::OnlineClient;

use crate::error::{ChainConnectionSnafu, Error, Result};
use crate::signer;
use crate::subxt_client::{SubxtChainClient, DEFAULT_MAX_RETRIES};

/// Connection settings of a [`SubxtChainClient`].
///
/// Meant to be flattened into a binary's CLI with `#[command(flatten)]`.
#[derive(Args, Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// URL of the Polymesh node (e.g. ws://localhost:9944)
    #[arg(
        long,
        env = "POLYMESH_NODE_URL",
        default_value = "ws://127.0.0.1:9944",
        help = "URL of the Polymesh node"
    )]
    pub node_url: String,

    /// Path to the file holding the signing key (hex seed or secret URI)
    #[arg(
        long,
        env = "POLYMESH_SIGNER_KEY",
        help = "Path to the key file used for signing transactions"
    )]
    pub signer_key: String,

    /// Timeout of a single RPC request, in seconds
    #[arg(long, env = "POLYMESH_REQUEST_TIMEOUT_SECS", default_value_t = 60)]
    pub request_timeout_secs: u64,

    /// Timeout of a connection attempt, in seconds
    #[arg(long, env = "POLYMESH_CONNECTION_TIMEOUT_SECS", default_value_t = 10)]
    pub connection_timeout_secs: u64,

    /// How many times a failed submission is retried
    #[arg(long, env = "POLYMESH_MAX_RETRIES", default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: usize,
}

impl ClientConfig {
    /// Connects to the node and loads the signing key.
    pub async fn connect(&self) -> Result<SubxtChainClient> {
        info!("🔵 Connecting to {}", self.node_url);
        let rpc_client = RpcClient::builder()
            .request_timeout(Duration::from_secs(self.request_timeout_secs))
            .connection_timeout(Duration::from_secs(self.connection_timeout_secs))
            .enable_ws_ping(PingConfig::new())
            .build(self.node_url.clone())
            .await
            .map_err(|err| Error::RpcClientBuild {
                url: self.node_url.clone(),
                message: err.to_string(),
            })?;

        let api = OnlineClient::from_rpc_client(rpc_client)
            .await
            .context(ChainConnectionSnafu)?;
        let keypair = signer::load_signing_key(&self.signer_key).await?;

        info!("🟢 Connected to {}", self.node_url);
        Ok(SubxtChainClient::new(api, keypair).with_max_retries(self.max_retries))
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser, Debug)]
    struct Cli {
        #[command(flatten)]
        client: ClientConfig,
    }

    #[test]
    fn defaults_apply_when_only_the_key_is_given() {
        let cli = Cli::try_parse_from(["engine", "--signer-key", "alice.key"]).unwrap();
        assert_eq!(
            cli.client,
            ClientConfig {
                node_url: "ws://127.0.0.1:9944".into(),
                signer_key: "alice.key".into(),
                request_timeout_secs: 60,
                connection_timeout_secs: 10,
                max_retries: 3,
            }
        );
    }

    #[test]
    fn every_setting_can_be_overridden() {
        let cli = Cli::try_parse_from([
            "engine",
            "--node-url",
            "wss://testnet-rpc.polymesh.live",
            "--signer-key",
            "bob.key",
            "--request-timeout-secs",
            "5",
            "--max-retries",
            "0",
        ])
        .unwrap();
        assert_eq!(cli.client.node_url, "wss://testnet-rpc.polymesh.live");
        assert_eq!(cli.client.request_timeout_secs, 5);
        assert_eq!(cli.client.max_retries, 0);
    }
}
