pub mod api;

use crate::cli::ServeArgs;
use crate::relay::Relay;
use self::api::TlsPaths;
use log::{ error, info };
use std::error::Error;
use std::net::SocketAddr;

pub struct Server {
    addr: SocketAddr,
    relay: Relay,
    tls: Option<TlsPaths>,
}

impl Server {
    pub fn new(relay: Relay, args: &ServeArgs) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let addr = args.server_addr
            .parse::<SocketAddr>()
            .map_err(|e| format!("Invalid server address '{}': {}", args.server_addr, e))?;
        let tls = tls_paths(args)?;

        Ok(Self { addr, relay, tls })
    }

    pub async fn run(self) -> Result<(), Box<dyn Error + Send + Sync>> {
        api::start_http_server(self.addr, self.relay, self.tls).await
    }
}

fn tls_paths(args: &ServeArgs) -> Result<Option<TlsPaths>, Box<dyn Error + Send + Sync>> {
    if !args.enable_tls {
        info!("TLS not enabled. Running plain HTTP relay.");
        return Ok(None);
    }

    match (&args.tls_cert_path, &args.tls_key_path) {
        (Some(cert_path), Some(key_path)) =>
            Ok(
                Some(TlsPaths {
                    cert_path: cert_path.clone(),
                    key_path: key_path.clone(),
                })
            ),
        (Some(_), None) | (None, Some(_)) => {
            error!("Both --tls-cert-path and --tls-key-path must be provided to enable TLS.");
            Err("Missing TLS certificate or key path".into())
        }
        (None, None) => {
            error!("--enable-tls was set but no certificate/key paths provided.");
            Err("TLS enabled without cert/key".into())
        }
    }
}
