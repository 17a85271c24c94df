//! Minimal driver: acknowledges every notification with an empty request.
//!
//! Usage: `idle_driver [..] <bridge-address>`; the address is always the last argument.

use std::io::ErrorKind;
use std::process::ExitCode;

use bridge_core::bridge_runtime::{BridgeRequest, BridgeResponse};
use bridge_core::{DriverConnection, TransportError};
use tracing::{error, info};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let Some(addr) = std::env::args().skip(1).last() else {
        error!(target: "bridge::idle_driver", "usage: idle_driver <bridge-address>");
        return ExitCode::from(2);
    };

    match run(&addr) {
        Ok(acknowledged) => {
            info!(target: "bridge::idle_driver", acknowledged, "driver.finished");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(target: "bridge::idle_driver", error = %err, "driver.failed");
            ExitCode::FAILURE
        }
    }
}

fn run(addr: &str) -> Result<u64, Box<dyn std::error::Error>> {
    let mut conn = DriverConnection::connect(addr.to_string())?;
    info!(target: "bridge::idle_driver", %addr, "driver.connected");

    let mut acknowledged = 0;
    loop {
        let frame = match conn.recv() {
            Ok(Some(frame)) => frame,
            Ok(None) | Err(TransportError::Closed) => return Ok(acknowledged),
            Err(TransportError::Receive(err)) if err.kind() == ErrorKind::ConnectionReset => {
                return Ok(acknowledged)
            }
            Err(err) => return Err(err.into()),
        };
        let response = BridgeResponse::decode(&frame)?;
        let Some(notification) = response.notification else {
            continue;
        };
        let request = BridgeRequest::acknowledge(notification.step);
        match conn.send(&request.encode_to_vec()?) {
            Ok(()) => acknowledged += 1,
            // The bridge may close right after the final acknowledgement.
            Err(TransportError::Send(_)) => return Ok(acknowledged),
            Err(err) => return Err(err.into()),
        }
    }
}
