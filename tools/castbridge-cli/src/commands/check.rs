//! Check configuration and the rendezvous socket.

use std::path::Path;

use castbridge_common::config::{config_file_path, BridgeConfig, MAX_SOCKET_PATH_LEN};
use castbridge_frame_transport::{Connector, UnixConnector};

pub fn run(config: &BridgeConfig, explicit_path: Option<&Path>) -> anyhow::Result<()> {
    println!("CastBridge Check");
    println!("{}", "=".repeat(50));

    let config_path = explicit_path
        .map(Path::to_path_buf)
        .unwrap_or_else(config_file_path);
    if config_path.exists() {
        println!("[OK] Config file: {}", config_path.display());
    } else {
        println!(
            "[OK] Config file: {} (not present, using defaults)",
            config_path.display()
        );
    }

    let socket_path = config.rendezvous.socket_path();
    let path_len = socket_path.as_os_str().len();
    let mut ready = true;

    match config.validate() {
        Ok(()) => println!("[OK] Configuration is valid"),
        Err(e) => {
            println!("[FAIL] Configuration: {e}");
            ready = false;
        }
    }

    if path_len < MAX_SOCKET_PATH_LEN {
        println!(
            "[OK] Socket path: {} ({path_len}/{} bytes)",
            socket_path.display(),
            MAX_SOCKET_PATH_LEN - 1
        );
    } else {
        println!(
            "[FAIL] Socket path: {} is too long ({path_len} bytes)",
            socket_path.display()
        );
        ready = false;
    }

    let connector = UnixConnector::new(&socket_path, config.transport.write_timeout());
    match connector.connect() {
        Ok(stream) => {
            println!("[OK] Consumer listening on {}", connector.describe());
            // Closing on a frame boundary reads as a finished session to
            // the consumer, which is harmless while nothing is live.
            drop(stream);
        }
        Err(e) if socket_path.exists() => {
            println!("[WARN] Socket exists but nobody is listening: {e}");
        }
        Err(_) => println!("[WARN] No consumer listening (run `castbridge serve`)"),
    }

    println!();
    println!("Resolved configuration:");
    println!("{}", serde_json::to_string_pretty(config)?);

    println!();
    if ready {
        println!("CastBridge is ready.");
    } else {
        println!("Some settings must be fixed. See above.");
    }
    Ok(())
}
