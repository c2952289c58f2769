use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use lescan::bluetooth::{list_adapters, BtleplugRadio, EventType, SessionEvent};
use lescan::config::AppConfig;
use lescan::error::ErrorContext;
use lescan::logging;
use lescan::{EventFilter, SessionController};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().context("Failed to load settings")?;
    if let Err(e) = logging::init_from_settings(&config.logging) {
        eprintln!("Logging disabled: {}", e);
    }

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("adapters") => adapters().await,
        Some("scan") => {
            let mut scan_config = config.to_scan_config();
            if let Some(seconds) = args.get(2) {
                let seconds: u64 = seconds
                    .parse()
                    .with_context(|| format!("Invalid scan length '{}'", seconds))?;
                scan_config = scan_config.with_scan_period(Duration::from_secs(seconds));
            }
            scan(scan_config).await
        }
        _ => {
            print_usage();
            Ok(())
        }
    }
}

async fn adapters() -> Result<()> {
    let adapters = list_adapters().await.context("Failed to enumerate adapters")?;
    if adapters.is_empty() {
        println!("No Bluetooth adapters found");
    }
    for adapter in adapters {
        println!("{}", adapter);
    }
    Ok(())
}

async fn scan(scan_config: lescan::ScanConfig) -> Result<()> {
    let radio = BtleplugRadio::open().await.context("Failed to open Bluetooth adapter")?;
    println!("Scanning on {} for {:?}...", radio.info().name, scan_config.scan_period);

    let controller = SessionController::new(Arc::new(radio), scan_config);
    let (_, mut events) = controller.subscribe(EventFilter::event_types(vec![
        EventType::RegistryChanged,
        EventType::ScanStopped,
        EventType::RadioFailure,
    ]));

    if let Err(e) = controller.start() {
        logging::log_error_with_recovery(&e, &ErrorContext::new("cli", "scan"), e.recovery());
        bail!("{} ({})", e, e.recovery().description());
    }

    let mut printed = 0;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(SessionEvent::RegistryChanged { count }) => {
                    for index in printed..count {
                        if let Ok(device) = controller.device_at(index) {
                            println!("  {:>3}  {}  {}", index, device.identifier, device.label());
                        }
                    }
                    printed = printed.max(count);
                }
                Some(SessionEvent::RadioFailure { code, .. }) => {
                    eprintln!("Radio reported failure code {}", code);
                }
                Some(SessionEvent::ScanStopped { reason, .. }) => {
                    println!("Scan stopped ({:?}), {} device(s) found", reason, controller.device_count());
                    break;
                }
                Some(_) => {}
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                controller.stop();
            }
        }
    }
    Ok(())
}

fn print_usage() {
    println!("Usage:");
    println!("  lescan adapters         - List Bluetooth adapters");
    println!("  lescan scan [seconds]   - Scan for nearby BLE devices");
}
