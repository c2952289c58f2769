//! btleplug-backed radio capability
//!
//! One worker task owns the adapter. Start and stop requests are queued to
//! it and run one after the other, so a stop-scan from a finished session
//! always reaches the adapter before the next start-scan.

use std::sync::{Arc, Mutex};

use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, PeripheralId};
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::bluetooth::dispatcher::ScanCallback;
use crate::bluetooth::radio::{failure_code, RadioCapabilities, RadioCapability, ScanRecord};
use crate::bluetooth::state::lock;
use crate::error::{ControllerError, ErrorContext, RadioError};

/// Information about a Bluetooth adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterInfo {
    pub index: usize,
    pub name: String,
}

impl std::fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}: {}", self.index, self.name)
    }
}

/// List every adapter the platform manager reports
pub async fn list_adapters() -> Result<Vec<AdapterInfo>, btleplug::Error> {
    let manager = Manager::new().await?;
    let mut infos = Vec::new();
    for (index, adapter) in manager.adapters().await?.into_iter().enumerate() {
        let name = adapter
            .adapter_info()
            .await
            .unwrap_or_else(|_| "unknown adapter".to_string());
        infos.push(AdapterInfo { index, name });
    }
    Ok(infos)
}

/// Failure code reported to the session for a btleplug error
pub fn failure_code_for(err: &btleplug::Error) -> i32 {
    match err {
        btleplug::Error::PermissionDenied => failure_code::REGISTRATION_FAILED,
        btleplug::Error::NotSupported(_) => failure_code::FEATURE_UNSUPPORTED,
        _ => failure_code::INTERNAL_ERROR,
    }
}

/// Errors that make the next start-discovery fail up front
fn blocking_error(err: &btleplug::Error) -> Option<RadioError> {
    match err {
        btleplug::Error::PermissionDenied => Some(RadioError::PermissionDenied(err.to_string())),
        btleplug::Error::NotSupported(msg) => Some(RadioError::Unavailable(msg.clone())),
        _ => None,
    }
}

/// Holds an adapter refusal until the next start-discovery collects it
///
/// Each refusal fails exactly one start; the retry after it goes through.
#[derive(Debug, Clone, Default)]
struct RefusalLatch {
    refusal: Arc<Mutex<Option<RadioError>>>,
}

impl RefusalLatch {
    /// Keep `err` for the next start if it needs user action; returns whether it was kept
    fn record(&self, err: &btleplug::Error) -> bool {
        match blocking_error(err) {
            Some(radio_error) => {
                *lock(&self.refusal) = Some(radio_error);
                true
            }
            None => false,
        }
    }

    /// Fail with the stored refusal, clearing it
    fn check(&self) -> Result<(), RadioError> {
        match lock(&self.refusal).take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// The adapter operations the scan worker drives
trait ScanBackend: Send + Sync + 'static {
    /// Begin scanning; the stream yields one record per advertisement
    fn start_scan(&self) -> BoxFuture<'_, Result<BoxStream<'static, ScanRecord>, btleplug::Error>>;

    fn stop_scan(&self) -> BoxFuture<'_, Result<(), btleplug::Error>>;
}

struct AdapterBackend {
    adapter: Adapter,
}

impl AdapterBackend {
    async fn record_for(adapter: &Adapter, id: &PeripheralId) -> Option<ScanRecord> {
        let peripheral = match adapter.peripheral(id).await {
            Ok(peripheral) => peripheral,
            Err(e) => {
                debug!("[AdapterBackend::record_for] Peripheral lookup failed: {}", e);
                return None;
            }
        };

        match peripheral.properties().await {
            Ok(Some(properties)) => Some(ScanRecord {
                identifier: Some(properties.address.to_string()),
                display_name: properties.local_name,
            }),
            // No properties: forwarded as a malformed result for the dispatcher to drop
            Ok(None) => Some(ScanRecord::default()),
            Err(e) => {
                debug!("[AdapterBackend::record_for] Failed to read properties: {}", e);
                None
            }
        }
    }
}

impl ScanBackend for AdapterBackend {
    fn start_scan(&self) -> BoxFuture<'_, Result<BoxStream<'static, ScanRecord>, btleplug::Error>> {
        async move {
            let events = self.adapter.events().await?;
            self.adapter.start_scan(ScanFilter::default()).await?;

            let adapter = self.adapter.clone();
            let records = events.filter_map(move |event| {
                let adapter = adapter.clone();
                async move {
                    match event {
                        CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                            Self::record_for(&adapter, &id).await
                        }
                        _ => None,
                    }
                }
            });
            Ok(records.boxed())
        }
        .boxed()
    }

    fn stop_scan(&self) -> BoxFuture<'_, Result<(), btleplug::Error>> {
        self.adapter.stop_scan().boxed()
    }
}

enum ScanCommand {
    Start(ScanCallback),
    Stop,
}

/// Send side of the scan worker
struct ScanDriver {
    commands: UnboundedSender<ScanCommand>,
    refusal: RefusalLatch,
}

impl ScanDriver {
    fn spawn<B: ScanBackend>(backend: B, runtime: &Handle) -> Self {
        let (commands, commands_rx) = unbounded_channel();
        let refusal = RefusalLatch::default();
        runtime.spawn(run_worker(backend, commands_rx, refusal.clone()));
        Self { commands, refusal }
    }

    fn start(&self, callback: ScanCallback) -> Result<(), RadioError> {
        if let Err(err) = self.refusal.check() {
            warn!("[ScanDriver::start] Adapter refused earlier: {}", err);
            return Err(err);
        }
        self.commands
            .send(ScanCommand::Start(callback))
            .map_err(|_| RadioError::Unavailable("scan worker has exited".to_string()))
    }

    fn stop(&self) {
        if self.commands.send(ScanCommand::Stop).is_err() {
            debug!("[ScanDriver::stop] Scan worker has exited");
        }
    }
}

async fn forward(mut records: BoxStream<'static, ScanRecord>, callback: ScanCallback) {
    while let Some(record) = records.next().await {
        callback.on_device_found(record.identifier, record.display_name);
    }
    debug!("[ScanDriver::forward session={}] Event stream ended", callback.session());
}

async fn stop_backend<B: ScanBackend>(backend: &B) {
    if let Err(e) = backend.stop_scan().await {
        warn!("[ScanDriver::worker] Failed to stop scan: {}", e);
    }
}

/// Apply commands in arrival order until the driver is dropped
async fn run_worker<B: ScanBackend>(backend: B, mut commands: UnboundedReceiver<ScanCommand>, refusal: RefusalLatch) {
    let mut forwarding: Option<JoinHandle<()>> = None;

    while let Some(command) = commands.recv().await {
        let was_scanning = match forwarding.take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        };

        match command {
            ScanCommand::Start(callback) => {
                let ctx = ErrorContext::new("ScanDriver", "start_scan")
                    .with_metadata("session", callback.session().to_string());
                if was_scanning {
                    stop_backend(&backend).await;
                }
                match backend.start_scan().await {
                    Ok(records) => {
                        debug!("{}Scan started, processing events", ctx);
                        forwarding = Some(tokio::spawn(forward(records, callback)));
                    }
                    Err(e) => {
                        error!("{}Failed to start scan: {}", ctx, e);
                        refusal.record(&e);
                        callback.on_failure(failure_code_for(&e));
                    }
                }
            }
            ScanCommand::Stop => {
                if was_scanning {
                    stop_backend(&backend).await;
                }
            }
        }
    }

    if let Some(task) = forwarding.take() {
        task.abort();
        stop_backend(&backend).await;
    }
    debug!("[ScanDriver::worker] Command queue closed, worker exiting");
}

/// Scans through the first adapter of the platform Bluetooth manager
pub struct BtleplugRadio {
    info: AdapterInfo,
    driver: ScanDriver,
}

impl BtleplugRadio {
    /// Open the first adapter; hosts without one are unsupported
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn open() -> Result<Self, ControllerError> {
        let ctx = ErrorContext::new("BtleplugRadio", "open");

        let manager = Manager::new().await.map_err(|e| {
            error!("{}Failed to create Bluetooth manager: {}", ctx, e);
            ControllerError::UnsupportedHardware
        })?;
        let adapter = manager
            .adapters()
            .await
            .map_err(|e| {
                error!("{}Failed to enumerate adapters: {}", ctx, e);
                ControllerError::UnsupportedHardware
            })?
            .into_iter()
            .next()
            .ok_or_else(|| {
                error!("{}No Bluetooth adapter found", ctx);
                ControllerError::UnsupportedHardware
            })?;

        let name = adapter
            .adapter_info()
            .await
            .unwrap_or_else(|_| "unknown adapter".to_string());
        info!("{}Using adapter {}", ctx, name);

        Ok(Self {
            info: AdapterInfo { index: 0, name },
            driver: ScanDriver::spawn(AdapterBackend { adapter }, &Handle::current()),
        })
    }

    pub fn info(&self) -> &AdapterInfo {
        &self.info
    }
}

impl RadioCapability for BtleplugRadio {
    fn capabilities(&self) -> RadioCapabilities {
        RadioCapabilities {
            supports_scanning: true,
            name: self.info.name.clone(),
        }
    }

    fn start_discovery(&self, callback: ScanCallback) -> Result<(), RadioError> {
        self.driver.start(callback)
    }

    fn stop_discovery(&self) {
        self.driver.stop();
    }
}
