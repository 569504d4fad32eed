//! shiftd - The shiftlog background service
//!
//! This is the main entry point for the shiftd service.
//! It wires together all the components:
//! - Configuration loading
//! - Store initialization
//! - Office client and scanner
//! - Shift service
//! - IPC server

use anyhow::{Context, Result};
use clap::Parser;
use shiftlog_api::{
    ClientRole, Command, ErrorCode, ErrorInfo, Event, EventPayload, Response, ResponsePayload,
};
use shiftlog_config::load_config;
use shiftlog_ipc::{IpcServer, ServerMessage};
use shiftlog_office::{OfficeBackend, Scanner};
use shiftlog_office_http::{HttpOffice, SimulatedScanner};
use shiftlog_store::{AuditEvent, AuditEventType, SqliteStore, Store};
use shiftlog_util::{ClientId, default_config_path};
use shiftd::{ServiceMessage, ServiceResult, ServiceTiming, ShiftService, error_info};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// shiftd - Driver shift sessions for in-cab terminals
#[derive(Parser, Debug)]
#[command(name = "shiftd")]
#[command(about = "Driver shift sessions for in-cab terminals", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/shiftlog/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Socket path override (or set SHIFTLOG_SOCKET env var)
    #[arg(short, long, env = "SHIFTLOG_SOCKET")]
    socket: Option<PathBuf>,

    /// Data directory override (or set SHIFTLOG_DATA_DIR env var)
    #[arg(short, long, env = "SHIFTLOG_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Main service state
struct Service {
    shift: ShiftService,
    messages: mpsc::UnboundedReceiver<ServiceMessage>,
    ipc: Arc<IpcServer>,
    store: Arc<dyn Store>,
    timing: ServiceTiming,
}

impl Service {
    async fn new(args: &Args) -> Result<Self> {
        let settings = load_config(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?;

        info!(
            config_path = %args.config.display(),
            endpoint = %settings.office.endpoint,
            poll_interval_secs = settings.sync.poll_interval.as_secs(),
            "Configuration loaded"
        );

        let socket_path = args
            .socket
            .clone()
            .unwrap_or_else(|| settings.service.socket_path.clone());

        let data_dir = args
            .data_dir
            .clone()
            .unwrap_or_else(|| settings.service.data_dir.clone());

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        let db_path = data_dir.join("shiftd.db");
        let store: Arc<dyn Store> = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );

        info!(db_path = %db_path.display(), "Store initialized");

        store.append_audit(AuditEvent::new(AuditEventType::ServiceStarted))?;

        let office: Arc<dyn OfficeBackend> = Arc::new(
            HttpOffice::new(settings.office.endpoint.clone(), settings.office.request_timeout)
                .context("Failed to create office client")?,
        );

        let scanner: Arc<dyn Scanner> = Arc::new(SimulatedScanner::new(
            settings.scanner.delay,
            settings.scanner.driver_code.clone(),
            settings.scanner.vehicle_code.clone(),
        ));

        let timing = ServiceTiming::from_settings(&settings);
        let (message_tx, messages) = mpsc::unbounded_channel();
        let shift = ShiftService::new(store.clone(), office, scanner, timing, message_tx);

        let mut ipc = IpcServer::new(&socket_path);
        ipc.start().await?;

        info!(socket_path = %socket_path.display(), "IPC server started");

        Ok(Self {
            shift,
            messages,
            ipc: Arc::new(ipc),
            store,
            timing,
        })
    }

    async fn run(self) -> Result<()> {
        let Service {
            mut shift,
            mut messages,
            ipc,
            store,
            timing,
        } = self;

        let mut ipc_messages = ipc
            .take_message_receiver()
            .await
            .context("IPC message receiver already taken")?;

        let ipc_accept = ipc.clone();
        tokio::spawn(async move {
            if let Err(e) = ipc_accept.run().await {
                error!(error = %e, "IPC server error");
            }
        });

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
        let mut sighup = signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?;

        // Queued records are retried on this timer while no shift is polling;
        // the first tick picks up whatever a previous run left behind.
        let mut retry_timer = tokio::time::interval(timing.poll_interval);

        info!("Service running");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, shutting down gracefully");
                    break;
                }

                _ = retry_timer.tick() => {
                    shift.retry_delivery();
                }

                Some(msg) = messages.recv() => {
                    shift.handle_message(msg);
                    Self::broadcast(&ipc, &mut shift);
                }

                Some(msg) = ipc_messages.recv() => {
                    Self::handle_ipc_message(&mut shift, &ipc, &store, msg).await;
                }
            }
        }

        // Graceful shutdown
        info!("Shutting down shiftd");

        shift.shutdown();
        ipc.broadcast_event(Event::new(EventPayload::Shutdown));

        let pending = shift.state().pending_outbound;
        if pending > 0 {
            info!(pending, "Records still queued for the office, delivering on next start");
        }

        if let Err(e) = store.append_audit(AuditEvent::new(AuditEventType::ServiceStopped)) {
            warn!(error = %e, "Failed to log service shutdown");
        }

        ipc.shutdown();
        info!("Shutdown complete");
        Ok(())
    }

    fn broadcast(ipc: &Arc<IpcServer>, shift: &mut ShiftService) {
        for event in shift.take_events() {
            ipc.broadcast_event(event);
        }
    }

    async fn handle_ipc_message(
        shift: &mut ShiftService,
        ipc: &Arc<IpcServer>,
        store: &Arc<dyn Store>,
        msg: ServerMessage,
    ) {
        match msg {
            ServerMessage::Request { client_id, request } => {
                let role = ipc
                    .get_client_info(&client_id)
                    .await
                    .map(|info| info.role)
                    .unwrap_or(ClientRole::Observer);

                let needs_operator = request.command.is_mutation()
                    || matches!(request.command, Command::Scan { .. } | Command::CancelScan);
                if needs_operator && !role.can_operate() {
                    warn!(client_id = %client_id, ?role, "Command refused for read-only client");
                    let response = Response::error(
                        request.request_id,
                        ErrorInfo::new(ErrorCode::PermissionDenied, "Client may not operate the terminal"),
                    );
                    let _ = ipc.send_response(&client_id, response).await;
                    return;
                }

                let response =
                    Self::handle_command(shift, ipc, &client_id, request.request_id, request.command)
                        .await;

                if let Some(response) = response {
                    let _ = ipc.send_response(&client_id, response).await;
                }
                Self::broadcast(ipc, shift);
            }

            ServerMessage::ClientConnected { client_id, info } => {
                info!(
                    client_id = %client_id,
                    role = ?info.role,
                    uid = ?info.uid,
                    "Client connected"
                );

                let _ = store.append_audit(AuditEvent::new(AuditEventType::ClientConnected {
                    client_id: client_id.to_string(),
                    role: format!("{:?}", info.role),
                    uid: info.uid,
                }));
            }

            ServerMessage::ClientDisconnected { client_id } => {
                debug!(client_id = %client_id, "Client disconnected");

                let _ = store.append_audit(AuditEvent::new(AuditEventType::ClientDisconnected {
                    client_id: client_id.to_string(),
                }));
            }
        }
    }

    /// Returns `None` when the answer is sent later from a spawned task
    async fn handle_command(
        shift: &mut ShiftService,
        ipc: &Arc<IpcServer>,
        client_id: &ClientId,
        request_id: u64,
        command: Command,
    ) -> Option<Response> {
        let result = match command {
            Command::GetState => Ok(ResponsePayload::State(shift.state())),

            Command::Login { employee_id } => shift.login(employee_id).await,

            Command::StartManual { vehicle, odometer } => {
                shift.start_manual(&vehicle, odometer).await
            }

            Command::AddFuel { entry } => shift.add_fuel(&entry),

            Command::BeginClose => shift.begin_close(),

            Command::CancelClose => shift.cancel_close(),

            Command::CloseShift { end_odometer } => shift.close_shift(end_odometer),

            Command::Logout => shift.logout(),

            Command::ListVehicles => {
                let queries = shift.queries();
                Self::respond_later(ipc, client_id, request_id, async move {
                    queries.vehicles().await
                });
                return None;
            }

            Command::ListStations => {
                let queries = shift.queries();
                Self::respond_later(ipc, client_id, request_id, async move {
                    queries.stations().await
                });
                return None;
            }

            Command::VehicleHistory { plate } => {
                let queries = shift.queries();
                Self::respond_later(ipc, client_id, request_id, async move {
                    queries.vehicle_history(&plate).await
                });
                return None;
            }

            Command::DriverHistory => match shift.current_driver() {
                Ok(employee_id) => {
                    let queries = shift.queries();
                    Self::respond_later(ipc, client_id, request_id, async move {
                        queries.driver_history(&employee_id).await
                    });
                    return None;
                }
                Err(e) => Err(e),
            },

            Command::Scan { kind } => {
                let scanner = shift.scanner();
                Self::respond_later(ipc, client_id, request_id, async move {
                    Ok(ResponsePayload::Scanned(scanner.scan(kind).await))
                });
                return None;
            }

            Command::CancelScan => {
                shift.scanner().cancel();
                Ok(ResponsePayload::ScanCancelled)
            }

            Command::SubscribeEvents => Ok(ResponsePayload::Subscribed {
                client_id: client_id.clone(),
            }),

            Command::UnsubscribeEvents => Ok(ResponsePayload::Unsubscribed),

            Command::GetHealth => Ok(ResponsePayload::Health(shift.health())),

            Command::Ping => Ok(ResponsePayload::Pong),
        };

        Some(Self::to_response(request_id, result))
    }

    fn to_response(request_id: u64, result: ServiceResult<ResponsePayload>) -> Response {
        match result {
            Ok(payload) => Response::success(request_id, payload),
            Err(e) => {
                debug!(request_id, error = %e, "Command failed");
                Response::error(request_id, error_info(&e))
            }
        }
    }

    /// Answer from a spawned task so slow lookups never hold up the shift
    fn respond_later<F>(ipc: &Arc<IpcServer>, client_id: &ClientId, request_id: u64, work: F)
    where
        F: Future<Output = ServiceResult<ResponsePayload>> + Send + 'static,
    {
        let ipc = ipc.clone();
        let client_id = client_id.clone();
        tokio::spawn(async move {
            let response = Self::to_response(request_id, work.await);
            if let Err(e) = ipc.send_response(&client_id, response).await {
                debug!(client_id = %client_id, error = %e, "Client gone before answer");
            }
        });
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "shiftd starting");

    let service = Service::new(&args).await?;
    service.run().await
}
