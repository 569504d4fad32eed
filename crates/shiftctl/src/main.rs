//! shiftctl - command-line client for shiftd
//!
//! Drives a terminal's shift from a shell: log in, start, record fuel,
//! close. Also used to watch the event stream while debugging.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use shiftlog_api::{Command, FuelEntry, ResponsePayload, ScanKind};
use shiftlog_ipc::IpcClient;
use shiftlog_util::{EmployeeId, format_clock_time};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// shiftctl - Control and inspect the shiftd service
#[derive(Parser, Debug)]
#[command(name = "shiftctl")]
#[command(version, about = "Control and inspect the shiftd service", long_about = None)]
struct Cli {
    /// Socket path (or set SHIFTLOG_SOCKET env var)
    #[arg(short, long, global = true, env = "SHIFTLOG_SOCKET")]
    socket: Option<PathBuf>,

    /// Print raw JSON responses
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the terminal's current state
    State,

    /// Log a driver in by employee number
    Login { employee_id: String },

    /// Start the shift with a vehicle and odometer reading.
    /// Repeat to confirm a reading below the vehicle's last one.
    Start { vehicle: String, odometer: u64 },

    /// Record a refueling
    Fuel {
        /// Litres, "40,5" or "40.5"
        #[arg(long)]
        litres: String,

        /// Amount paid
        #[arg(long)]
        cost: String,

        /// Odometer at the pump
        #[arg(long = "km")]
        odometer: Option<String>,

        #[arg(long, default_value = "")]
        card: String,

        #[arg(long, default_value = "")]
        station: String,
    },

    /// Go to the closure screen
    BeginClose,

    /// Leave the closure screen
    CancelClose,

    /// Close the shift with the final odometer reading
    Close { end_odometer: u64 },

    /// Log out; an open shift stays saved for today
    Logout,

    /// List office vehicles
    Vehicles,

    /// List office fuel stations
    Stations,

    /// Usage history of a vehicle
    History { plate: String },

    /// Past shifts of the logged-in driver
    MyHistory,

    /// Read a badge or a vehicle tag
    Scan {
        #[arg(value_enum)]
        kind: ScanTarget,
    },

    /// Abort the scan in progress
    CancelScan,

    /// Print events as they happen
    Watch,

    /// Service health
    Health,

    /// Check the service answers
    Ping,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ScanTarget {
    Driver,
    Vehicle,
}

impl From<ScanTarget> for ScanKind {
    fn from(target: ScanTarget) -> Self {
        match target {
            ScanTarget::Driver => ScanKind::Driver,
            ScanTarget::Vehicle => ScanKind::Vehicle,
        }
    }
}

impl Commands {
    /// Protocol command for a one-shot request; `None` for streaming ones
    fn to_command(&self) -> Option<Command> {
        let command = match self {
            Commands::State => Command::GetState,
            Commands::Login { employee_id } => Command::Login {
                employee_id: EmployeeId::new(employee_id.as_str()),
            },
            Commands::Start { vehicle, odometer } => Command::StartManual {
                vehicle: vehicle.clone(),
                odometer: *odometer,
            },
            Commands::Fuel {
                litres,
                cost,
                odometer,
                card,
                station,
            } => Command::AddFuel {
                entry: FuelEntry {
                    odometer_at_fill: odometer.clone(),
                    litres: Some(litres.clone()),
                    cost: Some(cost.clone()),
                    card_number: card.clone(),
                    station_name: station.clone(),
                },
            },
            Commands::BeginClose => Command::BeginClose,
            Commands::CancelClose => Command::CancelClose,
            Commands::Close { end_odometer } => Command::CloseShift {
                end_odometer: *end_odometer,
            },
            Commands::Logout => Command::Logout,
            Commands::Vehicles => Command::ListVehicles,
            Commands::Stations => Command::ListStations,
            Commands::History { plate } => Command::VehicleHistory {
                plate: plate.clone(),
            },
            Commands::MyHistory => Command::DriverHistory,
            Commands::Scan { kind } => Command::Scan {
                kind: (*kind).into(),
            },
            Commands::CancelScan => Command::CancelScan,
            Commands::Watch => return None,
            Commands::Health => Command::GetHealth,
            Commands::Ping => Command::Ping,
        };
        Some(command)
    }
}

/// Short human-readable rendering of a response
fn describe(payload: &ResponsePayload) -> Option<String> {
    let text = match payload {
        ResponsePayload::Session(session) => format!(
            "Shift open: {} on {} from {} km, started {}{}, {} fuel record(s)",
            session.driver.name,
            session.vehicle,
            session.start_odometer,
            format_clock_time(&session.started_at),
            if session.anomaly { " (low start confirmed)" } else { "" },
            session.fuel_count()
        ),
        ResponsePayload::ManualStartRequired { driver } => format!(
            "Welcome {}. No preloaded start: run `shiftctl start <vehicle> <km>`",
            driver.name
        ),
        ResponsePayload::AnomalyConfirmationRequired {
            vehicle,
            entered_odometer,
            last_known_odometer,
        } => format!(
            "{} km is below the last reading of {} ({} km). Repeat the same start to confirm.",
            entered_odometer, vehicle, last_known_odometer
        ),
        ResponsePayload::ShiftClosed(summary) => {
            let mut text = format!(
                "Shift closed: {} km driven, {:.2} l, {:.2} EUR",
                summary.total_distance, summary.total_litres, summary.total_cost
            );
            if summary.end_below_start {
                text.push_str("\nWarning: end reading is below the start reading");
            }
            text
        }
        ResponsePayload::LoggedOut => "Logged out".to_string(),
        ResponsePayload::ScreenChanged { screen } => format!("Screen: {}", screen),
        ResponsePayload::ScanCancelled => "Scan cancelled".to_string(),
        ResponsePayload::Pong => "pong".to_string(),
        _ => return None,
    };
    Some(text)
}

async fn run(cli: Cli) -> Result<()> {
    let mut client = IpcClient::connect_default(cli.socket.clone())
        .await
        .context("Failed to connect to shiftd")?;

    let Some(command) = cli.command.to_command() else {
        let mut events = client.subscribe().await.context("Failed to subscribe")?;
        loop {
            let event = events.next().await.context("Event stream ended")?;
            println!("{}", serde_json::to_string(&event)?);
        }
    };

    debug!(?command, "Sending request");
    let payload = client.request(command).await?;
    match describe(&payload) {
        Some(text) if !cli.json => println!("{}", text),
        _ => println!("{}", serde_json::to_string_pretty(&payload)?),
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Commands {
        let mut argv = vec!["shiftctl"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap().command
    }

    #[test]
    fn fuel_keeps_typed_numbers() {
        let command = parse(&["fuel", "--litres", "40,5", "--cost", "80", "--km", "124650"])
            .to_command()
            .unwrap();
        match command {
            Command::AddFuel { entry } => {
                assert_eq!(entry.litres.as_deref(), Some("40,5"));
                assert_eq!(entry.odometer_at_fill.as_deref(), Some("124650"));
                assert!(entry.card_number.is_empty());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn start_and_close_map_to_commands() {
        assert!(matches!(
            parse(&["start", "VEH_001", "60100"]).to_command(),
            Some(Command::StartManual { odometer: 60100, .. })
        ));
        assert!(matches!(
            parse(&["close", "60250"]).to_command(),
            Some(Command::CloseShift { end_odometer: 60250 })
        ));
        assert!(matches!(
            parse(&["scan", "vehicle"]).to_command(),
            Some(Command::Scan {
                kind: ScanKind::Vehicle
            })
        ));
    }

    #[test]
    fn watch_is_streaming() {
        assert!(parse(&["watch"]).to_command().is_none());
    }

    #[test]
    fn negative_odometer_is_rejected() {
        assert!(Cli::try_parse_from(["shiftctl", "close", "-20"]).is_err());
    }

    #[test]
    fn employee_id_is_trimmed() {
        match parse(&["login", " 12345 "]).to_command() {
            Some(Command::Login { employee_id }) => assert_eq!(employee_id.as_str(), "12345"),
            other => panic!("unexpected command {:?}", other),
        }
    }
}
