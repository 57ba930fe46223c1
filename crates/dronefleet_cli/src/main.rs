//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `dronefleet_core` linkage with a ping/version probe.
//! - Given a database path, initialize the serial counter and run one
//!   battery scan, printing the report as JSON.
//!
//! Set `DRONEFLEET_LOG_DIR` to an absolute path to enable file logging.

use dronefleet_core::{
    default_log_level, init_logging, open_db, sqlite_battery_monitor, sqlite_fleet_service,
    FleetConfig, NotificationBus,
};
use log::info;
use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;

const LOG_DIR_ENV: &str = "DRONEFLEET_LOG_DIR";

fn main() -> ExitCode {
    println!("dronefleet_core ping={}", dronefleet_core::ping());
    println!("dronefleet_core version={}", dronefleet_core::core_version());

    if let Ok(log_dir) = std::env::var(LOG_DIR_ENV) {
        if let Err(err) = init_logging(default_log_level(), &log_dir) {
            eprintln!("logging disabled: {err}");
        }
    }

    let Some(db_path) = std::env::args().nth(1) else {
        return ExitCode::SUCCESS;
    };
    match scan_once(&db_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn scan_once(db_path: &str) -> Result<(), Box<dyn Error>> {
    let config = FleetConfig::default();
    let conn = open_db(db_path)?;

    let fleet = sqlite_fleet_service(&conn, &config);
    let sequence = fleet.initialize()?;
    println!(
        "serial sequence={} current_value={}",
        sequence.name, sequence.current_value
    );

    let bus = Arc::new(NotificationBus::with_logging());
    let monitor = sqlite_battery_monitor(&conn, bus, config.monitor.clone());
    let report = monitor.run_scan()?;
    info!(
        "event=cli_scan module=cli status=ok scanned={} failed={}",
        report.scanned,
        report.failures.len()
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
