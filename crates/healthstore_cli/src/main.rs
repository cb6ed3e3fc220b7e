//! Maintenance entry point for a health record store.
//!
//! # Responsibility
//! - Probe `healthstore_core` linkage (`ping`, `version`).
//! - Run the periodic retention sweeps against one store file (`sweep`).
//!
//! Logs go to `HEALTHSTORE_LOG_DIR` when that variable names an absolute
//! directory; otherwise the sweep runs silently.

use healthstore_core::{
    default_log_level, init_logging, RecordTableRegistry, StandardRecordTable, StoreConfig,
    StoreContext, StoreError, TransactionManager,
};
use log::info;
use std::process::ExitCode;

const USAGE: &str = "usage: healthstore_cli ping | version | sweep <db> <retention_days> [table:time_column[:record_type] ...]";

fn main() -> ExitCode {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    match args.first().map(String::as_str) {
        None | Some("ping") => {
            println!("healthstore_core ping={}", healthstore_core::ping());
            ExitCode::SUCCESS
        }
        Some("version") => {
            println!("healthstore_core version={}", healthstore_core::core_version());
            ExitCode::SUCCESS
        }
        Some("sweep") => match run_sweep(&args[1..]) {
            Ok(()) => ExitCode::SUCCESS,
            Err(message) => {
                eprintln!("sweep failed: {message}");
                ExitCode::FAILURE
            }
        },
        Some(other) => {
            eprintln!("unknown command `{other}`\n{USAGE}");
            ExitCode::from(2)
        }
    }
}

fn run_sweep(args: &[String]) -> Result<(), String> {
    let [db_path, retention_days, table_specs @ ..] = args else {
        return Err(USAGE.to_string());
    };
    let retention_days = retention_days
        .parse::<u32>()
        .map_err(|err| format!("invalid retention_days `{retention_days}`: {err}"))?;

    if let Ok(log_dir) = std::env::var("HEALTHSTORE_LOG_DIR") {
        init_logging(default_log_level(), &log_dir).map_err(|err| err.to_string())?;
    }

    let tables = table_specs
        .iter()
        .try_fold(RecordTableRegistry::new(), |registry, spec| {
            parse_table_spec(spec).map(|table| registry.with_table(table))
        })?;
    let manager = TransactionManager::new(StoreContext::new(StoreConfig::new(db_path), tables))
        .map_err(describe)?;

    manager
        .delete_stale_record_entries(retention_days)
        .map_err(describe)?;
    manager.delete_stale_change_log_entries().map_err(describe)?;

    info!(
        "event=cli_sweep module=cli status=ok retention_days={retention_days} tables={}",
        table_specs.len()
    );
    println!(
        "swept {} record table(s) and change logs in {db_path}",
        table_specs.len()
    );
    Ok(())
}

fn parse_table_spec(spec: &str) -> Result<StandardRecordTable, String> {
    let mut parts = spec.split(':');
    let (Some(table), Some(time_column)) = (parts.next(), parts.next()) else {
        return Err(format!("table spec `{spec}` must be table:time_column"));
    };
    let record_type = match parts.next() {
        Some(raw) => raw
            .parse()
            .map_err(|err| format!("invalid record type in `{spec}`: {err}"))?,
        None => 0,
    };
    if parts.next().is_some() || table.is_empty() || time_column.is_empty() {
        return Err(format!("table spec `{spec}` must be table:time_column"));
    }
    Ok(StandardRecordTable::new(table, record_type, time_column))
}

fn describe(err: StoreError) -> String {
    format!("{} ({})", err, err.code())
}

#[cfg(test)]
mod tests {
    use super::parse_table_spec;
    use healthstore_core::RecordTableHelper;

    #[test]
    fn table_spec_parses_optional_record_type() {
        let table = parse_table_spec("steps_record_table:start_time:7").unwrap();
        assert_eq!(table.table_name(), "steps_record_table");
        assert_eq!(table.time_column(), "start_time");
        assert_eq!(table.record_type(), 7);

        assert_eq!(parse_table_spec("t:c").unwrap().record_type(), 0);
    }

    #[test]
    fn malformed_table_spec_is_rejected() {
        assert!(parse_table_spec("steps_record_table").is_err());
        assert!(parse_table_spec(":start_time").is_err());
        assert!(parse_table_spec("a:b:1:extra").is_err());
    }
}
