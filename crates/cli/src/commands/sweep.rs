use std::time::SystemTime;

use agroquote_db::SnapshotStore;

use crate::commands::{load_config, runtime, CommandResult};

/// One pass of the disk sweep the server runs hourly.
pub fn run() -> CommandResult {
    let config = match load_config("sweep") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("sweep") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let ttl_secs = i64::try_from(config.dialogue.session_ttl_secs).unwrap_or(i64::MAX / 1_000);
    let store = SnapshotStore::new(&config.storage.sessions_dir, chrono::Duration::seconds(ttl_secs));

    match runtime.block_on(store.sweep(SystemTime::now())) {
        Ok(report) => CommandResult::success(
            "sweep",
            format!(
                "scanned {} snapshots in {}, removed {}",
                report.scanned,
                config.storage.sessions_dir.display(),
                report.removed
            ),
        ),
        Err(error) => CommandResult::failure("sweep", "snapshot_io", error.to_string(), 4),
    }
}
