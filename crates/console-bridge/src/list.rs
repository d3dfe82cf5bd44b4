//! `list2` Parser
//!
//! Each `ldconsole list2` line looks like
//! `index,title,top-window,bind-window,android-ready,pid,vbox-pid`.

use tracing::debug;

use ldfleet_core::{InstanceStatus, LdError, Result};

/// Column count of a well-formed `list2` line
pub const LIST2_COLUMNS: usize = 7;

const INDEX_COLUMN: usize = 0;
const TITLE_COLUMN: usize = 1;
const ANDROID_READY_COLUMN: usize = 4;

/// Parse `list2` output.
///
/// Lines without exactly seven columns are partial or corrupt and are
/// skipped. An unparsable index fails the whole listing.
pub fn parse_list2(lines: &[String]) -> Result<Vec<InstanceStatus>> {
    let mut statuses = Vec::with_capacity(lines.len());

    for line in lines {
        let columns: Vec<&str> = line.split(',').collect();
        if columns.len() != LIST2_COLUMNS {
            debug!("Skipping list2 line with {} columns: {:?}", columns.len(), line);
            continue;
        }

        let index = columns[INDEX_COLUMN].trim().parse::<i32>().map_err(|e| {
            LdError::domain(format!("Invalid index in list2 line '{}': {}", line, e))
        })?;

        statuses.push(InstanceStatus {
            index,
            title: columns[TITLE_COLUMN].to_string(),
            android_ready: columns[ANDROID_READY_COLUMN] == "1",
        });
    }

    Ok(statuses)
}
