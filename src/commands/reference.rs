use crate::commands::db::{get_db_connection, replace_reference_tables};
use crate::error::{ErrorResponse, GrowthError};
use crate::models::reference::{ImportSummary, ReferenceBundle};
use std::fs;

/// Load a JSON reference bundle and replace both reference tables with it.
pub async fn import_reference_tables(
    data_dir: String,
    bundle_path: String,
) -> Result<ImportSummary, ErrorResponse> {
    let raw = fs::read_to_string(&bundle_path).map_err(|e| {
        GrowthError::invalid("bundle_path", format!("cannot read {bundle_path}: {e}"))
    })?;
    let bundle: ReferenceBundle = serde_json::from_str(&raw)
        .map_err(|e| GrowthError::invalid("bundle", format!("malformed reference bundle: {e}")))?;

    let conn = get_db_connection(&data_dir).map_err(GrowthError::from)?;
    let summary = replace_reference_tables(&conn, &bundle).map_err(GrowthError::from)?;
    log::info!(
        "imported {} reference rows and {} velocity rows from {bundle_path}",
        summary.row_count,
        summary.velocity_row_count
    );
    Ok(summary)
}
