pub mod db;
pub mod growth;
pub mod measurements;
pub mod quota;
pub mod reference;
pub mod settings;
pub mod velocity;

use crate::error::ErrorResponse;
use rusqlite::Connection;
use settings::EngineSettings;

/// Open the database and settings under `data_dir` for one command invocation.
pub(crate) fn open_data_dir(data_dir: &str) -> Result<(Connection, EngineSettings), ErrorResponse> {
    let settings = settings::load_engine_settings(data_dir).map_err(ErrorResponse::internal)?;
    let conn = db::get_db_connection(data_dir).map_err(ErrorResponse::internal)?;
    Ok((conn, settings))
}
