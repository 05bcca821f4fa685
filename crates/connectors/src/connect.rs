use crate::{
    config::{DatabaseConfig, Driver},
    connection::Connector,
    error::ConnectorError,
    sql::{mysql::adapter::MySqlConnector, postgres::adapter::PgConnector},
};
use std::sync::Arc;
use tracing::info;

/// Builds the connector matching the configured driver. No connection is
/// opened until the first `connect` call.
pub fn build_connector(config: &DatabaseConfig) -> Result<Arc<dyn Connector>, ConnectorError> {
    let url = config.url();
    let connector: Arc<dyn Connector> = match config.driver {
        Driver::MySql => Arc::new(MySqlConnector::new(&url)?),
        Driver::Postgres => Arc::new(PgConnector::new(&url)?),
    };
    info!(source = connector.name(), "Configured data source");
    Ok(connector)
}
