//! Conversions from external infrastructure errors into domain errors.

use fleetsync_domain::FleetError;
use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub FleetError);

impl From<InfraError> for FleetError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<FleetError> for InfraError {
    fn from(value: FleetError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoFleetError {
    fn into_fleet(self) -> FleetError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → FleetError */
/* -------------------------------------------------------------------------- */

impl IntoFleetError for SqlError {
    fn into_fleet(self) -> FleetError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => {
                        FleetError::Database("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        FleetError::Database("database is locked".into())
                    }
                    (ErrorCode::ConstraintViolation, 2067) => {
                        FleetError::Database("unique constraint violation".into())
                    }
                    (ErrorCode::ConstraintViolation, 787) => {
                        FleetError::Database("foreign key constraint violation".into())
                    }
                    _ => FleetError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => FleetError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                FleetError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                FleetError::Database(format!("invalid column type: {ty}"))
            }
            RE::Utf8Error(_) => FleetError::Database("invalid UTF-8 returned from sqlite".into()),
            RE::InvalidParameterName(parameter_name) => {
                FleetError::Database(format!("invalid parameter name: {parameter_name}"))
            }
            RE::InvalidPath(path) => {
                FleetError::Database(format!("invalid database path: {}", path.to_string_lossy()))
            }
            RE::InvalidQuery => FleetError::Database("invalid SQL query".into()),
            other => FleetError::Database(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_fleet())
    }
}

/// Map a SQL error straight to the domain error. Repository code uses this
/// as `map_err(sql_error)` at every rusqlite call site.
pub fn sql_error(err: SqlError) -> FleetError {
    err.into_fleet()
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → FleetError */
/* -------------------------------------------------------------------------- */

impl IntoFleetError for HttpError {
    fn into_fleet(self) -> FleetError {
        if self.is_timeout() {
            FleetError::Registry("request timed out".into())
        } else if self.is_connect() {
            FleetError::Registry(format!("connection failed: {self}"))
        } else if self.is_decode() {
            FleetError::Registry(format!("malformed response body: {self}"))
        } else if let Some(status) = self.status() {
            FleetError::Registry(format!("http status {status}: {self}"))
        } else {
            FleetError::Registry(self.to_string())
        }
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_fleet())
    }
}

/// Map an HTTP client error straight to the domain error.
pub fn http_error(err: HttpError) -> FleetError {
    err.into_fleet()
}
