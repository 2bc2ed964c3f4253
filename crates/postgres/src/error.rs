//! Classification of driver failures into persistence errors.

use common::error::PersistenceError;

pub const CONNECT_FAILED: &str = "CONNECT_FAILED";
pub const QUERY_FAILED: &str = "QUERY_FAILED";
pub const CONVERSION_FAILED: &str = "CONVERSION_FAILED";
pub const NOT_OPENED: &str = "NOT_OPENED";
pub const NO_CONNECTION: &str = "NO_CONNECTION";
pub const NO_TABLE_NAME: &str = "NO_TABLE_NAME";

/// Whether the driver failed to reach the server rather than to run the query
pub fn is_connectivity_error(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::Configuration(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}

/// Wrap a driver failure raised while running `action` on `table`
pub fn query_error(
    correlation_id: Option<&str>,
    table: &str,
    action: &str,
    error: sqlx::Error,
) -> PersistenceError {
    if is_connectivity_error(&error) {
        PersistenceError::connection(
            correlation_id,
            CONNECT_FAILED,
            format!("Connection to postgres failed while {action} in {table}"),
            error,
        )
    } else {
        PersistenceError::operation(
            correlation_id,
            QUERY_FAILED,
            format!("Failed {action} in {table}"),
        )
        .with_cause(error)
    }
}

/// Wrap a failure to convert between rows and items
pub fn conversion_error(
    correlation_id: Option<&str>,
    table: &str,
    error: impl Into<common::error::BoxError>,
) -> PersistenceError {
    PersistenceError::operation(
        correlation_id,
        CONVERSION_FAILED,
        format!("Failed to convert data of {table}"),
    )
    .with_cause(error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::error::ComponentError;

    #[test]
    fn test_connectivity_classification() {
        let io = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(is_connectivity_error(&io));
        assert!(is_connectivity_error(&sqlx::Error::PoolTimedOut));
        assert!(is_connectivity_error(&sqlx::Error::PoolClosed));

        assert!(!is_connectivity_error(&sqlx::Error::RowNotFound));
        assert!(!is_connectivity_error(&sqlx::Error::ColumnNotFound(
            "id".to_string()
        )));
    }

    #[test]
    fn test_query_error_codes() {
        let err = query_error(Some("123"), "dummies", "reading", sqlx::Error::PoolClosed);
        assert_eq!(err.code(), CONNECT_FAILED);
        assert_eq!(err.correlation_id(), Some("123"));

        let err = query_error(None, "dummies", "reading", sqlx::Error::RowNotFound);
        assert_eq!(err.code(), QUERY_FAILED);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_conversion_error() {
        let cause = serde_json::from_str::<u32>("\"x\"").unwrap_err();
        let err = conversion_error(None, "dummies", cause);
        assert_eq!(err.code(), CONVERSION_FAILED);
    }
}
