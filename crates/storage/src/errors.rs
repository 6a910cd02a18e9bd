use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to serialize prediction payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_formatting() {
        let err = StoreError::Database(sqlx::Error::RowNotFound);
        assert!(
            err.to_string().starts_with("database error:"),
            "Database errors should carry the 'database error:' prefix"
        );

        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: StoreError = json_err.into();
        assert!(
            err.to_string()
                .starts_with("failed to serialize prediction payload:"),
            "Serialization errors should convert through From"
        );
    }
}
