//! Inbound frame validation rules.

use parlor_core::error::AppError;

/// Rejects frames above the configured size limit.
///
/// The limit is also enforced at upgrade time via the WebSocket
/// configuration; this check covers halves that bypass it (tests, future
/// transports).
pub fn check_frame_size(raw: &str, max_bytes: usize) -> Result<(), AppError> {
    if raw.len() > max_bytes {
        return Err(AppError::protocol(format!(
            "Frame exceeds maximum size of {max_bytes} bytes"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_frame_at_limit() {
        assert!(check_frame_size("abcd", 4).is_ok());
    }

    #[test]
    fn test_rejects_oversized_frame() {
        let err = check_frame_size("abcde", 4).expect_err("must reject");
        assert_eq!(err.kind, parlor_core::error::ErrorKind::Protocol);
    }
}
