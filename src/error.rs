use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("TransportError: {0}")]
    Transport(String),
    #[error("ParseError: {0}")]
    Parse(String),
    #[error("EmptyRegionError: {width}x{height} region has no pixels")]
    EmptyRegion { width: u32, height: u32 },
    #[error("OutOfBounds: region {x0},{y0} {width}x{height} exceeds {frame_width}x{frame_height} frame")]
    OutOfBounds {
        x0: u32,
        y0: u32,
        width: u32,
        height: u32,
        frame_width: u32,
        frame_height: u32,
    },
    #[error("ConfigurationError: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for SyncError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            SyncError::Parse(crate::unpack_error(&error))
        } else {
            SyncError::Transport(crate::unpack_error(&error))
        }
    }
}

impl From<image::ImageError> for SyncError {
    fn from(error: image::ImageError) -> Self {
        SyncError::Parse(error.to_string())
    }
}

impl From<roxmltree::Error> for SyncError {
    fn from(error: roxmltree::Error) -> Self {
        SyncError::Parse(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_failures_map_to_transport_errors() {
        let err = reqwest::Client::new().get("not a url").build().unwrap_err();
        assert!(matches!(SyncError::from(err), SyncError::Transport(_)));
    }

    #[test]
    fn display_names_the_error_kind() {
        let err = SyncError::EmptyRegion { width: 0, height: 4 };
        assert_eq!(err.to_string(), "EmptyRegionError: 0x4 region has no pixels");
    }
}
