/// Parse a camera index from either a bare number or a `/dev/videoX` path.
pub fn parse_device_index(uri: &str) -> Option<i32> {
    if let Ok(index) = uri.parse::<i32>() {
        return (index >= 0).then_some(index);
    }
    let stripped = uri.strip_prefix("/dev/video")?;
    if !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit()) {
        return stripped.parse::<i32>().ok();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_index_and_device_path() {
        assert_eq!(parse_device_index("0"), Some(0));
        assert_eq!(parse_device_index("3"), Some(3));
        assert_eq!(parse_device_index("/dev/video2"), Some(2));
    }

    #[test]
    fn rejects_everything_else() {
        assert_eq!(parse_device_index("-1"), None);
        assert_eq!(parse_device_index("/dev/video"), None);
        assert_eq!(parse_device_index("/dev/videoX"), None);
        assert_eq!(parse_device_index("rtsp://cam/stream"), None);
    }
}
