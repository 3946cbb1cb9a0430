use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use thiserror::Error;
use url::Url;

/// Where the page that hosts the forms comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageLocation {
    Url(Url),
    File(PathBuf),
}

#[derive(Debug, Error)]
pub enum ParseInputError {
    #[error("input is empty")]
    Empty,
    #[error("input could not be parsed as a URL or file path")]
    InvalidUrl,
}

pub fn parse_input(raw: &str) -> Result<PageLocation, ParseInputError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ParseInputError::Empty);
    }

    if let Ok(url) = Url::parse(trimmed) {
        if url.scheme() == "file" {
            let path = url.to_file_path().map_err(|_| ParseInputError::InvalidUrl)?;
            return Ok(PageLocation::File(path));
        }
        // single letters are windows drive prefixes, not schemes
        if url.scheme().len() > 1 {
            return Ok(PageLocation::Url(url));
        }
    }

    let path = Path::new(trimmed);
    if path.exists() || trimmed.starts_with('/') || trimmed.starts_with("./") {
        return Ok(PageLocation::File(path.to_path_buf()));
    }

    // bare ip:port means a local dev server
    if let Ok(addr) = trimmed.parse::<SocketAddr>() {
        let url = Url::parse(&format!("http://{addr}")).map_err(|_| ParseInputError::InvalidUrl)?;
        return Ok(PageLocation::Url(url));
    }

    if trimmed.contains('.') {
        let url = Url::parse(&format!("https://{trimmed}")).map_err(|_| ParseInputError::InvalidUrl)?;
        return Ok(PageLocation::Url(url));
    }

    Err(ParseInputError::InvalidUrl)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_url() {
        match parse_input("http://localhost:8080/app/page.xhtml").unwrap() {
            PageLocation::Url(url) => assert_eq!(url.path(), "/app/page.xhtml"),
            other => panic!("expected URL, got {other:?}"),
        }
    }

    #[test]
    fn parses_direct_ip() {
        assert_eq!(
            parse_input("127.0.0.1:9000").unwrap(),
            PageLocation::Url(Url::parse("http://127.0.0.1:9000/").unwrap())
        );
    }

    #[test]
    fn parses_files() {
        let dir = tempfile::tempdir().unwrap();
        let page = dir.path().join("page.html");
        std::fs::write(&page, "<form></form>").unwrap();

        assert_eq!(
            parse_input(page.to_str().unwrap()).unwrap(),
            PageLocation::File(page.clone())
        );
        let url = Url::from_file_path(&page).unwrap();
        assert_eq!(parse_input(url.as_str()).unwrap(), PageLocation::File(page));
    }

    #[test]
    fn bare_host_defaults_to_https() {
        assert_eq!(
            parse_input("example.com").unwrap(),
            PageLocation::Url(Url::parse("https://example.com/").unwrap())
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(parse_input("   "), Err(ParseInputError::Empty)));
        assert!(matches!(parse_input("nothing"), Err(ParseInputError::InvalidUrl)));
    }
}
