use std::path::PathBuf;

use thiserror::Error;
use url::Url;

use crate::dom::Document;
use crate::input::PageLocation;

/// A loaded page, before it is parsed into a [`Document`].
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub base_url: Url,
    pub contents: String,
    pub file_path: Option<PathBuf>,
}

impl FetchedPage {
    pub fn into_document(self) -> Document {
        Document::parse_with_base(&self.contents, self.base_url)
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("page request failed with status {0}")]
    Status(u16),
    #[error("file error: {0}")]
    File(#[from] std::io::Error),
    #[error("invalid file path: {0}")]
    InvalidPath(PathBuf),
}

pub async fn fetch_page(location: &PageLocation, client: &reqwest::Client) -> Result<FetchedPage, FetchError> {
    match location {
        PageLocation::File(path) => fetch_file(path).await,
        PageLocation::Url(url) => {
            tracing::debug!(target: "navigation", %url, "fetching page");
            let response = client.get(url.clone()).send().await?;
            if !response.status().is_success() {
                return Err(FetchError::Status(response.status().as_u16()));
            }
            // redirects move the base for relative form actions
            let base_url = response.url().clone();
            let contents = response.text().await?;
            Ok(FetchedPage {
                base_url,
                contents,
                file_path: None,
            })
        }
    }
}

async fn fetch_file(path: &PathBuf) -> Result<FetchedPage, FetchError> {
    if path.is_dir() {
        return Err(FetchError::File(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "path is a directory",
        )));
    }

    let absolute = if path.is_absolute() {
        path.clone()
    } else {
        std::env::current_dir()?.join(path)
    };
    let base_url = Url::from_file_path(&absolute).map_err(|_| FetchError::InvalidPath(absolute.clone()))?;
    let contents = tokio::fs::read_to_string(&absolute).await?;

    Ok(FetchedPage {
        base_url,
        contents,
        file_path: Some(absolute),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loads_file_pages_with_file_base() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.html");
        std::fs::write(&path, r#"<form id="f" action="submit"></form>"#).unwrap();

        let page = fetch_page(&PageLocation::File(path.clone()), &reqwest::Client::new())
            .await
            .unwrap();
        assert_eq!(page.base_url.scheme(), "file");
        assert_eq!(page.file_path.as_deref(), Some(path.as_path()));

        let document = page.into_document();
        assert!(document.element_by_id("f").is_some());
    }

    #[tokio::test]
    async fn directories_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = fetch_page(&PageLocation::File(dir.path().to_path_buf()), &reqwest::Client::new()).await;
        assert!(matches!(result, Err(FetchError::File(_))));
    }
}
