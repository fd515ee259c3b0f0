use log::{debug, info, warn};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::fs::File;
use tokio_util::io::ReaderStream;

use super::discovery::DEFAULT_PORT;
use crate::error::TransferError;

pub const DROP_PATH: &str = "/drop";
pub const FILE_FIELD: &str = "file";
pub const NAME_FIELD: &str = "name";
pub const DEFAULT_SENDER_NAME: &str = "Anonymous";

/// Configuration for sending files
#[derive(Debug, Clone)]
pub struct TransferClientConfig {
    /// Port used when the target does not carry one
    pub port: u16,
    /// Name shown to the receiving operator
    pub sender_name: String,
    /// Limit for establishing the connection. The request itself has no
    /// deadline since the receiver waits on its operator.
    pub connect_timeout: Duration,
}

impl Default for TransferClientConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            sender_name: DEFAULT_SENDER_NAME.to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// A local file opened for upload
struct OpenedFile {
    file_name: String,
    length: u64,
    file: File,
}

async fn open_for_upload(path: &Path) -> Result<OpenedFile, TransferError> {
    let open_err = |source| TransferError::OpenFile {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).await.map_err(open_err)?;
    let length = file.metadata().await.map_err(open_err)?.len();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| TransferError::OpenFile {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"),
        })?;

    Ok(OpenedFile {
        file_name,
        length,
        file,
    })
}

/// Build the upload URL for a target that is either a bare host or `host:port`
pub fn drop_url(target: &str, default_port: u16) -> Result<String, TransferError> {
    let target = target.trim();
    if target.is_empty() {
        return Err(TransferError::InvalidTarget("empty host".to_string()));
    }

    let authority = if let Ok(addr) = target.parse::<SocketAddr>() {
        addr.to_string()
    } else if let Ok(ip) = target.parse::<IpAddr>() {
        SocketAddr::new(ip, default_port).to_string()
    } else if let Some(ip) = target
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .and_then(|inner| inner.parse::<IpAddr>().ok())
    {
        // [v6addr] without a port
        SocketAddr::new(ip, default_port).to_string()
    } else if target.contains(&['/', '?', '#', '@', ' ', '[', ']'][..]) {
        return Err(TransferError::InvalidTarget(target.to_string()));
    } else if target.contains(':') {
        // hostname:port
        let (host, port) = target.rsplit_once(':').unwrap_or((target, ""));
        if host.is_empty() || port.parse::<u16>().is_err() {
            return Err(TransferError::InvalidTarget(target.to_string()));
        }
        target.to_string()
    } else {
        format!("{}:{}", target, default_port)
    };

    Ok(format!("http://{}{}", authority, DROP_PATH))
}

/// Sends files to a remote receiver in a single multipart upload
pub struct TransferClient {
    client: Client,
    config: TransferClientConfig,
}

impl TransferClient {
    pub fn new(config: TransferClientConfig) -> Result<Self, TransferError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self { client, config })
    }

    /// Send `paths` to `target` and return the receiver's reply body verbatim.
    ///
    /// Every file is opened before anything goes on the wire, so a missing file
    /// aborts the whole transfer.
    pub async fn send_files(&self, target: &str, paths: &[PathBuf]) -> Result<String, TransferError> {
        if paths.is_empty() {
            return Err(TransferError::NoFiles);
        }

        let url = drop_url(target, self.config.port)?;

        let mut opened = Vec::with_capacity(paths.len());
        for path in paths {
            debug!("Reading file {}", path.display());
            opened.push(open_for_upload(path).await?);
        }

        let total_bytes: u64 = opened.iter().map(|f| f.length).sum();
        let mut form = Form::new();
        for upload in opened {
            let body = Body::wrap_stream(ReaderStream::new(upload.file));
            let part = Part::stream_with_length(body, upload.length).file_name(upload.file_name);
            form = form.part(FILE_FIELD, part);
        }
        form = form.text(NAME_FIELD, self.config.sender_name.clone());

        info!("Transferring {} file(s), {} bytes to {}", paths.len(), total_bytes, url);
        let start_time = Instant::now();

        let response = self.client.post(&url).multipart(form).send().await?;
        let status = response.status();
        let reply = response.text().await?;

        if status.is_success() {
            info!(
                "POST {} - {} - {}ms - {:?}",
                url,
                status.as_u16(),
                start_time.elapsed().as_millis(),
                reply
            );
        } else {
            warn!("POST {} - {} - {:?}", url, status.as_u16(), reply);
        }

        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_drop_url_forms() {
        assert_eq!(drop_url("192.168.1.5", 2001).unwrap(), "http://192.168.1.5:2001/drop");
        assert_eq!(drop_url("192.168.1.5:3000", 2001).unwrap(), "http://192.168.1.5:3000/drop");
        assert_eq!(drop_url("fe80::1", 2001).unwrap(), "http://[fe80::1]:2001/drop");
        assert_eq!(drop_url("[fe80::1]", 2001).unwrap(), "http://[fe80::1]:2001/drop");
        assert_eq!(drop_url("[fe80::1]:3000", 2001).unwrap(), "http://[fe80::1]:3000/drop");
        assert_eq!(drop_url("laptop.local", 2001).unwrap(), "http://laptop.local:2001/drop");
        assert_eq!(drop_url("laptop:8080", 2001).unwrap(), "http://laptop:8080/drop");
    }

    #[test]
    fn test_drop_url_rejects_garbage() {
        assert!(drop_url("", 2001).is_err());
        assert!(drop_url("host/path", 2001).is_err());
        assert!(drop_url("host:notaport", 2001).is_err());
        assert!(drop_url("[not-an-ip]", 2001).is_err());
    }

    #[tokio::test]
    async fn test_missing_file_aborts_before_sending() {
        let dir = tempdir().unwrap();
        let present = dir.path().join("present.txt");
        std::fs::write(&present, b"hello").unwrap();
        let missing = dir.path().join("missing.txt");

        let client = TransferClient::new(TransferClientConfig::default()).unwrap();
        // Port 9 on loopback: nothing is contacted because opening fails first
        let err = client
            .send_files("127.0.0.1:9", &[present, missing.clone()])
            .await
            .unwrap_err();

        match err {
            TransferError::OpenFile { path, .. } => assert_eq!(path, missing),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_receiver_is_reported() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"hello").unwrap();

        // Bind then drop to get a port with nothing behind it
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let client = TransferClient::new(TransferClientConfig::default()).unwrap();
        let err = client
            .send_files(&format!("127.0.0.1:{}", port), &[file])
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Request(_)));
    }

    #[tokio::test]
    async fn test_no_files() {
        let client = TransferClient::new(TransferClientConfig::default()).unwrap();
        assert!(matches!(
            client.send_files("127.0.0.1", &[]).await,
            Err(TransferError::NoFiles)
        ));
    }
}
