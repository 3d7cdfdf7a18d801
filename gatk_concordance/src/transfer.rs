use std::{
    fs,
    path::Path,
    sync::OnceLock,
    time::Duration,
};

use anyhow::Context;
use aws_sdk_s3::{primitives::ByteStream, Client};
use base64::{engine::general_purpose::STANDARD, Engine};
use md5::Md5;
use sha2::{Digest, Sha256};
use tokio::{io::AsyncWriteExt, runtime::Runtime};

use crate::location::{Location, S3Path};

/// Number of attempts made for an HTTP download before giving up
pub const HTTP_ATTEMPTS: usize = 5;

/// Wait after the first failed HTTP attempt, doubled after each further failure
const HTTP_RETRY_WAIT: Duration = Duration::from_secs(1);

/// Moves files between remote locations and the local file system
pub trait Transfer: Sync {
    /// Download (or copy) src to the local path dest
    fn fetch(&self, src: &Location, dest: &Path) -> anyhow::Result<()>;

    /// Upload the local file src to dest
    fn upload(&self, src: &Path, dest: &S3Path) -> anyhow::Result<()>;
}

/// SSE-C key for one object: SHA-256 of the master key followed by the object URL
pub fn sse_customer_key(master_key: &[u8], url: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(master_key);
    hasher.update(url.as_bytes());
    hasher.finalize().into()
}

/// Headers for SSE-C requests: (base64 key, base64 MD5 of key)
fn sse_headers(master_key: &[u8], path: &S3Path) -> (String, String) {
    let key = sse_customer_key(master_key, &path.to_string());
    let md5 = Md5::digest(key);
    (STANDARD.encode(key), STANDARD.encode(md5))
}

/// Transfer for S3 (aws-sdk-s3) and HTTP(S) (reqwest) locations
///
/// The SDKs are async, so the transfer owns a private runtime.  The
/// staging threads call into it with block_on.
pub struct RemoteTransfer {
    rt: Runtime,
    http: reqwest::Client,
    s3: OnceLock<Client>,
    ssec_key: Option<Vec<u8>>,
    retry_wait: Duration,
}

impl RemoteTransfer {
    pub fn new(ssec_key: Option<&[u8]>) -> anyhow::Result<Self> {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .with_context(|| "Could not start async runtime for transfers")?;
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .with_context(|| "Could not set up HTTP client")?;
        Ok(Self {
            rt,
            http,
            s3: OnceLock::new(),
            ssec_key: ssec_key.map(|k| k.to_vec()),
            retry_wait: HTTP_RETRY_WAIT,
        })
    }

    // Client is only set up when needed as resolving the AWS configuration can
    // be slow when no region or credentials are set
    fn s3_client(&self) -> &Client {
        self.s3.get_or_init(|| {
            debug!("Setting up S3 client");
            let cfg = self
                .rt
                .block_on(aws_config::load_defaults(aws_config::BehaviorVersion::latest()));
            Client::new(&cfg)
        })
    }

    async fn http_download(&self, url: &reqwest::Url, dest: &Path) -> anyhow::Result<()> {
        let mut resp = self.http.get(url.clone()).send().await?.error_for_status()?;
        let mut wrt = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("Could not create {}", dest.display()))?;
        while let Some(chunk) = resp.chunk().await? {
            wrt.write_all(&chunk)
                .await
                .with_context(|| format!("Error writing to {}", dest.display()))?;
        }
        wrt.flush().await?;
        Ok(())
    }

    async fn http_download_with_retry(
        &self,
        url: &reqwest::Url,
        dest: &Path,
    ) -> anyhow::Result<()> {
        let mut attempt = 1;
        loop {
            match self.http_download(url, dest).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < HTTP_ATTEMPTS => {
                    let wait = self.retry_wait * (1u32 << (attempt - 1));
                    warn!(
                        "Download of {} failed (attempt {} of {}): {:#}; retrying in {:?}",
                        url, attempt, HTTP_ATTEMPTS, e, wait
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(e.context(format!(
                        "Giving up on {} after {} attempts",
                        url, HTTP_ATTEMPTS
                    )))
                }
            }
        }
    }
}

async fn s3_download(
    client: &Client,
    ssec_key: Option<&[u8]>,
    src: &S3Path,
    dest: &Path,
) -> anyhow::Result<()> {
    let mut req = client.get_object().bucket(src.bucket()).key(src.key());
    if let Some(k) = ssec_key {
        let (key, md5) = sse_headers(k, src);
        req = req
            .sse_customer_algorithm("AES256")
            .sse_customer_key(key)
            .sse_customer_key_md5(md5);
    }
    let mut resp = req.send().await?;
    let mut wrt = tokio::fs::File::create(dest)
        .await
        .with_context(|| format!("Could not create {}", dest.display()))?;
    while let Some(bytes) = resp.body.try_next().await? {
        wrt.write_all(&bytes)
            .await
            .with_context(|| format!("Error writing to {}", dest.display()))?;
    }
    wrt.flush().await?;
    Ok(())
}

async fn s3_upload(
    client: &Client,
    ssec_key: Option<&[u8]>,
    src: &Path,
    dest: &S3Path,
) -> anyhow::Result<()> {
    let body = ByteStream::from_path(src)
        .await
        .with_context(|| format!("Could not read {}", src.display()))?;
    let mut req = client
        .put_object()
        .bucket(dest.bucket())
        .key(dest.key())
        .body(body);
    if let Some(k) = ssec_key {
        let (key, md5) = sse_headers(k, dest);
        req = req
            .sse_customer_algorithm("AES256")
            .sse_customer_key(key)
            .sse_customer_key_md5(md5);
    }
    req.send().await?;
    Ok(())
}

impl Transfer for RemoteTransfer {
    fn fetch(&self, src: &Location, dest: &Path) -> anyhow::Result<()> {
        debug!("Fetching {} to {}", src, dest.display());
        match src {
            Location::S3(p) => {
                // The client must be set up outside block_on as it may itself block on the runtime
                let client = self.s3_client();
                self.rt
                    .block_on(s3_download(client, self.ssec_key.as_deref(), p, dest))
            }
            Location::Http(u) => self.rt.block_on(self.http_download_with_retry(u, dest)),
            Location::Local(p) => fs::copy(p, dest)
                .map(|_| ())
                .with_context(|| format!("Error copying {} to {}", p.display(), dest.display())),
        }
    }

    fn upload(&self, src: &Path, dest: &S3Path) -> anyhow::Result<()> {
        debug!("Uploading {} to {}", src.display(), dest);
        let client = self.s3_client();
        self.rt
            .block_on(s3_upload(client, self.ssec_key.as_deref(), src, dest))
            .with_context(|| format!("Failed to upload {} to {}", src.display(), dest))
    }
}
