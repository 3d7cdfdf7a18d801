use std::{fmt, path::PathBuf, str::FromStr};

use url::Url;

/// An object in an S3 bucket.  For destinations the key is a prefix and may be empty
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Path {
    bucket: String,
    key: String,
}

impl S3Path {
    pub fn new<S: Into<String>, T: Into<String>>(bucket: S, key: T) -> anyhow::Result<Self> {
        let bucket = bucket.into();
        if bucket.is_empty() || bucket.contains('/') {
            Err(anyhow!("Invalid S3 bucket name '{}'", bucket))
        } else {
            Ok(Self {
                bucket,
                key: key.into().trim_matches('/').to_owned(),
            })
        }
    }

    /// Parse either `s3://bucket/key` or plain `bucket/key`
    pub fn from_dir_str(s: &str) -> anyhow::Result<Self> {
        let s = s.strip_prefix("s3://").unwrap_or(s);
        let (bucket, key) = s.split_once('/').unwrap_or((s, ""));
        Self::new(bucket, key)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Location of an object called `name` below this prefix
    pub fn join(&self, name: &str) -> Self {
        let key = if self.key.is_empty() {
            name.to_owned()
        } else {
            format!("{}/{}", self.key, name)
        };
        Self {
            bucket: self.bucket.clone(),
            key,
        }
    }

    fn base_name(&self) -> Option<&str> {
        self.key.rsplit('/').next().filter(|s| !s.is_empty())
    }
}

impl fmt::Display for S3Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Source of an input file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    S3(S3Path),
    Http(Url),
    Local(PathBuf),
}

impl Location {
    /// Final path segment of the location (used as the default label)
    pub fn base_name(&self) -> Option<&str> {
        match self {
            Self::S3(p) => p.base_name(),
            Self::Http(u) => u
                .path_segments()
                .and_then(|mut s| s.next_back())
                .filter(|s| !s.is_empty()),
            Self::Local(p) => p.file_name().and_then(|s| s.to_str()),
        }
    }

    pub fn is_remote(&self) -> bool {
        !matches!(self, Self::Local(_))
    }
}

impl FromStr for Location {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix("s3://") {
            let (bucket, key) = rest
                .split_once('/')
                .ok_or_else(|| anyhow!("S3 URL {} has no object key", s))?;
            if key.trim_matches('/').is_empty() {
                return Err(anyhow!("S3 URL {} has no object key", s));
            }
            Ok(Self::S3(S3Path::new(bucket, key)?))
        } else if s.contains("://") {
            let url = Url::parse(s).map_err(|e| anyhow!("Invalid URL {}: {}", s, e))?;
            match url.scheme() {
                "http" | "https" => Ok(Self::Http(url)),
                "file" => url
                    .to_file_path()
                    .map(Self::Local)
                    .map_err(|_| anyhow!("Invalid file URL {}", s)),
                sch => Err(anyhow!("Unsupported URL scheme '{}' in {}", sch, s)),
            }
        } else if s.is_empty() {
            Err(anyhow!("Empty location"))
        } else {
            Ok(Self::Local(PathBuf::from(s)))
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::S3(p) => write!(f, "{}", p),
            Self::Http(u) => write!(f, "{}", u),
            Self::Local(p) => write!(f, "{}", p.display()),
        }
    }
}
