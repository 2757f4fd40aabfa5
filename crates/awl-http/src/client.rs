//! Outbound HTTP collaborators: replica propagation and remote chunk deletion.

use std::time::Duration;

use awl_engine::{ChunkDeleter, ReplicaClient, ReplicaError, sign_grant};
use awl_types::{FileId, Needle, VolumeId};
use reqwest::StatusCode;
use reqwest::header;
use tracing::debug;

/// Longest error body kept in a [`ReplicaError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// Replays committed mutations on peer volume servers over HTTP.
///
/// Writes are sent as `POST http://{peer}/{fid}?type=replicate&ts=..` with
/// the payload exactly as stored; deletes as
/// `DELETE http://{peer}/{fid}?type=replicate&ts=..`.
#[derive(Clone)]
pub struct HttpReplicaClient {
    http: reqwest::Client,
    signing_key: Option<Vec<u8>>,
}

impl HttpReplicaClient {
    /// Create a client whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(timeout).build()?,
            signing_key: None,
        })
    }

    /// Sign every request with grants derived from `key`.
    pub fn with_signing_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.signing_key = Some(key.into());
        self
    }

    fn authorize(&self, req: reqwest::RequestBuilder, fid: FileId) -> reqwest::RequestBuilder {
        match &self.signing_key {
            Some(key) => req.bearer_auth(sign_grant(key, &fid.to_string())),
            None => req,
        }
    }
}

#[async_trait::async_trait]
impl ReplicaClient for HttpReplicaClient {
    async fn replicate_write(
        &self,
        peer: &str,
        volume_id: VolumeId,
        needle: &Needle,
    ) -> Result<(), ReplicaError> {
        let fid = needle.file_id(volume_id);
        let mut query: Vec<(&str, String)> = vec![
            ("type", "replicate".to_string()),
            ("ts", needle.last_modified.to_string()),
        ];
        if needle.is_manifest {
            query.push(("cm", "true".to_string()));
        }
        if let Some(name) = &needle.name {
            query.push(("name", name.clone()));
        }

        let mut req = self
            .http
            .post(format!("http://{peer}/{fid}"))
            .query(&query)
            .body(needle.data.clone());
        if let Some(mime) = &needle.mime {
            req = req.header(header::CONTENT_TYPE, mime);
        }
        if needle.compressed {
            req = req.header(header::CONTENT_ENCODING, "gzip");
        }

        debug!(%fid, peer, "replicating write");
        let resp = self
            .authorize(req, fid)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(resp, &[]).await
    }

    async fn replicate_delete(
        &self,
        peer: &str,
        fid: FileId,
        last_modified: u64,
    ) -> Result<(), ReplicaError> {
        let req = self
            .http
            .delete(format!("http://{peer}/{fid}"))
            .query(&[("type", "replicate".to_string()), ("ts", last_modified.to_string())]);

        debug!(%fid, peer, "replicating delete");
        let resp = self
            .authorize(req, fid)
            .send()
            .await
            .map_err(transport_error)?;
        // Already gone on the peer is as good as deleted.
        check_status(resp, &[StatusCode::NOT_FOUND]).await
    }
}

/// Deletes chunks on volumes this server does not serve by asking the
/// master: `DELETE http://{master}/{fid}`.
#[derive(Clone)]
pub struct HttpChunkDeleter {
    http: reqwest::Client,
    signing_key: Option<Vec<u8>>,
}

impl HttpChunkDeleter {
    /// Create a deleter whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(timeout).build()?,
            signing_key: None,
        })
    }

    /// Sign every request with grants derived from `key`.
    pub fn with_signing_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.signing_key = Some(key.into());
        self
    }
}

#[async_trait::async_trait]
impl ChunkDeleter for HttpChunkDeleter {
    async fn delete_chunk(&self, master: &str, fid: FileId) -> Result<(), ReplicaError> {
        let mut req = self.http.delete(format!("http://{master}/{fid}"));
        if let Some(key) = &self.signing_key {
            req = req.bearer_auth(sign_grant(key, &fid.to_string()));
        }

        debug!(%fid, master, "deleting remote chunk");
        let resp = req.send().await.map_err(transport_error)?;
        check_status(resp, &[StatusCode::NOT_FOUND]).await
    }
}

fn transport_error(err: reqwest::Error) -> ReplicaError {
    if err.is_timeout() {
        ReplicaError::Timeout
    } else {
        ReplicaError::Transport(err.to_string())
    }
}

async fn check_status(resp: reqwest::Response, also_ok: &[StatusCode]) -> Result<(), ReplicaError> {
    let status = resp.status();
    if status.is_success() || also_ok.contains(&status) {
        return Ok(());
    }
    let mut body = resp.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    Err(ReplicaError::Status {
        status: status.as_u16(),
        body,
    })
}
