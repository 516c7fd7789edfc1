use std::fs::File;
use std::io::{Read, Write};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use s3s::auth::SimpleAuth;
use s3s::service::{S3ServiceBuilder, SharedS3Service};
use s3s_fs::FileSystem;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// `FakeS3Server` is a fake implementation of an S3 server for testing purposes, serving a
/// temporary directory through `s3s-fs`.
///
/// Buckets are plain directories below the root and objects plain files, so tests can seed and
/// inspect the server's state without going through the S3 protocol.
pub struct FakeS3Server {
    #[allow(dead_code)]
    runtime: Arc<Runtime>,
    handle: JoinHandle<Result<()>>,
    cancel: CancellationToken,
    root: TempDir,
}

impl FakeS3Server {
    /// Creates a new instance of `FakeS3Server` and starts serving on `host:port`.
    ///
    /// The listener is bound before this method returns, so clients can connect right away.
    pub fn new(
        host: String,
        port: u16,
        maybe_auth: Option<SimpleAuth>,
        runtime: Arc<Runtime>,
    ) -> Result<FakeS3Server> {
        let root = TempDir::new().context("Temporary directory")?;
        debug!("FakeS3Server {}:{} has root fs {:?}", host, port, root.path());

        let fs = FileSystem::new(root.path())
            .map_err(|err| anyhow!("{:?}", err))
            .context("FileSystem creation")?;

        let service = {
            let mut builder = S3ServiceBuilder::new(fs);
            if let Some(auth) = maybe_auth {
                builder.set_auth(auth);
            }
            builder.build()
        };

        let listener = runtime
            .block_on(TcpListener::bind((host, port)))
            .context("FakeS3Server: tcp listener binding")?;

        let cancel = CancellationToken::new();
        let cancel_token = cancel.clone();
        let handle = runtime.spawn(async move {
            FakeS3Server::run_inner(service.into_shared(), cancel_token, listener)
                .await
                .inspect_err(|e| error!("FakeS3Server: connection loop failure {}", e))
        });
        Ok(FakeS3Server {
            runtime,
            handle,
            root,
            cancel,
        })
    }

    /// Accepts connections until cancelled, serving each one on its own task.
    async fn run_inner(
        service: SharedS3Service,
        cancel_token: CancellationToken,
        listener: TcpListener,
    ) -> Result<()> {
        let connection = ConnBuilder::new(TokioExecutor::new());

        loop {
            let (socket, _) = tokio::select! {
                result = listener.accept() => result.context("FakeS3Server: accepting connection")?,
                _ = cancel_token.cancelled() => return Ok(()),
            };
            let service = service.clone();
            let conn = connection.clone();
            tokio::spawn(async move {
                conn.serve_connection(TokioIo::new(socket), service)
                    .await
                    .inspect_err(|e| error!("Serve connection error: {}", e))
                    .ok();
            });
        }
    }

    /// Creates a new bucket in the fake S3 server.
    pub fn create_bucket<P: AsRef<str>>(&self, bucket: P) -> Result<()> {
        let path = self.root.path().join(bucket.as_ref());
        debug!(
            "FakeS3Server: creating bucket {}, fs path {:?}",
            bucket.as_ref(),
            path
        );
        std::fs::create_dir(path).context("Create bucket path")?;
        Ok(())
    }

    /// Checks if an object exists in the specified bucket.
    pub fn exists<P: AsRef<str>>(&self, bucket: P, file_path: P) -> Result<bool> {
        let path = self
            .root
            .path()
            .join(bucket.as_ref())
            .join(file_path.as_ref());
        Ok(std::fs::exists(path.as_path())?)
    }

    /// Reads the contents of an object in the specified bucket.
    pub fn get_bytes<P: AsRef<str>>(&self, bucket: P, file_path: P) -> Result<Vec<u8>> {
        let path = self
            .root
            .path()
            .join(bucket.as_ref())
            .join(file_path.as_ref());
        debug!(
            "FakeS3Server: reading from bucket {}, file_path {}, fs path {:?}",
            bucket.as_ref(),
            file_path.as_ref(),
            path
        );
        let mut target_bytes = Vec::new();
        File::open(path)
            .context("Open file for read")?
            .read_to_end(&mut target_bytes)
            .context("File reading")?;
        Ok(target_bytes)
    }

    /// Stores bytes as an object in the specified bucket, creating intermediate directories for
    /// `/` separated keys.
    pub fn put_bytes<P: AsRef<str>>(&self, bucket: P, file_path: P, contents: &[u8]) -> Result<()> {
        let path = self
            .root
            .path()
            .join(bucket.as_ref())
            .join(file_path.as_ref());
        debug!(
            "FakeS3Server: save bytes into bucket {}, file_path {}, fs path {:?}",
            bucket.as_ref(),
            file_path.as_ref(),
            path
        );
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Create object directories")?;
        }
        File::create(path)
            .context("Open file for write")?
            .write_all(contents)
            .context("Writing file contents")?;
        Ok(())
    }

    /// Discards the fake S3 server, cancelling any ongoing operations.
    pub fn discard(self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}
