//! Output backends for emitting snapshots.

use std::path::PathBuf;
use std::sync::Arc;

use loadwatch_types::Snapshot;

/// Output destination for published snapshots.
#[derive(Debug)]
pub enum Output {
    /// Write snapshots to a JSON file.
    ///
    /// Each snapshot replaces the file atomically: it is written to a
    /// hidden temporary file in the same directory and renamed over the
    /// target, so readers never see a partial document.
    File(PathBuf),

    /// Send snapshots to a TCP server.
    ///
    /// Each snapshot is sent as a newline-delimited JSON message over a
    /// fresh connection.
    Tcp(String),

    /// Send snapshots through a channel.
    ///
    /// Use `Output::channel()` to create this variant and get the receiver.
    #[cfg(feature = "tokio")]
    Channel(tokio::sync::mpsc::Sender<Arc<Snapshot>>),
}

impl Output {
    /// Create a file output.
    ///
    /// ```rust
    /// use loadwatch_core::Output;
    ///
    /// let output = Output::file("snapshot.json");
    /// ```
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Output::File(path.into())
    }

    /// Create a TCP output.
    pub fn tcp(addr: impl Into<String>) -> Self {
        Output::Tcp(addr.into())
    }

    /// Create a channel output and return both the output and receiver.
    ///
    /// Sends never block: if the receiver falls `buffer` snapshots behind,
    /// newer snapshots are dropped until it catches up.
    #[cfg(feature = "tokio")]
    pub fn channel(buffer: usize) -> (Self, tokio::sync::mpsc::Receiver<Arc<Snapshot>>) {
        let (tx, rx) = tokio::sync::mpsc::channel(buffer);
        (Output::Channel(tx), rx)
    }

    /// Short description for logs.
    pub fn describe(&self) -> String {
        match self {
            Output::File(path) => format!("file: {}", path.display()),
            Output::Tcp(addr) => format!("tcp: {}", addr),
            #[cfg(feature = "tokio")]
            Output::Channel(_) => "channel".to_string(),
        }
    }

    /// Emit a snapshot to this output.
    #[cfg(feature = "tokio")]
    pub(crate) async fn emit(&self, snapshot: &Arc<Snapshot>) -> std::io::Result<()> {
        match self {
            Output::File(path) => {
                let json = serde_json::to_string_pretty(snapshot.as_ref())?;
                let staging = staging_path(path);
                tokio::fs::write(&staging, json).await?;
                tokio::fs::rename(&staging, path).await?;
            }
            Output::Tcp(addr) => {
                use tokio::io::AsyncWriteExt;
                use tokio::net::TcpStream;

                let mut stream = TcpStream::connect(addr).await?;
                let mut line = serde_json::to_vec(snapshot.as_ref())?;
                line.push(b'\n');
                stream.write_all(&line).await?;
            }
            Output::Channel(tx) => {
                // Best effort: a slow consumer must not stall publication
                let _ = tx.try_send(snapshot.clone());
            }
        }
        Ok(())
    }
}

/// `dir/.name.tmp` next to `dir/name`.
#[cfg(feature = "tokio")]
fn staging_path(path: &std::path::Path) -> PathBuf {
    let mut name = std::ffi::OsString::from(".");
    name.push(path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("snapshot")));
    name.push(".tmp");
    path.with_file_name(name)
}
